//! Chain-data accessor abstraction.
//!
//! The account cache never computes balances itself; it re-reads them from
//! a node through this trait. Implementations wrap a JSON-RPC client, an
//! indexer database or, in tests, a scripted in-memory ledger.

pub mod error;

pub use error::ChainError;

use relay_types::{Address, BlockTag, U256};

/// Authoritative on-chain reads.
///
/// Calls may block on network I/O; the account cache invokes them from its
/// single event-processing task and tolerates per-call failures.
pub trait ChainAccessor: Send + Sync {
    /// Balance of `token` held by `owner`. `token` is
    /// [`relay_types::NATIVE_ASSET`] for the native asset.
    fn balance(&self, owner: &Address, token: &Address, at: BlockTag) -> Result<U256, ChainError>;

    /// Amount of `owner`'s `token` that `spender` may transfer.
    fn allowance(
        &self,
        owner: &Address,
        token: &Address,
        spender: &Address,
        at: BlockTag,
    ) -> Result<U256, ChainError>;

    /// The spender address that must be approved for transfers routed
    /// through the contract at `target`.
    fn spender_for(&self, target: &Address) -> Result<Address, ChainError>;
}

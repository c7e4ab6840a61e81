//! Fundamental types for the relay account cache.
//!
//! This crate defines the types shared across every other crate in the workspace:
//! chain addresses, block numbers, cache keys, chain events and timestamps.

pub mod address;
pub mod block;
pub mod error;
pub mod event;
pub mod keys;
pub mod time;

pub use address::{is_hex_address, parse_address, NATIVE_ASSET};
pub use alloy_primitives::{Address, U256};
pub use block::{BlockNumber, BlockTag};
pub use error::TypesError;
pub use event::{
    ApprovalEvent, ChainEvent, ForkEvent, NativeTransferEvent, TransferEvent, TxStatus,
    WrapEvent,
};
pub use keys::{AllowanceKey, BalanceKey};
pub use time::{Clock, SystemClock, Timestamp};

//! Key layout and record encoding shared by the writer and every reader.
//!
//! Addresses are rendered as lowercase `0x`-prefixed hex so that keys built
//! from checksummed and plain inputs collide. Values are bincode-encoded.

use relay_types::{Address, AllowanceKey, BalanceKey, BlockNumber, BlockTag, U256};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::StoreError;

const BALANCE_PREFIX: &str = "balance";
const ALLOWANCE_PREFIX: &str = "allowance";
const UNLOCK_PREFIX: &str = "unlock";
const BLOCK_CHANGES_PREFIX: &str = "block_changes";

/// Lowest block number whose [`BlockChanges`] may still be stored.
pub const RETENTION_WATERMARK_KEY: &str = "block_changes:watermark";

pub fn balance_key(key: &BalanceKey) -> String {
    format!("{BALANCE_PREFIX}:{:#x}:{:#x}", key.owner, key.token)
}

pub fn allowance_key(key: &AllowanceKey) -> String {
    format!(
        "{ALLOWANCE_PREFIX}:{:#x}:{:#x}:{:#x}",
        key.owner, key.token, key.spender
    )
}

pub fn unlock_key(owner: &Address) -> String {
    format!("{UNLOCK_PREFIX}:{owner:#x}")
}

pub fn block_changes_key(block: BlockNumber) -> String {
    format!("{BLOCK_CHANGES_PREFIX}:{block}")
}

/// A reconciled balance or allowance together with the chain state it was
/// read from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedValue {
    pub value: U256,
    pub derived_at: BlockTag,
}

/// Block-scoped bookkeeping: every key reconciled at the end of `block`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockChanges {
    pub block: BlockNumber,
    pub balances: Vec<BalanceKey>,
    pub allowances: Vec<AllowanceKey>,
}

impl BlockChanges {
    pub fn is_empty(&self) -> bool {
        self.balances.is_empty() && self.allowances.is_empty()
    }

    pub fn key_count(&self) -> usize {
        self.balances.len() + self.allowances.len()
    }
}

pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
    bincode::serialize(value).map_err(|e| StoreError::Serialization(e.to_string()))
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
    bincode::deserialize(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
}

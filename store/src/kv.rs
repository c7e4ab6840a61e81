//! Key-value storage trait.

use std::time::Duration;

use crate::StoreError;

/// A shared key-value store with per-entry expiry.
///
/// The account cache is the only writer of balance, allowance and
/// bookkeeping entries, but other processes read the same store, so
/// implementations must make each `set`/`delete` individually atomic.
pub trait KvStore: Send + Sync {
    /// Fetch a value. Expired entries read as `None`.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Store a value, replacing any previous one. `ttl` of `None` keeps the
    /// entry until it is overwritten or deleted.
    fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<(), StoreError>;

    /// Remove a value. Deleting an absent key is not an error.
    fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Whether a live (non-expired) entry exists.
    fn exists(&self, key: &str) -> Result<bool, StoreError> {
        self.get(key).map(|v| v.is_some())
    }
}

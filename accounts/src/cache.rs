//! Read side of the account cache and the wallet unlock flag.

use std::sync::Arc;
use std::time::Duration;

use relay_store::layout::{self, allowance_key, balance_key, unlock_key};
use relay_store::{CachedValue, KvStore};
use relay_types::{parse_address, Address, AllowanceKey, BalanceKey};

use crate::config::AccountCacheConfig;
use crate::AccountError;

const UNLOCKED: &[u8] = b"true";

/// Cloneable handle over the shared store for query consumers.
///
/// Values read here reflect at least the last finalized block; they are
/// written only by the process holding the cluster lock.
#[derive(Clone)]
pub struct AccountCache {
    store: Arc<dyn KvStore>,
    unlock_ttl: Duration,
}

impl AccountCache {
    pub fn new(store: Arc<dyn KvStore>, unlock_ttl: Duration) -> Self {
        Self { store, unlock_ttl }
    }

    pub fn from_config(store: Arc<dyn KvStore>, config: &AccountCacheConfig) -> Self {
        Self::new(store, config.unlock_ttl())
    }

    pub fn balance(
        &self,
        owner: Address,
        token: Address,
    ) -> Result<Option<CachedValue>, AccountError> {
        self.read(&balance_key(&BalanceKey::new(owner, token)))
    }

    pub fn allowance(
        &self,
        owner: Address,
        token: Address,
        spender: Address,
    ) -> Result<Option<CachedValue>, AccountError> {
        self.read(&allowance_key(&AllowanceKey::new(owner, token, spender)))
    }

    /// Mark `owner` as unlocked for the configured TTL.
    ///
    /// Rejects anything that is not a 20-byte hex address without touching
    /// the store.
    pub fn set_wallet_unlocked(&self, owner: &str) -> Result<(), AccountError> {
        let address = parse_address(owner).map_err(|e| {
            tracing::debug!(input = owner, "rejected unlock request");
            AccountError::from(e)
        })?;
        self.store
            .set(&unlock_key(&address), UNLOCKED, Some(self.unlock_ttl))?;
        tracing::info!(
            owner = %address,
            ttl_secs = self.unlock_ttl.as_secs(),
            "wallet unlocked"
        );
        Ok(())
    }

    pub fn is_wallet_unlocked(&self, owner: &Address) -> Result<bool, AccountError> {
        Ok(self
            .store
            .get(&unlock_key(owner))?
            .is_some_and(|v| v == UNLOCKED))
    }

    fn read(&self, key: &str) -> Result<Option<CachedValue>, AccountError> {
        Ok(self
            .store
            .get(key)?
            .map(|bytes| layout::decode(&bytes))
            .transpose()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_nullables::NullStore;
    use relay_types::{BlockTag, U256};

    const OWNER: &str = "0x52908400098527886E0F7030069857D2E4169EE7";

    fn cache(ttl_secs: u64) -> (Arc<NullStore>, AccountCache) {
        let store = Arc::new(NullStore::new());
        let cache = AccountCache::new(store.clone(), Duration::from_secs(ttl_secs));
        (store, cache)
    }

    #[test]
    fn unlock_flag_expires_after_ttl() {
        let (store, cache) = cache(600);
        cache.set_wallet_unlocked(OWNER).unwrap();
        let owner = parse_address(OWNER).unwrap();

        assert!(cache.is_wallet_unlocked(&owner).unwrap());
        assert_eq!(store.ttl_of(&unlock_key(&owner)), Some(600));

        store.clock().advance(599);
        assert!(cache.is_wallet_unlocked(&owner).unwrap());
        store.clock().advance(1);
        assert!(!cache.is_wallet_unlocked(&owner).unwrap());
    }

    #[test]
    fn lowercase_and_checksummed_inputs_share_a_key() {
        let (store, cache) = cache(60);
        cache.set_wallet_unlocked(OWNER).unwrap();
        cache.set_wallet_unlocked(&OWNER.to_lowercase()).unwrap();
        let owner = parse_address(OWNER).unwrap();
        assert_eq!(store.write_count(&unlock_key(&owner)), 2);
        assert_eq!(store.writes().len(), 2);
    }

    #[test]
    fn malformed_address_is_rejected_without_write() {
        let (store, cache) = cache(60);
        for input in [
            "not-an-address",
            "",
            "0x1234",
            "0xZZ908400098527886E0F7030069857D2E4169EE7",
        ] {
            let result = cache.set_wallet_unlocked(input);
            assert!(matches!(result, Err(AccountError::InvalidAddress(_))), "{input}");
        }
        assert!(store.writes().is_empty());
    }

    #[test]
    fn reads_decode_cached_values() {
        let (store, cache) = cache(60);
        let owner = Address::repeat_byte(1);
        let token = Address::repeat_byte(2);
        assert_eq!(cache.balance(owner, token).unwrap(), None);

        let record = CachedValue {
            value: U256::from(77u64),
            derived_at: BlockTag::Number(12),
        };
        store
            .set(
                &balance_key(&BalanceKey::new(owner, token)),
                &layout::encode(&record).unwrap(),
                None,
            )
            .unwrap();
        assert_eq!(cache.balance(owner, token).unwrap(), Some(record));
        assert_eq!(cache.allowance(owner, token, owner).unwrap(), None);
    }
}

//! LMDB implementation of KvStore.

use std::sync::Arc;
use std::time::Duration;

use heed::types::{Bytes, Str};
use heed::{Database, Env};

use relay_store::{KvStore, StoreError};
use relay_types::Clock;

use crate::entry::StoredEntry;
use crate::LmdbError;

pub struct LmdbKvStore {
    pub(crate) env: Arc<Env>,
    pub(crate) kv_db: Database<Str, Bytes>,
    pub(crate) clock: Arc<dyn Clock>,
}

impl LmdbKvStore {
    /// Delete every expired entry. Returns how many were removed.
    ///
    /// Reads already hide expired entries, so this only reclaims space.
    pub fn purge_expired(&self) -> Result<usize, StoreError> {
        let now = self.clock.now();
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        let mut expired = Vec::new();
        {
            let iter = self.kv_db.iter(&wtxn).map_err(LmdbError::from)?;
            for item in iter {
                let (key, bytes) = item.map_err(LmdbError::from)?;
                match StoredEntry::from_bytes(bytes) {
                    Ok(entry) if entry.is_expired(now) => expired.push(key.to_string()),
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!(key, error = %e, "undecodable entry, purging");
                        expired.push(key.to_string());
                    }
                }
            }
        }
        for key in &expired {
            self.kv_db
                .delete(&mut wtxn, key)
                .map_err(LmdbError::from)?;
        }
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(expired.len())
    }

    /// Number of stored entries, expired ones included.
    pub fn len(&self) -> Result<u64, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        Ok(self.kv_db.len(&rtxn).map_err(LmdbError::from)?)
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        self.len().map(|n| n == 0)
    }
}

impl KvStore for LmdbKvStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        let Some(bytes) = self.kv_db.get(&rtxn, key).map_err(LmdbError::from)? else {
            return Ok(None);
        };
        let entry = StoredEntry::from_bytes(bytes)?;
        if entry.is_expired(self.clock.now()) {
            return Ok(None);
        }
        Ok(Some(entry.value))
    }

    fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<(), StoreError> {
        let entry = StoredEntry {
            expires_at: ttl.map(|ttl| self.clock.now().plus_secs(ttl.as_secs())),
            value: value.to_vec(),
        };
        let bytes = entry.to_bytes()?;
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        self.kv_db
            .put(&mut wtxn, key, &bytes)
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        self.kv_db.delete(&mut wtxn, key).map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }
}

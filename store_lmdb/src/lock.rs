//! LMDB implementation of ClusterLock.
//!
//! Each lock is a single record in the `locks` database. LMDB serialises
//! write transactions across every process sharing the environment, so the
//! read-check-write inside one transaction is an atomic compare-and-set.

use std::sync::Arc;
use std::time::Duration;

use heed::types::{Bytes, Str};
use heed::{Database, Env};

use relay_store::{ClusterLock, LockError};
use relay_types::{Clock, Timestamp};

use crate::entry::LeaseRecord;
use crate::LmdbError;

pub struct LmdbLeaseLock {
    pub(crate) env: Arc<Env>,
    pub(crate) locks_db: Database<Str, Bytes>,
    pub(crate) clock: Arc<dyn Clock>,
}

impl LmdbLeaseLock {
    /// Current lease on `name`, if any, expired or not.
    pub fn current_lease(&self, name: &str) -> Result<Option<LeaseRecord>, LockError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        match self.locks_db.get(&rtxn, name).map_err(LmdbError::from)? {
            Some(bytes) => Ok(Some(LeaseRecord::from_bytes(bytes)?)),
            None => Ok(None),
        }
    }

    fn lease_until(&self, lease: Duration) -> Timestamp {
        self.clock.now().plus_secs(lease.as_secs().max(1))
    }
}

impl ClusterLock for LmdbLeaseLock {
    fn try_acquire(&self, name: &str, holder: &str, lease: Duration) -> Result<bool, LockError> {
        let now = self.clock.now();
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        let existing = match self.locks_db.get(&wtxn, name).map_err(LmdbError::from)? {
            Some(bytes) => Some(LeaseRecord::from_bytes(bytes)?),
            None => None,
        };

        if let Some(current) = &existing {
            if current.holder != holder && !current.expires_at.is_reached(now) {
                return Ok(false);
            }
            if current.holder != holder {
                tracing::info!(
                    lock = name,
                    previous = %current.holder,
                    "taking over expired lease"
                );
            }
        }

        let record = LeaseRecord {
            holder: holder.to_string(),
            expires_at: self.lease_until(lease),
        };
        self.locks_db
            .put(&mut wtxn, name, &record.to_bytes()?)
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(true)
    }

    fn renew(&self, name: &str, holder: &str, lease: Duration) -> Result<bool, LockError> {
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        let Some(bytes) = self.locks_db.get(&wtxn, name).map_err(LmdbError::from)? else {
            return Ok(false);
        };
        let mut record = LeaseRecord::from_bytes(bytes)?;
        if record.holder != holder {
            return Ok(false);
        }
        record.expires_at = self.lease_until(lease);
        self.locks_db
            .put(&mut wtxn, name, &record.to_bytes()?)
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(true)
    }

    fn release(&self, name: &str, holder: &str) -> Result<(), LockError> {
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        let held = match self.locks_db.get(&wtxn, name).map_err(LmdbError::from)? {
            Some(bytes) => LeaseRecord::from_bytes(bytes)?.holder == holder,
            None => false,
        };
        if !held {
            return Err(LockError::NotHeld {
                name: name.to_string(),
                holder: holder.to_string(),
            });
        }
        self.locks_db
            .delete(&mut wtxn, name)
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }
}

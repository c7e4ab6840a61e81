//! LMDB environment setup.

use std::path::Path;
use std::sync::Arc;

use heed::types::{Bytes, Str};
use heed::{Database, Env, EnvOpenOptions};
use relay_types::{Clock, SystemClock};

use crate::{LmdbError, LmdbKvStore, LmdbLeaseLock};

/// Number of named databases in the environment.
const MAX_DBS: u32 = 4;

/// Default map size: 1 GiB.
pub const DEFAULT_MAP_SIZE: usize = 1 << 30;

/// Wraps the LMDB environment and all database handles.
pub struct LmdbEnvironment {
    env: Arc<Env>,
    kv_db: Database<Str, Bytes>,
    locks_db: Database<Str, Bytes>,
    clock: Arc<dyn Clock>,
}

impl LmdbEnvironment {
    /// Open or create an LMDB environment at the given path.
    pub fn open(path: &Path, map_size: usize) -> Result<Self, LmdbError> {
        Self::open_with_clock(path, map_size, Arc::new(SystemClock))
    }

    /// Open with a custom clock for TTL and lease decisions.
    pub fn open_with_clock(
        path: &Path,
        map_size: usize,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, LmdbError> {
        std::fs::create_dir_all(path)?;

        // SAFETY: the environment is opened once per process and never
        // truncated or remapped behind heed's back.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(map_size)
                .max_dbs(MAX_DBS)
                .open(path)?
        };

        let mut wtxn = env.write_txn()?;
        let kv_db: Database<Str, Bytes> = env.create_database(&mut wtxn, Some("kv"))?;
        let locks_db: Database<Str, Bytes> = env.create_database(&mut wtxn, Some("locks"))?;
        wtxn.commit()?;

        tracing::debug!(path = %path.display(), map_size, "opened LMDB environment");

        Ok(Self {
            env: Arc::new(env),
            kv_db,
            locks_db,
            clock,
        })
    }

    /// Handle implementing [`relay_store::KvStore`].
    pub fn kv_store(&self) -> LmdbKvStore {
        LmdbKvStore {
            env: Arc::clone(&self.env),
            kv_db: self.kv_db,
            clock: Arc::clone(&self.clock),
        }
    }

    /// Handle implementing [`relay_store::ClusterLock`].
    pub fn lease_lock(&self) -> LmdbLeaseLock {
        LmdbLeaseLock {
            env: Arc::clone(&self.env),
            locks_db: self.locks_db,
            clock: Arc::clone(&self.clock),
        }
    }
}

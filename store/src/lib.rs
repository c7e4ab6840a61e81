//! Abstract storage traits for the relay account cache.
//!
//! Every backend (LMDB, Redis, in-memory for testing) implements these
//! traits. The rest of the codebase depends only on the traits and on the
//! key layout in [`layout`].

pub mod error;
pub mod kv;
pub mod layout;
pub mod lock;

pub use error::{LockError, StoreError};
pub use kv::KvStore;
pub use layout::{BlockChanges, CachedValue};
pub use lock::ClusterLock;

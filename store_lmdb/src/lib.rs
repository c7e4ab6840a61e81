//! LMDB storage backend for the relay account cache.
//!
//! Implements [`relay_store::KvStore`] and [`relay_store::ClusterLock`] using
//! the `heed` LMDB bindings. LMDB environments may be opened by several
//! processes at once, so every process on a host shares one view of the
//! cache and one set of lock leases.

pub mod entry;
pub mod environment;
pub mod error;
pub mod kv;
pub mod lock;

pub use environment::LmdbEnvironment;
pub use error::LmdbError;
pub use kv::LmdbKvStore;
pub use lock::LmdbLeaseLock;

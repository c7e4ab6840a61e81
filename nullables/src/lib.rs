//! Nullable infrastructure for deterministic testing.
//!
//! Every external collaborator of the account cache (clock, key-value
//! store, chain accessor, cluster lock) is abstracted behind a trait. This
//! crate provides test-friendly implementations that:
//! - Return deterministic values
//! - Can be controlled programmatically
//! - Record what was asked of them
//! - Never touch the filesystem or network
//!
//! Usage: swap real implementations for nullables in tests.

pub mod chain;
pub mod clock;
pub mod lock;
pub mod store;

pub use chain::{ChainCall, NullChain};
pub use clock::NullClock;
pub use lock::NullLock;
pub use store::NullStore;

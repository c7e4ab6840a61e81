//! Block-indexed account-state cache with reorg-safe invalidation.
//!
//! Chain events mark balance and allowance keys dirty; at each block end the
//! dirty keys are re-read from the chain and written to a shared key-value
//! store. Per-block bookkeeping lets a reorganization replay exactly the keys
//! it may have poisoned, and a block-count retention sweep bounds how much of
//! that bookkeeping is kept.
//!
//! ## Crate layout
//!
//! - [`tracker`]: per-block dirty key sets and the block cursor
//! - [`reconcile`]: re-derivation of dirty keys into the store
//! - [`bookkeeping`]: persisted per-block key lists and the retention watermark
//! - [`retention`]: block-count eviction of bookkeeping
//! - [`fork`]: descending replay across a reorganized range
//! - [`engine`]: the event handlers tying the above together
//! - [`router`]: the single task that feeds events to the engine
//! - [`guard`]: the cluster-wide single-writer lease
//! - [`cache`]: read handle and the wallet unlock flag
//! - [`service`]: dependency checks and task lifecycle

pub mod bookkeeping;
pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod fork;
pub mod guard;
pub mod metrics;
pub mod reconcile;
pub mod retention;
pub mod router;
pub mod service;
pub mod shutdown;
pub mod tracker;

pub use bookkeeping::BlockBook;
pub use cache::AccountCache;
pub use config::{AccountCacheConfig, DEFAULT_TTL_SECS};
pub use engine::{AccountEngine, Applied};
pub use error::AccountError;
pub use fork::{ForkReconciler, ForkState};
pub use guard::{BackoffPolicy, ClusterGuard};
pub use metrics::AccountMetrics;
pub use reconcile::{ReconcileReport, Reconciler};
pub use retention::{RetentionSweep, SweepReport, MAX_BLOCKS_PER_SWEEP};
pub use router::{EventRouter, EventSender};
pub use service::{AccountService, AccountServiceBuilder, RunningService};
pub use shutdown::ShutdownController;
pub use tracker::DirtyKeyTracker;

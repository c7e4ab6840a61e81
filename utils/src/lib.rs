//! Shared utilities for the relay account cache.

pub mod logging;
pub mod time;

pub use logging::{init_logging, init_test_logging, logging_ready, LogFormat};
pub use time::format_duration;

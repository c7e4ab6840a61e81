//! Account cache configuration with TOML file support.
//!
//! Two unrelated expiry notions live here and are kept apart on purpose:
//! `retention_blocks` counts blocks of bookkeeping, while `unlock_ttl_secs`
//! and `value_ttl_secs` are wall-clock seconds on store entries.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use relay_utils::LogFormat;

use crate::AccountError;

/// Configuration for the account cache service.
///
/// Can be loaded from a TOML file via [`AccountCacheConfig::from_toml_file`]
/// or built programmatically (e.g. for tests).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AccountCacheConfig {
    /// Blocks of per-block bookkeeping kept behind the cursor.
    #[serde(default = "default_retention_blocks")]
    pub retention_blocks: u64,

    /// Seconds a wallet stays marked as unlocked. Zero selects the default.
    #[serde(default = "default_ttl_secs")]
    pub unlock_ttl_secs: u64,

    /// Seconds a reconciled balance or allowance stays readable. Zero
    /// selects the default.
    #[serde(default = "default_ttl_secs")]
    pub value_ttl_secs: u64,

    /// Name of the cluster-wide lock guarding reconciliation writes.
    #[serde(default = "default_lock_name")]
    pub lock_name: String,

    /// Identity this process uses when holding the lock. Derived from the
    /// host name and pid when absent.
    #[serde(default)]
    pub holder_id: Option<String>,

    /// Lease length of the cluster lock, in seconds.
    #[serde(default = "default_lock_lease_secs")]
    pub lock_lease_secs: u64,

    /// First retry delay while waiting for the lock, in milliseconds.
    #[serde(default = "default_lock_retry_initial_ms")]
    pub lock_retry_initial_ms: u64,

    /// Upper bound of the retry delay, in milliseconds.
    #[serde(default = "default_lock_retry_max_ms")]
    pub lock_retry_max_ms: u64,

    /// Capacity of the inbound event queue.
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// Directory of the LMDB environment.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// LMDB map size in bytes.
    #[serde(default = "default_map_size")]
    pub map_size: usize,

    /// Log format: "human" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: LogFormat,

    /// Log level filter: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// ── Serde default helpers ──────────────────────────────────────────────

pub const DEFAULT_TTL_SECS: u64 = 3600 * 24 * 100;

fn default_retention_blocks() -> u64 {
    500
}

fn default_ttl_secs() -> u64 {
    DEFAULT_TTL_SECS
}

fn default_lock_name() -> String {
    "account_manager".to_string()
}

fn default_lock_lease_secs() -> u64 {
    30
}

fn default_lock_retry_initial_ms() -> u64 {
    200
}

fn default_lock_retry_max_ms() -> u64 {
    10_000
}

fn default_event_channel_capacity() -> usize {
    4096
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./relay_data")
}

fn default_map_size() -> usize {
    1 << 30
}

fn default_log_format() -> LogFormat {
    LogFormat::Human
}

fn default_log_level() -> String {
    "info".to_string()
}

// ── Impl ───────────────────────────────────────────────────────────────

impl AccountCacheConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, AccountError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| AccountError::Config(e.to_string()))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, AccountError> {
        let config: Self = toml::from_str(s).map_err(|e| AccountError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml_string(&self) -> Result<String, AccountError> {
        toml::to_string_pretty(self).map_err(|e| AccountError::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), AccountError> {
        if self.lock_name.is_empty() {
            return Err(AccountError::Config("lock_name must not be empty".into()));
        }
        if self.event_channel_capacity == 0 {
            return Err(AccountError::Config(
                "event_channel_capacity must be positive".into(),
            ));
        }
        if self.lock_retry_initial_ms > self.lock_retry_max_ms {
            return Err(AccountError::Config(
                "lock_retry_initial_ms exceeds lock_retry_max_ms".into(),
            ));
        }
        Ok(())
    }

    pub fn unlock_ttl(&self) -> Duration {
        Duration::from_secs(non_zero_or_default(self.unlock_ttl_secs))
    }

    pub fn value_ttl(&self) -> Duration {
        Duration::from_secs(non_zero_or_default(self.value_ttl_secs))
    }

    pub fn lock_lease(&self) -> Duration {
        Duration::from_secs(self.lock_lease_secs.max(1))
    }

    pub fn holder_id(&self) -> String {
        self.holder_id.clone().unwrap_or_else(|| {
            let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
            format!("{host}-{}", std::process::id())
        })
    }
}

fn non_zero_or_default(secs: u64) -> u64 {
    if secs > 0 {
        secs
    } else {
        DEFAULT_TTL_SECS
    }
}

impl Default for AccountCacheConfig {
    fn default() -> Self {
        Self {
            retention_blocks: default_retention_blocks(),
            unlock_ttl_secs: default_ttl_secs(),
            value_ttl_secs: default_ttl_secs(),
            lock_name: default_lock_name(),
            holder_id: None,
            lock_lease_secs: default_lock_lease_secs(),
            lock_retry_initial_ms: default_lock_retry_initial_ms(),
            lock_retry_max_ms: default_lock_retry_max_ms(),
            event_channel_capacity: default_event_channel_capacity(),
            data_dir: default_data_dir(),
            map_size: default_map_size(),
            log_format: default_log_format(),
            log_level: default_log_level(),
        }
    }
}

//! relay-admin: operator CLI for the relay account cache.
//!
//! Works directly on the LMDB environment the relay writes to.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use relay_accounts::{AccountCache, AccountCacheConfig, AccountMetrics, BlockBook, RetentionSweep};
use relay_store::ClusterLock;
use relay_store_lmdb::{LmdbEnvironment, LmdbKvStore};
use relay_types::{parse_address, NATIVE_ASSET};
use relay_utils::LogFormat;

#[derive(Parser)]
#[command(name = "relay-admin", about = "Relay account cache administration")]
struct Cli {
    /// Path to a TOML configuration file. CLI flags and env vars override it.
    #[arg(long, env = "RELAY_CONFIG")]
    config: Option<PathBuf>,

    /// Directory of the LMDB environment.
    #[arg(long, env = "RELAY_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log level: "trace", "debug", "info", "warn", "error".
    #[arg(long, env = "RELAY_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format: "human" or "json".
    #[arg(long, env = "RELAY_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Mark a wallet as unlocked for the configured TTL.
    Unlock {
        /// Hex address of the wallet owner.
        owner: String,
    },
    /// Report whether a wallet is currently unlocked.
    Unlocked { owner: String },
    /// Print the cached balance of an owner.
    Balance {
        owner: String,
        /// Token contract; the native asset when omitted.
        #[arg(long)]
        token: Option<String>,
    },
    /// Print the cached allowance of `spender` over `owner`'s `token`.
    Allowance {
        owner: String,
        token: String,
        spender: String,
    },
    /// Print the keys recorded as reconciled in a block.
    BlockChanges { block: u64 },
    /// Evict block bookkeeping outside the retention window.
    Sweep {
        /// Block the window is measured back from.
        #[arg(long)]
        current: u64,
        /// Retention window in blocks; the configured value when omitted.
        #[arg(long)]
        window: Option<u64>,
    },
    /// Delete every expired entry from the store.
    PurgeExpired,
    /// Print the current holder of the cluster lock.
    Lease,
    /// Print the effective configuration as TOML.
    ShowConfig,
}

/// The LMDB environment plus the handles commands work through.
struct AdminStore {
    env: LmdbEnvironment,
    store: Arc<LmdbKvStore>,
    cache: AccountCache,
}

impl AdminStore {
    fn open(config: &AccountCacheConfig) -> anyhow::Result<Self> {
        let env = LmdbEnvironment::open(&config.data_dir, config.map_size)
            .with_context(|| format!("opening store at {}", config.data_dir.display()))?;
        let store = Arc::new(env.kv_store());
        let cache = AccountCache::from_config(store.clone(), config);
        Ok(Self { env, store, cache })
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match cli.config {
        Some(ref path) => AccountCacheConfig::from_toml_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => AccountCacheConfig::default(),
    };
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }
    if let Some(level) = cli.log_level {
        config.log_level = level;
    }
    if let Some(format) = cli.log_format {
        config.log_format = format;
    }

    relay_utils::init_logging(config.log_format, &config.log_level);

    let open = || AdminStore::open(&config);

    match cli.command {
        Command::ShowConfig => print!("{}", config.to_toml_string()?),
        Command::Unlock { owner } => {
            let AdminStore { cache, .. } = open()?;
            cache.set_wallet_unlocked(&owner)?;
            println!(
                "{owner} unlocked for {}",
                relay_utils::format_duration(config.unlock_ttl().as_secs())
            );
        }
        Command::Unlocked { owner } => {
            let AdminStore { cache, .. } = open()?;
            let owner = parse_address(&owner)?;
            println!("{}", cache.is_wallet_unlocked(&owner)?);
        }
        Command::Balance { owner, token } => {
            let AdminStore { cache, .. } = open()?;
            let owner = parse_address(&owner)?;
            let token = match token {
                Some(token) => parse_address(&token)?,
                None => NATIVE_ASSET,
            };
            match cache.balance(owner, token)? {
                Some(cached) => println!("{}", serde_json::to_string_pretty(&cached)?),
                None => println!("not cached"),
            }
        }
        Command::Allowance {
            owner,
            token,
            spender,
        } => {
            let AdminStore { cache, .. } = open()?;
            let owner = parse_address(&owner)?;
            let token = parse_address(&token)?;
            let spender = parse_address(&spender)?;
            match cache.allowance(owner, token, spender)? {
                Some(cached) => println!("{}", serde_json::to_string_pretty(&cached)?),
                None => println!("not cached"),
            }
        }
        Command::BlockChanges { block } => {
            let AdminStore { store, .. } = open()?;
            match BlockBook::new(store).load(block)? {
                Some(changes) => println!("{}", serde_json::to_string_pretty(&changes)?),
                None => println!("no bookkeeping for block {block}"),
            }
        }
        Command::Sweep { current, window } => {
            let AdminStore { env, store, .. } = open()?;
            let window = window.unwrap_or(config.retention_blocks);
            let lock = env.lease_lock();
            let holder = format!("relay-admin-{}", std::process::id());
            if !lock.try_acquire(&config.lock_name, &holder, config.lock_lease())? {
                bail!(
                    "cluster lock '{}' is held by a running relay; sweep from there instead",
                    config.lock_name
                );
            }
            let sweep = RetentionSweep::new(BlockBook::new(store), Arc::new(AccountMetrics::new()));
            let result = sweep.sweep(current, window);
            lock.release(&config.lock_name, &holder)?;
            let report = result?;
            println!(
                "cleared {} block(s) below {}, watermark {:?}",
                report.cleared, report.cutoff, report.watermark
            );
        }
        Command::PurgeExpired => {
            let AdminStore { store, .. } = open()?;
            let purged = store.purge_expired()?;
            println!("purged {purged} expired entr{}", if purged == 1 { "y" } else { "ies" });
        }
        Command::Lease => {
            let AdminStore { env, .. } = open()?;
            match env.lease_lock().current_lease(&config.lock_name)? {
                Some(lease) => {
                    let now = relay_types::Timestamp::now();
                    if lease.expires_at.is_reached(now) {
                        println!("{} expired, last held by {}", config.lock_name, lease.holder);
                    } else {
                        println!(
                            "{} held by {} for another {}",
                            config.lock_name,
                            lease.holder,
                            relay_utils::format_duration(now.elapsed_since(lease.expires_at))
                        );
                    }
                }
                None => println!("{} is free", config.lock_name),
            }
        }
    }

    tracing::debug!("relay-admin finished");
    Ok(())
}

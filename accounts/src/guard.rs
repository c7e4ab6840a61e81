//! Cluster-wide single-writer guard.
//!
//! Only one relay process may reconcile into the shared store. The guard
//! acquires a named lease before the router starts, keeps it renewed, and
//! stops the process's writers as soon as the lease is lost.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use relay_store::ClusterLock;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::config::AccountCacheConfig;
use crate::shutdown::ShutdownController;
use crate::AccountError;

/// Exponential backoff between lock acquisition attempts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub initial: Duration,
    pub max: Duration,
}

impl BackoffPolicy {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max: max.max(initial),
        }
    }

    /// Delay before retry number `attempt` (zero-based): `initial * 2^attempt`,
    /// capped at `max`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.min(31)).unwrap_or(u32::MAX);
        self.initial.saturating_mul(factor).min(self.max)
    }
}

pub struct ClusterGuard {
    lock: Arc<dyn ClusterLock>,
    name: String,
    holder: String,
    lease: Duration,
    backoff: BackoffPolicy,
}

impl ClusterGuard {
    pub fn new(
        lock: Arc<dyn ClusterLock>,
        name: impl Into<String>,
        holder: impl Into<String>,
        lease: Duration,
        backoff: BackoffPolicy,
    ) -> Self {
        Self {
            lock,
            name: name.into(),
            holder: holder.into(),
            lease,
            backoff,
        }
    }

    pub fn from_config(lock: Arc<dyn ClusterLock>, config: &AccountCacheConfig) -> Self {
        Self::new(
            lock,
            config.lock_name.clone(),
            config.holder_id(),
            config.lock_lease(),
            BackoffPolicy::new(
                Duration::from_millis(config.lock_retry_initial_ms),
                Duration::from_millis(config.lock_retry_max_ms),
            ),
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn holder(&self) -> &str {
        &self.holder
    }

    /// Block until the lease is held, sleeping with backoff between
    /// attempts. Backend errors are retried like a busy lock.
    pub async fn acquire(
        &self,
        shutdown_rx: &mut broadcast::Receiver<()>,
    ) -> Result<(), AccountError> {
        let mut attempt: u32 = 0;
        loop {
            match self.lock.try_acquire(&self.name, &self.holder, self.lease) {
                Ok(true) => {
                    tracing::info!(
                        lock = %self.name,
                        holder = %self.holder,
                        attempts = attempt + 1,
                        "cluster lock acquired"
                    );
                    return Ok(());
                }
                Ok(false) => {
                    tracing::debug!(lock = %self.name, attempt, "cluster lock busy");
                }
                Err(e) => {
                    tracing::warn!(
                        lock = %self.name,
                        attempt,
                        error = %e,
                        "cluster lock attempt failed"
                    );
                }
            }

            let delay = self.backoff.delay(attempt);
            attempt = attempt.saturating_add(1);
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => {
                    return Err(AccountError::Shutdown("cluster lock acquisition"));
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Extend the lease. `Ok(false)` means another holder owns it now.
    pub fn renew(&self) -> Result<bool, AccountError> {
        Ok(self.lock.renew(&self.name, &self.holder, self.lease)?)
    }

    pub fn release(&self) -> Result<(), AccountError> {
        self.lock.release(&self.name, &self.holder)?;
        tracing::info!(lock = %self.name, holder = %self.holder, "cluster lock released");
        Ok(())
    }

    /// Renew the lease every third of its length until shutdown.
    ///
    /// When the lease is taken over, or renewals fail for a whole lease
    /// period, `held` is cleared and shutdown is triggered.
    pub fn spawn_keeper(
        self: Arc<Self>,
        held: Arc<AtomicBool>,
        shutdown: Arc<ShutdownController>,
    ) -> JoinHandle<()> {
        let mut shutdown_rx = shutdown.subscribe();
        tokio::spawn(async move {
            let period = (self.lease / 3).max(Duration::from_millis(1));
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            let mut last_renewed = Instant::now();

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.recv() => {
                        tracing::info!("lease keeper shutting down");
                        break;
                    }
                    _ = interval.tick() => {
                        let lost = match self.renew() {
                            Ok(true) => {
                                last_renewed = Instant::now();
                                false
                            }
                            Ok(false) => true,
                            Err(e) => {
                                tracing::warn!(
                                    lock = %self.name,
                                    error = %e,
                                    "lease renewal failed"
                                );
                                last_renewed.elapsed() >= self.lease
                            }
                        };
                        if lost {
                            tracing::error!(
                                lock = %self.name,
                                holder = %self.holder,
                                "cluster lease lost, stopping writers"
                            );
                            held.store(false, Ordering::SeqCst);
                            shutdown.shutdown();
                            break;
                        }
                    }
                }
            }
        })
    }
}

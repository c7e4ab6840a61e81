//! Service wiring: dependency checks, lock acquisition and task lifecycle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use relay_chain::ChainAccessor;
use relay_store::{ClusterLock, KvStore};
use tokio::task::JoinHandle;

use crate::cache::AccountCache;
use crate::config::AccountCacheConfig;
use crate::engine::AccountEngine;
use crate::guard::ClusterGuard;
use crate::metrics::AccountMetrics;
use crate::router::{EventRouter, EventSender};
use crate::shutdown::ShutdownController;
use crate::AccountError;

/// Collects the collaborators of an [`AccountService`].
///
/// `build` fails with [`AccountError::NotReady`] when any of them is
/// missing, including a global tracing subscriber.
pub struct AccountServiceBuilder {
    config: AccountCacheConfig,
    store: Option<Arc<dyn KvStore>>,
    chain: Option<Arc<dyn ChainAccessor>>,
    lock: Option<Arc<dyn ClusterLock>>,
    metrics: Option<Arc<AccountMetrics>>,
}

impl AccountServiceBuilder {
    pub fn new(config: AccountCacheConfig) -> Self {
        Self {
            config,
            store: None,
            chain: None,
            lock: None,
            metrics: None,
        }
    }

    pub fn store(mut self, store: Arc<dyn KvStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn chain(mut self, chain: Arc<dyn ChainAccessor>) -> Self {
        self.chain = Some(chain);
        self
    }

    pub fn lock(mut self, lock: Arc<dyn ClusterLock>) -> Self {
        self.lock = Some(lock);
        self
    }

    pub fn metrics(mut self, metrics: Arc<AccountMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn build(self) -> Result<AccountService, AccountError> {
        if !relay_utils::logging_ready() {
            return Err(AccountError::NotReady("logging subscriber".into()));
        }
        let store = self
            .store
            .ok_or_else(|| AccountError::NotReady("key-value store".into()))?;
        let chain = self
            .chain
            .ok_or_else(|| AccountError::NotReady("chain accessor".into()))?;
        let lock = self
            .lock
            .ok_or_else(|| AccountError::NotReady("cluster lock".into()))?;
        self.config.validate()?;

        Ok(AccountService {
            config: self.config,
            store,
            chain,
            lock,
            metrics: self.metrics.unwrap_or_default(),
        })
    }
}

/// A fully wired but not yet running account cache.
pub struct AccountService {
    config: AccountCacheConfig,
    store: Arc<dyn KvStore>,
    chain: Arc<dyn ChainAccessor>,
    lock: Arc<dyn ClusterLock>,
    metrics: Arc<AccountMetrics>,
}

impl AccountService {
    pub fn builder(config: AccountCacheConfig) -> AccountServiceBuilder {
        AccountServiceBuilder::new(config)
    }

    /// Query handle usable before and after `start`.
    pub fn cache(&self) -> AccountCache {
        AccountCache::from_config(self.store.clone(), &self.config)
    }

    pub async fn start(self) -> Result<RunningService, AccountError> {
        self.start_with_shutdown(Arc::new(ShutdownController::new()))
            .await
    }

    /// Acquire the cluster lock, then spawn the router and the lease keeper.
    ///
    /// Triggering `shutdown` while waiting for the lock aborts startup.
    pub async fn start_with_shutdown(
        self,
        shutdown: Arc<ShutdownController>,
    ) -> Result<RunningService, AccountError> {
        let guard = Arc::new(ClusterGuard::from_config(self.lock.clone(), &self.config));
        let mut startup_rx = shutdown.subscribe();
        if shutdown.is_triggered() {
            return Err(AccountError::Shutdown("cluster lock acquisition"));
        }
        guard.acquire(&mut startup_rx).await?;

        let held = Arc::new(AtomicBool::new(true));
        let engine = AccountEngine::new(
            &self.config,
            self.store.clone(),
            self.chain.clone(),
            self.metrics.clone(),
        );
        let (router, events) = EventRouter::new(
            engine,
            self.config.event_channel_capacity,
            shutdown.subscribe(),
            held.clone(),
        );
        let keeper = guard.clone().spawn_keeper(held.clone(), shutdown.clone());
        let router = router.spawn();

        tracing::info!(
            lock = %guard.name(),
            holder = %guard.holder(),
            retention_blocks = self.config.retention_blocks,
            "account cache started"
        );

        Ok(RunningService {
            events,
            cache: self.cache(),
            metrics: self.metrics,
            shutdown,
            guard,
            held,
            router,
            keeper,
        })
    }
}

/// Handles to a started service.
pub struct RunningService {
    events: EventSender,
    cache: AccountCache,
    metrics: Arc<AccountMetrics>,
    shutdown: Arc<ShutdownController>,
    guard: Arc<ClusterGuard>,
    held: Arc<AtomicBool>,
    router: JoinHandle<Result<AccountEngine, AccountError>>,
    keeper: JoinHandle<()>,
}

impl RunningService {
    /// Sender for the inbound event queue.
    pub fn events(&self) -> EventSender {
        self.events.clone()
    }

    pub fn cache(&self) -> AccountCache {
        self.cache.clone()
    }

    pub fn metrics(&self) -> &Arc<AccountMetrics> {
        &self.metrics
    }

    pub fn shutdown_controller(&self) -> Arc<ShutdownController> {
        self.shutdown.clone()
    }

    pub fn holds_lease(&self) -> bool {
        self.held.load(Ordering::SeqCst)
    }

    /// Run until SIGINT/SIGTERM or until the lease is lost, then stop.
    pub async fn run_until_signal(self) -> Result<AccountEngine, AccountError> {
        let mut stopped = self.shutdown.subscribe();
        if !self.shutdown.is_triggered() {
            tokio::select! {
                _ = self.shutdown.wait_for_signal() => {}
                _ = stopped.recv() => {}
            }
        }
        self.stop().await
    }

    /// Stop both tasks, let the router drain its queue and release the lock.
    ///
    /// Returns [`AccountError::LeaseLost`] when the lease had already been
    /// taken over; queued events were not applied in that case.
    pub async fn stop(self) -> Result<AccountEngine, AccountError> {
        drop(self.events);
        self.shutdown.shutdown();

        let routed = self
            .router
            .await
            .map_err(|e| AccountError::Task(e.to_string()));
        self.keeper
            .await
            .map_err(|e| AccountError::Task(e.to_string()))?;
        let engine = routed??;

        if !self.held.load(Ordering::SeqCst) {
            return Err(AccountError::LeaseLost(self.guard.name().to_string()));
        }
        if let Err(e) = self.guard.release() {
            tracing::warn!(error = %e, "failed to release cluster lock");
        }
        tracing::info!(
            cursor = ?engine.cursor(),
            finalized = ?engine.last_finalized(),
            "account cache stopped"
        );
        Ok(engine)
    }
}

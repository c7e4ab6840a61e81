//! Ordered delivery of chain events to the engine.
//!
//! One task owns the [`AccountEngine`] and reads a bounded queue, so
//! handlers run strictly one after another in delivery order. Each handler
//! runs on the blocking pool. Shutdown is only observed between events.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use relay_types::ChainEvent;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::engine::AccountEngine;
use crate::AccountError;

/// Producer side of the router queue.
pub type EventSender = mpsc::Sender<ChainEvent>;

pub struct EventRouter {
    engine: AccountEngine,
    rx: mpsc::Receiver<ChainEvent>,
    shutdown_rx: broadcast::Receiver<()>,
    lease_held: Arc<AtomicBool>,
}

impl EventRouter {
    /// Build a router and the sender producers use to feed it.
    ///
    /// `lease_held` is cleared by the lease keeper when the cluster lock is
    /// lost; the router stops before applying another event once it is.
    pub fn new(
        engine: AccountEngine,
        capacity: usize,
        shutdown_rx: broadcast::Receiver<()>,
        lease_held: Arc<AtomicBool>,
    ) -> (Self, EventSender) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                engine,
                rx,
                shutdown_rx,
                lease_held,
            },
            tx,
        )
    }

    pub fn spawn(self) -> JoinHandle<Result<AccountEngine, AccountError>> {
        tokio::spawn(self.run())
    }

    /// Process events until shutdown, lease loss or every sender is dropped.
    /// Returns the engine so callers can inspect its final state.
    pub async fn run(self) -> Result<AccountEngine, AccountError> {
        let Self {
            mut engine,
            mut rx,
            mut shutdown_rx,
            lease_held,
        } = self;

        tracing::info!("event router started");
        loop {
            let event = tokio::select! {
                biased;
                _ = shutdown_rx.recv() => {
                    tracing::info!("event router shutting down");
                    return drain(engine, rx, &lease_held).await;
                }
                event = rx.recv() => match event {
                    Some(event) => event,
                    None => {
                        tracing::info!("all event senders dropped, router stopping");
                        break;
                    }
                },
            };

            let (returned, keep_going) = apply(engine, event, &lease_held).await?;
            engine = returned;
            if !keep_going {
                break;
            }
        }
        Ok(engine)
    }
}

/// Apply whatever was queued before shutdown, refusing new events.
async fn drain(
    mut engine: AccountEngine,
    mut rx: mpsc::Receiver<ChainEvent>,
    lease_held: &AtomicBool,
) -> Result<AccountEngine, AccountError> {
    rx.close();
    let mut drained = 0usize;
    while let Some(event) = rx.recv().await {
        let (returned, keep_going) = apply(engine, event, lease_held).await?;
        engine = returned;
        if !keep_going {
            return Ok(engine);
        }
        drained += 1;
    }
    if drained > 0 {
        tracing::info!(drained, "applied queued events before shutdown");
    }
    Ok(engine)
}

/// Run one handler on the blocking pool. Handlers block on chain reads and
/// store writes, and the lease keeper shares the async workers.
///
/// The flag is `false` when the router must stop.
async fn apply(
    mut engine: AccountEngine,
    event: ChainEvent,
    lease_held: &AtomicBool,
) -> Result<(AccountEngine, bool), AccountError> {
    let kind = event.kind();
    if !lease_held.load(Ordering::SeqCst) {
        tracing::error!(kind, "cluster lease lost, refusing further events");
        return Ok((engine, false));
    }

    let (engine, result) = tokio::task::spawn_blocking(move || {
        let result = engine.handle(event);
        (engine, result)
    })
    .await
    .map_err(|e| AccountError::Task(format!("{kind} handler: {e}")))?;

    let keep_going = match result {
        Ok(applied) => {
            tracing::trace!(kind, ?applied, "event applied");
            true
        }
        Err(e) if e.is_fatal() => {
            tracing::error!(kind, error = %e, "fatal error, router stopping");
            false
        }
        Err(e) => {
            tracing::warn!(kind, error = %e, "event dropped");
            true
        }
    };
    Ok((engine, keep_going))
}

//! Replay of block reconciliation after a chain reorganization.
//!
//! Every key recorded for a block inside the reorganized range is treated as
//! stale and re-read at the canonical head. Heights on the discarded branch
//! no longer identify the state the new branch will build on.

use std::sync::Arc;

use relay_types::{BlockNumber, BlockTag, ForkEvent};
use tracing::{info, warn};

use crate::metrics::AccountMetrics;
use crate::reconcile::{ReconcileReport, Reconciler};
use crate::AccountError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ForkState {
    Idle,
    /// Replaying `detected` down to `fork`; `next` is the block being
    /// reconciled.
    Replaying {
        detected: BlockNumber,
        fork: BlockNumber,
        next: BlockNumber,
    },
}

pub struct ForkReconciler {
    state: ForkState,
    max_span: u64,
    metrics: Arc<AccountMetrics>,
}

impl ForkReconciler {
    /// `max_span` bounds `detected - fork`; bookkeeping never covers more
    /// than the retention window, so a wider fork cannot be replayed.
    pub fn new(max_span: u64, metrics: Arc<AccountMetrics>) -> Self {
        Self {
            state: ForkState::Idle,
            max_span,
            metrics,
        }
    }

    pub fn state(&self) -> ForkState {
        self.state
    }

    /// Reconcile every block from `detected` down to `fork`, inclusive, in
    /// descending order, then drop bookkeeping for the discarded blocks
    /// above `fork`.
    ///
    /// A block whose bookkeeping cannot be loaded or whose keys fail still
    /// counts as replayed; the walk never stops early.
    pub fn replay(
        &mut self,
        reconciler: &Reconciler,
        event: ForkEvent,
    ) -> Result<Vec<ReconcileReport>, AccountError> {
        let ForkEvent {
            detected_block: detected,
            fork_block: fork,
        } = event;
        let Some(span) = detected.checked_sub(fork) else {
            return Err(AccountError::MalformedEvent(format!(
                "fork detected at {detected} is below fork block {fork}"
            )));
        };
        if span > self.max_span {
            return Err(AccountError::MalformedEvent(format!(
                "fork from {fork} to {detected} spans {span} blocks, retention covers {}",
                self.max_span
            )));
        }

        info!(detected, fork, "replaying fork");
        self.metrics.fork_replays.inc();

        let mut reports = Vec::new();
        for block in (fork..=detected).rev() {
            self.state = ForkState::Replaying {
                detected,
                fork,
                next: block,
            };
            reports.push(self.replay_block(reconciler, block));
            self.metrics.blocks_replayed.inc();
        }

        for block in fork.saturating_add(1)..=detected {
            if let Err(e) = reconciler.book().remove(block) {
                warn!(block, error = %e, "failed to drop bookkeeping of discarded block");
            }
        }

        self.state = ForkState::Idle;
        let failed: usize = reports.iter().map(|r| r.failed).sum();
        info!(detected, fork, blocks = reports.len(), failed, "fork replay finished");
        Ok(reports)
    }

    fn replay_block(&self, reconciler: &Reconciler, block: BlockNumber) -> ReconcileReport {
        match reconciler.book().load(block) {
            Ok(Some(changes)) => reconciler.reconcile_keys(
                block,
                BlockTag::Latest,
                changes.balances.iter(),
                changes.allowances.iter(),
            ),
            Ok(None) => reconciler.reconcile_keys(block, BlockTag::Latest, [], []),
            Err(e) => {
                warn!(block, error = %e, "failed to load bookkeeping for replay");
                let mut report = reconciler.reconcile_keys(block, BlockTag::Latest, [], []);
                report.failed += 1;
                report
            }
        }
    }
}

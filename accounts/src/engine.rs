//! The single-owner state machine behind the event router.
//!
//! [`AccountEngine`] owns the dirty-key tracker and drives reconciliation,
//! retention and fork replay. It is never shared: the router task holds it
//! by value and applies events one at a time.

use std::sync::Arc;

use relay_chain::ChainAccessor;
use relay_store::{KvStore, StoreError};
use relay_types::{
    Address, ApprovalEvent, BlockNumber, ChainEvent, ForkEvent, NativeTransferEvent,
    TransferEvent, WrapEvent, NATIVE_ASSET,
};
use tracing::{debug, info, warn};

use crate::config::AccountCacheConfig;
use crate::fork::{ForkReconciler, ForkState};
use crate::metrics::AccountMetrics;
use crate::reconcile::{ReconcileReport, Reconciler};
use crate::retention::{RetentionSweep, SweepReport};
use crate::tracker::DirtyKeyTracker;
use crate::AccountError;

/// What applying one event did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Applied {
    /// The event marked keys; the count is how many were new.
    Marked { new_keys: usize },
    /// The event was filtered out by its transaction status.
    Dropped,
    CursorAdvanced(BlockNumber),
    Finalized {
        report: ReconcileReport,
        sweep: Option<SweepReport>,
    },
    ForkReplayed(Vec<ReconcileReport>),
}

pub struct AccountEngine {
    tracker: DirtyKeyTracker,
    reconciler: Reconciler,
    sweep: RetentionSweep,
    forks: ForkReconciler,
    chain: Arc<dyn ChainAccessor>,
    retention_blocks: u64,
    last_finalized: Option<BlockNumber>,
    metrics: Arc<AccountMetrics>,
}

impl AccountEngine {
    pub fn new(
        config: &AccountCacheConfig,
        store: Arc<dyn KvStore>,
        chain: Arc<dyn ChainAccessor>,
        metrics: Arc<AccountMetrics>,
    ) -> Self {
        let reconciler = Reconciler::new(store, chain.clone(), config.value_ttl(), metrics.clone());
        let sweep = RetentionSweep::new(reconciler.book().clone(), metrics.clone());
        Self {
            tracker: DirtyKeyTracker::new(),
            reconciler,
            sweep,
            forks: ForkReconciler::new(config.retention_blocks, metrics.clone()),
            chain,
            retention_blocks: config.retention_blocks,
            last_finalized: None,
            metrics,
        }
    }

    /// Apply one event.
    ///
    /// Errors are never fatal to the engine itself; the caller decides
    /// whether to keep feeding events.
    pub fn handle(&mut self, event: ChainEvent) -> Result<Applied, AccountError> {
        self.metrics.events.with_label_values(&[event.kind()]).inc();
        let applied = match event {
            ChainEvent::Transfer(e) => self.on_transfer(&e),
            ChainEvent::Approval(e) => self.on_approval(&e),
            ChainEvent::WrapDeposit(e) => self.on_wrap(&e, "deposit"),
            ChainEvent::WrapWithdrawal(e) => self.on_wrap(&e, "withdrawal"),
            ChainEvent::NativeTransfer(e) => self.on_native_transfer(&e),
            ChainEvent::BlockNew { number } => self.on_block_new(number),
            ChainEvent::BlockEnd { number } => Ok(self.on_block_end(number)),
            ChainEvent::ForkDetected(e) => self.fork(e).map(Applied::ForkReplayed),
        };
        if matches!(applied, Ok(Applied::Dropped) | Err(AccountError::MalformedEvent(_))) {
            self.metrics.events_dropped.inc();
        }
        self.metrics
            .pending_keys
            .set(self.tracker.pending_count() as i64);
        applied
    }

    // ── Event handlers ─────────────────────────────────────────────────

    fn on_transfer(&mut self, e: &TransferEvent) -> Result<Applied, AccountError> {
        if !e.status.is_success() {
            info!(status = ?e.status, protocol = %e.protocol, "dropping unsuccessful transfer");
            return Ok(Applied::Dropped);
        }
        let mut new_keys = 0;
        new_keys += self.mark_balance_dirty(e.sender, e.protocol) as usize;
        new_keys += self.mark_balance_dirty(e.from, NATIVE_ASSET) as usize;
        new_keys += self.mark_balance_dirty(e.receiver, e.protocol) as usize;

        match self.chain.spender_for(&e.to) {
            Ok(spender) => {
                new_keys += self.mark_allowance_dirty(e.sender, e.protocol, spender) as usize;
            }
            Err(err) => {
                self.metrics.spender_misses.inc();
                debug!(target_contract = %e.to, error = %err, "no spender for transfer target");
            }
        }
        Ok(Applied::Marked { new_keys })
    }

    fn on_approval(&mut self, e: &ApprovalEvent) -> Result<Applied, AccountError> {
        if !e.status.is_success() {
            info!(status = ?e.status, protocol = %e.protocol, "dropping unsuccessful approval");
            return Ok(Applied::Dropped);
        }
        let mut new_keys = 0;
        new_keys += self.mark_allowance_dirty(e.owner, e.protocol, e.spender) as usize;
        new_keys += self.mark_balance_dirty(e.owner, NATIVE_ASSET) as usize;
        Ok(Applied::Marked { new_keys })
    }

    fn on_wrap(&mut self, e: &WrapEvent, direction: &'static str) -> Result<Applied, AccountError> {
        if !e.status.is_success() {
            info!(status = ?e.status, direction, "dropping unsuccessful wrap");
            return Ok(Applied::Dropped);
        }
        let mut new_keys = 0;
        new_keys += self.mark_balance_dirty(e.account, e.protocol) as usize;
        new_keys += self.mark_balance_dirty(e.from, NATIVE_ASSET) as usize;
        Ok(Applied::Marked { new_keys })
    }

    fn on_native_transfer(&mut self, e: &NativeTransferEvent) -> Result<Applied, AccountError> {
        let mut new_keys = 0;
        new_keys += self.mark_balance_dirty(e.from, NATIVE_ASSET) as usize;
        new_keys += self.mark_balance_dirty(e.to, NATIVE_ASSET) as usize;
        Ok(Applied::Marked { new_keys })
    }

    fn on_block_new(&mut self, number: BlockNumber) -> Result<Applied, AccountError> {
        if !self.tracker.advance_to(number) {
            return Err(AccountError::MalformedEvent(format!(
                "block {number} is behind cursor {}",
                self.tracker.cursor().unwrap_or_default()
            )));
        }
        self.metrics.block_cursor.set(number as i64);
        debug!(block = number, "cursor advanced");
        Ok(Applied::CursorAdvanced(number))
    }

    fn on_block_end(&mut self, number: BlockNumber) -> Applied {
        let block = match self.tracker.cursor() {
            Some(cursor) => {
                if cursor != number {
                    warn!(cursor, announced = number, "block end does not match cursor");
                }
                cursor
            }
            None => {
                self.tracker.advance_to(number);
                self.metrics.block_cursor.set(number as i64);
                number
            }
        };

        let report = self.reconcile(block);
        let sweep = match self.sweep(block, self.retention_blocks) {
            Ok(sweep) => Some(sweep),
            Err(e) => {
                warn!(block, error = %e, "retention sweep failed");
                None
            }
        };
        Applied::Finalized { report, sweep }
    }

    // ── Operations ─────────────────────────────────────────────────────

    pub fn mark_balance_dirty(&mut self, owner: Address, token: Address) -> bool {
        self.tracker.mark_balance_dirty(owner, token)
    }

    pub fn mark_allowance_dirty(
        &mut self,
        owner: Address,
        token: Address,
        spender: Address,
    ) -> bool {
        self.tracker.mark_allowance_dirty(owner, token, spender)
    }

    /// Re-derive every pending key at `block`, record the block's
    /// bookkeeping and clear the pending sets. Marks `block` finalized.
    pub fn reconcile(&mut self, block: BlockNumber) -> ReconcileReport {
        let (balances, allowances) = self.tracker.take();
        let report = self.reconciler.reconcile_block(block, &balances, &allowances);

        self.last_finalized = Some(block);
        self.metrics.finalized_block.set(block as i64);
        self.metrics.pending_keys.set(0);
        if report.written() > 0 || report.failed > 0 {
            info!(
                block,
                written = report.written(),
                failed = report.failed,
                "block reconciled"
            );
        }
        report
    }

    pub fn sweep(&self, current: BlockNumber, window: u64) -> Result<SweepReport, StoreError> {
        self.sweep.sweep(current, window)
    }

    /// Replay a reorganization and move the cursor back to the fork block.
    pub fn fork(&mut self, event: ForkEvent) -> Result<Vec<ReconcileReport>, AccountError> {
        let reports = self.forks.replay(&self.reconciler, event)?;

        let fork = event.fork_block;
        self.tracker.rewind_to(fork);
        self.metrics.block_cursor.set(fork as i64);
        if self.last_finalized.is_some_and(|f| f >= fork) {
            self.last_finalized = fork.checked_sub(1);
            self.metrics
                .finalized_block
                .set(self.last_finalized.unwrap_or_default() as i64);
        }
        Ok(reports)
    }

    // ── Accessors ──────────────────────────────────────────────────────

    pub fn cursor(&self) -> Option<BlockNumber> {
        self.tracker.cursor()
    }

    /// Last block whose reconciliation completed.
    pub fn last_finalized(&self) -> Option<BlockNumber> {
        self.last_finalized
    }

    pub fn pending_count(&self) -> usize {
        self.tracker.pending_count()
    }

    pub fn tracker(&self) -> &DirtyKeyTracker {
        &self.tracker
    }

    pub fn fork_state(&self) -> ForkState {
        self.forks.state()
    }

    pub fn metrics(&self) -> &Arc<AccountMetrics> {
        &self.metrics
    }
}

//! Block-count retention for per-block bookkeeping.

use std::sync::Arc;

use relay_store::StoreError;
use relay_types::BlockNumber;
use tracing::debug;

use crate::bookkeeping::BlockBook;
use crate::metrics::AccountMetrics;

/// Upper bound on blocks cleared by a single sweep. A larger backlog is
/// worked off over the following block ends.
pub const MAX_BLOCKS_PER_SWEEP: u64 = 10_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SweepReport {
    /// Blocks below this number are eligible for eviction.
    pub cutoff: BlockNumber,
    /// Blocks whose bookkeeping was removed in this pass.
    pub cleared: u64,
    /// Watermark after the pass, if any bookkeeping was ever recorded.
    pub watermark: Option<BlockNumber>,
}

/// Removes bookkeeping for blocks that fell out of the retention window.
///
/// Walks upward from the stored watermark, so the cost of a pass is
/// proportional to the blocks it clears rather than to the store size.
pub struct RetentionSweep {
    book: BlockBook,
    max_per_pass: u64,
    metrics: Arc<AccountMetrics>,
}

impl RetentionSweep {
    pub fn new(book: BlockBook, metrics: Arc<AccountMetrics>) -> Self {
        Self {
            book,
            max_per_pass: MAX_BLOCKS_PER_SWEEP,
            metrics,
        }
    }

    pub fn with_max_per_pass(mut self, max_per_pass: u64) -> Self {
        self.max_per_pass = max_per_pass.max(1);
        self
    }

    /// Evict bookkeeping for every block `< current - window`.
    ///
    /// The current block and the `window` blocks behind it are never
    /// touched.
    pub fn sweep(&self, current: BlockNumber, window: u64) -> Result<SweepReport, StoreError> {
        let cutoff = current.saturating_sub(window);
        let Some(mark) = self.book.watermark()? else {
            return Ok(SweepReport {
                cutoff,
                cleared: 0,
                watermark: None,
            });
        };
        if mark >= cutoff {
            return Ok(SweepReport {
                cutoff,
                cleared: 0,
                watermark: Some(mark),
            });
        }

        let end = cutoff.min(mark.saturating_add(self.max_per_pass));
        for block in mark..end {
            self.book.remove(block)?;
        }
        self.book.set_watermark(end)?;

        let cleared = end - mark;
        self.metrics.bookkeeping_evicted.inc_by(cleared);
        debug!(current, window, cutoff, cleared, watermark = end, "retention sweep");
        Ok(SweepReport {
            cutoff,
            cleared,
            watermark: Some(end),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_nullables::NullStore;
    use relay_store::BlockChanges;
    use relay_types::{Address, BalanceKey};

    fn record(book: &BlockBook, block: BlockNumber) {
        book.record(&BlockChanges {
            block,
            balances: vec![BalanceKey::new(Address::repeat_byte(1), Address::ZERO)],
            allowances: vec![],
        })
        .unwrap();
    }

    fn setup() -> (BlockBook, RetentionSweep) {
        let book = BlockBook::new(Arc::new(NullStore::new()));
        let sweep = RetentionSweep::new(book.clone(), Arc::new(AccountMetrics::new()));
        (book, sweep)
    }

    #[test]
    fn evicts_only_outside_window() {
        let (book, sweep) = setup();
        for block in [400, 499, 500, 750, 1000] {
            record(&book, block);
        }

        let report = sweep.sweep(1000, 500).unwrap();
        assert_eq!(report.cutoff, 500);
        assert_eq!(report.cleared, 100);
        assert_eq!(book.load(400).unwrap(), None);
        assert_eq!(book.load(499).unwrap(), None);
        assert!(book.load(500).unwrap().is_some());
        assert!(book.load(1000).unwrap().is_some());
        assert_eq!(book.watermark().unwrap(), Some(500));
    }

    #[test]
    fn window_larger_than_chain_keeps_everything() {
        let (book, sweep) = setup();
        record(&book, 3);
        let report = sweep.sweep(10, 500).unwrap();
        assert_eq!(report.cutoff, 0);
        assert_eq!(report.cleared, 0);
        assert!(book.load(3).unwrap().is_some());
    }

    #[test]
    fn nothing_recorded_is_a_no_op() {
        let (_book, sweep) = setup();
        let report = sweep.sweep(1000, 10).unwrap();
        assert_eq!(report.watermark, None);
        assert_eq!(report.cleared, 0);
    }

    #[test]
    fn backlog_is_worked_off_across_passes() {
        let (book, sweep) = setup();
        let sweep = sweep.with_max_per_pass(4);
        record(&book, 0);
        record(&book, 6);

        let first = sweep.sweep(20, 10).unwrap();
        assert_eq!(first.cleared, 4);
        assert_eq!(first.watermark, Some(4));
        assert!(book.load(6).unwrap().is_some());

        let second = sweep.sweep(20, 10).unwrap();
        assert_eq!(second.watermark, Some(8));
        assert_eq!(book.load(6).unwrap(), None);
    }

    #[test]
    fn repeated_sweep_is_idempotent() {
        let (book, sweep) = setup();
        record(&book, 1);
        sweep.sweep(100, 10).unwrap();
        let again = sweep.sweep(100, 10).unwrap();
        assert_eq!(again.cleared, 0);
    }
}

//! Re-derivation of dirty keys from authoritative chain state.
//!
//! Values are always re-read and overwritten, never adjusted by deltas, so
//! running the same pass twice converges on the same store contents.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use relay_chain::ChainAccessor;
use relay_store::layout::{self, allowance_key, balance_key};
use relay_store::{BlockChanges, CachedValue, KvStore, StoreError};
use relay_types::{AllowanceKey, BalanceKey, BlockNumber, BlockTag, U256};
use tracing::{debug, warn};

use crate::bookkeeping::BlockBook;
use crate::metrics::AccountMetrics;
use crate::AccountError;

/// Outcome of one reconciliation pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Block the pass was run for.
    pub block: BlockNumber,
    /// Chain state the values were read at.
    pub tag: BlockTag,
    pub balances_written: usize,
    pub allowances_written: usize,
    /// Keys whose fetch or write failed, plus a failed bookkeeping write.
    pub failed: usize,
}

impl ReconcileReport {
    fn new(block: BlockNumber, tag: BlockTag) -> Self {
        Self {
            block,
            tag,
            balances_written: 0,
            allowances_written: 0,
            failed: 0,
        }
    }

    pub fn written(&self) -> usize {
        self.balances_written + self.allowances_written
    }

    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }
}

/// Writes authoritative balances and allowances into the shared store.
pub struct Reconciler {
    store: Arc<dyn KvStore>,
    chain: Arc<dyn ChainAccessor>,
    book: BlockBook,
    value_ttl: Duration,
    metrics: Arc<AccountMetrics>,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn KvStore>,
        chain: Arc<dyn ChainAccessor>,
        value_ttl: Duration,
        metrics: Arc<AccountMetrics>,
    ) -> Self {
        let book = BlockBook::new(store.clone());
        Self {
            store,
            chain,
            book,
            value_ttl,
            metrics,
        }
    }

    pub fn book(&self) -> &BlockBook {
        &self.book
    }

    /// Reconcile the keys accumulated for `block`, reading at that height,
    /// and record them as the block's bookkeeping.
    ///
    /// An empty key set performs no store writes at all.
    pub fn reconcile_block(
        &self,
        block: BlockNumber,
        balances: &BTreeSet<BalanceKey>,
        allowances: &BTreeSet<AllowanceKey>,
    ) -> ReconcileReport {
        let mut report = self.reconcile_keys(
            block,
            BlockTag::Number(block),
            balances.iter(),
            allowances.iter(),
        );
        if balances.is_empty() && allowances.is_empty() {
            return report;
        }

        let changes = BlockChanges {
            block,
            balances: balances.iter().copied().collect(),
            allowances: allowances.iter().copied().collect(),
        };
        if let Err(e) = self.book.record(&changes) {
            warn!(block, error = %e, "failed to record block bookkeeping");
            report.failed += 1;
        }
        report
    }

    /// Re-derive every given key at `tag` and write it. Failures are logged
    /// and counted per key; the pass always visits every key.
    pub fn reconcile_keys<'a>(
        &self,
        block: BlockNumber,
        tag: BlockTag,
        balances: impl IntoIterator<Item = &'a BalanceKey>,
        allowances: impl IntoIterator<Item = &'a AllowanceKey>,
    ) -> ReconcileReport {
        let started = Instant::now();
        let mut report = ReconcileReport::new(block, tag);

        for key in balances {
            match self.reconcile_balance(key, tag) {
                Ok(()) => report.balances_written += 1,
                Err(e) => {
                    warn!(
                        block,
                        owner = %key.owner,
                        token = %key.token,
                        error = %e,
                        "balance reconciliation failed"
                    );
                    report.failed += 1;
                }
            }
        }

        for key in allowances {
            match self.reconcile_allowance(key, tag) {
                Ok(()) => report.allowances_written += 1,
                Err(e) => {
                    warn!(
                        block,
                        owner = %key.owner,
                        token = %key.token,
                        spender = %key.spender,
                        error = %e,
                        "allowance reconciliation failed"
                    );
                    report.failed += 1;
                }
            }
        }

        self.metrics.keys_reconciled.inc_by(report.written() as u64);
        self.metrics.key_failures.inc_by(report.failed as u64);
        self.metrics
            .reconcile_time_ms
            .observe(started.elapsed().as_secs_f64() * 1000.0);

        debug!(
            block,
            %tag,
            balances = report.balances_written,
            allowances = report.allowances_written,
            failed = report.failed,
            "reconciled"
        );
        report
    }

    fn reconcile_balance(&self, key: &BalanceKey, tag: BlockTag) -> Result<(), AccountError> {
        let value = self.chain.balance(&key.owner, &key.token, tag)?;
        self.write(&balance_key(key), value, tag)?;
        Ok(())
    }

    fn reconcile_allowance(&self, key: &AllowanceKey, tag: BlockTag) -> Result<(), AccountError> {
        let value = self
            .chain
            .allowance(&key.owner, &key.token, &key.spender, tag)?;
        self.write(&allowance_key(key), value, tag)?;
        Ok(())
    }

    fn write(&self, key: &str, value: U256, tag: BlockTag) -> Result<(), StoreError> {
        let record = CachedValue {
            value,
            derived_at: tag,
        };
        self.store
            .set(key, &layout::encode(&record)?, Some(self.value_ttl))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_nullables::{ChainCall, NullChain, NullStore};
    use relay_types::{Address, NATIVE_ASSET};

    const TTL: Duration = Duration::from_secs(60);

    fn addr(n: u8) -> Address {
        Address::repeat_byte(n)
    }

    fn setup() -> (Arc<NullStore>, Arc<NullChain>, Reconciler) {
        let store = Arc::new(NullStore::new());
        let chain = Arc::new(NullChain::new());
        let reconciler = Reconciler::new(
            store.clone(),
            chain.clone(),
            TTL,
            Arc::new(AccountMetrics::new()),
        );
        (store, chain, reconciler)
    }

    #[test]
    fn writes_values_read_at_block_height() {
        let (store, chain, reconciler) = setup();
        chain.set_balance(addr(1), NATIVE_ASSET, U256::from(42u64));
        let balances = BTreeSet::from([BalanceKey::new(addr(1), NATIVE_ASSET)]);

        let report = reconciler.reconcile_block(9, &balances, &BTreeSet::new());
        assert_eq!(report.balances_written, 1);
        assert!(report.is_clean());

        let key = balance_key(&BalanceKey::new(addr(1), NATIVE_ASSET));
        let cached: CachedValue = layout::decode(&store.get(&key).unwrap().unwrap()).unwrap();
        assert_eq!(cached.value, U256::from(42u64));
        assert_eq!(cached.derived_at, BlockTag::Number(9));
        assert_eq!(store.ttl_of(&key), Some(60));
        assert_eq!(
            chain.calls(),
            vec![ChainCall::Balance(
                BalanceKey::new(addr(1), NATIVE_ASSET),
                BlockTag::Number(9)
            )]
        );
    }

    #[test]
    fn empty_pass_writes_nothing() {
        let (store, _chain, reconciler) = setup();
        let report = reconciler.reconcile_block(3, &BTreeSet::new(), &BTreeSet::new());
        assert_eq!(report.written(), 0);
        assert!(store.writes().is_empty());
        assert_eq!(reconciler.book().load(3).unwrap(), None);
    }

    #[test]
    fn one_failing_key_does_not_stop_the_rest() {
        let (store, chain, reconciler) = setup();
        chain.fail_reads_for(addr(2));
        let balances = BTreeSet::from([
            BalanceKey::new(addr(1), NATIVE_ASSET),
            BalanceKey::new(addr(2), NATIVE_ASSET),
            BalanceKey::new(addr(3), NATIVE_ASSET),
        ]);
        let allowances = BTreeSet::from([AllowanceKey::new(addr(1), addr(8), addr(9))]);

        let report = reconciler.reconcile_block(4, &balances, &allowances);
        assert_eq!(report.balances_written, 2);
        assert_eq!(report.allowances_written, 1);
        assert_eq!(report.failed, 1);
        assert!(store.contains_raw(&balance_key(&BalanceKey::new(addr(3), NATIVE_ASSET))));
    }

    #[test]
    fn store_write_failure_is_counted() {
        let (store, _chain, reconciler) = setup();
        let bad = BalanceKey::new(addr(5), NATIVE_ASSET);
        store.fail_writes_to(balance_key(&bad));
        let balances = BTreeSet::from([bad, BalanceKey::new(addr(6), NATIVE_ASSET)]);

        let report = reconciler.reconcile_block(4, &balances, &BTreeSet::new());
        assert_eq!(report.balances_written, 1);
        assert_eq!(report.failed, 1);
    }

    #[test]
    fn bookkeeping_lists_every_attempted_key() {
        let (_store, chain, reconciler) = setup();
        chain.fail_reads_for(addr(2));
        let balances = BTreeSet::from([
            BalanceKey::new(addr(1), NATIVE_ASSET),
            BalanceKey::new(addr(2), NATIVE_ASSET),
        ]);
        reconciler.reconcile_block(11, &balances, &BTreeSet::new());

        let recorded = reconciler.book().load(11).unwrap().unwrap();
        assert_eq!(recorded.balances.len(), 2);
    }

    #[test]
    fn keys_pass_reads_at_given_tag_without_bookkeeping() {
        let (_store, chain, reconciler) = setup();
        let key = BalanceKey::new(addr(1), NATIVE_ASSET);
        let report = reconciler.reconcile_keys(20, BlockTag::Latest, [&key], []);
        assert_eq!(report.tag, BlockTag::Latest);
        assert_eq!(chain.calls(), vec![ChainCall::Balance(key, BlockTag::Latest)]);
        assert_eq!(reconciler.book().load(20).unwrap(), None);
    }
}

//! Prometheus metrics for the account cache.
//!
//! [`AccountMetrics`] owns a dedicated [`Registry`] that the embedding
//! service can encode into the Prometheus text exposition format.

use prometheus::{
    register_histogram_with_registry, register_int_counter_vec_with_registry,
    register_int_counter_with_registry, register_int_gauge_with_registry, Histogram,
    HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
};

/// Central collection of account cache metrics.
pub struct AccountMetrics {
    /// The Prometheus registry that owns every metric below.
    pub registry: Registry,

    // ── Counters ────────────────────────────────────────────────────────
    /// Events handled, by kind.
    pub events: IntCounterVec,
    /// Events dropped for a non-success status or a malformed payload.
    pub events_dropped: IntCounter,
    /// Balance and allowance entries re-derived and written.
    pub keys_reconciled: IntCounter,
    /// Per-key fetch or write failures during reconciliation.
    pub key_failures: IntCounter,
    /// Spender lookups that failed and were skipped.
    pub spender_misses: IntCounter,
    /// Fork events replayed.
    pub fork_replays: IntCounter,
    /// Blocks replayed across all forks.
    pub blocks_replayed: IntCounter,
    /// Block bookkeeping records evicted by the retention sweep.
    pub bookkeeping_evicted: IntCounter,

    // ── Gauges ──────────────────────────────────────────────────────────
    /// Block currently being accumulated.
    pub block_cursor: IntGauge,
    /// Last block whose reconciliation completed.
    pub finalized_block: IntGauge,
    /// Keys waiting for the next reconciliation.
    pub pending_keys: IntGauge,

    // ── Histograms ──────────────────────────────────────────────────────
    /// Time spent reconciling one block, in milliseconds.
    pub reconcile_time_ms: Histogram,
}

impl AccountMetrics {
    /// Create a fresh set of metrics, all registered under a new [`Registry`].
    pub fn new() -> Self {
        let registry = Registry::new();

        let events = register_int_counter_vec_with_registry!(
            Opts::new("relay_account_events_total", "Chain events handled"),
            &["kind"],
            registry
        )
        .expect("failed to register events counter");

        let events_dropped = register_int_counter_with_registry!(
            Opts::new(
                "relay_account_events_dropped_total",
                "Chain events dropped without effect"
            ),
            registry
        )
        .expect("failed to register events_dropped counter");

        let keys_reconciled = register_int_counter_with_registry!(
            Opts::new(
                "relay_account_keys_reconciled_total",
                "Cache entries re-derived from the chain and written"
            ),
            registry
        )
        .expect("failed to register keys_reconciled counter");

        let key_failures = register_int_counter_with_registry!(
            Opts::new(
                "relay_account_key_failures_total",
                "Cache entries that failed to reconcile"
            ),
            registry
        )
        .expect("failed to register key_failures counter");

        let spender_misses = register_int_counter_with_registry!(
            Opts::new(
                "relay_account_spender_misses_total",
                "Transfer targets with no resolvable spender"
            ),
            registry
        )
        .expect("failed to register spender_misses counter");

        let fork_replays = register_int_counter_with_registry!(
            Opts::new("relay_account_fork_replays_total", "Forks replayed"),
            registry
        )
        .expect("failed to register fork_replays counter");

        let blocks_replayed = register_int_counter_with_registry!(
            Opts::new(
                "relay_account_blocks_replayed_total",
                "Blocks reconciled during fork replay"
            ),
            registry
        )
        .expect("failed to register blocks_replayed counter");

        let bookkeeping_evicted = register_int_counter_with_registry!(
            Opts::new(
                "relay_account_bookkeeping_evicted_total",
                "Per-block bookkeeping records evicted"
            ),
            registry
        )
        .expect("failed to register bookkeeping_evicted counter");

        let block_cursor = register_int_gauge_with_registry!(
            Opts::new("relay_account_block_cursor", "Block currently being accumulated"),
            registry
        )
        .expect("failed to register block_cursor gauge");

        let finalized_block = register_int_gauge_with_registry!(
            Opts::new(
                "relay_account_finalized_block",
                "Last block whose reconciliation completed"
            ),
            registry
        )
        .expect("failed to register finalized_block gauge");

        let pending_keys = register_int_gauge_with_registry!(
            Opts::new(
                "relay_account_pending_keys",
                "Dirty keys awaiting reconciliation"
            ),
            registry
        )
        .expect("failed to register pending_keys gauge");

        // 1 ms → ~16 s.
        let reconcile_time_ms = register_histogram_with_registry!(
            HistogramOpts::new(
                "relay_account_reconcile_time_ms",
                "Reconciliation time per block in milliseconds"
            )
            .buckets(prometheus::exponential_buckets(1.0, 2.0, 15).expect("valid buckets")),
            registry
        )
        .expect("failed to register reconcile_time_ms histogram");

        Self {
            registry,
            events,
            events_dropped,
            keys_reconciled,
            key_failures,
            spender_misses,
            fork_replays,
            blocks_replayed,
            bookkeeping_evicted,
            block_cursor,
            finalized_block,
            pending_keys,
            reconcile_time_ms,
        }
    }

    /// Encode every metric in the Prometheus text format.
    pub fn encode(&self) -> String {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let mut buf = Vec::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buf) {
            tracing::warn!(error = %e, "failed to encode metrics");
        }
        String::from_utf8(buf).unwrap_or_default()
    }
}

impl Default for AccountMetrics {
    fn default() -> Self {
        Self::new()
    }
}

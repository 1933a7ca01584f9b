//! Prometheus metrics for a chainpay node.
//!
//! [`NodeMetrics`] owns a dedicated [`Registry`]; the rpc `/metrics` route
//! encodes it into the Prometheus text exposition format.

use prometheus::{
    register_histogram_with_registry, register_int_counter_with_registry,
    register_int_gauge_with_registry, Encoder, Histogram, HistogramOpts, IntCounter, IntGauge,
    Opts, Registry, TextEncoder,
};

pub struct NodeMetrics {
    pub registry: Registry,

    // ── Counters ────────────────────────────────────────────────────────
    /// Legs built by `create_transaction`.
    pub transactions_created: IntCounter,
    /// Legs signed by this node (service or chain).
    pub transactions_signed: IntCounter,
    /// Legs committed (saved for a flush or submitted directly).
    pub transactions_committed: IntCounter,
    /// Envelopes accepted by the ledger.
    pub transactions_submitted: IntCounter,
    pub flush_runs: IntCounter,
    pub flush_failures: IntCounter,
    /// Inbound commands executed against this node.
    pub commands_dispatched: IntCounter,
    /// Asynchronous responses matched to a waiting command.
    pub commands_delivered: IntCounter,
    /// Asynchronous responses nobody was waiting for.
    pub commands_dropped: IntCounter,
    pub sessions_completed: IntCounter,
    pub sessions_failed: IntCounter,

    // ── Gauges ──────────────────────────────────────────────────────────
    /// Accumulated transactions waiting for a flush.
    pub outstanding_transactions: IntGauge,
    /// Sessions that still owe this node for requested services.
    pub pending_usage: IntGauge,

    // ── Histograms ──────────────────────────────────────────────────────
    pub flush_duration_ms: Histogram,
}

fn counter(registry: &Registry, name: &str, help: &str) -> IntCounter {
    register_int_counter_with_registry!(Opts::new(name, help), registry)
        .unwrap_or_else(|e| panic!("failed to register {name} counter: {e}"))
}

fn gauge(registry: &Registry, name: &str, help: &str) -> IntGauge {
    register_int_gauge_with_registry!(Opts::new(name, help), registry)
        .unwrap_or_else(|e| panic!("failed to register {name} gauge: {e}"))
}

impl NodeMetrics {
    /// Create a fresh set of metrics under a new [`Registry`].
    pub fn new() -> Self {
        let registry = Registry::new();

        let transactions_created = counter(
            &registry,
            "chainpay_transactions_created_total",
            "Hop legs built by this node",
        );
        let transactions_signed = counter(
            &registry,
            "chainpay_transactions_signed_total",
            "Hop legs signed by this node",
        );
        let transactions_committed = counter(
            &registry,
            "chainpay_transactions_committed_total",
            "Hop legs committed by this node",
        );
        let transactions_submitted = counter(
            &registry,
            "chainpay_transactions_submitted_total",
            "Envelopes accepted by the ledger",
        );
        let flush_runs = counter(&registry, "chainpay_flush_runs_total", "Flush runs");
        let flush_failures = counter(
            &registry,
            "chainpay_flush_failures_total",
            "Flush runs stopped by a failed submission",
        );
        let commands_dispatched = counter(
            &registry,
            "chainpay_commands_dispatched_total",
            "Inbound commands executed",
        );
        let commands_delivered = counter(
            &registry,
            "chainpay_commands_delivered_total",
            "Asynchronous responses matched to a waiting command",
        );
        let commands_dropped = counter(
            &registry,
            "chainpay_commands_dropped_total",
            "Asynchronous responses for unknown or closed commands",
        );
        let sessions_completed = counter(
            &registry,
            "chainpay_sessions_completed_total",
            "Payment sessions committed",
        );
        let sessions_failed = counter(
            &registry,
            "chainpay_sessions_failed_total",
            "Payment sessions failed",
        );

        let outstanding_transactions = gauge(
            &registry,
            "chainpay_outstanding_transactions",
            "Accumulated transactions waiting for a flush",
        );
        let pending_usage = gauge(
            &registry,
            "chainpay_pending_usage_sessions",
            "Sessions with an outstanding owed amount",
        );

        // 1 ms → ~16 s
        let flush_duration_ms = register_histogram_with_registry!(
            HistogramOpts::new("chainpay_flush_duration_ms", "Flush duration in milliseconds")
                .buckets(vec![
                    1.0, 2.0, 4.0, 8.0, 16.0, 32.0, 64.0, 128.0, 256.0, 512.0, 1024.0, 2048.0,
                    4096.0, 8192.0, 16384.0,
                ]),
            registry
        )
        .unwrap_or_else(|e| panic!("failed to register flush_duration_ms histogram: {e}"));

        Self {
            registry,
            transactions_created,
            transactions_signed,
            transactions_committed,
            transactions_submitted,
            flush_runs,
            flush_failures,
            commands_dispatched,
            commands_delivered,
            commands_dropped,
            sessions_completed,
            sessions_failed,
            outstanding_transactions,
            pending_usage,
            flush_duration_ms,
        }
    }

    /// Encode every metric in the Prometheus text exposition format.
    pub fn encode(&self) -> String {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buffer) {
            tracing::warn!(error = %e, "failed to encode metrics");
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

impl Default for NodeMetrics {
    fn default() -> Self {
        Self::new()
    }
}

use std::net::SocketAddr;

// ── RED metrics (operation-driven) ──────────────────────────────

/// Counter: engine operations. Labels: op, status ("ok" or error kind).
pub const OPERATIONS_TOTAL: &str = "tablewait_operations_total";

/// Histogram: engine operation latency in seconds. Labels: op.
pub const OPERATION_DURATION_SECONDS: &str = "tablewait_operation_duration_seconds";

// ── Lifecycle ───────────────────────────────────────────────────

/// Counter: entry state transitions. Labels: to.
pub const TRANSITIONS_TOTAL: &str = "tablewait_transitions_total";

/// Counter: reservations emitted from confirmed entries.
pub const RESERVATIONS_EMITTED_TOTAL: &str = "tablewait_reservations_emitted_total";

/// Counter: notification channel failures.
pub const NOTIFY_FAILURES_TOTAL: &str = "tablewait_notify_failures_total";

// ── Sweeps ──────────────────────────────────────────────────────

/// Histogram: sweep duration in seconds.
pub const SWEEP_DURATION_SECONDS: &str = "tablewait_sweep_duration_seconds";

/// Counter: per-entry tick errors swallowed by a sweep.
pub const SWEEP_ERRORS_TOTAL: &str = "tablewait_sweep_errors_total";

/// Gauge: active entries seen by the last sweep.
pub const ACTIVE_ENTRIES: &str = "tablewait_active_entries";

// ── Storage ─────────────────────────────────────────────────────

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "tablewait_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (records per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "tablewait_wal_flush_batch_size";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Record one engine operation's outcome and latency. `status` is "ok" or
/// the error kind.
pub(crate) fn record_operation(op: &'static str, status: &'static str, started: std::time::Instant) {
    metrics::counter!(OPERATIONS_TOTAL, "op" => op, "status" => status).increment(1);
    metrics::histogram!(OPERATION_DURATION_SECONDS, "op" => op)
        .record(started.elapsed().as_secs_f64());
}

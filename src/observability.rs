use std::net::SocketAddr;

// ── Booking flow ────────────────────────────────────────────────

/// Counter: reservation attempts. Labels: outcome (`ok` or an error label).
pub const RESERVATIONS_TOTAL: &str = "slotbook_reservations_total";

/// Counter: appointments cancelled. Labels: reason (customer, admin, abandoned).
pub const CANCELLATIONS_TOTAL: &str = "slotbook_cancellations_total";

/// Counter: incomplete holds cancelled by the sweeper.
pub const HOLDS_EXPIRED_TOTAL: &str = "slotbook_holds_expired_total";

/// Histogram: slot generation latency for one date, in seconds.
pub const SLOT_QUERY_DURATION_SECONDS: &str = "slotbook_slot_query_duration_seconds";

// ── Storage ─────────────────────────────────────────────────────

/// Gauge: appointments held in memory, any status.
pub const APPOINTMENTS_STORED: &str = "slotbook_appointments_stored";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "slotbook_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "slotbook_wal_flush_batch_size";

/// Counter: WAL compactions performed.
pub const WAL_COMPACTIONS_TOTAL: &str = "slotbook_wal_compactions_total";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    match metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
    {
        Ok(()) => tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics"),
        Err(e) => tracing::error!("failed to install Prometheus exporter on {addr}: {e}"),
    }
}

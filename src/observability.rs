use std::net::SocketAddr;

// ── Booking lifecycle ───────────────────────────────────────────

/// Counter: bookings created.
pub const BOOKINGS_CREATED_TOTAL: &str = "roomcore_bookings_created_total";

/// Counter: booking attempts rejected by an overlap.
pub const BOOKING_CONFLICTS_TOTAL: &str = "roomcore_booking_conflicts_total";

/// Counter: bookings cancelled (owner, admin or conflict resolution).
pub const BOOKINGS_CANCELLED_TOTAL: &str = "roomcore_bookings_cancelled_total";

/// Gauge: confirmed bookings whose window has elapsed, per watcher sweep.
pub const STUCK_BOOKINGS: &str = "roomcore_stuck_bookings";

// ── Resilience ──────────────────────────────────────────────────

/// Gauge: breaker state (0 closed, 1 open, 2 half-open). Labels: dependency.
pub const BREAKER_STATE: &str = "roomcore_breaker_state";

/// Counter: calls rejected by an open breaker. Labels: dependency.
pub const BREAKER_REJECTIONS_TOTAL: &str = "roomcore_breaker_rejections_total";

/// Counter: existence checks answered from the local directory. Labels: dependency.
pub const EXISTENCE_FALLBACKS_TOTAL: &str = "roomcore_existence_fallbacks_total";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("failed to install Prometheus metrics exporter");
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
}

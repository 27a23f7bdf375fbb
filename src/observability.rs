use std::net::SocketAddr;

use crate::sql::Command;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total queries executed. Labels: command, status.
pub const QUERIES_TOTAL: &str = "barberslot_queries_total";

/// Histogram: query latency in seconds. Labels: command.
pub const QUERY_DURATION_SECONDS: &str = "barberslot_query_duration_seconds";

/// Counter: booking attempts. Labels: outcome.
pub const BOOKING_ATTEMPTS_TOTAL: &str = "barberslot_booking_attempts_total";

/// Counter: slot claims undone because the booking insert failed.
pub const BOOKING_ROLLBACKS_TOTAL: &str = "barberslot_booking_rollbacks_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: active TCP connections.
pub const CONNECTIONS_ACTIVE: &str = "barberslot_connections_active";

/// Counter: total connections accepted.
pub const CONNECTIONS_TOTAL: &str = "barberslot_connections_total";

/// Counter: connections rejected due to limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "barberslot_connections_rejected_total";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Map a Command variant to a short label for metrics.
pub fn command_label(cmd: &Command) -> &'static str {
    match cmd {
        Command::SelectServices => "select_services",
        Command::SelectBarbers => "select_barbers",
        Command::SelectDates { .. } => "select_dates",
        Command::SelectTimeSlots { .. } => "select_time_slots",
        Command::SelectStartTimes { .. } => "select_start_times",
        Command::InsertBooking { .. } => "insert_booking",
        Command::SelectBookings { .. } => "select_bookings",
        Command::SelectBookingCounts => "select_booking_counts",
        Command::UpdateBookingStatus { .. } => "update_booking_status",
        Command::DeleteBooking { .. } => "delete_booking",
    }
}

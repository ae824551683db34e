use std::net::SocketAddr;

use crate::engine::BookingError;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: booking requests. Labels: outcome.
pub const BOOKING_REQUESTS_TOTAL: &str = "rental_booking_requests_total";

/// Counter: reservation attempts rejected by an overlapping interval.
pub const SLOT_CONFLICTS_TOTAL: &str = "rental_slot_conflicts_total";

/// Counter: applied lifecycle transitions. Labels: from, to.
pub const TRANSITIONS_TOTAL: &str = "rental_transitions_total";

/// Counter: booking/ledger disagreements. Any increase needs an operator.
pub const INCONSISTENCIES_TOTAL: &str = "rental_inconsistencies_total";

/// Histogram: time spent inside an asset's reservation critical section, seconds.
pub const RESERVE_DURATION_SECONDS: &str = "rental_reserve_duration_seconds";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: bookings held in memory.
pub const BOOKINGS_TRACKED: &str = "rental_bookings_tracked";

/// Counter: pending bookings failed by the hold sweeper.
pub const HOLDS_EXPIRED_TOTAL: &str = "rental_holds_expired_total";

/// Histogram: journal group-commit flush duration in seconds.
pub const JOURNAL_FLUSH_DURATION_SECONDS: &str = "rental_journal_flush_duration_seconds";

/// Histogram: journal group-commit batch size (events per flush).
pub const JOURNAL_FLUSH_BATCH_SIZE: &str = "rental_journal_flush_batch_size";

/// Install the Prometheus exporter on the given port. No-op if port is None.
pub fn init(
    port: Option<u16>,
) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Short label for the result of an engine call.
pub fn outcome_label<T>(result: &Result<T, BookingError>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(BookingError::SlotUnavailable { .. }) => "slot_unavailable",
        Err(BookingError::InvalidTransition { .. }) => "invalid_transition",
        Err(BookingError::Inconsistent(_)) => "inconsistent",
        Err(BookingError::NotFound(_)) => "not_found",
        Err(BookingError::Validation(_)) => "validation",
        Err(BookingError::NotParticipant { .. }) => "not_participant",
        Err(BookingError::LimitExceeded(_)) => "limit_exceeded",
        Err(BookingError::Journal(_)) => "journal",
    }
}

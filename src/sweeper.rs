use std::sync::Arc;
use std::time::Duration;

use chrono::TimeDelta;
use tracing::{debug, info, warn};

use crate::engine::Engine;
use crate::observability::HOLDS_EXPIRED_TOTAL;

/// Fail every pending booking older than `hold_ttl`, handing its dates back.
/// Returns how many holds were expired.
pub async fn sweep_stale_holds(engine: &Engine, hold_ttl: TimeDelta) -> usize {
    let Some(cutoff) = engine.now().checked_sub_signed(hold_ttl) else {
        return 0;
    };
    let mut expired = 0;
    for booking_id in engine.stale_holds(cutoff).await {
        match engine.fail_payment(booking_id).await {
            Ok(_) => {
                expired += 1;
                metrics::counter!(HOLDS_EXPIRED_TOTAL).increment(1);
                info!("expired unpaid hold of booking {booking_id}");
            }
            Err(e) => {
                // Payment may have been confirmed since the scan.
                debug!("sweeper skip {booking_id}: {e}");
            }
        }
    }
    expired
}

/// Background task that periodically expires unpaid holds.
pub async fn run_hold_sweeper(engine: Arc<Engine>, hold_ttl: TimeDelta, period: Duration) {
    let mut interval = tokio::time::interval(period);
    loop {
        interval.tick().await;
        sweep_stale_holds(&engine, hold_ttl).await;
    }
}

/// Background task that rewrites the journal once enough appends piled up.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64, period: Duration) {
    let mut interval = tokio::time::interval(period);
    loop {
        interval.tick().await;
        if engine.journal_appends_since_compact().await < threshold {
            continue;
        }
        if let Err(e) = engine.compact_journal().await {
            warn!("journal compaction failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::engine::EngineSettings;
    use crate::model::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;
    use ulid::Ulid;

    fn request(asset_id: AssetId, start: NaiveDate, end: NaiveDate) -> BookingRequest {
        BookingRequest {
            asset_id,
            requester_id: Ulid::new(),
            owner_id: Ulid::new(),
            start,
            end,
            rates: RateSchedule::daily(dec!(40), dec!(0)),
            policy: CancellationPolicy::Flexible,
        }
    }

    #[tokio::test]
    async fn sweeper_expires_only_stale_pending() {
        let today = NaiveDate::from_ymd_opt(2030, 5, 1).unwrap();
        let clock = Arc::new(ManualClock::at_date(today));
        let engine = Engine::in_memory(EngineSettings {
            clock: clock.clone(),
            ..Default::default()
        });
        let asset = Ulid::new();
        let day = |n: u64| today + chrono::Days::new(n);

        let stale = engine.request_booking(request(asset, day(3), day(5))).await.unwrap();
        let paid = engine.request_booking(request(asset, day(6), day(8))).await.unwrap();
        engine.confirm_payment(paid.id, None).await.unwrap();

        clock.advance(TimeDelta::minutes(45));
        let fresh = engine.request_booking(request(asset, day(9), day(10))).await.unwrap();

        assert_eq!(sweep_stale_holds(&engine, TimeDelta::minutes(30)).await, 1);

        let stale = engine.booking(stale.id).await.unwrap();
        assert_eq!(stale.status, BookingStatus::Cancelled);
        assert_eq!(stale.payment_status, PaymentStatus::Failed);
        assert_eq!(engine.booking(paid.id).await.unwrap().status, BookingStatus::Confirmed);
        assert_eq!(engine.booking(fresh.id).await.unwrap().status, BookingStatus::Pending);

        // Dates of the expired hold are free again.
        assert!(engine.request_booking(request(asset, day(3), day(5))).await.is_ok());

        // Nothing left to expire.
        assert_eq!(sweep_stale_holds(&engine, TimeDelta::minutes(30)).await, 0);
    }

    #[tokio::test]
    async fn sweeper_handles_huge_ttl() {
        let engine = Engine::in_memory(EngineSettings::default());
        assert_eq!(sweep_stale_holds(&engine, TimeDelta::MAX).await, 0);
    }
}

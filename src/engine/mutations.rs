use chrono::NaiveDate;
use tracing::{error, info};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability::{outcome_label, BOOKINGS_TRACKED, BOOKING_REQUESTS_TOTAL};
use crate::pricing;

use super::{BookingError, Engine};

impl Engine {
    /// Hold the dates and open a `pending` booking for them.
    ///
    /// On a conflict nothing is created and `SlotUnavailable` is returned.
    pub async fn request_booking(&self, request: BookingRequest) -> Result<Booking, BookingError> {
        let result = self.place_booking(request).await;
        metrics::counter!(BOOKING_REQUESTS_TOTAL, "outcome" => outcome_label(&result)).increment(1);
        result
    }

    async fn place_booking(&self, request: BookingRequest) -> Result<Booking, BookingError> {
        let now = self.clock.now();
        let today = now.date_naive();
        if request.start >= request.end {
            return Err(BookingError::Validation("start date must be before end date"));
        }
        if request.start < today {
            return Err(BookingError::Validation("start date is in the past"));
        }
        if (request.start - today).num_days() > MAX_ADVANCE_DAYS {
            return Err(BookingError::LimitExceeded("start date too far ahead"));
        }
        pricing::validate_rates(&request.rates).map_err(BookingError::Validation)?;
        // Priced before the hold so a bad price never leaves dates blocked.
        let price = pricing::compute(
            request.start,
            request.end,
            request.rates.daily_rate,
            request.rates.security_deposit,
        )
        .map_err(BookingError::Validation)?;

        let range = DateRange::new(request.start, request.end);
        let _gate = self.gate.read().await;
        let interval = self
            .ledger
            .try_reserve(request.asset_id, range)
            .await
            .map_err(|e| BookingError::from_reserve(request.asset_id, e))?;

        let id = Ulid::new();
        let booking = Booking {
            id,
            booking_number: booking_number(id, now),
            asset_id: request.asset_id,
            interval_id: interval.id,
            requester_id: request.requester_id,
            owner_id: request.owner_id,
            status: BookingStatus::Pending,
            range,
            total_days: price.total_days,
            daily_rate: request.rates.daily_rate,
            subtotal: price.subtotal,
            security_deposit: request.rates.security_deposit,
            service_fee: price.service_fee,
            total_amount: price.total_amount,
            cancellation_policy: request.policy,
            payment_status: PaymentStatus::Pending,
            payment_id: None,
            pickup_time: None,
            return_time: None,
            cancelled_by: None,
            cancellation_reason: None,
            refund: None,
            created_at: now,
            updated_at: now,
        };

        let event = Event::BookingCreated {
            booking: Box::new(booking.clone()),
        };
        if let Err(e) = self.journal_append(&event).await {
            // Give the dates back; a booking that was never recorded must not hold them.
            if let Err(release_err) = self.ledger.release(interval.id).await {
                error!("could not release hold {} after failed booking: {release_err}", interval.id);
            }
            return Err(e);
        }
        self.insert_booking(booking.clone());
        self.notify.send(booking.asset_id, &event);
        metrics::gauge!(BOOKINGS_TRACKED).set(self.bookings.len() as f64);
        info!(
            "booking {} ({}) held {} on asset {} for {}",
            booking.id, booking.booking_number, range, booking.asset_id, booking.total_amount
        );
        Ok(booking)
    }

    /// Take dates off an asset's calendar (maintenance or an owner block).
    pub async fn block_dates(
        &self,
        asset_id: AssetId,
        start: NaiveDate,
        end: NaiveDate,
        kind: BlockKind,
    ) -> Result<AllocationInterval, BookingError> {
        if start >= end {
            return Err(BookingError::Validation("start date must be before end date"));
        }
        let _gate = self.gate.read().await;
        let interval = self
            .ledger
            .block(asset_id, DateRange::new(start, end), kind)
            .await
            .map_err(|e| BookingError::from_reserve(asset_id, e))?;
        info!("asset {asset_id}: {} blocked ({kind:?})", interval.range);
        Ok(interval)
    }

    /// Reopen dates taken by `block_dates`. Booking intervals are released
    /// only through the booking lifecycle.
    pub async fn unblock(&self, interval_id: IntervalId) -> Result<(), BookingError> {
        let _gate = self.gate.read().await;
        let interval = self
            .ledger
            .interval(interval_id)
            .await
            .ok_or(BookingError::NotFound(interval_id))?;
        match interval.status {
            IntervalStatus::Maintenance | IntervalStatus::Blocked => {}
            IntervalStatus::Available => return Ok(()),
            IntervalStatus::Held | IntervalStatus::Booked => {
                return Err(BookingError::Validation("interval belongs to a booking"));
            }
        }
        self.ledger
            .release(interval_id)
            .await
            .map_err(|e| BookingError::from_reserve(interval.asset_id, e))
    }
}

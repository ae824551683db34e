use rust_decimal::Decimal;
use tracing::{debug, error, info, warn};

use crate::ledger::LedgerError;
use crate::limits::{MAX_PAYMENT_ID_LEN, MAX_REASON_LEN};
use crate::lifecycle::check_transition;
use crate::model::*;
use crate::observability::{INCONSISTENCIES_TOTAL, TRANSITIONS_TOTAL};
use crate::policy;

use super::{BookingError, Engine};

fn count_transition(from: BookingStatus, to: BookingStatus) {
    metrics::counter!(TRANSITIONS_TOTAL, "from" => from.as_str(), "to" => to.as_str())
        .increment(1);
}

/// Surface a broken booking/ledger pairing loudly; it is never repaired here.
fn report(err: BookingError) -> BookingError {
    if let BookingError::Inconsistent(msg) = &err {
        metrics::counter!(INCONSISTENCIES_TOTAL).increment(1);
        error!("ledger inconsistency: {msg}");
    }
    err
}

impl Engine {
    /// Payment succeeded: `pending → confirmed`, hold becomes a booking.
    /// `payment_id` is the payment subsystem's reference, kept on the booking.
    ///
    /// A repeated callback for a booking that is already paid is a no-op and
    /// keeps the reference of the first one.
    pub async fn confirm_payment(
        &self,
        booking_id: BookingId,
        payment_id: Option<String>,
    ) -> Result<Booking, BookingError> {
        if payment_id.as_ref().is_some_and(|p| p.len() > MAX_PAYMENT_ID_LEN) {
            return Err(BookingError::LimitExceeded("payment id too long"));
        }
        let _gate = self.gate.read().await;
        let shared = self.resolve_booking(&booking_id)?;
        let mut booking = shared.lock().await;

        match booking.status {
            BookingStatus::Confirmed | BookingStatus::Active | BookingStatus::Completed => {
                debug!("booking {booking_id}: duplicate payment confirmation ignored");
                return Ok(booking.clone());
            }
            BookingStatus::Pending | BookingStatus::Cancelled => {}
        }
        check_transition(booking.status, BookingStatus::Confirmed)?;

        self.ledger
            .commit(booking.interval_id, booking.id)
            .await
            .map_err(|e| report(BookingError::from_held(booking_id, e)))?;

        let event = Event::BookingConfirmed {
            id: booking.id,
            asset_id: booking.asset_id,
            payment_id,
            at: self.clock.now(),
        };
        self.persist_and_apply(&mut booking, &event).await?;
        count_transition(BookingStatus::Pending, BookingStatus::Confirmed);
        info!("booking {booking_id} confirmed");
        Ok(booking.clone())
    }

    /// Payment declined or the hold expired: `pending → cancelled` with no
    /// refund, and the dates go back on the calendar.
    pub async fn fail_payment(&self, booking_id: BookingId) -> Result<Booking, BookingError> {
        let _gate = self.gate.read().await;
        let shared = self.resolve_booking(&booking_id)?;
        let mut booking = shared.lock().await;

        match booking.status {
            BookingStatus::Pending => {}
            BookingStatus::Cancelled if booking.payment_status == PaymentStatus::Failed => {
                return Ok(booking.clone());
            }
            from @ (BookingStatus::Confirmed
            | BookingStatus::Active
            | BookingStatus::Completed
            | BookingStatus::Cancelled) => {
                return Err(BookingError::InvalidTransition {
                    from,
                    to: BookingStatus::Cancelled,
                });
            }
        }

        self.release_interval_of(&booking).await?;

        let event = Event::BookingCancelled {
            id: booking.id,
            asset_id: booking.asset_id,
            cancelled_by: None,
            reason: Some("payment failed".into()),
            refund: RefundDecision::none(Decimal::ZERO),
            payment_status: PaymentStatus::Failed,
            at: self.clock.now(),
        };
        self.persist_and_apply(&mut booking, &event).await?;
        count_transition(BookingStatus::Pending, BookingStatus::Cancelled);
        info!("booking {booking_id} cancelled: payment failed");
        Ok(booking.clone())
    }

    /// Cancel on behalf of the requester or the owner. Legal from `pending`
    /// and `confirmed`; the refund follows the booking's policy.
    pub async fn cancel_booking(
        &self,
        booking_id: BookingId,
        cancelled_by: PartyId,
        reason: Option<String>,
    ) -> Result<Booking, BookingError> {
        if reason.as_ref().is_some_and(|r| r.len() > MAX_REASON_LEN) {
            return Err(BookingError::LimitExceeded("cancellation reason too long"));
        }
        let _gate = self.gate.read().await;
        let shared = self.resolve_booking(&booking_id)?;
        let mut booking = shared.lock().await;

        if !booking.is_participant(cancelled_by) {
            return Err(BookingError::NotParticipant {
                booking_id,
                actor: cancelled_by,
            });
        }
        let from = booking.status;
        check_transition(from, BookingStatus::Cancelled)?;

        let now = self.clock.now();
        let refund = policy::compute_refund(
            &self.refunds,
            booking.cancellation_policy,
            booking.range.start,
            now,
            booking.total_amount,
            booking.security_deposit,
        );

        self.release_interval_of(&booking).await?;

        let payment_status = match booking.payment_status {
            PaymentStatus::Completed if refund.refund_amount > Decimal::ZERO => {
                PaymentStatus::Refunded
            }
            other => other,
        };
        let event = Event::BookingCancelled {
            id: booking.id,
            asset_id: booking.asset_id,
            cancelled_by: Some(cancelled_by),
            reason,
            refund,
            payment_status,
            at: now,
        };
        self.persist_and_apply(&mut booking, &event).await?;
        count_transition(from, BookingStatus::Cancelled);
        info!(
            "booking {booking_id} cancelled by {cancelled_by}: refund {} ({})",
            refund.refund_amount, refund.refund_fraction
        );
        Ok(booking.clone())
    }

    /// Hand-over: `confirmed → active`. The interval stays booked.
    pub async fn start_rental(&self, booking_id: BookingId) -> Result<Booking, BookingError> {
        self.advance(booking_id, BookingStatus::Active).await
    }

    /// Return: `active → completed`. The interval stays booked as history.
    pub async fn complete_rental(&self, booking_id: BookingId) -> Result<Booking, BookingError> {
        self.advance(booking_id, BookingStatus::Completed).await
    }

    /// Give a booking's dates back. An interval the ledger no longer knows
    /// was released before and dropped by compaction, so a retried
    /// cancellation goes through.
    async fn release_interval_of(&self, booking: &Booking) -> Result<(), BookingError> {
        match self.ledger.release(booking.interval_id).await {
            Ok(()) => Ok(()),
            Err(LedgerError::NotFound(id)) => {
                warn!("booking {}: interval {id} already released", booking.id);
                Ok(())
            }
            Err(e) => Err(report(BookingError::from_held(booking.id, e))),
        }
    }

    async fn advance(&self, booking_id: BookingId, to: BookingStatus) -> Result<Booking, BookingError> {
        let _gate = self.gate.read().await;
        let shared = self.resolve_booking(&booking_id)?;
        let mut booking = shared.lock().await;
        let from = booking.status;
        check_transition(from, to)?;

        let (id, asset_id, at) = (booking.id, booking.asset_id, self.clock.now());
        let event = match to {
            BookingStatus::Active => Event::RentalStarted { id, asset_id, at },
            BookingStatus::Completed => Event::RentalCompleted { id, asset_id, at },
            BookingStatus::Pending | BookingStatus::Confirmed | BookingStatus::Cancelled => {
                return Err(BookingError::InvalidTransition { from, to });
            }
        };
        self.persist_and_apply(&mut booking, &event).await?;
        count_transition(from, to);
        info!("booking {booking_id}: {from} -> {to}");
        Ok(booking.clone())
    }
}

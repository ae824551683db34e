//! Booking lifecycle state machine.
//!
//! ```text
//! pending ──► confirmed ──► active ──► completed
//!    │            │
//!    └────────────┴──► cancelled
//! ```
//!
//! `completed` and `cancelled` are terminal.

use chrono::{DateTime, Utc};

use crate::engine::BookingError;
use crate::model::{Booking, BookingStatus};

impl BookingStatus {
    pub fn can_transition_to(self, to: BookingStatus) -> bool {
        use BookingStatus::*;
        match (self, to) {
            (Pending, Confirmed) | (Confirmed, Active) | (Active, Completed) => true,
            (Pending, Cancelled) | (Confirmed, Cancelled) => true,
            (Pending, _) | (Confirmed, _) | (Active, _) => false,
            (Completed, _) | (Cancelled, _) => false,
        }
    }
}

/// Check a move without touching the booking.
pub fn check_transition(from: BookingStatus, to: BookingStatus) -> Result<(), BookingError> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(BookingError::InvalidTransition { from, to })
    }
}

/// Apply a move. On error the booking is left untouched.
pub fn transition(
    booking: &mut Booking,
    to: BookingStatus,
    at: DateTime<Utc>,
) -> Result<BookingStatus, BookingError> {
    let from = booking.status;
    check_transition(from, to)?;
    booking.status = to;
    booking.updated_at = at;
    Ok(from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;
    use ulid::Ulid;

    use BookingStatus::*;

    const ALL: [BookingStatus; 5] = [Pending, Confirmed, Active, Completed, Cancelled];

    fn booking(status: BookingStatus) -> Booking {
        let now = Utc::now();
        let id = Ulid::new();
        Booking {
            id,
            booking_number: booking_number(id, now),
            asset_id: Ulid::new(),
            interval_id: Ulid::new(),
            requester_id: Ulid::new(),
            owner_id: Ulid::new(),
            status,
            range: DateRange::new(
                NaiveDate::from_ymd_opt(2030, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(2030, 1, 3).unwrap(),
            ),
            total_days: 2,
            daily_rate: dec!(10),
            subtotal: dec!(20),
            security_deposit: dec!(0),
            service_fee: dec!(2),
            total_amount: dec!(22),
            cancellation_policy: CancellationPolicy::Moderate,
            payment_status: PaymentStatus::Pending,
            payment_id: None,
            pickup_time: None,
            return_time: None,
            cancelled_by: None,
            cancellation_reason: None,
            refund: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn happy_path() {
        let mut b = booking(Pending);
        let t = Utc::now();
        assert_eq!(transition(&mut b, Confirmed, t).unwrap(), Pending);
        assert_eq!(transition(&mut b, Active, t).unwrap(), Confirmed);
        assert_eq!(transition(&mut b, Completed, t).unwrap(), Active);
        assert_eq!(b.status, Completed);
        assert_eq!(b.updated_at, t);
    }

    #[test]
    fn pending_cannot_skip_to_active() {
        let mut b = booking(Pending);
        let before = b.clone();
        let err = transition(&mut b, Active, Utc::now()).unwrap_err();
        assert!(matches!(
            err,
            BookingError::InvalidTransition { from: Pending, to: Active }
        ));
        assert_eq!(b, before);
    }

    #[test]
    fn cancelled_cannot_be_confirmed() {
        let mut b = booking(Cancelled);
        assert!(matches!(
            transition(&mut b, Confirmed, Utc::now()),
            Err(BookingError::InvalidTransition { from: Cancelled, to: Confirmed })
        ));
    }

    #[test]
    fn terminal_states_have_no_exits() {
        for from in [Completed, Cancelled] {
            for to in ALL {
                assert!(!from.can_transition_to(to), "{from} -> {to}");
            }
        }
    }

    #[test]
    fn exactly_five_legal_moves() {
        let legal: Vec<_> = ALL
            .iter()
            .flat_map(|&f| ALL.iter().map(move |&t| (f, t)))
            .filter(|(f, t)| f.can_transition_to(*t))
            .collect();
        assert_eq!(
            legal,
            vec![
                (Pending, Confirmed),
                (Pending, Cancelled),
                (Confirmed, Active),
                (Confirmed, Cancelled),
                (Active, Completed),
            ]
        );
    }

    #[test]
    fn active_cannot_be_cancelled() {
        assert!(check_transition(Active, Cancelled).is_err());
    }
}

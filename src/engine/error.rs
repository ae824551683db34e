use ulid::Ulid;

use crate::ledger::LedgerError;
use crate::model::{AssetId, BookingId, BookingStatus, IntervalId, PartyId};

#[derive(Debug)]
pub enum BookingError {
    /// The requested dates are no longer available.
    SlotUnavailable {
        asset_id: AssetId,
        conflicting: IntervalId,
    },
    InvalidTransition {
        from: BookingStatus,
        to: BookingStatus,
    },
    /// A booking and the ledger disagree. Never repaired automatically.
    Inconsistent(String),
    NotFound(Ulid),
    Validation(&'static str),
    NotParticipant {
        booking_id: BookingId,
        actor: PartyId,
    },
    LimitExceeded(&'static str),
    Journal(String),
}

impl BookingError {
    /// Errors caused by the caller rather than by the engine.
    pub fn is_client_error(&self) -> bool {
        match self {
            BookingError::SlotUnavailable { .. }
            | BookingError::InvalidTransition { .. }
            | BookingError::NotFound(_)
            | BookingError::Validation(_)
            | BookingError::NotParticipant { .. }
            | BookingError::LimitExceeded(_) => true,
            BookingError::Inconsistent(_) | BookingError::Journal(_) => false,
        }
    }

    /// Map a ledger failure on the reservation path.
    pub(crate) fn from_reserve(asset_id: AssetId, err: LedgerError) -> Self {
        match err {
            LedgerError::Conflict(conflicting) => BookingError::SlotUnavailable {
                asset_id,
                conflicting,
            },
            LedgerError::Validation(msg) => BookingError::Validation(msg),
            LedgerError::LimitExceeded(msg) => BookingError::LimitExceeded(msg),
            LedgerError::Journal(e) => BookingError::Journal(e),
            LedgerError::NotFound(id) => BookingError::NotFound(id),
            other @ LedgerError::InvalidState { .. } => {
                BookingError::Inconsistent(other.to_string())
            }
        }
    }

    /// Map a ledger failure on an interval the booking already references.
    /// A missing or unusable interval there means the protocol was broken.
    pub(crate) fn from_held(booking_id: BookingId, err: LedgerError) -> Self {
        match err {
            LedgerError::Journal(e) => BookingError::Journal(e),
            other => BookingError::Inconsistent(format!("booking {booking_id}: {other}")),
        }
    }
}

impl std::fmt::Display for BookingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BookingError::SlotUnavailable { asset_id, conflicting } => write!(
                f,
                "dates no longer available on asset {asset_id} (conflicts with {conflicting})"
            ),
            BookingError::InvalidTransition { from, to } => {
                write!(f, "invalid transition: {from} -> {to}")
            }
            BookingError::Inconsistent(msg) => write!(f, "inconsistent state: {msg}"),
            BookingError::NotFound(id) => write!(f, "not found: {id}"),
            BookingError::Validation(msg) => write!(f, "validation failed: {msg}"),
            BookingError::NotParticipant { booking_id, actor } => {
                write!(f, "{actor} is not a party to booking {booking_id}")
            }
            BookingError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            BookingError::Journal(e) => write!(f, "journal error: {e}"),
        }
    }
}

impl std::error::Error for BookingError {}

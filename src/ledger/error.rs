use crate::model::{IntervalId, IntervalStatus};

#[derive(Debug)]
pub enum LedgerError {
    /// The candidate range overlaps this unavailable interval.
    Conflict(IntervalId),
    NotFound(IntervalId),
    InvalidState {
        id: IntervalId,
        status: IntervalStatus,
    },
    Validation(&'static str),
    LimitExceeded(&'static str),
    Journal(String),
}

impl std::fmt::Display for LedgerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LedgerError::Conflict(id) => write!(f, "conflict with interval: {id}"),
            LedgerError::NotFound(id) => write!(f, "interval not found: {id}"),
            LedgerError::InvalidState { id, status } => {
                write!(f, "interval {id} is {}", status.as_str())
            }
            LedgerError::Validation(msg) => write!(f, "invalid range: {msg}"),
            LedgerError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            LedgerError::Journal(e) => write!(f, "journal error: {e}"),
        }
    }
}

impl std::error::Error for LedgerError {}

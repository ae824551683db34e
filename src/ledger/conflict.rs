use crate::limits::MAX_RANGE_DAYS;
use crate::model::*;

use super::LedgerError;

pub fn validate_range(range: &DateRange) -> Result<(), LedgerError> {
    if !range.is_valid() {
        return Err(LedgerError::Validation("start date must be before end date"));
    }
    if range.days() > MAX_RANGE_DAYS {
        return Err(LedgerError::LimitExceeded("range too long"));
    }
    Ok(())
}

/// First unavailable interval overlapping `range`, if any.
pub fn find_conflict<'a>(
    ledger: &'a AssetLedger,
    range: &DateRange,
    exclude: Option<IntervalId>,
) -> Option<&'a AllocationInterval> {
    ledger
        .overlapping(range)
        .filter(|i| Some(i.id) != exclude)
        .find(|i| match i.status {
            IntervalStatus::Available => false,
            IntervalStatus::Held
            | IntervalStatus::Booked
            | IntervalStatus::Maintenance
            | IntervalStatus::Blocked => true,
        })
}

//! Availability ledger: the single source of truth for which dates of an
//! asset are taken.
//!
//! Every mutation of one asset's intervals runs inside that asset's critical
//! section; assets never share a lock.

mod conflict;
mod error;
mod memory;

pub use conflict::{find_conflict, validate_range};
pub use error::LedgerError;
pub use memory::MemoryLedger;

use async_trait::async_trait;

use crate::model::*;

/// Store abstraction over the per-asset interval sets.
///
/// Implementations must run the overlap check and the insert of
/// `try_reserve`/`block` as one indivisible step per asset. A read
/// followed by a separate write is not an acceptable implementation.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Atomically check `range` against the asset's unavailable intervals and
    /// insert a `held` interval if nothing overlaps.
    async fn try_reserve(
        &self,
        asset_id: AssetId,
        range: DateRange,
    ) -> Result<AllocationInterval, LedgerError>;

    /// Take dates off the calendar for maintenance or an owner block.
    async fn block(
        &self,
        asset_id: AssetId,
        range: DateRange,
        kind: BlockKind,
    ) -> Result<AllocationInterval, LedgerError>;

    /// `held → booked`. Idempotent for the same booking.
    async fn commit(&self, interval_id: IntervalId, booking_id: BookingId) -> Result<(), LedgerError>;

    /// Flip an interval back to `available`. Releasing an available interval
    /// is a no-op; once pruned the id is `NotFound`.
    async fn release(&self, interval_id: IntervalId) -> Result<(), LedgerError>;

    /// Unavailable intervals overlapping `range`. Read-only; for calendars.
    async fn list_conflicts(
        &self,
        asset_id: AssetId,
        range: DateRange,
        exclude: Option<IntervalId>,
    ) -> Result<Vec<AllocationInterval>, LedgerError>;

    async fn interval(&self, interval_id: IntervalId) -> Option<AllocationInterval>;

    /// Every unavailable interval, for journal compaction.
    async fn snapshot(&self) -> Vec<AllocationInterval>;

    /// Forget released intervals. Returns how many were dropped.
    async fn prune_released(&self) -> usize;
}

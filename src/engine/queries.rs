use chrono::{DateTime, Days, NaiveDate, Utc};
use dashmap::DashMap;

use crate::limits::*;
use crate::model::*;

use super::{BookingError, Engine};

impl Engine {
    pub async fn booking(&self, id: BookingId) -> Result<Booking, BookingError> {
        let shared = self.resolve_booking(&id)?;
        let booking = shared.lock().await;
        Ok(booking.clone())
    }

    /// Bookings a party requested, newest first. Returns the page and the total.
    pub async fn bookings_for_requester(
        &self,
        requester_id: PartyId,
        offset: usize,
        limit: usize,
    ) -> (Vec<Booking>, usize) {
        self.page(&self.by_requester, requester_id, offset, limit).await
    }

    /// Bookings on a party's assets, newest first.
    pub async fn bookings_for_owner(
        &self,
        owner_id: PartyId,
        offset: usize,
        limit: usize,
    ) -> (Vec<Booking>, usize) {
        self.page(&self.by_owner, owner_id, offset, limit).await
    }

    async fn page(
        &self,
        index: &DashMap<PartyId, Vec<BookingId>>,
        party: PartyId,
        offset: usize,
        limit: usize,
    ) -> (Vec<Booking>, usize) {
        // Index lists are in insertion order.
        let mut ids = index.get(&party).map(|e| e.value().clone()).unwrap_or_default();
        ids.reverse();
        let total = ids.len();

        let mut page = Vec::new();
        for id in ids.into_iter().skip(offset).take(limit.min(MAX_PAGE_SIZE)) {
            if let Some(shared) = self.booking_handle(&id) {
                page.push(shared.lock().await.clone());
            }
        }
        (page, total)
    }

    /// Intervals that make any date of `[start, end)` unavailable on an asset.
    pub async fn calendar(
        &self,
        asset_id: AssetId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<AllocationInterval>, BookingError> {
        let range = DateRange::new(start, end);
        if !range.is_valid() {
            return Err(BookingError::Validation("start date must be before end date"));
        }
        if range.days() > MAX_CALENDAR_WINDOW_DAYS {
            return Err(BookingError::LimitExceeded("calendar window too large"));
        }
        let mut busy = Vec::new();
        // The ledger caps a single query span; walk long windows in chunks.
        let mut cursor = start;
        while cursor < end {
            let chunk_end = cursor
                .checked_add_days(Days::new(MAX_RANGE_DAYS as u64))
                .map_or(end, |d| d.min(end));
            let hits = self
                .ledger
                .list_conflicts(asset_id, DateRange::new(cursor, chunk_end), None)
                .await
                .map_err(|e| BookingError::from_reserve(asset_id, e))?;
            for hit in hits {
                if !busy.iter().any(|b: &AllocationInterval| b.id == hit.id) {
                    busy.push(hit);
                }
            }
            cursor = chunk_end;
        }
        busy.sort_by_key(|i| i.range.start);
        Ok(busy)
    }

    /// Pending bookings created at or before `cutoff`: holds whose payment
    /// never arrived.
    pub async fn stale_holds(&self, cutoff: DateTime<Utc>) -> Vec<BookingId> {
        let mut stale = Vec::new();
        for shared in self.all_bookings() {
            let booking = shared.lock().await;
            if booking.status == BookingStatus::Pending && booking.created_at <= cutoff {
                stale.push(booking.id);
            }
        }
        stale.sort_unstable();
        stale
    }
}

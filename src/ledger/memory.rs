use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;
use ulid::Ulid;

use crate::journal::Journal;
use crate::limits::MAX_LIVE_INTERVALS_PER_ASSET;
use crate::model::*;
use crate::notify::NotifyHub;
use crate::observability::{RESERVE_DURATION_SECONDS, SLOT_CONFLICTS_TOTAL};

use super::conflict::{find_conflict, validate_range};
use super::{Ledger, LedgerError};

pub type SharedAssetLedger = Arc<Mutex<AssetLedger>>;

/// In-memory ledger with one mutex per asset.
///
/// With a journal attached every mutation is appended (and fsynced) while the
/// asset's lock is held, before it becomes visible.
pub struct MemoryLedger {
    assets: DashMap<AssetId, SharedAssetLedger>,
    /// Reverse lookup: interval id → asset id.
    interval_to_asset: DashMap<IntervalId, AssetId>,
    journal: Option<Journal>,
    notify: Option<Arc<NotifyHub>>,
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

/// Apply an event to one asset's intervals (caller holds the asset's lock).
fn apply_to_asset(
    ledger: &mut AssetLedger,
    event: &Event,
    index: &DashMap<IntervalId, AssetId>,
) {
    match event {
        Event::IntervalHeld { id, asset_id, range } => {
            ledger.insert_interval(AllocationInterval {
                id: *id,
                asset_id: *asset_id,
                range: *range,
                status: IntervalStatus::Held,
                booking_id: None,
            });
            index.insert(*id, *asset_id);
        }
        Event::IntervalBlocked { id, asset_id, range, kind } => {
            ledger.insert_interval(AllocationInterval {
                id: *id,
                asset_id: *asset_id,
                range: *range,
                status: (*kind).into(),
                booking_id: None,
            });
            index.insert(*id, *asset_id);
        }
        Event::IntervalCommitted { id, booking_id, .. } => {
            if let Some(interval) = ledger.get_mut(*id) {
                interval.status = IntervalStatus::Booked;
                interval.booking_id = Some(*booking_id);
            }
        }
        Event::IntervalReleased { id, .. } => {
            if let Some(interval) = ledger.get_mut(*id) {
                interval.status = IntervalStatus::Available;
            }
        }
        // Booking events belong to the coordinator.
        Event::BookingCreated { .. }
        | Event::BookingConfirmed { .. }
        | Event::RentalStarted { .. }
        | Event::RentalCompleted { .. }
        | Event::BookingCancelled { .. } => {}
    }
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self {
            assets: DashMap::new(),
            interval_to_asset: DashMap::new(),
            journal: None,
            notify: None,
        }
    }

    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn with_notify(mut self, notify: Arc<NotifyHub>) -> Self {
        self.notify = Some(notify);
        self
    }

    #[cfg(test)]
    pub(super) fn asset_count(&self) -> usize {
        self.assets.len()
    }

    /// Intervals kept in memory, released ones included, and index entries.
    #[cfg(test)]
    pub(super) async fn stored_intervals(&self) -> (usize, usize) {
        let assets: Vec<SharedAssetLedger> =
            self.assets.iter().map(|e| e.value().clone()).collect();
        let mut stored = 0;
        for shared in assets {
            stored += shared.lock().await.intervals.len();
        }
        (stored, self.interval_to_asset.len())
    }

    /// Get or lazily create the interval set of an asset.
    fn asset(&self, asset_id: AssetId) -> SharedAssetLedger {
        self.assets
            .entry(asset_id)
            .or_insert_with(|| Arc::new(Mutex::new(AssetLedger::new(asset_id))))
            .value()
            .clone()
    }

    fn existing_asset(&self, asset_id: &AssetId) -> Option<SharedAssetLedger> {
        self.assets.get(asset_id).map(|e| e.value().clone())
    }

    /// Lookup interval → asset, then take the asset's lock.
    async fn resolve_interval(
        &self,
        interval_id: IntervalId,
    ) -> Result<OwnedMutexGuard<AssetLedger>, LedgerError> {
        let asset_id = self
            .interval_to_asset
            .get(&interval_id)
            .map(|e| *e.value())
            .ok_or(LedgerError::NotFound(interval_id))?;
        let shared = self
            .existing_asset(&asset_id)
            .ok_or(LedgerError::NotFound(interval_id))?;
        Ok(shared.lock_owned().await)
    }

    /// Journal-append + apply + notify, under the caller's asset lock.
    async fn persist_and_apply(
        &self,
        ledger: &mut AssetLedger,
        event: &Event,
    ) -> Result<(), LedgerError> {
        if let Some(journal) = &self.journal {
            journal.append(event).await.map_err(LedgerError::Journal)?;
        }
        apply_to_asset(ledger, event, &self.interval_to_asset);
        if let Some(notify) = &self.notify {
            notify.send(ledger.asset_id, event);
        }
        Ok(())
    }

    /// Rebuild state from a journaled event. Nothing is re-journaled.
    pub async fn replay(&self, event: &Event) {
        if !event.is_ledger_event() {
            return;
        }
        let shared = self.asset(event.asset_id());
        let mut guard = shared.lock().await;
        apply_to_asset(&mut guard, event, &self.interval_to_asset);
    }

    /// Shared path of `try_reserve` and `block`: check and insert under one lock.
    async fn place(
        &self,
        asset_id: AssetId,
        range: DateRange,
        kind: Option<BlockKind>,
    ) -> Result<AllocationInterval, LedgerError> {
        validate_range(&range)?;
        let shared = self.asset(asset_id);
        let mut guard = shared.lock().await;
        if guard.live_count() >= MAX_LIVE_INTERVALS_PER_ASSET {
            return Err(LedgerError::LimitExceeded("too many intervals on asset"));
        }

        if let Some(existing) = find_conflict(&guard, &range, None) {
            metrics::counter!(SLOT_CONFLICTS_TOTAL).increment(1);
            debug!(
                "asset {asset_id}: {range} conflicts with {} interval {}",
                existing.status.as_str(),
                existing.id
            );
            return Err(LedgerError::Conflict(existing.id));
        }

        let id = Ulid::new();
        let (event, status) = match kind {
            None => (Event::IntervalHeld { id, asset_id, range }, IntervalStatus::Held),
            Some(kind) => (
                Event::IntervalBlocked { id, asset_id, range, kind },
                kind.into(),
            ),
        };
        self.persist_and_apply(&mut guard, &event).await?;
        Ok(AllocationInterval {
            id,
            asset_id,
            range,
            status,
            booking_id: None,
        })
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn try_reserve(
        &self,
        asset_id: AssetId,
        range: DateRange,
    ) -> Result<AllocationInterval, LedgerError> {
        let started = Instant::now();
        let result = self.place(asset_id, range, None).await;
        metrics::histogram!(RESERVE_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
        result
    }

    async fn block(
        &self,
        asset_id: AssetId,
        range: DateRange,
        kind: BlockKind,
    ) -> Result<AllocationInterval, LedgerError> {
        self.place(asset_id, range, Some(kind)).await
    }

    async fn commit(&self, interval_id: IntervalId, booking_id: BookingId) -> Result<(), LedgerError> {
        let mut guard = self.resolve_interval(interval_id).await?;
        let (status, current) = guard
            .get(interval_id)
            .map(|i| (i.status, i.booking_id))
            .ok_or(LedgerError::NotFound(interval_id))?;
        match status {
            IntervalStatus::Held => {}
            IntervalStatus::Booked if current == Some(booking_id) => return Ok(()),
            IntervalStatus::Booked
            | IntervalStatus::Available
            | IntervalStatus::Maintenance
            | IntervalStatus::Blocked => {
                return Err(LedgerError::InvalidState {
                    id: interval_id,
                    status,
                });
            }
        }
        let event = Event::IntervalCommitted {
            id: interval_id,
            asset_id: guard.asset_id,
            booking_id,
        };
        self.persist_and_apply(&mut guard, &event).await
    }

    async fn release(&self, interval_id: IntervalId) -> Result<(), LedgerError> {
        let mut guard = self.resolve_interval(interval_id).await?;
        let status = guard
            .get(interval_id)
            .map(|i| i.status)
            .ok_or(LedgerError::NotFound(interval_id))?;
        if status == IntervalStatus::Available {
            return Ok(());
        }
        let event = Event::IntervalReleased {
            id: interval_id,
            asset_id: guard.asset_id,
        };
        self.persist_and_apply(&mut guard, &event).await
    }

    async fn list_conflicts(
        &self,
        asset_id: AssetId,
        range: DateRange,
        exclude: Option<IntervalId>,
    ) -> Result<Vec<AllocationInterval>, LedgerError> {
        validate_range(&range)?;
        let Some(shared) = self.existing_asset(&asset_id) else {
            return Ok(Vec::new());
        };
        let guard = shared.lock().await;
        Ok(guard
            .overlapping(&range)
            .filter(|i| i.status.is_unavailable() && Some(i.id) != exclude)
            .cloned()
            .collect())
    }

    async fn interval(&self, interval_id: IntervalId) -> Option<AllocationInterval> {
        let guard = self.resolve_interval(interval_id).await.ok()?;
        guard.get(interval_id).cloned()
    }

    async fn snapshot(&self) -> Vec<AllocationInterval> {
        let assets: Vec<SharedAssetLedger> =
            self.assets.iter().map(|e| e.value().clone()).collect();
        let mut live = Vec::new();
        for shared in assets {
            let guard = shared.lock().await;
            live.extend(
                guard
                    .intervals
                    .iter()
                    .filter(|i| i.status.is_unavailable())
                    .cloned(),
            );
        }
        live
    }

    async fn prune_released(&self) -> usize {
        let assets: Vec<SharedAssetLedger> =
            self.assets.iter().map(|e| e.value().clone()).collect();
        let mut pruned = 0;
        for shared in assets {
            let mut guard = shared.lock().await;
            let before = guard.intervals.len();
            guard.intervals.retain(|i| {
                let keep = i.status != IntervalStatus::Available;
                if !keep {
                    self.interval_to_asset.remove(&i.id);
                }
                keep
            });
            pruned += before - guard.intervals.len();
        }
        if pruned > 0 {
            debug!("pruned {pruned} released intervals");
        }
        pruned
    }
}

mod error;
mod mutations;
mod queries;
mod transitions;

pub use error::BookingError;

use std::io;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use crate::clock::{Clock, SystemClock};
use crate::journal::Journal;
use crate::ledger::{Ledger, MemoryLedger};
use crate::lifecycle;
use crate::model::*;
use crate::notify::NotifyHub;
use crate::observability::BOOKINGS_TRACKED;
use crate::policy::RefundTable;

pub type SharedBooking = Arc<Mutex<Booking>>;

/// Knobs the coordinator needs besides storage.
pub struct EngineSettings {
    pub clock: Arc<dyn Clock>,
    pub refunds: RefundTable,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            clock: Arc::new(SystemClock),
            refunds: RefundTable::default(),
        }
    }
}

/// The reservation coordinator: owns the booking table and drives the ledger.
pub struct Engine {
    ledger: Arc<dyn Ledger>,
    pub(super) bookings: DashMap<BookingId, SharedBooking>,
    pub(super) by_requester: DashMap<PartyId, Vec<BookingId>>,
    pub(super) by_owner: DashMap<PartyId, Vec<BookingId>>,
    journal: Option<Journal>,
    pub notify: Arc<NotifyHub>,
    clock: Arc<dyn Clock>,
    refunds: RefundTable,
    /// Held shared by every mutation; compaction takes it exclusively so no
    /// append can land between the snapshot and the file swap.
    gate: RwLock<()>,
}

/// Apply a booking event (caller holds the booking's lock).
fn apply_to_booking(booking: &mut Booking, event: &Event) -> Result<(), BookingError> {
    match event {
        Event::BookingConfirmed { payment_id, at, .. } => {
            lifecycle::transition(booking, BookingStatus::Confirmed, *at)?;
            booking.payment_status = PaymentStatus::Completed;
            booking.payment_id = payment_id.clone();
        }
        Event::RentalStarted { at, .. } => {
            lifecycle::transition(booking, BookingStatus::Active, *at)?;
            booking.pickup_time = Some(*at);
        }
        Event::RentalCompleted { at, .. } => {
            lifecycle::transition(booking, BookingStatus::Completed, *at)?;
            booking.return_time = Some(*at);
        }
        Event::BookingCancelled {
            cancelled_by,
            reason,
            refund,
            payment_status,
            at,
            ..
        } => {
            lifecycle::transition(booking, BookingStatus::Cancelled, *at)?;
            booking.cancelled_by = *cancelled_by;
            booking.cancellation_reason = reason.clone();
            booking.refund = Some(*refund);
            booking.payment_status = *payment_status;
        }
        // Created is handled at the table level; interval events belong to the ledger.
        Event::BookingCreated { .. }
        | Event::IntervalHeld { .. }
        | Event::IntervalBlocked { .. }
        | Event::IntervalCommitted { .. }
        | Event::IntervalReleased { .. } => {}
    }
    Ok(())
}

fn booking_id_of(event: &Event) -> Option<BookingId> {
    match event {
        Event::BookingConfirmed { id, .. }
        | Event::RentalStarted { id, .. }
        | Event::RentalCompleted { id, .. }
        | Event::BookingCancelled { id, .. } => Some(*id),
        Event::BookingCreated { booking } => Some(booking.id),
        Event::IntervalHeld { .. }
        | Event::IntervalBlocked { .. }
        | Event::IntervalCommitted { .. }
        | Event::IntervalReleased { .. } => None,
    }
}

impl Engine {
    /// Coordinator over an arbitrary ledger, without a journal of its own.
    pub fn with_ledger(
        ledger: Arc<dyn Ledger>,
        notify: Arc<NotifyHub>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            ledger,
            bookings: DashMap::new(),
            by_requester: DashMap::new(),
            by_owner: DashMap::new(),
            journal: None,
            notify,
            clock: settings.clock,
            refunds: settings.refunds,
            gate: RwLock::new(()),
        }
    }

    /// Volatile engine over a `MemoryLedger`.
    pub fn in_memory(settings: EngineSettings) -> Self {
        let notify = Arc::new(NotifyHub::new());
        let ledger = MemoryLedger::new().with_notify(notify.clone());
        Self::with_ledger(Arc::new(ledger), notify, settings)
    }

    /// Durable engine: replay the journal at `path`, then keep appending to it.
    pub async fn open(path: &Path, settings: EngineSettings) -> io::Result<Self> {
        let (journal, events) = Journal::open(path)?;
        let notify = Arc::new(NotifyHub::new());
        let ledger = Arc::new(
            MemoryLedger::new()
                .with_journal(journal.clone())
                .with_notify(notify.clone()),
        );

        for event in &events {
            ledger.replay(event).await;
        }

        let mut engine = Self::with_ledger(ledger, notify, settings);
        engine.journal = Some(journal);
        for event in &events {
            engine.replay_booking_event(event).await;
        }
        engine.release_orphaned_holds().await;

        info!(
            "journal {} replayed: {} events, {} bookings",
            path.display(),
            events.len(),
            engine.bookings.len()
        );
        metrics::gauge!(BOOKINGS_TRACKED).set(engine.bookings.len() as f64);
        Ok(engine)
    }

    async fn replay_booking_event(&self, event: &Event) {
        if let Event::BookingCreated { booking } = event {
            self.insert_booking((**booking).clone());
            return;
        }
        let Some(id) = booking_id_of(event) else { return };
        let Some(shared) = self.booking_handle(&id) else {
            warn!("replay: {} for unknown booking {id}", event.kind());
            return;
        };
        let mut booking = shared.lock().await;
        if let Err(e) = apply_to_booking(&mut booking, event) {
            warn!("replay: skipping {} for booking {id}: {e}", event.kind());
        }
    }

    /// A crash between the hold and the booking record leaves a hold nobody
    /// owns. Give those dates back.
    async fn release_orphaned_holds(&self) {
        let mut owned = std::collections::HashSet::new();
        for shared in self.all_bookings() {
            let booking = shared.lock().await;
            if booking.status == BookingStatus::Pending {
                owned.insert(booking.interval_id);
            }
        }
        for interval in self.ledger.snapshot().await {
            if interval.status == IntervalStatus::Held && !owned.contains(&interval.id) {
                warn!(
                    "releasing orphaned hold {} on asset {}",
                    interval.id, interval.asset_id
                );
                if let Err(e) = self.ledger.release(interval.id).await {
                    warn!("could not release orphaned hold {}: {e}", interval.id);
                }
            }
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub(super) fn booking_handle(&self, id: &BookingId) -> Option<SharedBooking> {
        self.bookings.get(id).map(|e| e.value().clone())
    }

    pub(super) fn resolve_booking(&self, id: &BookingId) -> Result<SharedBooking, BookingError> {
        self.booking_handle(id).ok_or(BookingError::NotFound(*id))
    }

    pub(super) fn all_bookings(&self) -> Vec<SharedBooking> {
        self.bookings.iter().map(|e| e.value().clone()).collect()
    }

    pub(super) fn insert_booking(&self, booking: Booking) {
        self.by_requester
            .entry(booking.requester_id)
            .or_default()
            .push(booking.id);
        self.by_owner.entry(booking.owner_id).or_default().push(booking.id);
        self.bookings
            .insert(booking.id, Arc::new(Mutex::new(booking)));
    }

    pub(super) async fn journal_append(&self, event: &Event) -> Result<(), BookingError> {
        match &self.journal {
            Some(journal) => journal.append(event).await.map_err(BookingError::Journal),
            None => Ok(()),
        }
    }

    /// Journal-append + apply + notify for an existing booking. The caller
    /// holds the booking's lock and has already validated the move.
    pub(super) async fn persist_and_apply(
        &self,
        booking: &mut Booking,
        event: &Event,
    ) -> Result<(), BookingError> {
        self.journal_append(event).await?;
        apply_to_booking(booking, event)?;
        self.notify.send(booking.asset_id, event);
        Ok(())
    }

    pub async fn journal_appends_since_compact(&self) -> u64 {
        match &self.journal {
            Some(journal) => journal.appends_since_compact().await,
            None => 0,
        }
    }

    /// Drop released intervals from memory, then rewrite the journal with
    /// only the events needed to recreate the current state.
    pub async fn compact_journal(&self) -> Result<(), BookingError> {
        let _exclusive = self.gate.write().await;
        let pruned = self.ledger.prune_released().await;
        let Some(journal) = &self.journal else {
            return Ok(());
        };

        let mut events = Vec::new();
        for interval in self.ledger.snapshot().await {
            let AllocationInterval {
                id,
                asset_id,
                range,
                status,
                booking_id,
            } = interval;
            match status {
                IntervalStatus::Held => events.push(Event::IntervalHeld { id, asset_id, range }),
                IntervalStatus::Booked => {
                    events.push(Event::IntervalHeld { id, asset_id, range });
                    if let Some(booking_id) = booking_id {
                        events.push(Event::IntervalCommitted { id, asset_id, booking_id });
                    }
                }
                IntervalStatus::Maintenance => events.push(Event::IntervalBlocked {
                    id,
                    asset_id,
                    range,
                    kind: BlockKind::Maintenance,
                }),
                IntervalStatus::Blocked => events.push(Event::IntervalBlocked {
                    id,
                    asset_id,
                    range,
                    kind: BlockKind::Blocked,
                }),
                IntervalStatus::Available => {}
            }
        }
        let mut bookings = Vec::with_capacity(self.bookings.len());
        for shared in self.all_bookings() {
            bookings.push(shared.lock().await.clone());
        }
        bookings.sort_by_key(|b| (b.created_at, b.id));
        events.extend(bookings.into_iter().map(|booking| Event::BookingCreated {
            booking: Box::new(booking),
        }));

        let count = events.len();
        journal.compact(events).await.map_err(BookingError::Journal)?;
        info!("journal compacted to {count} events, {pruned} released intervals pruned");
        Ok(())
    }
}

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

pub type AssetId = Ulid;
pub type IntervalId = Ulid;
pub type BookingId = Ulid;
/// Opaque requester/owner identifier handed in by the identity layer.
pub type PartyId = Ulid;

/// Half-open range of calendar dates `[start, end)`.
///
/// A return date equal to another booking's pickup date does not overlap it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn is_valid(&self) -> bool {
        self.start < self.end
    }

    /// Whole days covered by the range.
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days()
    }

    pub fn overlaps(&self, other: &DateRange) -> bool {
        self.start < other.end && other.start < self.end
    }
}

impl std::fmt::Display for DateRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

// ── Ledger ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IntervalStatus {
    Available,
    /// Provisional reservation awaiting payment.
    Held,
    Booked,
    Maintenance,
    Blocked,
}

impl IntervalStatus {
    /// Whether an interval in this status makes its dates unavailable.
    pub fn is_unavailable(self) -> bool {
        match self {
            IntervalStatus::Available => false,
            IntervalStatus::Held
            | IntervalStatus::Booked
            | IntervalStatus::Maintenance
            | IntervalStatus::Blocked => true,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            IntervalStatus::Available => "available",
            IntervalStatus::Held => "held",
            IntervalStatus::Booked => "booked",
            IntervalStatus::Maintenance => "maintenance",
            IntervalStatus::Blocked => "blocked",
        }
    }
}

/// Why an owner took dates off the calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockKind {
    Maintenance,
    Blocked,
}

impl From<BlockKind> for IntervalStatus {
    fn from(kind: BlockKind) -> Self {
        match kind {
            BlockKind::Maintenance => IntervalStatus::Maintenance,
            BlockKind::Blocked => IntervalStatus::Blocked,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationInterval {
    pub id: IntervalId,
    pub asset_id: AssetId,
    pub range: DateRange,
    pub status: IntervalStatus,
    pub booking_id: Option<BookingId>,
}

/// Every interval of one asset, sorted by `range.start`.
#[derive(Debug, Clone)]
pub struct AssetLedger {
    pub asset_id: AssetId,
    pub intervals: Vec<AllocationInterval>,
}

impl AssetLedger {
    pub fn new(asset_id: AssetId) -> Self {
        Self {
            asset_id,
            intervals: Vec::new(),
        }
    }

    /// Insert interval maintaining sort order by range.start.
    pub fn insert_interval(&mut self, interval: AllocationInterval) {
        let pos = self
            .intervals
            .binary_search_by_key(&interval.range.start, |i| i.range.start)
            .unwrap_or_else(|e| e);
        self.intervals.insert(pos, interval);
    }

    pub fn get(&self, id: IntervalId) -> Option<&AllocationInterval> {
        self.intervals.iter().find(|i| i.id == id)
    }

    pub fn get_mut(&mut self, id: IntervalId) -> Option<&mut AllocationInterval> {
        self.intervals.iter_mut().find(|i| i.id == id)
    }

    pub fn live_count(&self) -> usize {
        self.intervals
            .iter()
            .filter(|i| i.status.is_unavailable())
            .count()
    }

    /// Return only intervals whose range overlaps the query window.
    /// Binary search skips everything starting at or after `query.end`.
    pub fn overlapping(&self, query: &DateRange) -> impl Iterator<Item = &AllocationInterval> {
        let right_bound = self
            .intervals
            .partition_point(|i| i.range.start < query.end);
        self.intervals[..right_bound]
            .iter()
            .filter(move |i| i.range.end > query.start)
    }
}

// ── Pricing & refunds ────────────────────────────────────────────

/// Rates of an asset, supplied by the caller with every request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateSchedule {
    pub daily_rate: Decimal,
    pub weekly_rate: Option<Decimal>,
    pub monthly_rate: Option<Decimal>,
    pub security_deposit: Decimal,
}

impl RateSchedule {
    pub fn daily(daily_rate: Decimal, security_deposit: Decimal) -> Self {
        Self {
            daily_rate,
            weekly_rate: None,
            monthly_rate: None,
            security_deposit,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingBreakdown {
    pub total_days: i64,
    pub subtotal: Decimal,
    pub service_fee: Decimal,
    pub total_amount: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundDecision {
    /// Share of the non-deposit amount returned, in `[0, 1]`.
    pub refund_fraction: Decimal,
    pub refund_amount: Decimal,
    pub deposit_released: Decimal,
}

impl RefundDecision {
    pub fn none(deposit_released: Decimal) -> Self {
        Self {
            refund_fraction: Decimal::ZERO,
            refund_amount: Decimal::ZERO,
            deposit_released,
        }
    }
}

// ── Bookings ─────────────────────────────────────────────────────

/// Everything the coordinator needs to place a booking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingRequest {
    pub asset_id: AssetId,
    pub requester_id: PartyId,
    pub owner_id: PartyId,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub rates: RateSchedule,
    pub policy: CancellationPolicy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Active,
    Completed,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Active => "active",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CancellationPolicy {
    Flexible,
    Moderate,
    Strict,
}

impl CancellationPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            CancellationPolicy::Flexible => "flexible",
            CancellationPolicy::Moderate => "moderate",
            CancellationPolicy::Strict => "strict",
        }
    }
}

impl std::str::FromStr for CancellationPolicy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "flexible" => Ok(CancellationPolicy::Flexible),
            "moderate" => Ok(CancellationPolicy::Moderate),
            "strict" => Ok(CancellationPolicy::Strict),
            _ => Err(()),
        }
    }
}

/// Payment state as reported by the payment subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Refunded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    /// Human-facing reference, e.g. `BK20261018X7KQ`.
    pub booking_number: String,
    pub asset_id: AssetId,
    pub interval_id: IntervalId,
    pub requester_id: PartyId,
    pub owner_id: PartyId,
    pub status: BookingStatus,
    pub range: DateRange,
    pub total_days: i64,
    pub daily_rate: Decimal,
    pub subtotal: Decimal,
    pub security_deposit: Decimal,
    pub service_fee: Decimal,
    pub total_amount: Decimal,
    pub cancellation_policy: CancellationPolicy,
    pub payment_status: PaymentStatus,
    /// Reference reported by the payment subsystem on confirmation.
    pub payment_id: Option<String>,
    /// When the asset was handed over.
    pub pickup_time: Option<DateTime<Utc>>,
    /// When the asset came back.
    pub return_time: Option<DateTime<Utc>>,
    pub cancelled_by: Option<PartyId>,
    pub cancellation_reason: Option<String>,
    pub refund: Option<RefundDecision>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    pub fn is_participant(&self, actor: PartyId) -> bool {
        self.requester_id == actor || self.owner_id == actor
    }
}

/// Build the booking reference from the creation date and the id's random tail.
pub fn booking_number(id: BookingId, created_at: DateTime<Utc>) -> String {
    let encoded = id.to_string();
    let tail = &encoded[encoded.len() - 4..];
    format!("BK{}{}", created_at.format("%Y%m%d"), tail)
}

// ── Events ───────────────────────────────────────────────────────

/// Flat event types. This is the journal record format and
/// the lifecycle fact published to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    IntervalHeld {
        id: IntervalId,
        asset_id: AssetId,
        range: DateRange,
    },
    IntervalBlocked {
        id: IntervalId,
        asset_id: AssetId,
        range: DateRange,
        kind: BlockKind,
    },
    IntervalCommitted {
        id: IntervalId,
        asset_id: AssetId,
        booking_id: BookingId,
    },
    IntervalReleased {
        id: IntervalId,
        asset_id: AssetId,
    },
    BookingCreated {
        booking: Box<Booking>,
    },
    BookingConfirmed {
        id: BookingId,
        asset_id: AssetId,
        payment_id: Option<String>,
        at: DateTime<Utc>,
    },
    RentalStarted {
        id: BookingId,
        asset_id: AssetId,
        at: DateTime<Utc>,
    },
    RentalCompleted {
        id: BookingId,
        asset_id: AssetId,
        at: DateTime<Utc>,
    },
    BookingCancelled {
        id: BookingId,
        asset_id: AssetId,
        cancelled_by: Option<PartyId>,
        reason: Option<String>,
        refund: RefundDecision,
        payment_status: PaymentStatus,
        at: DateTime<Utc>,
    },
}

impl Event {
    pub fn asset_id(&self) -> AssetId {
        match self {
            Event::IntervalHeld { asset_id, .. }
            | Event::IntervalBlocked { asset_id, .. }
            | Event::IntervalCommitted { asset_id, .. }
            | Event::IntervalReleased { asset_id, .. }
            | Event::BookingConfirmed { asset_id, .. }
            | Event::RentalStarted { asset_id, .. }
            | Event::RentalCompleted { asset_id, .. }
            | Event::BookingCancelled { asset_id, .. } => *asset_id,
            Event::BookingCreated { booking } => booking.asset_id,
        }
    }

    pub fn is_ledger_event(&self) -> bool {
        matches!(
            self,
            Event::IntervalHeld { .. }
                | Event::IntervalBlocked { .. }
                | Event::IntervalCommitted { .. }
                | Event::IntervalReleased { .. }
        )
    }

    /// Short name used for metrics labels and notification channels.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::IntervalHeld { .. } => "interval_held",
            Event::IntervalBlocked { .. } => "interval_blocked",
            Event::IntervalCommitted { .. } => "interval_committed",
            Event::IntervalReleased { .. } => "interval_released",
            Event::BookingCreated { .. } => "booking_created",
            Event::BookingConfirmed { .. } => "booking_confirmed",
            Event::RentalStarted { .. } => "rental_started",
            Event::RentalCompleted { .. } => "rental_completed",
            Event::BookingCancelled { .. } => "booking_cancelled",
        }
    }

    /// JSON payload handed to notification delivery.
    pub fn payload(&self) -> String {
        serde_json::json!({
            "event": self.kind(),
            "asset_id": self.asset_id().to_string(),
            "data": self,
        })
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2030, 1, day).unwrap()
    }

    fn interval(start: u32, end: u32, status: IntervalStatus) -> AllocationInterval {
        AllocationInterval {
            id: Ulid::new(),
            asset_id: Ulid::nil(),
            range: DateRange::new(d(start), d(end)),
            status,
            booking_id: None,
        }
    }

    #[test]
    fn range_basics() {
        let r = DateRange::new(d(10), d(13));
        assert_eq!(r.days(), 3);
        assert!(r.is_valid());
        assert!(!DateRange::new(d(5), d(5)).is_valid());
    }

    #[test]
    fn range_overlap_is_half_open() {
        let a = DateRange::new(d(1), d(5));
        let b = DateRange::new(d(4), d(8));
        let c = DateRange::new(d(5), d(9));
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
        assert!(!a.overlaps(&c)); // return day == next pickup day
    }

    #[test]
    fn status_availability() {
        assert!(!IntervalStatus::Available.is_unavailable());
        assert!(IntervalStatus::Held.is_unavailable());
        assert!(IntervalStatus::Booked.is_unavailable());
        assert!(IntervalStatus::Maintenance.is_unavailable());
        assert!(IntervalStatus::Blocked.is_unavailable());
    }

    #[test]
    fn intervals_stay_sorted() {
        let mut ledger = AssetLedger::new(Ulid::nil());
        ledger.insert_interval(interval(20, 22, IntervalStatus::Booked));
        ledger.insert_interval(interval(1, 3, IntervalStatus::Held));
        ledger.insert_interval(interval(10, 12, IntervalStatus::Blocked));
        let starts: Vec<_> = ledger.intervals.iter().map(|i| i.range.start).collect();
        assert_eq!(starts, vec![d(1), d(10), d(20)]);
    }

    #[test]
    fn overlapping_skips_disjoint() {
        let mut ledger = AssetLedger::new(Ulid::nil());
        ledger.insert_interval(interval(1, 3, IntervalStatus::Booked));
        ledger.insert_interval(interval(5, 9, IntervalStatus::Held));
        ledger.insert_interval(interval(20, 25, IntervalStatus::Booked));

        let hits: Vec<_> = ledger.overlapping(&DateRange::new(d(3), d(6))).collect();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].range, DateRange::new(d(5), d(9)));
    }

    #[test]
    fn overlapping_spanning_interval() {
        let mut ledger = AssetLedger::new(Ulid::nil());
        ledger.insert_interval(interval(1, 28, IntervalStatus::Maintenance));
        let hits: Vec<_> = ledger.overlapping(&DateRange::new(d(10), d(11))).collect();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn live_count_ignores_available() {
        let mut ledger = AssetLedger::new(Ulid::nil());
        ledger.insert_interval(interval(1, 3, IntervalStatus::Available));
        ledger.insert_interval(interval(5, 9, IntervalStatus::Held));
        assert_eq!(ledger.live_count(), 1);
    }

    #[test]
    fn booking_number_format() {
        let id = Ulid::new();
        let at = DateTime::parse_from_rfc3339("2026-10-18T09:30:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let number = booking_number(id, at);
        assert!(number.starts_with("BK20261018"));
        assert_eq!(number.len(), 14);
        assert!(id.to_string().ends_with(&number[10..]));
    }

    #[test]
    fn policy_parses() {
        assert_eq!("strict".parse(), Ok(CancellationPolicy::Strict));
        assert!("lenient".parse::<CancellationPolicy>().is_err());
    }

    #[test]
    fn event_payload_is_json() {
        let asset_id = Ulid::new();
        let event = Event::IntervalReleased {
            id: Ulid::new(),
            asset_id,
        };
        let value: serde_json::Value = serde_json::from_str(&event.payload()).unwrap();
        assert_eq!(value["event"], "interval_released");
        assert_eq!(value["asset_id"], asset_id.to_string());
    }

    #[test]
    fn event_bincode_roundtrip() {
        let event = Event::IntervalHeld {
            id: Ulid::new(),
            asset_id: Ulid::new(),
            range: DateRange::new(d(3), d(4)),
        };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
    }
}

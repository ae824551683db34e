//! Hard limits that keep a single caller from exhausting memory or the journal.

/// Maximum unavailable (held/booked/blocked) intervals tracked per asset.
pub const MAX_LIVE_INTERVALS_PER_ASSET: usize = 10_000;

/// Longest bookable or blockable range.
pub const MAX_RANGE_DAYS: i64 = 366;

/// How far ahead a booking may start.
pub const MAX_ADVANCE_DAYS: i64 = 730;

/// Maximum length of a cancellation reason, in bytes.
pub const MAX_REASON_LEN: usize = 1024;

/// Upper bound for one page of booking listings.
pub const MAX_PAGE_SIZE: usize = 500;

/// Widest window a calendar query may cover.
pub const MAX_CALENDAR_WINDOW_DAYS: i64 = 3 * 366;

/// Largest accepted daily rate or security deposit.
pub const MAX_RATE: u64 = 1_000_000_000;

/// Maximum length of a payment reference, in bytes.
pub const MAX_PAYMENT_ID_LEN: usize = 128;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::model::{CancellationPolicy, RefundDecision};
use crate::pricing::round_money;

const SECONDS_PER_DAY: i64 = 86_400;

/// Refund fractions for one policy tier, by notice given.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundTier {
    /// Fraction refunded with at least `long_notice_days` of notice.
    pub long_notice: Decimal,
    /// Fraction refunded with at least `short_notice_days` of notice.
    pub short_notice: Decimal,
    /// Fraction refunded inside `short_notice_days`.
    pub late: Decimal,
}

/// Breakpoints and percentages of the cancellation policies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundTable {
    pub long_notice_days: i64,
    pub short_notice_days: i64,
    pub flexible: RefundTier,
    pub moderate: RefundTier,
    pub strict: RefundTier,
}

impl Default for RefundTable {
    fn default() -> Self {
        let full = Decimal::ONE;
        let half = Decimal::new(5, 1);
        let none = Decimal::ZERO;
        Self {
            long_notice_days: 7,
            short_notice_days: 3,
            flexible: RefundTier { long_notice: full, short_notice: full, late: half },
            moderate: RefundTier { long_notice: full, short_notice: half, late: none },
            strict: RefundTier { long_notice: half, short_notice: none, late: none },
        }
    }
}

impl RefundTable {
    pub fn tier(&self, policy: CancellationPolicy) -> &RefundTier {
        match policy {
            CancellationPolicy::Flexible => &self.flexible,
            CancellationPolicy::Moderate => &self.moderate,
            CancellationPolicy::Strict => &self.strict,
        }
    }

    pub fn fraction(&self, policy: CancellationPolicy, days_before: i64) -> Decimal {
        let tier = self.tier(policy);
        if days_before >= self.long_notice_days {
            tier.long_notice
        } else if days_before >= self.short_notice_days {
            tier.short_notice
        } else {
            tier.late
        }
    }

    /// Breakpoints must be ordered and every fraction must lie in `[0, 1]`.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.short_notice_days < 0 || self.long_notice_days < self.short_notice_days {
            return Err("refund breakpoints out of order");
        }
        let in_range = |f: Decimal| (Decimal::ZERO..=Decimal::ONE).contains(&f);
        for tier in [&self.flexible, &self.moderate, &self.strict] {
            if !(in_range(tier.long_notice) && in_range(tier.short_notice) && in_range(tier.late)) {
                return Err("refund fraction outside [0, 1]");
            }
        }
        Ok(())
    }
}

/// Whole days of notice, floored. Cancelling after the start date is negative.
pub fn days_before(booking_start: NaiveDate, cancelled_at: DateTime<Utc>) -> i64 {
    let start = booking_start.and_time(chrono::NaiveTime::MIN).and_utc();
    (start - cancelled_at).num_seconds().div_euclid(SECONDS_PER_DAY)
}

/// Decide what a cancellation returns. The security deposit is released in
/// full and never scaled by the policy.
pub fn compute_refund(
    table: &RefundTable,
    policy: CancellationPolicy,
    booking_start: NaiveDate,
    cancelled_at: DateTime<Utc>,
    amount_paid: Decimal,
    security_deposit: Decimal,
) -> RefundDecision {
    let fraction = table.fraction(policy, days_before(booking_start, cancelled_at));
    let refundable = (amount_paid - security_deposit).max(Decimal::ZERO);
    RefundDecision {
        refund_fraction: fraction,
        refund_amount: round_money(fraction * refundable),
        deposit_released: security_deposit,
    }
}

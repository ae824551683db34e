use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::limits::MAX_RATE;
use crate::model::{PricingBreakdown, RateSchedule};

/// Service fee charged on top of the rental subtotal: 10 %.
pub const SERVICE_FEE_RATE: Decimal = Decimal::from_parts(10, 0, 0, false, 2);

/// Decimal places kept on the final amount.
pub const MONEY_SCALE: u32 = 2;

/// Price a rental of `[start, end)`.
///
/// A same-day range still costs one day. Intermediate values keep full
/// precision; only `total_amount` is rounded. Fails instead of panicking
/// when an amount leaves the `Decimal` range.
pub fn compute(
    start: NaiveDate,
    end: NaiveDate,
    daily_rate: Decimal,
    security_deposit: Decimal,
) -> Result<PricingBreakdown, &'static str> {
    const OVERFLOW: &str = "price overflows";
    let total_days = (end - start).num_days().max(1);
    let subtotal = Decimal::from(total_days)
        .checked_mul(daily_rate)
        .ok_or(OVERFLOW)?;
    let service_fee = subtotal.checked_mul(SERVICE_FEE_RATE).ok_or(OVERFLOW)?;
    let total_amount = subtotal
        .checked_add(service_fee)
        .and_then(|sum| sum.checked_add(security_deposit))
        .ok_or(OVERFLOW)?;
    Ok(PricingBreakdown {
        total_days,
        subtotal,
        service_fee,
        total_amount: round_money(total_amount),
    })
}

pub(crate) fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Reject rate schedules the calculator cannot price.
pub fn validate_rates(rates: &RateSchedule) -> Result<(), &'static str> {
    let max = Decimal::from(MAX_RATE);
    if rates.daily_rate <= Decimal::ZERO {
        return Err("daily rate must be positive");
    }
    if rates.daily_rate > max {
        return Err("daily rate too large");
    }
    if rates.security_deposit < Decimal::ZERO {
        return Err("security deposit must not be negative");
    }
    if rates.security_deposit > max {
        return Err("security deposit too large");
    }
    if rates.weekly_rate.is_some_and(|r| r <= Decimal::ZERO) {
        return Err("weekly rate must be positive");
    }
    if rates.monthly_rate.is_some_and(|r| r <= Decimal::ZERO) {
        return Err("monthly rate must be positive");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2030, 3, day).unwrap()
    }

    #[test]
    fn three_day_rental() {
        let p = compute(d(1), d(4), dec!(100), dec!(50)).unwrap();
        assert_eq!(p.total_days, 3);
        assert_eq!(p.subtotal, dec!(300));
        assert_eq!(p.service_fee, dec!(30));
        assert_eq!(p.total_amount, dec!(380));
    }

    #[test]
    fn same_day_costs_one_day() {
        let p = compute(d(7), d(7), dec!(45), dec!(0)).unwrap();
        assert_eq!(p.total_days, 1);
        assert_eq!(p.subtotal, dec!(45));
        assert_eq!(p.total_amount, dec!(49.5));
    }

    #[test]
    fn invariant_total_is_sum_of_parts() {
        let p = compute(d(1), d(11), dec!(19.99), dec!(75)).unwrap();
        assert_eq!(p.total_amount, p.subtotal + p.service_fee + dec!(75));
    }

    #[test]
    fn rounding_happens_once_on_total() {
        // 3 × 33.335 = 100.005; fee 10.0005; total 110.0055 → 110.01
        let p = compute(d(1), d(4), dec!(33.335), dec!(0)).unwrap();
        assert_eq!(p.subtotal, dec!(100.005));
        assert_eq!(p.service_fee, dec!(10.0005));
        assert_eq!(p.total_amount, dec!(110.01));
    }

    #[test]
    fn crosses_month_boundary() {
        let start = NaiveDate::from_ymd_opt(2030, 1, 30).unwrap();
        let end = NaiveDate::from_ymd_opt(2030, 2, 2).unwrap();
        assert_eq!(compute(start, end, dec!(10), dec!(0)).unwrap().total_days, 3);
    }

    #[test]
    fn rate_validation() {
        assert!(validate_rates(&RateSchedule::daily(dec!(50), dec!(20))).is_ok());
        assert!(validate_rates(&RateSchedule::daily(dec!(0), dec!(20))).is_err());
        assert!(validate_rates(&RateSchedule::daily(dec!(-1), dec!(20))).is_err());
        assert!(validate_rates(&RateSchedule::daily(dec!(50), dec!(-5))).is_err());

        let mut weekly = RateSchedule::daily(dec!(50), dec!(0));
        weekly.weekly_rate = Some(dec!(0));
        assert_eq!(validate_rates(&weekly), Err("weekly rate must be positive"));

        let huge = Decimal::from(MAX_RATE) + dec!(0.01);
        assert_eq!(
            validate_rates(&RateSchedule::daily(huge, dec!(0))),
            Err("daily rate too large")
        );
        assert_eq!(
            validate_rates(&RateSchedule::daily(dec!(50), huge)),
            Err("security deposit too large")
        );
        let ceiling = Decimal::from(MAX_RATE);
        assert!(validate_rates(&RateSchedule::daily(ceiling, ceiling)).is_ok());
    }

    #[test]
    fn overflow_is_an_error() {
        assert_eq!(
            compute(d(1), d(3), Decimal::MAX, dec!(0)),
            Err("price overflows")
        );
        // Subtotal fits, the fee pushes the total past the range.
        assert!(compute(d(1), d(2), Decimal::MAX, dec!(0)).is_err());
        assert!(compute(d(1), d(2), dec!(1), Decimal::MAX).is_err());
    }

    #[test]
    fn largest_accepted_rate_prices_a_long_rental() {
        let ceiling = Decimal::from(MAX_RATE);
        let p = compute(d(1), d(1) + chrono::Days::new(366), ceiling, ceiling).unwrap();
        assert_eq!(p.total_days, 366);
        assert_eq!(p.total_amount, dec!(403600000000));
    }
}

//! Zero-safe derived-ratio math.
//!
//! Every derived metric (CPL, CAC, ROAS, ticket médio, conversion rate) uses
//! the same policy: a zero denominator yields `None` ("no data"), never a
//! division error or an infinity, and `None` propagates into aggregates as
//! SQL NULL.

use rust_decimal::Decimal;

/// `amount / count`, rounded to 2 decimal places; `None` when `count <= 0`.
#[must_use]
pub fn per_count(amount: Decimal, count: i64) -> Option<Decimal> {
    if count <= 0 {
        return None;
    }
    amount
        .checked_div(Decimal::from(count))
        .map(|d| d.round_dp(2))
}

/// `numerator / denominator` rounded to 4 decimal places; `None` when the
/// denominator is zero.
#[must_use]
pub fn fraction(numerator: Decimal, denominator: Decimal) -> Option<Decimal> {
    if denominator.is_zero() {
        return None;
    }
    numerator.checked_div(denominator).map(|d| d.round_dp(4))
}

/// Conversion rate as a fraction of counts; `None` when `total <= 0`.
#[must_use]
pub fn rate(part: i64, total: i64) -> Option<Decimal> {
    if total <= 0 {
        return None;
    }
    fraction(Decimal::from(part), Decimal::from(total))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_count_divides_and_rounds() {
        // 100 / 3 = 33.33 after rounding to cents.
        assert_eq!(
            per_count(Decimal::from(100), 3),
            Some(Decimal::new(3333, 2))
        );
    }

    #[test]
    fn per_count_is_none_on_zero_count() {
        assert_eq!(per_count(Decimal::from(500), 0), None);
        assert_eq!(per_count(Decimal::from(500), -2), None);
    }

    #[test]
    fn fraction_is_none_on_zero_denominator() {
        assert_eq!(fraction(Decimal::from(10), Decimal::ZERO), None);
        assert_eq!(
            fraction(Decimal::from(9), Decimal::from(2)),
            Some(Decimal::new(45, 1))
        );
    }

    #[test]
    fn rate_handles_zero_total() {
        assert_eq!(rate(5, 0), None);
        assert_eq!(rate(1, 4), Some(Decimal::new(25, 2)));
    }
}

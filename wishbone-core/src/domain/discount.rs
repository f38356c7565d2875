//! Percentage discount from base/final price pairs.

use serde::{Deserialize, Serialize};

/// What to do with a negative discount (a price increase).
///
/// `Signed` stores the negative value as-is; `ClampNonNegative` floors it at
/// zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DiscountPolicy {
    #[default]
    Signed,
    ClampNonNegative,
}

impl DiscountPolicy {
    pub fn apply(self, percent: i64) -> i64 {
        match self {
            DiscountPolicy::Signed => percent,
            DiscountPolicy::ClampNonNegative => percent.max(0),
        }
    }
}

/// Percentage discount of `final_price` against `base`, rounded to the
/// nearest integer.
///
/// `None` when the base price is missing or non-positive (unknown, not
/// zero), or when the final price is missing. A final price above base
/// yields a negative percentage; that is accepted input, not an error.
pub fn discount_percent(base: Option<i64>, final_price: Option<i64>) -> Option<i64> {
    let base = base.filter(|b| *b > 0)?;
    let final_price = final_price?;
    let ratio = final_price as f64 / base as f64;
    Some(((1.0 - ratio) * 100.0).round() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn halves_base_price() {
        assert_eq!(discount_percent(Some(1000), Some(500)), Some(50));
    }

    #[test]
    fn full_price_is_zero_discount() {
        assert_eq!(discount_percent(Some(4299), Some(4299)), Some(0));
    }

    #[test]
    fn rounds_to_nearest_integer() {
        // 1 - 666/1000 = 0.334 -> 33
        assert_eq!(discount_percent(Some(1000), Some(666)), Some(33));
        // 1 - 665/1000 = 0.335 -> 34 (rounds away from zero)
        assert_eq!(discount_percent(Some(1000), Some(665)), Some(34));
    }

    #[test]
    fn zero_or_negative_base_is_unknown() {
        assert_eq!(discount_percent(Some(0), Some(500)), None);
        assert_eq!(discount_percent(Some(-100), Some(500)), None);
    }

    #[test]
    fn missing_inputs_are_unknown() {
        assert_eq!(discount_percent(None, Some(500)), None);
        assert_eq!(discount_percent(Some(1000), None), None);
    }

    #[test]
    fn price_increase_goes_negative() {
        assert_eq!(discount_percent(Some(1000), Some(1500)), Some(-50));
    }

    #[test]
    fn clamp_policy_floors_at_zero() {
        let pct = discount_percent(Some(1000), Some(1500)).unwrap();
        assert_eq!(DiscountPolicy::Signed.apply(pct), -50);
        assert_eq!(DiscountPolicy::ClampNonNegative.apply(pct), 0);
        assert_eq!(DiscountPolicy::ClampNonNegative.apply(50), 50);
    }
}

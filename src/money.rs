//! Integer minor-unit money arithmetic.
//!
//! All pricing math runs on `i64` minor units (paise/cents) to avoid
//! floating-point drift; `rust_decimal` appears only at the API and storage
//! boundaries. Rounding is half-up and happens once, at the final step of a
//! calculation.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

/// Minor units per major currency unit.
pub const MINOR_PER_MAJOR: i64 = 100;

/// Converts a decimal amount (major units) to integer minor units, rounding
/// half-up to two decimal places first.
pub fn to_minor(amount: Decimal) -> i64 {
    let cents = (amount * Decimal::from(MINOR_PER_MAJOR))
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    cents.to_i64().unwrap_or(0)
}

/// Converts integer minor units back to a two-decimal amount.
pub fn from_minor(minor: i64) -> Decimal {
    Decimal::new(minor, 2)
}

/// Divides `numerator / denominator` rounding half-up. Both operands are
/// expected non-negative; checkout amounts never go negative.
pub fn div_round_half_up(numerator: i128, denominator: i128) -> i64 {
    debug_assert!(denominator > 0);
    ((numerator + denominator / 2) / denominator) as i64
}

/// Percentage of an amount in minor units, rounded half-up.
/// `percent` is expressed in hundredths (e.g. 1000 = 10.00%).
pub fn percent_of(amount_minor: i64, percent_hundredths: i64) -> i64 {
    div_round_half_up(amount_minor as i128 * percent_hundredths as i128, 10_000)
}

/// Converts a fractional rate (e.g. 0.18) to basis points (1800).
pub fn rate_to_basis_points(rate: Decimal) -> i64 {
    (rate * Decimal::from(10_000))
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .unwrap_or(0)
}

/// Applies a rate given in basis points to an amount in minor units.
pub fn apply_basis_points(amount_minor: i64, basis_points: i64) -> i64 {
    div_round_half_up(amount_minor as i128 * basis_points as i128, 10_000)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn to_minor_round_trips_two_decimals() {
        assert_eq!(to_minor(dec!(1000.00)), 100_000);
        assert_eq!(to_minor(dec!(99.99)), 9_999);
        assert_eq!(from_minor(228_200), dec!(2282.00));
    }

    #[test]
    fn to_minor_rounds_half_up() {
        assert_eq!(to_minor(dec!(0.005)), 1);
        assert_eq!(to_minor(dec!(0.004)), 0);
    }

    #[test]
    fn div_rounds_half_up() {
        assert_eq!(div_round_half_up(5, 10), 1);
        assert_eq!(div_round_half_up(4, 10), 0);
        assert_eq!(div_round_half_up(15, 10), 2);
    }

    #[test]
    fn percent_of_exact_and_rounded() {
        // 10% of 2000.00
        assert_eq!(percent_of(200_000, 1_000), 20_000);
        // 18% of 1850.00 -> 333.00
        assert_eq!(percent_of(185_000, 1_800), 33_300);
        // 12.5% of 0.03 -> 0.00375 -> rounds to 0.00
        assert_eq!(percent_of(3, 1_250), 0);
    }

    #[test]
    fn rate_conversion() {
        assert_eq!(rate_to_basis_points(dec!(0.18)), 1_800);
        assert_eq!(apply_basis_points(185_000, 1_800), 33_300);
    }
}

//! Type-safe money representation using decimal arithmetic.

use core::fmt;
use core::iter::Sum;
use core::ops::{Add, AddAssign};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A monetary amount in the marketplace's settlement currency.
///
/// Backed by [`Decimal`] so that cart totals and order amounts never
/// accumulate float error. The amount is in the currency's standard unit
/// (e.g. dollars, not cents).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    /// Zero amount.
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Create a money value from a decimal amount.
    #[must_use]
    pub const fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    /// Create a money value from a count of minor units (e.g. cents).
    #[must_use]
    pub fn from_cents(cents: i64) -> Self {
        Self(Decimal::new(cents, 2))
    }

    /// Get the underlying decimal amount.
    #[must_use]
    pub const fn amount(&self) -> Decimal {
        self.0
    }

    /// Multiply by a line quantity.
    #[must_use]
    pub fn times(self, quantity: u32) -> Self {
        Self(self.0 * Decimal::from(quantity))
    }
}

impl From<Decimal> for Money {
    fn from(amount: Decimal) -> Self {
        Self(amount)
    }
}

impl From<Money> for Decimal {
    fn from(money: Money) -> Self {
        money.0
    }
}

impl Add for Money {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_from_cents() {
        let money = Money::from_cents(1050);
        assert_eq!(money.amount(), Decimal::new(1050, 2));
    }

    #[test]
    fn test_add() {
        let a = Money::from_cents(1000);
        let b = Money::from_cents(550);
        assert_eq!(a + b, Money::from_cents(1550));
    }

    #[test]
    fn test_add_assign() {
        let mut total = Money::ZERO;
        total += Money::from_cents(250);
        total += Money::from_cents(250);
        assert_eq!(total, Money::from_cents(500));
    }

    #[test]
    fn test_times() {
        let unit = Money::from_cents(1050);
        assert_eq!(unit.times(3), Money::from_cents(3150));
    }

    #[test]
    fn test_times_zero() {
        assert_eq!(Money::from_cents(1050).times(0), Money::ZERO);
    }

    #[test]
    fn test_sum() {
        let total: Money = [
            Money::from_cents(100),
            Money::from_cents(200),
            Money::from_cents(300),
        ]
        .into_iter()
        .sum();
        assert_eq!(total, Money::from_cents(600));
    }

    #[test]
    fn test_sum_empty() {
        let total: Money = core::iter::empty().sum();
        assert_eq!(total, Money::ZERO);
    }

    #[test]
    fn test_display_two_decimal_places() {
        assert_eq!(Money::from_cents(1050).to_string(), "10.50");
        assert_eq!(Money::new(Decimal::from(7)).to_string(), "7.00");
    }

    #[test]
    fn test_serde_roundtrip() {
        let money = Money::from_cents(1999);
        let json = serde_json::to_string(&money).unwrap();
        assert_eq!(json, "\"19.99\"");

        let parsed: Money = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, money);
    }

    #[test]
    fn test_deserialize_from_number() {
        // Backend numeric columns arrive as JSON numbers.
        let parsed: Money = serde_json::from_str("19.99").unwrap();
        assert_eq!(parsed, Money::from_cents(1999));
    }

    #[test]
    fn test_default_is_zero() {
        assert_eq!(Money::default(), Money::ZERO);
    }
}

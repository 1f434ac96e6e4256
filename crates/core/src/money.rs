use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub};

/// A dollar amount held as a cent-rounded decimal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Money(Decimal);

impl Money {
    pub fn from_cents(cents: i64) -> Self {
        Money(Decimal::new(cents, 2))
    }

    /// Saturates at the `i64` bounds; plant-scale values never get close.
    pub fn to_cents(self) -> i64 {
        let cents = (self.0 * Decimal::ONE_HUNDRED).round();
        cents.to_i64().unwrap_or(if cents.is_sign_negative() { i64::MIN } else { i64::MAX })
    }

    pub fn from_decimal(decimal: Decimal) -> Self {
        Money(decimal.round_dp(2))
    }

    pub fn zero() -> Self {
        Money(Decimal::ZERO)
    }

    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }

    pub fn abs(self) -> Self {
        Money(self.0.abs())
    }

    pub fn as_decimal(self) -> Decimal {
        self.0
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let plain = format!("{:.2}", self.0.abs());
        let (whole, frac) = plain.split_once('.').unwrap_or((plain.as_str(), "00"));

        let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
        for (i, ch) in whole.chars().enumerate() {
            if i > 0 && (whole.len() - i) % 3 == 0 {
                grouped.push(',');
            }
            grouped.push(ch);
        }

        let sign = if self.0.is_sign_negative() && !self.0.is_zero() { "-" } else { "" };
        f.pad(&format!("{sign}${grouped}.{frac}"))
    }
}

impl Add for Money {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Money(self.0 + rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl Sub for Money {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Money(self.0 - rhs.0)
    }
}

impl Neg for Money {
    type Output = Self;
    fn neg(self) -> Self {
        Money(-self.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Money::zero(), |a, b| a + b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn display_groups_thousands() {
        assert_eq!(Money::from_decimal(dec!(42768.63)).to_string(), "$42,768.63");
        assert_eq!(Money::from_decimal(dec!(1234567)).to_string(), "$1,234,567.00");
        assert_eq!(Money::from_decimal(dec!(999.5)).to_string(), "$999.50");
    }

    #[test]
    fn display_negative_and_zero() {
        assert_eq!(Money::from_decimal(dec!(-1500.25)).to_string(), "-$1,500.25");
        assert_eq!(Money::zero().to_string(), "$0.00");
    }

    #[test]
    fn subtraction_is_exact() {
        let detail = Money::from_decimal(dec!(72378.63));
        let master = Money::from_decimal(dec!(29610));
        assert_eq!(detail - master, Money::from_decimal(dec!(42768.63)));
    }

    #[test]
    fn cents_round_trip() {
        assert_eq!(Money::from_cents(25000).to_cents(), 25000);
        assert_eq!(Money::from_cents(-1).to_string(), "-$0.01");
    }

    #[test]
    fn sum_and_abs() {
        let total: Money = [Money::from_cents(500), Money::from_cents(-200)].into_iter().sum();
        assert_eq!(total, Money::from_cents(300));
        assert_eq!(Money::from_cents(-300).abs(), Money::from_cents(300));
    }
}

//! Fixed-precision decimal arithmetic for balances and rewards. Balances
//! never use binary floating point, since repeated proportional splits
//! would otherwise drift.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Div, Mul, Sub};
use std::str::FromStr;

/// Number of fractional digits carried by every [`Money`] value.
pub const SCALE: u32 = 18;

/// A non-negative-by-convention (callers enforce where required) decimal
/// amount, scaled to [`SCALE`] fractional digits on every construction and
/// arithmetic result. Wraps [`rust_decimal::Decimal`] rather than a binary
/// float so that repeated proportional splits never drift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    pub fn new(value: Decimal) -> Self {
        Money(rescale(value))
    }

    pub fn from_i64(whole: i64) -> Self {
        Money(rescale(Decimal::from(whole)))
    }

    pub fn inner(self) -> Decimal {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }

    pub fn is_negative(self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    /// Divides `self` by `count`, rounding toward negative infinity at
    /// [`SCALE`] fractional digits.
    pub fn div_floor(self, count: u64) -> Money {
        if count == 0 {
            return Money::ZERO;
        }
        let divided = self.0 / Decimal::from(count);
        Money(divided.round_dp_with_strategy(SCALE, RoundingStrategy::ToNegativeInfinity))
    }

    /// Proportional share `self * numerator / denominator`, with an
    /// intermediate rational step so `numerator / denominator` is never
    /// truncated before multiplying.
    pub fn proportional(self, numerator: Decimal, denominator: Decimal) -> Money {
        if denominator.is_zero() {
            return Money::ZERO;
        }
        let ratio = numerator / denominator;
        Money(rescale(self.0 * ratio))
    }
}

fn rescale(d: Decimal) -> Decimal {
    d.round_dp_with_strategy(SCALE, RoundingStrategy::ToNegativeInfinity)
}

impl Add for Money {
    type Output = Money;
    fn add(self, rhs: Self) -> Self::Output {
        Money(rescale(self.0 + rhs.0))
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 = rescale(self.0 + rhs.0);
    }
}

impl Sub for Money {
    type Output = Money;
    fn sub(self, rhs: Self) -> Self::Output {
        Money(rescale(self.0 - rhs.0))
    }
}

impl Mul<Decimal> for Money {
    type Output = Money;
    fn mul(self, rhs: Decimal) -> Self::Output {
        Money(rescale(self.0 * rhs))
    }
}

impl Div<Decimal> for Money {
    type Output = Money;
    fn div(self, rhs: Decimal) -> Self::Output {
        Money(rescale(self.0 / rhs))
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::ZERO, |acc, m| acc + m)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Money {
    type Err = rust_decimal::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Decimal::from_str(s).map(Money::new)
    }
}

impl From<Decimal> for Money {
    fn from(d: Decimal) -> Self {
        Money::new(d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn div_floor_never_rounds_up() {
        let m = Money::from_i64(10);
        let share = m.div_floor(3);
        // 10/3 = 3.333...; flooring at 18 dp must not creep past the true value.
        assert!(share.inner() * Decimal::from(3) <= m.inner());
    }

    #[test]
    fn proportional_split_is_exact_for_equal_shares() {
        let pool = Money::from_i64(24);
        let a = pool.proportional(Decimal::from(100), Decimal::from(400));
        let b = pool.proportional(Decimal::from(300), Decimal::from(400));
        assert_eq!(a, Money::from_i64(6));
        assert_eq!(b, Money::from_i64(18));
    }

    #[test]
    fn addition_keeps_scale() {
        let a = Money::new(Decimal::new(1, 1)); // 0.1
        let b = Money::new(Decimal::new(2, 1)); // 0.2
        assert_eq!((a + b).to_string(), "0.300000000000000000");
    }
}

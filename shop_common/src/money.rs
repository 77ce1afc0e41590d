use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign},
    str::FromStr,
};

use rust_decimal::{
    prelude::{FromPrimitive, ToPrimitive},
    Decimal,
    RoundingStrategy,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{decimal_text_codec, op};

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented as a decimal amount: {0}")]
pub struct AmountConversionError(String);

//--------------------------------------        Money          ---------------------------------------------------------
/// An arbitrary-precision monetary amount. The currency is always carried alongside, never inside, the amount.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(Decimal);

op!(binary Money, Add, add);
op!(binary Money, Sub, sub);
op!(inplace Money, AddAssign, add_assign);
op!(inplace Money, SubAssign, sub_assign);
op!(unary Money, Neg, neg);
decimal_text_codec!(Money);

impl Mul<i64> for Money {
    type Output = Self;

    fn mul(self, rhs: i64) -> Self::Output {
        Self(self.0 * Decimal::from(rhs))
    }
}

impl Mul<Decimal> for Money {
    type Output = Self;

    fn mul(self, rhs: Decimal) -> Self::Output {
        Self(self.0 * rhs)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

impl From<Decimal> for Money {
    fn from(value: Decimal) -> Self {
        Self(value)
    }
}

impl From<i64> for Money {
    fn from(value: i64) -> Self {
        Self(Decimal::from(value))
    }
}

impl FromStr for Money {
    type Err = AmountConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<Decimal>().map(Self).map_err(|e| AmountConversionError(format!("{s}: {e}")))
    }
}

impl Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Money {
    pub fn zero() -> Self {
        Self(Decimal::ZERO)
    }

    /// Builds an amount from an integer number of minor units, e.g. `Money::new(2050, 2)` is 20.50.
    pub fn new(num: i64, scale: u32) -> Self {
        Self(Decimal::new(num, scale))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    /// Rounds half away from zero to `dp` fractional digits. This is plain commercial rounding, not banker's rounding.
    pub fn round_to(&self, dp: u32) -> Self {
        Self(self.0.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero))
    }

    /// Drops the fractional part without rounding.
    pub fn trunc(&self) -> Self {
        Self(self.0.trunc())
    }

    /// Applies a percentage reduction: `self × (100 − pct) / 100`. The result is not rounded.
    pub fn less_percent(&self, pct: Percentage) -> Self {
        Self(self.0 * (Decimal::ONE_HUNDRED - pct.0) / Decimal::ONE_HUNDRED)
    }

    /// An integer amount such as an on-chain value in the token's smallest unit. `None` if it does not fit.
    pub fn from_u128(value: u128) -> Option<Self> {
        Decimal::from_u128(value).map(Self)
    }

    /// Returns the value as an unsigned integer if it has no fractional part and is not negative.
    pub fn to_u128(&self) -> Option<u128> {
        if self.0.fract().is_zero() {
            self.0.to_u128()
        } else {
            None
        }
    }
}

//--------------------------------------      Percentage       ---------------------------------------------------------
/// A percentage in the range 0 to 100 inclusive, e.g. a sale reduction or a promo discount.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Percentage(Decimal);

decimal_text_codec!(Percentage);

impl Percentage {
    pub fn try_new(value: Decimal) -> Result<Self, AmountConversionError> {
        if value < Decimal::ZERO || value > Decimal::ONE_HUNDRED {
            return Err(AmountConversionError(format!("{value} is not a percentage between 0 and 100")));
        }
        Ok(Self(value))
    }

    pub fn zero() -> Self {
        Self(Decimal::ZERO)
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }
}

impl TryFrom<i64> for Percentage {
    type Error = AmountConversionError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::try_new(Decimal::from(value))
    }
}

impl FromStr for Percentage {
    type Err = AmountConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let d = s.trim().parse::<Decimal>().map_err(|e| AmountConversionError(format!("{s}: {e}")))?;
        Self::try_new(d)
    }
}

impl Display for Percentage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}%", self.0)
    }
}

//--------------------------------------        Measure        ---------------------------------------------------------
/// A garment measurement value (centimetres).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Measure(Decimal);

decimal_text_codec!(Measure);

impl From<Decimal> for Measure {
    fn from(value: Decimal) -> Self {
        Self(value)
    }
}

impl Display for Measure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn rounding_is_half_up() {
        let m: Money = "2.345".parse().unwrap();
        assert_eq!(m.round_to(2), Money::new(235, 2));
        let m: Money = "2.5".parse().unwrap();
        assert_eq!(m.round_to(0), Money::from(3));
        let m: Money = "-2.5".parse().unwrap();
        assert_eq!(m.round_to(0), Money::from(-3));
        let m: Money = "0.125".parse().unwrap();
        assert_eq!(m.round_to(2), Money::new(13, 2));
    }

    #[test]
    fn truncation_never_rounds() {
        let m: Money = "21999999.999".parse().unwrap();
        assert_eq!(m.trunc(), Money::from(21_999_999));
        assert_eq!(m.trunc().to_u128(), Some(21_999_999));
        assert_eq!(m.to_u128(), None);
        assert_eq!(Money::from_u128(22_000_000), Some(Money::from(22_000_000)));
    }

    #[test]
    fn percentage_reductions() {
        let price = Money::from(100);
        let sale = Percentage::try_from(15).unwrap();
        assert_eq!(price.less_percent(sale), Money::from(85));
        assert_eq!(price.less_percent(Percentage::zero()), price);
        assert!(Percentage::try_from(101).is_err());
        assert!("-1".parse::<Percentage>().is_err());
    }

    #[test]
    fn arithmetic() {
        let a = Money::new(1050, 2);
        let b = Money::new(250, 2);
        assert_eq!(a + b, Money::from(13));
        assert_eq!(a - b, Money::from(8));
        assert_eq!(a * 3, Money::new(3150, 2));
        let total: Money = vec![a, b, b].into_iter().sum();
        assert_eq!(total, Money::new(1550, 2));
        let mut c = a;
        c -= a;
        assert!(c.is_zero());
        assert!((-a).is_negative());
    }

    #[test]
    fn serializes_as_string() {
        let m = Money::new(2000, 2);
        let json = serde_json::to_string(&m).unwrap();
        assert_eq!(json, "\"20.00\"");
        let back: Money = serde_json::from_str(&json).unwrap();
        assert_eq!(back, m);
    }
}

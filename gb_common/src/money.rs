use std::{fmt::Display, iter::Sum, str::FromStr};

use rust_decimal::{prelude::ToPrimitive, Decimal};
use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::op;

pub const CURRENCY_CODE: &str = "CNY";

//--------------------------------------       Money         ---------------------------------------------------------
/// An amount of money in minor units (fen). All prices in the engine carry two decimal places, so integer minor units
/// are exact and the database stores them as plain integers.
#[derive(Debug, Clone, Copy, Default, Type, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct Money(i64);

op!(binary Money, Add, add);
op!(binary Money, Sub, sub);
op!(inplace Money, AddAssign, add_assign);
op!(inplace Money, SubAssign, sub_assign);
op!(unary Money, Neg, neg);
op!(scalar Money, Mul, mul, i64);

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), |acc, m| acc + m)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Value cannot be represented as money: {0}")]
pub struct MoneyConversionError(String);

impl From<i64> for Money {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl Money {
    /// The smallest amount a customer can be asked to pay.
    pub const MIN_PAYABLE: Money = Money(1);

    pub const fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    pub const fn from_yuan(yuan: i64) -> Self {
        Self(yuan * 100)
    }

    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    pub fn to_decimal(&self) -> Decimal {
        Decimal::new(self.0, 2)
    }

    /// Converts a decimal amount to money, truncating anything below one fen towards negative infinity. Amounts too
    /// large for the decimal or for `i64` fen are an error.
    pub fn from_decimal_floor(value: Decimal) -> Result<Self, MoneyConversionError> {
        value
            .checked_mul(Decimal::ONE_HUNDRED)
            .ok_or_else(|| MoneyConversionError(value.to_string()))?
            .floor()
            .to_i64()
            .map(Self)
            .ok_or_else(|| MoneyConversionError(value.to_string()))
    }
}

impl FromStr for Money {
    type Err = MoneyConversionError;

    /// Parses a decimal amount in major units, e.g. "19.90".
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = Decimal::from_str(s.trim()).map_err(|e| MoneyConversionError(format!("{s}: {e}")))?;
        if value.round_dp(2) != value {
            return Err(MoneyConversionError(format!("{s} has more than two decimal places")));
        }
        Self::from_decimal_floor(value)
    }
}

impl Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}¥{}.{:02}", abs / 100, abs % 100)
    }
}

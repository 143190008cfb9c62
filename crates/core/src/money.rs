//! Fixed-point money (two decimal places, never negative).

use core::fmt;
use core::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// A non-negative amount of money with exactly two decimal places.
///
/// Used both for balances and for operation amounts. The upper bound matches a
/// `NUMERIC(12, 2)` column: 9 999 999 999.99.
///
/// Serialises as a decimal string (`"150.00"`) so no precision is lost in JSON.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Money(Decimal);

impl Money {
    /// Number of fractional digits carried by every amount.
    pub const SCALE: u32 = 2;

    /// Largest representable amount, in minor units (cents).
    pub const MAX_MINOR_UNITS: i64 = 999_999_999_999;

    pub const ZERO: Money = Money(Decimal::ZERO);

    /// Build money from a decimal, rejecting negatives, sub-cent precision and
    /// values beyond the storage limit.
    pub fn new(value: Decimal) -> DomainResult<Self> {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(DomainError::invariant("money cannot be negative"));
        }
        if value.normalize().scale() > Self::SCALE {
            return Err(DomainError::validation(format!(
                "amount {value} has more than {} decimal places",
                Self::SCALE
            )));
        }
        if value > Self::max().0 {
            return Err(DomainError::invariant(format!(
                "amount {value} exceeds the maximum of {}",
                Self::max()
            )));
        }

        let mut scaled = value.abs();
        scaled.rescale(Self::SCALE);
        Ok(Self(scaled))
    }

    /// Build money from an integer count of cents.
    pub fn from_minor_units(cents: i64) -> DomainResult<Self> {
        Self::new(Decimal::new(cents, Self::SCALE))
    }

    /// The largest amount a balance may hold.
    pub fn max() -> Self {
        Self(Decimal::new(Self::MAX_MINOR_UNITS, Self::SCALE))
    }

    pub fn amount(&self) -> Decimal {
        self.0
    }

    /// Amount expressed in cents.
    pub fn minor_units(&self) -> i64 {
        // Always scale 2 and bounded by MAX_MINOR_UNITS, so the mantissa fits.
        self.0.mantissa() as i64
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// `self + rhs`, or `None` when the result would exceed [`Money::max`].
    pub fn checked_add(self, rhs: Money) -> Option<Money> {
        self.0.checked_add(rhs.0).and_then(|sum| Money::new(sum).ok())
    }

    /// `self - rhs`, or `None` when the result would be negative.
    pub fn checked_sub(self, rhs: Money) -> Option<Money> {
        if rhs > self {
            return None;
        }
        self.0.checked_sub(rhs.0).and_then(|diff| Money::new(diff).ok())
    }
}

impl Default for Money {
    fn default() -> Self {
        Self::ZERO
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl fmt::Debug for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Money({self})")
    }
}

impl FromStr for Money {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(DomainError::validation("amount is empty"));
        }
        let value = Decimal::from_str_exact(trimmed)
            .map_err(|e| DomainError::validation(format!("amount '{trimmed}' is not a number: {e}")))?;
        Self::new(value)
    }
}

impl TryFrom<Decimal> for Money {
    type Error = DomainError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Money> for Decimal {
    fn from(value: Money) -> Self {
        value.0
    }
}

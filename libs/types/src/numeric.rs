//! Integral token amounts backed by fixed-point decimals
//!
//! Uses rust_decimal for deterministic arithmetic (no floating-point errors).
//! Every `Amount` is a non-negative whole number of base units; fractional
//! results (fees, auction interpolation) always round toward zero.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::NumericError;

/// Denominator for basis-point fees (1 bp = 1/10 000).
pub const INVERSE_BASIS_POINT: u64 = 10_000;

/// Non-negative integral token quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Amount(Decimal);

impl Amount {
    pub const ZERO: Amount = Amount(Decimal::ZERO);

    pub fn new(units: u64) -> Self {
        Self(Decimal::from(units))
    }

    /// Validate a decimal as an amount: non-negative, no fractional part.
    pub fn try_from_decimal(value: Decimal) -> Result<Self, NumericError> {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(NumericError::Negative(value.to_string()));
        }
        if !value.fract().is_zero() {
            return Err(NumericError::Fractional(value.to_string()));
        }
        Ok(Self(value.normalize()))
    }

    /// Convert from a 128-bit integer (values above 96 bits overflow).
    pub fn from_u128(value: u128) -> Result<Self, NumericError> {
        let signed = i128::try_from(value).map_err(|_| NumericError::Overflow)?;
        Decimal::try_from_i128_with_scale(signed, 0)
            .map(Self)
            .map_err(|_| NumericError::Overflow)
    }

    /// Integral value as u128 (always representable).
    pub fn to_u128(&self) -> u128 {
        self.0.trunc().to_u128().unwrap_or(0)
    }

    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn checked_add(self, rhs: Amount) -> Option<Amount> {
        self.0.checked_add(rhs.0).map(Amount)
    }

    pub fn checked_sub(self, rhs: Amount) -> Option<Amount> {
        if rhs.0 > self.0 {
            return None;
        }
        self.0.checked_sub(rhs.0).map(Amount)
    }

    /// Subtraction that reports the operands on underflow.
    pub fn try_sub(self, rhs: Amount) -> Result<Amount, NumericError> {
        self.checked_sub(rhs).ok_or_else(|| NumericError::Underflow {
            lhs: self.to_string(),
            rhs: rhs.to_string(),
        })
    }

    /// `floor(self * numerator / denominator)`, computed exactly.
    pub fn mul_div_floor(
        self,
        numerator: Amount,
        denominator: Amount,
    ) -> Result<Amount, NumericError> {
        if denominator.is_zero() {
            return Err(NumericError::DivisionByZero);
        }
        let product = self
            .0
            .checked_mul(numerator.0)
            .ok_or(NumericError::Overflow)?;
        let remainder = product
            .checked_rem(denominator.0)
            .ok_or(NumericError::Overflow)?;
        // product - remainder is an exact multiple, so the division is exact
        let quotient = (product - remainder)
            .checked_div(denominator.0)
            .ok_or(NumericError::Overflow)?;
        Ok(Amount(quotient.trunc().normalize()))
    }

    /// Basis-point share of this amount, rounded down.
    pub fn bps_floor(self, bps: Amount) -> Result<Amount, NumericError> {
        self.mul_div_floor(bps, Amount::new(INVERSE_BASIS_POINT))
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = NumericError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::try_from_decimal(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl From<u64> for Amount {
    fn from(units: u64) -> Self {
        Self::new(units)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

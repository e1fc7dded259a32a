//! # Monetary Amounts
//!
//! Defines `Amount`, an integer monetary value in the smallest currency unit.
//!
//! ## Security Invariant
//!
//! Monetary values are never floats. `Amount` wraps a `u64` and all
//! arithmetic is checked: an overflowing add or underflowing subtract
//! returns a [`ValidationError::AmountOverflow`] rather than wrapping.
//! Percentage arithmetic lives in `escrow-split` and works in integer
//! basis points over a `u128` intermediate.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// An integer monetary amount in the smallest currency unit.
///
/// The currency itself is tracked on the owning aggregate, not here: every
/// amount inside a single escrow shares the escrow's currency, so the
/// newtype carries only the magnitude.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct Amount(u64);

impl Amount {
    /// Zero, in the smallest currency unit.
    pub const ZERO: Amount = Amount(0);

    /// Create an amount from a raw value in the smallest currency unit.
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Create an amount that must be strictly positive.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::ZeroAmount`] if `value` is zero.
    pub fn new_positive(value: u64) -> Result<Self, ValidationError> {
        if value == 0 {
            return Err(ValidationError::ZeroAmount);
        }
        Ok(Self(value))
    }

    /// The raw value in the smallest currency unit.
    pub fn value(&self) -> u64 {
        self.0
    }

    /// Whether this amount is zero.
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checked addition.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::AmountOverflow`] on overflow.
    pub fn checked_add(&self, other: Amount) -> Result<Amount, ValidationError> {
        self.0
            .checked_add(other.0)
            .map(Amount)
            .ok_or(ValidationError::AmountOverflow {
                operation: "add",
                left: self.0,
                right: other.0,
            })
    }

    /// Checked subtraction.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::AmountOverflow`] if `other > self`.
    pub fn checked_sub(&self, other: Amount) -> Result<Amount, ValidationError> {
        self.0
            .checked_sub(other.0)
            .map(Amount)
            .ok_or(ValidationError::AmountOverflow {
                operation: "sub",
                left: self.0,
                right: other.0,
            })
    }
}

impl std::fmt::Display for Amount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Amount> for u64 {
    fn from(a: Amount) -> u64 {
        a.0
    }
}

/// Validate a currency code: non-empty, 3–8 uppercase ASCII letters.
///
/// Covers ISO 4217 codes ("USD") and longer token symbols ("USDC").
///
/// # Errors
///
/// Returns [`ValidationError::InvalidCurrency`] on violation.
pub fn validate_currency(code: &str) -> Result<(), ValidationError> {
    let ok = (3..=8).contains(&code.len()) && code.chars().all(|c| c.is_ascii_uppercase());
    if ok {
        Ok(())
    } else {
        Err(ValidationError::InvalidCurrency {
            currency: code.to_string(),
        })
    }
}

//! # Error Types
//!
//! Structured errors for the foundational types. All errors use `thiserror`
//! for derive-based `Display` and `Error` implementations. Validation errors
//! are synchronous and never accompany a mutation.

use thiserror::Error;

/// Validation failure for a foundational primitive.
///
/// Raised at construction time by the validated newtypes in this crate
/// ([`Address`](crate::Address), [`TxHash`](crate::TxHash),
/// [`Timestamp`](crate::Timestamp), [`Amount`](crate::Amount)). The input is
/// rejected before it can reach an aggregate, so no state is touched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Address string is empty or whitespace-only.
    #[error("address must be non-empty")]
    EmptyAddress,

    /// Address contains characters outside the permitted set or has an
    /// out-of-range length.
    #[error("invalid address {address:?}: {reason}")]
    InvalidAddress {
        /// The offending input, as given.
        address: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Transaction hash is empty or contains non-hex characters.
    #[error("invalid transaction hash {hash:?}: {reason}")]
    InvalidTxHash {
        /// The offending input, as given.
        hash: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Currency code is empty or not uppercase ASCII letters.
    #[error("invalid currency code {currency:?}")]
    InvalidCurrency {
        /// The offending input, as given.
        currency: String,
    },

    /// Monetary amount must be strictly positive for this use.
    #[error("amount must be greater than zero")]
    ZeroAmount,

    /// Checked arithmetic on an amount overflowed or underflowed.
    #[error("amount arithmetic overflow: {operation} on {left} and {right}")]
    AmountOverflow {
        /// The operation that failed ("add" or "sub").
        operation: &'static str,
        /// Left operand, smallest currency unit.
        left: u64,
        /// Right operand, smallest currency unit.
        right: u64,
    },

    /// Timestamp string failed to parse or used a non-UTC offset.
    #[error("invalid timestamp {input:?}: {reason}")]
    InvalidTimestamp {
        /// The offending input, as given.
        input: String,
        /// Why it was rejected.
        reason: String,
    },
}

/// Error during canonical serialization.
#[derive(Error, Debug)]
pub enum CanonicalizationError {
    /// Float values are not permitted in canonical representations.
    /// Amounts must be integers; percentages must be pre-converted to
    /// integer basis points before they reach a digest path.
    #[error("float values are not permitted in canonical representations: {0}")]
    FloatRejected(f64),

    /// JSON serialization failed.
    #[error("serialization failed: {0}")]
    SerializationFailed(#[from] serde_json::Error),
}

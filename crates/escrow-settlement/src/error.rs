//! # Settlement Error Types
//!
//! Failures moving funds. Every variant answers `is_retryable()`: the
//! engine commits no state transition on failure, so a retryable error
//! means the whole operation can be re-driven safely — the idempotency
//! ledger guarantees the retry never double-pays.

use thiserror::Error;

use escrow_core::CanonicalizationError;
use escrow_vault::VaultError;

use crate::provider::ProviderError;

/// Errors from settlement execution.
#[derive(Error, Debug)]
pub enum SettlementError {
    /// The custody wallet does not hold the required amount.
    ///
    /// Retryable: funding the source address and re-driving the operation
    /// succeeds.
    #[error(
        "insufficient balance on {source_address} for escrow {escrow_id}: \
         required {required}, available {available}"
    )]
    InsufficientBalance {
        /// The escrow being settled.
        escrow_id: String,
        /// The custody address checked.
        source_address: String,
        /// The amount the intent needs.
        required: u64,
        /// The balance the provider reported.
        available: u64,
    },

    /// The chain/payment provider failed.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Custody key material could not be used.
    ///
    /// Fatal for this escrow's settlement path: never retried as
    /// transient, flagged for manual review, and never logged with
    /// plaintext.
    #[error(transparent)]
    Vault(#[from] VaultError),

    /// The intent payload could not be canonicalized for signing.
    #[error("settlement intent canonicalization failed: {0}")]
    Canonicalization(#[from] CanonicalizationError),
}

impl SettlementError {
    /// Whether re-driving the whole operation can succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::InsufficientBalance { .. } => true,
            Self::Provider(e) => e.is_transient(),
            Self::Vault(_) | Self::Canonicalization(_) => false,
        }
    }

    /// Whether this failure needs a human before any retry.
    pub fn requires_manual_review(&self) -> bool {
        matches!(self, Self::Vault(e) if e.requires_manual_review())
    }
}

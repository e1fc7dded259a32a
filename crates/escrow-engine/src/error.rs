//! # Engine Error Types
//!
//! The aggregation point for every failure the engine can surface.
//! Component errors convert in via `#[from]`; orchestration-level
//! preconditions (missing records, duplicate disputes, lost CAS) are the
//! engine's own variants.

use thiserror::Error;

use escrow_arbitration::ArbitrationError;
use escrow_core::ValidationError;
use escrow_settlement::SettlementError;
use escrow_split::SplitError;
use escrow_state::StateError;
use escrow_vault::VaultError;

use crate::store::StoreError;

/// Errors from engine operations.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The referenced record does not exist.
    #[error("{kind} {id} not found")]
    NotFound {
        /// What was looked up ("escrow", "dispute").
        kind: &'static str,
        /// The missing identifier.
        id: String,
    },

    /// An escrow already has an active dispute; at most one at a time.
    #[error("escrow {escrow_id} already has active dispute {dispute_id}")]
    DisputeAlreadyActive {
        /// The escrow's identifier.
        escrow_id: String,
        /// The already-active dispute.
        dispute_id: String,
    },

    /// A compare-and-swap lost; retry the whole operation.
    #[error("concurrent modification of {id}: expected version {expected_version}, found {found_version}")]
    ConcurrencyConflict {
        /// The contended record.
        id: String,
        /// The version this writer read.
        expected_version: u64,
        /// The version actually stored.
        found_version: u64,
    },

    /// An escrow lifecycle rule was violated.
    #[error(transparent)]
    State(#[from] StateError),

    /// A dispute lifecycle rule was violated.
    #[error(transparent)]
    Arbitration(#[from] ArbitrationError),

    /// A fund movement failed; state stays at its pre-call status.
    #[error(transparent)]
    Settlement(#[from] SettlementError),

    /// Custody key material could not be created or used.
    #[error(transparent)]
    Vault(#[from] VaultError),

    /// A core primitive failed validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The payout recipient table failed validation.
    #[error(transparent)]
    Split(#[from] SplitError),
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::VersionConflict {
                id,
                expected,
                found,
            } => Self::ConcurrencyConflict {
                id,
                expected_version: expected,
                found_version: found,
            },
            StoreError::NotFound { id } => Self::NotFound { kind: "record", id },
            StoreError::AlreadyExists { id } => Self::ConcurrencyConflict {
                id,
                expected_version: 0,
                found_version: 0,
            },
        }
    }
}

impl EngineError {
    /// Whether re-driving the whole operation can succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ConcurrencyConflict { .. } => true,
            Self::Settlement(e) => e.is_retryable(),
            _ => false,
        }
    }
}

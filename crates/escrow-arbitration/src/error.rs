//! # Arbitration Error Types
//!
//! Structured errors for dispute lifecycle operations. A rejected operation
//! leaves the dispute untouched: every method validates fully before its
//! first mutation.

use thiserror::Error;

/// Errors from dispute aggregate operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ArbitrationError {
    /// The requested transition is not an edge in the legal graph.
    #[error("invalid dispute transition {from} -> {to}: {reason}")]
    InvalidTransition {
        /// State before the attempt.
        from: String,
        /// Requested target state.
        to: String,
        /// Why the transition was rejected.
        reason: String,
    },

    /// The dispute is in a terminal state; no further transitions exist.
    #[error("dispute {dispute_id} is terminal in state {status}")]
    TerminalState {
        /// The dispute's identifier.
        dispute_id: String,
        /// The terminal status.
        status: String,
    },

    /// The acting party is not the assigned arbiter.
    #[error("{actor} is not the assigned arbiter for dispute {dispute_id}")]
    NotAssignedArbiter {
        /// The dispute's identifier.
        dispute_id: String,
        /// Who attempted the operation.
        actor: String,
    },

    /// No arbiter has been assigned yet.
    #[error("dispute {dispute_id} has no assigned arbiter")]
    NoArbiter {
        /// The dispute's identifier.
        dispute_id: String,
    },

    /// Arbiter replacement was attempted after arbitration began.
    #[error("dispute {dispute_id} arbiter is locked in state {status}: {reason}")]
    ArbiterLocked {
        /// The dispute's identifier.
        dispute_id: String,
        /// The current status.
        status: String,
        /// Why replacement is refused.
        reason: String,
    },

    /// Evidence submission outside the evidence-accepting states.
    #[error("dispute {dispute_id} does not accept evidence in state {status}")]
    EvidenceClosed {
        /// The dispute's identifier.
        dispute_id: String,
        /// The current status.
        status: String,
    },

    /// A resolution's parameters are invalid.
    #[error("invalid resolution: {reason}")]
    InvalidResolution {
        /// The violated rule.
        reason: String,
    },

    /// A second, differing resolution was submitted for a resolved dispute.
    #[error("dispute {dispute_id} already resolved with a different resolution")]
    ResolutionConflict {
        /// The dispute's identifier.
        dispute_id: String,
    },
}

//! # State Machine Error Types
//!
//! Structured errors for escrow lifecycle operations. A rejected operation
//! leaves the aggregate untouched: every method validates fully before its
//! first mutation.

use thiserror::Error;

use escrow_core::Actor;

/// Errors from escrow aggregate operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StateError {
    /// The requested transition is not an edge in the legal graph.
    #[error("invalid state transition {from} -> {to}: {reason}")]
    InvalidTransition {
        /// State before the attempt.
        from: String,
        /// Requested target state.
        to: String,
        /// Why the transition was rejected.
        reason: String,
    },

    /// The escrow is in a terminal state; no further transitions exist.
    #[error("escrow {escrow_id} is terminal in state {status}")]
    TerminalState {
        /// The escrow's identifier.
        escrow_id: String,
        /// The terminal status.
        status: String,
    },

    /// The acting party is not permitted to perform this operation.
    #[error("{actor} may not {operation}: {reason}")]
    UnauthorizedActor {
        /// Who attempted the operation.
        actor: Actor,
        /// The operation name.
        operation: &'static str,
        /// Why the actor was rejected.
        reason: String,
    },

    /// No milestone with the given id exists on this escrow.
    #[error("milestone {milestone_id} not found on escrow {escrow_id}")]
    MilestoneNotFound {
        /// The escrow's identifier.
        escrow_id: String,
        /// The missing milestone identifier.
        milestone_id: String,
    },

    /// The operation does not apply to this escrow kind.
    #[error("operation {operation} does not apply to a {kind} escrow: {reason}")]
    WrongKind {
        /// The operation name.
        operation: &'static str,
        /// The escrow kind.
        kind: String,
        /// Why the kind is incompatible.
        reason: String,
    },

    /// Construction-time invariant violation.
    #[error("invalid escrow: {reason}")]
    InvalidEscrow {
        /// The violated invariant.
        reason: String,
    },

    /// A foundational primitive failed validation.
    #[error(transparent)]
    Validation(#[from] escrow_core::ValidationError),

    /// The payout recipient table failed validation.
    #[error(transparent)]
    Split(#[from] escrow_split::SplitError),
}

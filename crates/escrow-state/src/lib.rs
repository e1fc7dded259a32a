//! # escrow-state — Escrow Lifecycle State Machine
//!
//! The escrow aggregate and its milestone children: a pure state machine
//! with an explicit transition graph, actor authorization on every
//! operation, and an append-only activity log.
//!
//! The aggregate performs no I/O and moves no funds. Fund-moving
//! transitions are split into an `authorize_*` check and a `commit_*`
//! application; the settlement executor runs in between, driven by
//! `escrow-engine`.

pub mod error;
pub mod escrow;
pub mod milestone;

pub use error::StateError;
pub use escrow::{
    ActivityRecord, Escrow, EscrowEvent, EscrowKind, EscrowParams, EscrowStatus, ResolutionOutcome,
};
pub use milestone::{Milestone, MilestonePlan, MilestoneStatus};

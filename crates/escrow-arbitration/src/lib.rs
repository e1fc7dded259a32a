//! # escrow-arbitration — Dispute Arbitration
//!
//! The dispute lifecycle state machine: opening, evidence collection,
//! arbiter assignment, resolution, and escalation, with append-only
//! evidence and timeline records.
//!
//! A resolution produces a [`SettlementDirective`] describing the fund
//! movement it demands; `escrow-engine` executes the directive and commits
//! the matching escrow-side transition.

pub mod dispute;
pub mod error;

pub use dispute::{
    Arbiter, Dispute, DisputeEvent, DisputeStatus, DisputeType, EvidenceItem, Party, Resolution,
    ResolutionType, SettlementDirective, TimelineEntry,
};
pub use error::ArbitrationError;

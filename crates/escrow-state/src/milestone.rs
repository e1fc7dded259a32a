//! # Milestones
//!
//! An independently releasable portion of an escrow's total, gated on
//! ordered completion. Milestones are owned exclusively by their escrow;
//! all lifecycle mutation goes through the [`Escrow`](crate::Escrow)
//! aggregate so ordering invariants cannot be bypassed.

use serde::{Deserialize, Serialize};

use escrow_core::{Amount, EscrowId, MilestoneId, Timestamp};

/// The lifecycle state of a single milestone.
///
/// `Pending → Completed → Released`, strictly in `order_index` order
/// across the escrow's milestone list. A released milestone is immutable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MilestoneStatus {
    /// Work not yet delivered.
    Pending,
    /// Seller has marked the work delivered; awaiting buyer release.
    Completed,
    /// Buyer has released this milestone's amount. Immutable.
    Released,
}

impl MilestoneStatus {
    /// The canonical string name of this state.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Completed => "COMPLETED",
            Self::Released => "RELEASED",
        }
    }
}

impl std::fmt::Display for MilestoneStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a milestone plan supplied at escrow creation.
///
/// Carries only a title and percentage; the integer amount is derived from
/// the escrow total through the split calculator with the engine's residual
/// policy, so the milestone amounts always sum to the total exactly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MilestonePlan {
    /// Human-readable description of the deliverable.
    pub title: String,
    /// Share of the escrow total, in percent (0 < p ≤ 100).
    pub percentage: f64,
}

impl MilestonePlan {
    /// Construct a plan entry.
    pub fn new(title: impl Into<String>, percentage: f64) -> Self {
        Self {
            title: title.into(),
            percentage,
        }
    }
}

/// An independently releasable portion of an escrow's total.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Milestone {
    /// Unique milestone identifier.
    pub id: MilestoneId,
    /// Back-reference to the owning escrow (no ownership).
    pub escrow_id: EscrowId,
    /// Human-readable description of the deliverable.
    pub title: String,
    /// Derived integer amount, smallest currency unit.
    pub amount: Amount,
    /// The share of the total this milestone was derived from.
    pub percentage: f64,
    /// Current lifecycle state.
    pub status: MilestoneStatus,
    /// Mandatory completion order: milestone k may only complete after
    /// all milestones with a lower index, and release after all lower
    /// milestones have released.
    pub order_index: u32,
    /// When the seller completed the work (UTC).
    pub completed_at: Option<Timestamp>,
    /// When the buyer released the amount (UTC).
    pub released_at: Option<Timestamp>,
}

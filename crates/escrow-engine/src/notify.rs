//! # Notifications & Escalation Hook
//!
//! Outbound, fire-and-forget side channels. Notifier failures are
//! warn-logged by the engine and never propagated: a broken webhook must
//! not block a settlement. The escalation hook hands an escalated dispute
//! to whatever oversight process exists outside this engine.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use escrow_arbitration::ResolutionType;
use escrow_core::{DisputeId, EscrowId, MilestoneId, Timestamp};

/// A lifecycle event published to interested parties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EscrowNotification {
    /// An escrow was created and awaits funding.
    EscrowCreated { escrow_id: EscrowId },
    /// The buyer's deposit was confirmed.
    EscrowFunded { escrow_id: EscrowId },
    /// The escrow fully paid out.
    EscrowReleased { escrow_id: EscrowId },
    /// The escrow was cancelled before funding.
    EscrowCancelled { escrow_id: EscrowId },
    /// A time-locked escrow froze past its deadline.
    EscrowExpired { escrow_id: EscrowId },
    /// The seller completed a milestone.
    MilestoneCompleted {
        escrow_id: EscrowId,
        milestone_id: MilestoneId,
    },
    /// The buyer released a milestone's amount.
    MilestoneReleased {
        escrow_id: EscrowId,
        milestone_id: MilestoneId,
    },
    /// A dispute was opened.
    DisputeOpened {
        escrow_id: EscrowId,
        dispute_id: DisputeId,
    },
    /// A dispute was resolved and its directive settled.
    DisputeResolved {
        escrow_id: EscrowId,
        dispute_id: DisputeId,
        resolution_type: ResolutionType,
    },
    /// A dispute passed its advisory resolution deadline.
    DisputeOverdue {
        escrow_id: EscrowId,
        dispute_id: DisputeId,
        deadline: Timestamp,
    },
    /// A dispute was escalated out of this engine.
    DisputeEscalated {
        escrow_id: EscrowId,
        dispute_id: DisputeId,
    },
}

/// Delivery failure from a notifier.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("notification delivery failed: {reason}")]
pub struct NotifyError {
    /// The delivery-side failure.
    pub reason: String,
}

/// A fire-and-forget notification sink.
///
/// The engine warn-logs a returned error with context and carries on;
/// implementations must not block for long.
pub trait Notifier: Send + Sync {
    /// Deliver one notification.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError`] on delivery failure; the engine never
    /// propagates it.
    fn notify(&self, notification: &EscrowNotification) -> Result<(), NotifyError>;
}

/// Discards every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn notify(&self, _notification: &EscrowNotification) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// Captures notifications in order, for tests.
#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<EscrowNotification>>,
    fail_with: Mutex<Option<String>>,
}

impl RecordingNotifier {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// All notifications delivered so far, in order.
    pub fn events(&self) -> Vec<EscrowNotification> {
        self.events.lock().clone()
    }

    /// Make every subsequent delivery fail with `reason`. Deliveries are
    /// still recorded, so tests can assert the engine carried on.
    pub fn fail_with(&self, reason: impl Into<String>) {
        *self.fail_with.lock() = Some(reason.into());
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: &EscrowNotification) -> Result<(), NotifyError> {
        self.events.lock().push(notification.clone());
        match self.fail_with.lock().clone() {
            Some(reason) => Err(NotifyError { reason }),
            None => Ok(()),
        }
    }
}

/// Receives disputes escalated out of this engine's jurisdiction.
///
/// Fire-and-forget: the oversight cycle an escalation spawns lives
/// entirely outside the engine.
pub trait EscalationHook: Send + Sync {
    /// Hand off an escalated dispute.
    fn escalated(&self, escrow_id: EscrowId, dispute_id: DisputeId, reason: &str);
}

/// Ignores escalations.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEscalationHook;

impl EscalationHook for NullEscalationHook {
    fn escalated(&self, _escrow_id: EscrowId, _dispute_id: DisputeId, _reason: &str) {}
}

/// Captures escalations, for tests.
#[derive(Default)]
pub struct RecordingEscalationHook {
    escalations: Mutex<Vec<(EscrowId, DisputeId, String)>>,
}

impl RecordingEscalationHook {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// All escalations received so far, in order.
    pub fn escalations(&self) -> Vec<(EscrowId, DisputeId, String)> {
        self.escalations.lock().clone()
    }
}

impl EscalationHook for RecordingEscalationHook {
    fn escalated(&self, escrow_id: EscrowId, dispute_id: DisputeId, reason: &str) {
        self.escalations
            .lock()
            .push((escrow_id, dispute_id, reason.to_string()));
    }
}

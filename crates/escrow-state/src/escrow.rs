//! # Escrow Aggregate
//!
//! The escrow lifecycle state machine. The aggregate is pure: methods
//! validate an operation against the current state and the acting party,
//! mutate on success, and append to the activity log. Settlement coupling
//! (the two-phase authorize/commit around fund movement), persistence, and
//! per-escrow locking live in `escrow-engine`.
//!
//! ## Transition Graph
//!
//! ```text
//! Pending ──mark_funded()──▶ Funded ──commit_release()──▶ Released
//!   │                          │
//!   │                          ├─expire()──▶ Expired        (time-locked,
//!   │                          │                             auto_release=false)
//!   ├─cancel()──▶ Cancelled    │
//!   │                          │
//!   └──────open_dispute()──────┴──▶ Disputed ──commit_resolution()──▶
//!                                     ResolvedReleased | ResolvedRefunded
//!                                     | state held before the dispute
//! ```
//!
//! Released, ResolvedReleased, ResolvedRefunded, Cancelled, and Expired are
//! terminal. Any other requested transition fails with
//! [`StateError::InvalidTransition`] and leaves the aggregate unchanged —
//! no partial effects.
//!
//! ## Security Invariant
//!
//! Release and milestone release are split into `authorize_*` (pure
//! validation) and `commit_*` (applied only after the settlement executor
//! has confirmed the fund movement). On executor failure nothing is
//! committed, so state and fund movement form one logical unit and a
//! retried release never double-pays.

use serde::{Deserialize, Serialize};

use escrow_core::{
    validate_currency, Actor, Address, Amount, DisputeId, EscrowId, MilestoneId, Timestamp, TxHash,
};
use escrow_split::{
    allocate_portions, basis_points, validate as validate_recipients, Recipient, ResidualPolicy,
    SplitConfig, FULL_BASIS_POINTS, SUM_TOLERANCE_BASIS_POINTS,
};
use escrow_vault::EncryptedKeyBlob;

use crate::error::StateError;
use crate::milestone::{Milestone, MilestonePlan, MilestoneStatus};

// ── Escrow Kind & Status ───────────────────────────────────────────────

/// The release rule variant of an escrow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EscrowKind {
    /// Released by the buyer once, for the full amount.
    Simple,
    /// Released by the buyer, or automatically at `release_date` when
    /// `auto_release` is set; freezes to Expired past the deadline
    /// otherwise.
    TimeLocked,
    /// Released per milestone, in mandatory order.
    Milestone,
}

impl EscrowKind {
    /// The canonical string identifier for serialization and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::TimeLocked => "time_locked",
            Self::Milestone => "milestone",
        }
    }
}

impl std::fmt::Display for EscrowKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The lifecycle state of an escrow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EscrowStatus {
    /// Created; awaiting the buyer's deposit.
    Pending,
    /// Deposit confirmed; funds are custodied.
    Funded,
    /// Funds fully paid out to the seller side. Terminal.
    Released,
    /// A dispute is active; only a resolution exits this state.
    Disputed,
    /// Dispute resolved in the seller's favor; funds paid out. Terminal.
    ResolvedReleased,
    /// Dispute resolved in the buyer's favor; funds returned. Terminal.
    ResolvedRefunded,
    /// Cancelled before funding. Terminal.
    Cancelled,
    /// Time-locked deadline passed without auto-release; funds remain
    /// custodied pending manual or dispute intervention. Terminal.
    Expired,
}

impl EscrowStatus {
    /// The canonical string name of this state.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Funded => "FUNDED",
            Self::Released => "RELEASED",
            Self::Disputed => "DISPUTED",
            Self::ResolvedReleased => "RESOLVED_RELEASED",
            Self::ResolvedRefunded => "RESOLVED_REFUNDED",
            Self::Cancelled => "CANCELLED",
            Self::Expired => "EXPIRED",
        }
    }

    /// Whether this state is terminal (no further transitions allowed).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Released
                | Self::ResolvedReleased
                | Self::ResolvedRefunded
                | Self::Cancelled
                | Self::Expired
        )
    }

    /// Valid target states from this state.
    pub fn valid_transitions(&self) -> &'static [EscrowStatus] {
        match self {
            Self::Pending => &[Self::Funded, Self::Cancelled, Self::Disputed],
            Self::Funded => &[Self::Released, Self::Disputed, Self::Expired],
            Self::Disputed => &[
                Self::ResolvedReleased,
                Self::ResolvedRefunded,
                Self::Pending,
                Self::Funded,
            ],
            Self::Released
            | Self::ResolvedReleased
            | Self::ResolvedRefunded
            | Self::Cancelled
            | Self::Expired => &[],
        }
    }
}

impl std::fmt::Display for EscrowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Activity Log ───────────────────────────────────────────────────────

/// A typed lifecycle event, recorded in the append-only activity log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EscrowEvent {
    /// The escrow was created in Pending state.
    Created,
    /// The buyer's deposit was confirmed.
    Funded {
        /// The funding proof transaction hash.
        proof: TxHash,
    },
    /// The seller completed a milestone's work.
    MilestoneCompleted {
        /// The completed milestone.
        milestone_id: MilestoneId,
    },
    /// The buyer released a milestone's amount.
    MilestoneReleased {
        /// The released milestone.
        milestone_id: MilestoneId,
        /// Provider transaction id of the payout.
        tx_id: String,
    },
    /// The full remaining amount was paid out to the recipient table.
    Released {
        /// Provider transaction ids, one per payout leg.
        tx_ids: Vec<String>,
    },
    /// The escrow was cancelled before funding.
    Cancelled,
    /// A dispute was opened against this escrow.
    DisputeOpened {
        /// The dispute record.
        dispute_id: DisputeId,
    },
    /// A dispute resolution was applied.
    DisputeResolved {
        /// The outcome, as a canonical string.
        outcome: String,
    },
    /// The time-locked deadline passed without auto-release.
    Expired,
}

/// One entry of the append-only activity log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    /// Monotonic sequence number within this escrow, starting at 0.
    pub seq: u64,
    /// When the event occurred (UTC).
    pub at: Timestamp,
    /// Who performed the operation.
    pub actor: Actor,
    /// What happened.
    pub event: EscrowEvent,
}

// ── Resolution Outcome ─────────────────────────────────────────────────

/// The settled outcome of a dispute, applied via
/// [`Escrow::commit_resolution`] — the only legal exit from Disputed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ResolutionOutcome {
    /// Funds were paid out to the seller side (full release through the
    /// recipient table).
    ReleasedToSeller {
        /// Provider transaction ids, one per payout leg.
        tx_ids: Vec<String>,
    },
    /// Funds (all or part) were returned to the buyer.
    RefundedToBuyer {
        /// Provider transaction id of the refund.
        tx_id: String,
    },
    /// No fund movement; the escrow returns to the state it held before
    /// the dispute (rework, replacement, compromise, dismissed).
    ReturnedToPrior,
}

impl ResolutionOutcome {
    /// The canonical string name of this outcome.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReleasedToSeller { .. } => "released_to_seller",
            Self::RefundedToBuyer { .. } => "refunded_to_buyer",
            Self::ReturnedToPrior => "returned_to_prior",
        }
    }
}

// ── Creation Parameters ────────────────────────────────────────────────

/// Parameters for creating an escrow.
///
/// The deposit address and encrypted custody key come from the vault; the
/// engine generates them immediately before construction.
#[derive(Debug, Clone)]
pub struct EscrowParams {
    /// The funding party.
    pub buyer: Address,
    /// The delivering party.
    pub seller: Address,
    /// Total custodied amount, smallest currency unit. Must be positive.
    pub total_amount: Amount,
    /// Currency code (uppercase, 3–8 letters).
    pub currency: String,
    /// Release rule variant.
    pub kind: EscrowKind,
    /// Release deadline; required for [`EscrowKind::TimeLocked`].
    pub release_date: Option<Timestamp>,
    /// Whether the engine may release automatically at `release_date`.
    pub auto_release: bool,
    /// Payout split table. Empty means the seller receives 100%.
    pub recipients: Vec<Recipient>,
    /// Milestone plan; required non-empty for [`EscrowKind::Milestone`],
    /// must be empty otherwise.
    pub milestones: Vec<MilestonePlan>,
    /// The custody wallet's public address (deposit target).
    pub deposit_address: Address,
    /// The custody key seed, encrypted by the vault.
    pub encrypted_custody_key: EncryptedKeyBlob,
}

// ── The Escrow ─────────────────────────────────────────────────────────

/// An escrow aggregate: custodied funds for one two-party trade.
///
/// ## Security Invariant
///
/// Every successful mutation appends an [`ActivityRecord`]; the log is
/// append-only and its sequence numbers are contiguous from 0, giving a
/// complete audit trail of how the aggregate reached its current state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Escrow {
    /// Unique escrow identifier.
    pub id: EscrowId,
    /// The funding party.
    pub buyer: Address,
    /// The delivering party.
    pub seller: Address,
    /// Total custodied amount, smallest currency unit.
    pub total_amount: Amount,
    /// Currency code.
    pub currency: String,
    /// Release rule variant.
    pub kind: EscrowKind,
    /// Current lifecycle state.
    pub status: EscrowStatus,
    /// The custody wallet's public address (deposit target).
    pub deposit_address: Address,
    /// The custody key seed, encrypted by the vault. Never plaintext.
    pub encrypted_custody_key: EncryptedKeyBlob,
    /// Release deadline (time-locked escrows).
    pub release_date: Option<Timestamp>,
    /// Whether the engine may release automatically at `release_date`.
    pub auto_release: bool,
    /// Payout split table applied on release.
    pub recipients: Vec<Recipient>,
    /// Ordered milestones (milestone escrows only).
    pub milestones: Vec<Milestone>,
    /// The funding proof recorded by `mark_funded`.
    pub funding_proof: Option<TxHash>,
    /// The state held before entering Disputed, for resolutions with no
    /// fund movement.
    pub disputed_from: Option<EscrowStatus>,
    /// Append-only activity log.
    pub activity: Vec<ActivityRecord>,
    /// When the escrow was created (UTC).
    pub created_at: Timestamp,
    /// When the escrow was last mutated (UTC).
    pub updated_at: Timestamp,
}

impl Escrow {
    /// Create an escrow in Pending state, validating every construction
    /// invariant.
    ///
    /// Milestone amounts are derived from the plan percentages through the
    /// split calculator with `residual_policy` applied, so they sum to
    /// `total_amount` exactly by construction.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::InvalidEscrow`] for violated aggregate
    /// invariants, [`StateError::Validation`] for bad primitives, and
    /// [`StateError::Split`] for an invalid recipient table.
    pub fn create(
        params: EscrowParams,
        residual_policy: ResidualPolicy,
        split_config: &SplitConfig,
        now: Timestamp,
    ) -> Result<Self, StateError> {
        if params.total_amount.is_zero() {
            return Err(escrow_core::ValidationError::ZeroAmount.into());
        }
        validate_currency(&params.currency)?;
        if params.buyer.eq_normalized(&params.seller) {
            return Err(StateError::InvalidEscrow {
                reason: "buyer and seller addresses must differ".to_string(),
            });
        }

        let recipients = if params.recipients.is_empty() {
            vec![Recipient::new(params.seller.clone(), 100.0)]
        } else {
            params.recipients
        };
        validate_recipients(&recipients, split_config)?;

        match params.kind {
            EscrowKind::TimeLocked if params.release_date.is_none() => {
                return Err(StateError::InvalidEscrow {
                    reason: "time-locked escrow requires a release date".to_string(),
                });
            }
            EscrowKind::Milestone if params.milestones.is_empty() => {
                return Err(StateError::InvalidEscrow {
                    reason: "milestone escrow requires a non-empty milestone plan".to_string(),
                });
            }
            EscrowKind::Simple | EscrowKind::TimeLocked if !params.milestones.is_empty() => {
                return Err(StateError::InvalidEscrow {
                    reason: format!("a {} escrow may not carry milestones", params.kind),
                });
            }
            _ => {}
        }

        let id = EscrowId::new();
        let milestones = build_milestones(
            id,
            &params.milestones,
            params.total_amount,
            residual_policy,
        )?;

        let mut escrow = Self {
            id,
            buyer: params.buyer,
            seller: params.seller,
            total_amount: params.total_amount,
            currency: params.currency,
            kind: params.kind,
            status: EscrowStatus::Pending,
            deposit_address: params.deposit_address,
            encrypted_custody_key: params.encrypted_custody_key,
            release_date: params.release_date,
            auto_release: params.auto_release,
            recipients,
            milestones,
            funding_proof: None,
            disputed_from: None,
            activity: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        escrow.record(Actor::Buyer, EscrowEvent::Created, now);
        Ok(escrow)
    }

    // ── Funding ────────────────────────────────────────────────────

    /// Confirm the buyer's deposit: Pending → Funded.
    ///
    /// Idempotent on a repeated identical proof: calling again with the
    /// same transaction hash on an already-funded escrow returns `Ok`
    /// without mutating anything. A *different* proof on a funded escrow
    /// is an invalid transition.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::UnauthorizedActor`] unless `actor` is the
    /// buyer, and [`StateError::InvalidTransition`] /
    /// [`StateError::TerminalState`] outside Pending.
    pub fn mark_funded(
        &mut self,
        proof: TxHash,
        actor: Actor,
        now: Timestamp,
    ) -> Result<(), StateError> {
        if actor != Actor::Buyer {
            return Err(StateError::UnauthorizedActor {
                actor,
                operation: "mark_funded",
                reason: "only the buyer confirms the deposit".to_string(),
            });
        }
        if self.status == EscrowStatus::Funded && self.funding_proof.as_ref() == Some(&proof) {
            return Ok(());
        }
        self.require_status(EscrowStatus::Pending, EscrowStatus::Funded)?;
        self.status = EscrowStatus::Funded;
        self.funding_proof = Some(proof.clone());
        self.record(actor, EscrowEvent::Funded { proof }, now);
        Ok(())
    }

    // ── Release (simple / time-locked) ─────────────────────────────

    /// Validate that a full release may proceed, without mutating.
    ///
    /// Permitted when the escrow is Funded and `actor` is the buyer, or —
    /// for a time-locked escrow with `auto_release` — when `actor` is
    /// System and `now` has reached the release date.
    ///
    /// The settlement executor runs between this check and
    /// [`commit_release`](Self::commit_release); on executor failure the
    /// commit never happens, the status stays Funded, and the call is
    /// retryable.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::WrongKind`] for milestone escrows (those
    /// release per milestone), [`StateError::UnauthorizedActor`] for a
    /// disallowed actor, and transition errors outside Funded.
    pub fn authorize_release(&self, actor: Actor, now: Timestamp) -> Result<(), StateError> {
        if self.kind == EscrowKind::Milestone {
            return Err(StateError::WrongKind {
                operation: "release",
                kind: self.kind.as_str().to_string(),
                reason: "milestone escrows release per milestone".to_string(),
            });
        }
        match actor {
            Actor::Buyer => {}
            Actor::System => {
                let due = self
                    .release_date
                    .map(|d| now >= d)
                    .unwrap_or(false);
                if !(self.kind == EscrowKind::TimeLocked && self.auto_release && due) {
                    return Err(StateError::UnauthorizedActor {
                        actor,
                        operation: "release",
                        reason: "auto-release requires a due time-locked escrow with \
                                 auto_release enabled"
                            .to_string(),
                    });
                }
            }
            Actor::Seller | Actor::Arbiter => {
                return Err(StateError::UnauthorizedActor {
                    actor,
                    operation: "release",
                    reason: "only the buyer (or the engine at the release date) releases"
                        .to_string(),
                });
            }
        }
        self.require_status(EscrowStatus::Funded, EscrowStatus::Released)
    }

    /// Commit a successful full release: Funded → Released.
    ///
    /// Called only after the settlement executor has confirmed every
    /// payout leg; `tx_ids` are the provider transaction ids.
    ///
    /// # Errors
    ///
    /// Returns transition errors outside Funded.
    pub fn commit_release(
        &mut self,
        tx_ids: Vec<String>,
        actor: Actor,
        now: Timestamp,
    ) -> Result<(), StateError> {
        self.require_status(EscrowStatus::Funded, EscrowStatus::Released)?;
        self.status = EscrowStatus::Released;
        self.record(actor, EscrowEvent::Released { tx_ids }, now);
        Ok(())
    }

    // ── Milestones ─────────────────────────────────────────────────

    /// Mark a milestone's work delivered: milestone Pending → Completed.
    ///
    /// Only the seller completes milestones, only while the escrow is
    /// Funded, and only in `order_index` order: the milestone must hold
    /// the lowest pending index.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::MilestoneNotFound`],
    /// [`StateError::UnauthorizedActor`], or
    /// [`StateError::InvalidTransition`] on violation.
    pub fn complete_milestone(
        &mut self,
        milestone_id: MilestoneId,
        actor: Actor,
        now: Timestamp,
    ) -> Result<(), StateError> {
        if actor != Actor::Seller {
            return Err(StateError::UnauthorizedActor {
                actor,
                operation: "complete_milestone",
                reason: "only the seller completes milestones".to_string(),
            });
        }
        self.require_status(EscrowStatus::Funded, EscrowStatus::Funded)?;

        let lowest_pending = self
            .milestones
            .iter()
            .filter(|m| m.status == MilestoneStatus::Pending)
            .map(|m| m.order_index)
            .min();
        let milestone = self.milestone_mut(milestone_id)?;
        if milestone.status != MilestoneStatus::Pending {
            return Err(StateError::InvalidTransition {
                from: milestone.status.as_str().to_string(),
                to: MilestoneStatus::Completed.as_str().to_string(),
                reason: format!("milestone {milestone_id} is not pending"),
            });
        }
        if lowest_pending != Some(milestone.order_index) {
            return Err(StateError::InvalidTransition {
                from: MilestoneStatus::Pending.as_str().to_string(),
                to: MilestoneStatus::Completed.as_str().to_string(),
                reason: format!(
                    "milestones complete in order: index {} is not the lowest pending",
                    milestone.order_index
                ),
            });
        }
        milestone.status = MilestoneStatus::Completed;
        milestone.completed_at = Some(now);
        self.record(actor, EscrowEvent::MilestoneCompleted { milestone_id }, now);
        Ok(())
    }

    /// Validate that a milestone release may proceed; returns the amount
    /// to settle.
    ///
    /// Only the buyer releases, the milestone must be Completed, and every
    /// lower-index milestone must already be Released.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::UnauthorizedActor`],
    /// [`StateError::MilestoneNotFound`], or
    /// [`StateError::InvalidTransition`] on violation.
    pub fn authorize_milestone_release(
        &self,
        milestone_id: MilestoneId,
        actor: Actor,
    ) -> Result<Amount, StateError> {
        if actor != Actor::Buyer {
            return Err(StateError::UnauthorizedActor {
                actor,
                operation: "release_milestone",
                reason: "only the buyer releases milestone amounts".to_string(),
            });
        }
        self.require_status(EscrowStatus::Funded, EscrowStatus::Funded)?;
        let milestone = self.milestone(milestone_id)?;
        if milestone.status != MilestoneStatus::Completed {
            return Err(StateError::InvalidTransition {
                from: milestone.status.as_str().to_string(),
                to: MilestoneStatus::Released.as_str().to_string(),
                reason: format!("milestone {milestone_id} has not been completed"),
            });
        }
        if let Some(blocking) = self
            .milestones
            .iter()
            .find(|m| m.order_index < milestone.order_index && m.status != MilestoneStatus::Released)
        {
            return Err(StateError::InvalidTransition {
                from: MilestoneStatus::Completed.as_str().to_string(),
                to: MilestoneStatus::Released.as_str().to_string(),
                reason: format!(
                    "milestone at index {} must release before index {}",
                    blocking.order_index, milestone.order_index
                ),
            });
        }
        Ok(milestone.amount)
    }

    /// Commit a successful milestone release; flips the escrow to
    /// Released when this was the last milestone.
    ///
    /// Called only after the settlement executor has confirmed the payout.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::MilestoneNotFound`] or
    /// [`StateError::InvalidTransition`] if the milestone is not
    /// Completed.
    pub fn commit_milestone_release(
        &mut self,
        milestone_id: MilestoneId,
        tx_id: String,
        actor: Actor,
        now: Timestamp,
    ) -> Result<(), StateError> {
        self.require_status(EscrowStatus::Funded, EscrowStatus::Funded)?;
        let milestone = self.milestone_mut(milestone_id)?;
        if milestone.status != MilestoneStatus::Completed {
            return Err(StateError::InvalidTransition {
                from: milestone.status.as_str().to_string(),
                to: MilestoneStatus::Released.as_str().to_string(),
                reason: format!("milestone {milestone_id} has not been completed"),
            });
        }
        milestone.status = MilestoneStatus::Released;
        milestone.released_at = Some(now);
        self.record(
            actor,
            EscrowEvent::MilestoneReleased { milestone_id, tx_id },
            now,
        );
        if self.all_milestones_released() {
            self.status = EscrowStatus::Released;
        }
        Ok(())
    }

    /// Whether every milestone has been released.
    pub fn all_milestones_released(&self) -> bool {
        !self.milestones.is_empty()
            && self
                .milestones
                .iter()
                .all(|m| m.status == MilestoneStatus::Released)
    }

    // ── Cancellation, Disputes, Expiry ─────────────────────────────

    /// Cancel before funding: Pending → Cancelled. No settlement call —
    /// no funds have moved yet.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::UnauthorizedActor`] unless `actor` is the
    /// buyer or seller, and transition errors outside Pending.
    pub fn cancel(&mut self, actor: Actor, now: Timestamp) -> Result<(), StateError> {
        if !matches!(actor, Actor::Buyer | Actor::Seller) {
            return Err(StateError::UnauthorizedActor {
                actor,
                operation: "cancel",
                reason: "only a trade party cancels".to_string(),
            });
        }
        self.require_status(EscrowStatus::Pending, EscrowStatus::Cancelled)?;
        self.status = EscrowStatus::Cancelled;
        self.record(actor, EscrowEvent::Cancelled, now);
        Ok(())
    }

    /// Enter the disputed state, recording where the escrow came from.
    ///
    /// The engine enforces "no existing active dispute" and creates the
    /// dispute record; the aggregate only validates the escrow-side
    /// transition (Pending or Funded → Disputed, by a trade party).
    ///
    /// # Errors
    ///
    /// Returns [`StateError::UnauthorizedActor`] or transition errors.
    pub fn open_dispute(
        &mut self,
        dispute_id: DisputeId,
        actor: Actor,
        now: Timestamp,
    ) -> Result<(), StateError> {
        if !matches!(actor, Actor::Buyer | Actor::Seller) {
            return Err(StateError::UnauthorizedActor {
                actor,
                operation: "open_dispute",
                reason: "only a trade party opens a dispute".to_string(),
            });
        }
        if self.status.is_terminal() {
            return Err(StateError::TerminalState {
                escrow_id: self.id.to_string(),
                status: self.status.as_str().to_string(),
            });
        }
        if !matches!(self.status, EscrowStatus::Pending | EscrowStatus::Funded) {
            return Err(StateError::InvalidTransition {
                from: self.status.as_str().to_string(),
                to: EscrowStatus::Disputed.as_str().to_string(),
                reason: "disputes open only from Pending or Funded".to_string(),
            });
        }
        self.disputed_from = Some(self.status);
        self.status = EscrowStatus::Disputed;
        self.record(actor, EscrowEvent::DisputeOpened { dispute_id }, now);
        Ok(())
    }

    /// Apply a dispute resolution — the only legal exit from Disputed.
    ///
    /// Fund-moving outcomes land in the matching terminal state; a
    /// no-movement outcome returns the escrow to the state it held before
    /// the dispute.
    ///
    /// # Errors
    ///
    /// Returns transition errors outside Disputed.
    pub fn commit_resolution(
        &mut self,
        outcome: ResolutionOutcome,
        now: Timestamp,
    ) -> Result<(), StateError> {
        if self.status != EscrowStatus::Disputed {
            return Err(StateError::InvalidTransition {
                from: self.status.as_str().to_string(),
                to: "resolution".to_string(),
                reason: "only a disputed escrow accepts a resolution".to_string(),
            });
        }
        let outcome_str = outcome.as_str().to_string();
        self.status = match outcome {
            ResolutionOutcome::ReleasedToSeller { .. } => EscrowStatus::ResolvedReleased,
            ResolutionOutcome::RefundedToBuyer { .. } => EscrowStatus::ResolvedRefunded,
            ResolutionOutcome::ReturnedToPrior => {
                self.disputed_from.unwrap_or(EscrowStatus::Funded)
            }
        };
        self.disputed_from = None;
        self.record(
            Actor::Arbiter,
            EscrowEvent::DisputeResolved {
                outcome: outcome_str,
            },
            now,
        );
        Ok(())
    }

    /// Freeze a time-locked escrow whose deadline passed without
    /// auto-release: Funded → Expired.
    ///
    /// Funds remain custodied; this is a deliberately frozen state
    /// requiring manual or dispute intervention, not an auto-payout.
    /// Invoked by the engine's scheduler sweep.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::WrongKind`] for other kinds and
    /// [`StateError::InvalidTransition`] when the deadline has not
    /// passed, `auto_release` is set, or the escrow is not Funded.
    pub fn expire(&mut self, now: Timestamp) -> Result<(), StateError> {
        if self.kind != EscrowKind::TimeLocked {
            return Err(StateError::WrongKind {
                operation: "expire",
                kind: self.kind.as_str().to_string(),
                reason: "only time-locked escrows expire".to_string(),
            });
        }
        if self.auto_release {
            return Err(StateError::InvalidTransition {
                from: self.status.as_str().to_string(),
                to: EscrowStatus::Expired.as_str().to_string(),
                reason: "auto-release escrows release instead of expiring".to_string(),
            });
        }
        let past_deadline = self.release_date.map(|d| now > d).unwrap_or(false);
        if !past_deadline {
            return Err(StateError::InvalidTransition {
                from: self.status.as_str().to_string(),
                to: EscrowStatus::Expired.as_str().to_string(),
                reason: "release date has not passed".to_string(),
            });
        }
        self.require_status(EscrowStatus::Funded, EscrowStatus::Expired)?;
        self.status = EscrowStatus::Expired;
        self.record(Actor::System, EscrowEvent::Expired, now);
        Ok(())
    }

    // ── Accessors & helpers ────────────────────────────────────────

    /// Look up a milestone by id.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::MilestoneNotFound`] if absent.
    pub fn milestone(&self, id: MilestoneId) -> Result<&Milestone, StateError> {
        self.milestones
            .iter()
            .find(|m| m.id == id)
            .ok_or_else(|| StateError::MilestoneNotFound {
                escrow_id: self.id.to_string(),
                milestone_id: id.to_string(),
            })
    }

    fn milestone_mut(&mut self, id: MilestoneId) -> Result<&mut Milestone, StateError> {
        let escrow_id = self.id;
        self.milestones
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| StateError::MilestoneNotFound {
                escrow_id: escrow_id.to_string(),
                milestone_id: id.to_string(),
            })
    }

    /// Check the escrow is in the expected state for a transition.
    fn require_status(
        &self,
        expected: EscrowStatus,
        target: EscrowStatus,
    ) -> Result<(), StateError> {
        if self.status.is_terminal() {
            return Err(StateError::TerminalState {
                escrow_id: self.id.to_string(),
                status: self.status.as_str().to_string(),
            });
        }
        if self.status != expected {
            return Err(StateError::InvalidTransition {
                from: self.status.as_str().to_string(),
                to: target.as_str().to_string(),
                reason: format!("expected state {}, got {}", expected, self.status),
            });
        }
        Ok(())
    }

    /// Append to the activity log and bump `updated_at`.
    fn record(&mut self, actor: Actor, event: EscrowEvent, now: Timestamp) {
        self.activity.push(ActivityRecord {
            seq: self.activity.len() as u64,
            at: now,
            actor,
            event,
        });
        self.updated_at = now;
    }
}

/// Derive the milestone list from a plan, with amounts summing to the
/// total exactly.
fn build_milestones(
    escrow_id: EscrowId,
    plans: &[MilestonePlan],
    total: Amount,
    policy: ResidualPolicy,
) -> Result<Vec<Milestone>, StateError> {
    if plans.is_empty() {
        return Ok(Vec::new());
    }
    let mut sum_bp: u64 = 0;
    for plan in plans {
        let in_range =
            plan.percentage.is_finite() && plan.percentage > 0.0 && plan.percentage <= 100.0;
        let bp = basis_points(plan.percentage);
        if !in_range || bp == 0 {
            return Err(StateError::InvalidEscrow {
                reason: format!(
                    "milestone {:?} percentage {} outside (0, 100]",
                    plan.title, plan.percentage
                ),
            });
        }
        sum_bp += u64::from(bp);
    }
    let diff = sum_bp.abs_diff(u64::from(FULL_BASIS_POINTS));
    if diff > u64::from(SUM_TOLERANCE_BASIS_POINTS) {
        return Err(StateError::InvalidEscrow {
            reason: format!(
                "milestone percentages sum to {sum_bp} basis points, expected {FULL_BASIS_POINTS}"
            ),
        });
    }

    let percentages: Vec<f64> = plans.iter().map(|p| p.percentage).collect();
    let amounts = allocate_portions(total, &percentages, policy);
    Ok(plans
        .iter()
        .zip(amounts)
        .enumerate()
        .map(|(i, (plan, amount))| Milestone {
            id: MilestoneId::new(),
            escrow_id,
            title: plan.title.clone(),
            amount,
            percentage: plan.percentage,
            status: MilestoneStatus::Pending,
            order_index: i as u32,
            completed_at: None,
            released_at: None,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> Address {
        Address::new(s).unwrap()
    }

    fn blob() -> EncryptedKeyBlob {
        EncryptedKeyBlob::from_bytes(vec![0u8; EncryptedKeyBlob::MIN_LEN]).unwrap()
    }

    fn ts(s: &str) -> Timestamp {
        Timestamp::parse(s).unwrap()
    }

    fn params(kind: EscrowKind) -> EscrowParams {
        EscrowParams {
            buyer: addr("buyer-main"),
            seller: addr("seller-main"),
            total_amount: Amount::new(1000),
            currency: "USD".to_string(),
            kind,
            release_date: match kind {
                EscrowKind::TimeLocked => Some(ts("2026-03-01T00:00:00Z")),
                _ => None,
            },
            auto_release: false,
            recipients: Vec::new(),
            milestones: match kind {
                EscrowKind::Milestone => vec![
                    MilestonePlan::new("Design", 30.0),
                    MilestonePlan::new("Build", 50.0),
                    MilestonePlan::new("Deliver", 20.0),
                ],
                _ => Vec::new(),
            },
            deposit_address: addr("deposit-addr"),
            encrypted_custody_key: blob(),
        }
    }

    fn create(kind: EscrowKind) -> Escrow {
        Escrow::create(
            params(kind),
            ResidualPolicy::AssignToFirst,
            &SplitConfig::default(),
            ts("2026-01-01T00:00:00Z"),
        )
        .unwrap()
    }

    fn proof() -> TxHash {
        TxHash::new("0xfeedbead01").unwrap()
    }

    fn fund(escrow: &mut Escrow) {
        escrow
            .mark_funded(proof(), Actor::Buyer, ts("2026-01-02T00:00:00Z"))
            .unwrap();
    }

    // ── Creation ───────────────────────────────────────────────────

    #[test]
    fn create_starts_pending_with_default_recipient() {
        let escrow = create(EscrowKind::Simple);
        assert_eq!(escrow.status, EscrowStatus::Pending);
        assert_eq!(escrow.recipients.len(), 1);
        assert_eq!(escrow.recipients[0].address, escrow.seller);
        assert_eq!(escrow.recipients[0].percentage, 100.0);
        assert_eq!(escrow.activity.len(), 1);
        assert!(matches!(escrow.activity[0].event, EscrowEvent::Created));
    }

    #[test]
    fn create_rejects_zero_amount() {
        let mut p = params(EscrowKind::Simple);
        p.total_amount = Amount::ZERO;
        let err = Escrow::create(
            p,
            ResidualPolicy::AssignToFirst,
            &SplitConfig::default(),
            ts("2026-01-01T00:00:00Z"),
        )
        .unwrap_err();
        assert!(matches!(err, StateError::Validation(_)));
    }

    #[test]
    fn create_rejects_same_party_both_sides() {
        let mut p = params(EscrowKind::Simple);
        p.seller = addr("BUYER-MAIN");
        assert!(matches!(
            Escrow::create(
                p,
                ResidualPolicy::AssignToFirst,
                &SplitConfig::default(),
                ts("2026-01-01T00:00:00Z"),
            )
            .unwrap_err(),
            StateError::InvalidEscrow { .. }
        ));
    }

    #[test]
    fn create_rejects_time_locked_without_date() {
        let mut p = params(EscrowKind::TimeLocked);
        p.release_date = None;
        assert!(matches!(
            Escrow::create(
                p,
                ResidualPolicy::AssignToFirst,
                &SplitConfig::default(),
                ts("2026-01-01T00:00:00Z"),
            )
            .unwrap_err(),
            StateError::InvalidEscrow { .. }
        ));
    }

    #[test]
    fn create_rejects_lowercase_currency() {
        let mut p = params(EscrowKind::Simple);
        p.currency = "usd".to_string();
        assert!(Escrow::create(
            p,
            ResidualPolicy::AssignToFirst,
            &SplitConfig::default(),
            ts("2026-01-01T00:00:00Z"),
        )
        .is_err());
    }

    #[test]
    fn milestone_amounts_sum_to_total_exactly() {
        let mut p = params(EscrowKind::Milestone);
        p.total_amount = Amount::new(1001);
        p.milestones = vec![
            MilestonePlan::new("A", 33.33),
            MilestonePlan::new("B", 33.33),
            MilestonePlan::new("C", 33.34),
        ];
        let escrow = Escrow::create(
            p,
            ResidualPolicy::AssignToFirst,
            &SplitConfig::default(),
            ts("2026-01-01T00:00:00Z"),
        )
        .unwrap();
        let sum: u64 = escrow.milestones.iter().map(|m| m.amount.value()).sum();
        assert_eq!(sum, 1001);
        assert_eq!(
            escrow.milestones.iter().map(|m| m.order_index).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
    }

    #[test]
    fn milestone_plan_sum_must_be_100() {
        let mut p = params(EscrowKind::Milestone);
        p.milestones = vec![MilestonePlan::new("A", 30.0), MilestonePlan::new("B", 30.0)];
        assert!(matches!(
            Escrow::create(
                p,
                ResidualPolicy::AssignToFirst,
                &SplitConfig::default(),
                ts("2026-01-01T00:00:00Z"),
            )
            .unwrap_err(),
            StateError::InvalidEscrow { .. }
        ));
    }

    // ── Funding ────────────────────────────────────────────────────

    #[test]
    fn mark_funded_transitions_and_records_proof() {
        let mut escrow = create(EscrowKind::Simple);
        fund(&mut escrow);
        assert_eq!(escrow.status, EscrowStatus::Funded);
        assert_eq!(escrow.funding_proof, Some(proof()));
    }

    #[test]
    fn mark_funded_idempotent_on_same_proof() {
        let mut escrow = create(EscrowKind::Simple);
        fund(&mut escrow);
        let log_len = escrow.activity.len();
        escrow
            .mark_funded(proof(), Actor::Buyer, ts("2026-01-03T00:00:00Z"))
            .unwrap();
        // No second Funded record, no timestamp bump.
        assert_eq!(escrow.activity.len(), log_len);
        assert_eq!(escrow.updated_at, ts("2026-01-02T00:00:00Z"));
    }

    #[test]
    fn mark_funded_rejects_different_proof_when_funded() {
        let mut escrow = create(EscrowKind::Simple);
        fund(&mut escrow);
        let err = escrow
            .mark_funded(
                TxHash::new("0xdeadbeef02").unwrap(),
                Actor::Buyer,
                ts("2026-01-03T00:00:00Z"),
            )
            .unwrap_err();
        assert!(matches!(err, StateError::InvalidTransition { .. }));
    }

    #[test]
    fn mark_funded_rejects_non_buyer() {
        let mut escrow = create(EscrowKind::Simple);
        assert!(matches!(
            escrow
                .mark_funded(proof(), Actor::Seller, ts("2026-01-02T00:00:00Z"))
                .unwrap_err(),
            StateError::UnauthorizedActor { .. }
        ));
    }

    // ── Release ────────────────────────────────────────────────────

    #[test]
    fn release_authorize_then_commit() {
        let mut escrow = create(EscrowKind::Simple);
        fund(&mut escrow);
        escrow
            .authorize_release(Actor::Buyer, ts("2026-01-05T00:00:00Z"))
            .unwrap();
        escrow
            .commit_release(
                vec!["tx-1".to_string()],
                Actor::Buyer,
                ts("2026-01-05T00:00:00Z"),
            )
            .unwrap();
        assert_eq!(escrow.status, EscrowStatus::Released);
        assert!(escrow.status.is_terminal());
    }

    #[test]
    fn release_rejected_before_funding() {
        let escrow = create(EscrowKind::Simple);
        assert!(matches!(
            escrow
                .authorize_release(Actor::Buyer, ts("2026-01-05T00:00:00Z"))
                .unwrap_err(),
            StateError::InvalidTransition { .. }
        ));
    }

    #[test]
    fn release_rejected_for_seller() {
        let mut escrow = create(EscrowKind::Simple);
        fund(&mut escrow);
        assert!(matches!(
            escrow
                .authorize_release(Actor::Seller, ts("2026-01-05T00:00:00Z"))
                .unwrap_err(),
            StateError::UnauthorizedActor { .. }
        ));
    }

    #[test]
    fn auto_release_requires_due_date_and_flag() {
        let mut p = params(EscrowKind::TimeLocked);
        p.auto_release = true;
        let mut escrow = Escrow::create(
            p,
            ResidualPolicy::AssignToFirst,
            &SplitConfig::default(),
            ts("2026-01-01T00:00:00Z"),
        )
        .unwrap();
        fund(&mut escrow);
        // Before the release date: System may not release.
        assert!(escrow
            .authorize_release(Actor::System, ts("2026-02-01T00:00:00Z"))
            .is_err());
        // At the release date: System may release.
        assert!(escrow
            .authorize_release(Actor::System, ts("2026-03-01T00:00:00Z"))
            .is_ok());
    }

    #[test]
    fn system_release_rejected_without_auto_release() {
        let mut escrow = create(EscrowKind::TimeLocked);
        fund(&mut escrow);
        assert!(matches!(
            escrow
                .authorize_release(Actor::System, ts("2026-04-01T00:00:00Z"))
                .unwrap_err(),
            StateError::UnauthorizedActor { .. }
        ));
    }

    #[test]
    fn milestone_escrow_rejects_full_release() {
        let mut escrow = create(EscrowKind::Milestone);
        fund(&mut escrow);
        assert!(matches!(
            escrow
                .authorize_release(Actor::Buyer, ts("2026-01-05T00:00:00Z"))
                .unwrap_err(),
            StateError::WrongKind { .. }
        ));
    }

    // ── Milestones ─────────────────────────────────────────────────

    #[test]
    fn milestones_complete_in_order() {
        let mut escrow = create(EscrowKind::Milestone);
        fund(&mut escrow);
        let m0 = escrow.milestones[0].id;
        let m1 = escrow.milestones[1].id;

        // m1 before m0 is rejected.
        assert!(matches!(
            escrow
                .complete_milestone(m1, Actor::Seller, ts("2026-01-03T00:00:00Z"))
                .unwrap_err(),
            StateError::InvalidTransition { .. }
        ));
        escrow
            .complete_milestone(m0, Actor::Seller, ts("2026-01-03T00:00:00Z"))
            .unwrap();
        assert_eq!(escrow.milestones[0].status, MilestoneStatus::Completed);
        assert!(escrow.milestones[0].completed_at.is_some());
    }

    #[test]
    fn complete_rejected_for_buyer() {
        let mut escrow = create(EscrowKind::Milestone);
        fund(&mut escrow);
        let m0 = escrow.milestones[0].id;
        assert!(matches!(
            escrow
                .complete_milestone(m0, Actor::Buyer, ts("2026-01-03T00:00:00Z"))
                .unwrap_err(),
            StateError::UnauthorizedActor { .. }
        ));
    }

    #[test]
    fn milestone_release_requires_lower_indexes_released() {
        let mut escrow = create(EscrowKind::Milestone);
        fund(&mut escrow);
        let m0 = escrow.milestones[0].id;
        let m1 = escrow.milestones[1].id;
        escrow
            .complete_milestone(m0, Actor::Seller, ts("2026-01-03T00:00:00Z"))
            .unwrap();
        escrow
            .complete_milestone(m1, Actor::Seller, ts("2026-01-03T01:00:00Z"))
            .unwrap();

        // m1 cannot release while m0 is unreleased.
        assert!(matches!(
            escrow
                .authorize_milestone_release(m1, Actor::Buyer)
                .unwrap_err(),
            StateError::InvalidTransition { .. }
        ));
        let amount = escrow.authorize_milestone_release(m0, Actor::Buyer).unwrap();
        assert_eq!(amount, Amount::new(300));
    }

    #[test]
    fn last_milestone_release_flips_escrow_to_released() {
        let mut escrow = create(EscrowKind::Milestone);
        fund(&mut escrow);
        let ids: Vec<MilestoneId> = escrow.milestones.iter().map(|m| m.id).collect();
        for (i, id) in ids.iter().enumerate() {
            let t = ts(&format!("2026-01-0{}T00:00:00Z", i + 3));
            escrow.complete_milestone(*id, Actor::Seller, t).unwrap();
            escrow.authorize_milestone_release(*id, Actor::Buyer).unwrap();
            escrow
                .commit_milestone_release(*id, format!("tx-{i}"), Actor::Buyer, t)
                .unwrap();
        }
        assert_eq!(escrow.status, EscrowStatus::Released);
        assert!(escrow.all_milestones_released());
    }

    #[test]
    fn released_milestone_is_immutable() {
        let mut escrow = create(EscrowKind::Milestone);
        fund(&mut escrow);
        let m0 = escrow.milestones[0].id;
        escrow
            .complete_milestone(m0, Actor::Seller, ts("2026-01-03T00:00:00Z"))
            .unwrap();
        escrow
            .commit_milestone_release(m0, "tx-0".to_string(), Actor::Buyer, ts("2026-01-04T00:00:00Z"))
            .unwrap();
        assert!(escrow
            .complete_milestone(m0, Actor::Seller, ts("2026-01-05T00:00:00Z"))
            .is_err());
        assert!(escrow
            .commit_milestone_release(m0, "tx-0b".to_string(), Actor::Buyer, ts("2026-01-05T00:00:00Z"))
            .is_err());
    }

    // ── Cancellation ───────────────────────────────────────────────

    #[test]
    fn cancel_from_pending_only() {
        let mut escrow = create(EscrowKind::Simple);
        escrow.cancel(Actor::Seller, ts("2026-01-02T00:00:00Z")).unwrap();
        assert_eq!(escrow.status, EscrowStatus::Cancelled);

        let mut funded = create(EscrowKind::Simple);
        fund(&mut funded);
        assert!(funded.cancel(Actor::Buyer, ts("2026-01-03T00:00:00Z")).is_err());
    }

    // ── Disputes ───────────────────────────────────────────────────

    #[test]
    fn dispute_records_prior_state() {
        let mut escrow = create(EscrowKind::Simple);
        fund(&mut escrow);
        escrow
            .open_dispute(DisputeId::new(), Actor::Buyer, ts("2026-01-04T00:00:00Z"))
            .unwrap();
        assert_eq!(escrow.status, EscrowStatus::Disputed);
        assert_eq!(escrow.disputed_from, Some(EscrowStatus::Funded));
    }

    #[test]
    fn resolution_is_only_exit_from_disputed() {
        let mut escrow = create(EscrowKind::Simple);
        fund(&mut escrow);
        escrow
            .open_dispute(DisputeId::new(), Actor::Seller, ts("2026-01-04T00:00:00Z"))
            .unwrap();

        // No other operation may proceed while disputed.
        assert!(escrow
            .authorize_release(Actor::Buyer, ts("2026-01-05T00:00:00Z"))
            .is_err());
        assert!(escrow.cancel(Actor::Buyer, ts("2026-01-05T00:00:00Z")).is_err());

        escrow
            .commit_resolution(
                ResolutionOutcome::RefundedToBuyer {
                    tx_id: "tx-refund".to_string(),
                },
                ts("2026-01-06T00:00:00Z"),
            )
            .unwrap();
        assert_eq!(escrow.status, EscrowStatus::ResolvedRefunded);
        assert!(escrow.status.is_terminal());
    }

    #[test]
    fn no_movement_resolution_returns_to_prior_state() {
        let mut escrow = create(EscrowKind::Simple);
        fund(&mut escrow);
        escrow
            .open_dispute(DisputeId::new(), Actor::Buyer, ts("2026-01-04T00:00:00Z"))
            .unwrap();
        escrow
            .commit_resolution(ResolutionOutcome::ReturnedToPrior, ts("2026-01-05T00:00:00Z"))
            .unwrap();
        assert_eq!(escrow.status, EscrowStatus::Funded);
        assert_eq!(escrow.disputed_from, None);
    }

    #[test]
    fn resolution_rejected_outside_disputed() {
        let mut escrow = create(EscrowKind::Simple);
        assert!(escrow
            .commit_resolution(ResolutionOutcome::ReturnedToPrior, ts("2026-01-05T00:00:00Z"))
            .is_err());
    }

    // ── Expiry ─────────────────────────────────────────────────────

    #[test]
    fn expire_freezes_overdue_time_locked_escrow() {
        let mut escrow = create(EscrowKind::TimeLocked);
        fund(&mut escrow);
        // Deadline 2026-03-01; not yet passed.
        assert!(escrow.expire(ts("2026-03-01T00:00:00Z")).is_err());
        escrow.expire(ts("2026-03-02T00:00:00Z")).unwrap();
        assert_eq!(escrow.status, EscrowStatus::Expired);
        assert!(escrow.status.is_terminal());
    }

    #[test]
    fn expire_rejected_for_auto_release() {
        let mut p = params(EscrowKind::TimeLocked);
        p.auto_release = true;
        let mut escrow = Escrow::create(
            p,
            ResidualPolicy::AssignToFirst,
            &SplitConfig::default(),
            ts("2026-01-01T00:00:00Z"),
        )
        .unwrap();
        fund(&mut escrow);
        assert!(escrow.expire(ts("2026-04-01T00:00:00Z")).is_err());
    }

    #[test]
    fn expire_rejected_for_simple_escrow() {
        let mut escrow = create(EscrowKind::Simple);
        fund(&mut escrow);
        assert!(matches!(
            escrow.expire(ts("2026-04-01T00:00:00Z")).unwrap_err(),
            StateError::WrongKind { .. }
        ));
    }

    // ── Invariants ─────────────────────────────────────────────────

    #[test]
    fn terminal_states_reject_everything() {
        let mut escrow = create(EscrowKind::Simple);
        escrow.cancel(Actor::Buyer, ts("2026-01-02T00:00:00Z")).unwrap();
        assert!(escrow
            .mark_funded(proof(), Actor::Buyer, ts("2026-01-03T00:00:00Z"))
            .is_err());
        assert!(escrow
            .open_dispute(DisputeId::new(), Actor::Buyer, ts("2026-01-03T00:00:00Z"))
            .is_err());
        assert!(escrow.cancel(Actor::Buyer, ts("2026-01-03T00:00:00Z")).is_err());
    }

    #[test]
    fn activity_log_sequence_is_contiguous() {
        let mut escrow = create(EscrowKind::Simple);
        fund(&mut escrow);
        escrow
            .authorize_release(Actor::Buyer, ts("2026-01-05T00:00:00Z"))
            .unwrap();
        escrow
            .commit_release(vec!["tx-1".to_string()], Actor::Buyer, ts("2026-01-05T00:00:00Z"))
            .unwrap();
        let seqs: Vec<u64> = escrow.activity.iter().map(|r| r.seq).collect();
        assert_eq!(seqs, vec![0, 1, 2]);
    }

    #[test]
    fn failed_operation_leaves_state_unchanged() {
        let mut escrow = create(EscrowKind::Simple);
        let before = escrow.clone();
        assert!(escrow
            .commit_release(vec!["tx-1".to_string()], Actor::Buyer, ts("2026-01-05T00:00:00Z"))
            .is_err());
        assert_eq!(escrow, before);
    }

    #[test]
    fn escrow_serialization_roundtrip() {
        let escrow = create(EscrowKind::Milestone);
        let json = serde_json::to_string(&escrow).unwrap();
        let back: Escrow = serde_json::from_str(&json).unwrap();
        assert_eq!(back, escrow);
    }

    #[test]
    fn status_valid_transitions_match_graph() {
        assert!(EscrowStatus::Pending
            .valid_transitions()
            .contains(&EscrowStatus::Funded));
        assert!(EscrowStatus::Funded
            .valid_transitions()
            .contains(&EscrowStatus::Expired));
        assert!(EscrowStatus::Released.valid_transitions().is_empty());
        assert!(EscrowStatus::Cancelled.valid_transitions().is_empty());
    }
}

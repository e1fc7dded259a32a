//! # Dispute Lifecycle
//!
//! Manages dispute initiation, evidence collection, arbiter assignment, and
//! resolution through the state machine: `Open → UnderReview →
//! EvidenceCollection → Arbitration → Resolved → Closed`, with `Escalated`
//! reachable from any pre-resolution state.
//!
//! ## Design Choice: Validated Enum over Typestate
//!
//! The dispute uses a runtime-checked enum rather than typestate. Two
//! factors drive this decision:
//!
//! 1. **Escalation from any pre-resolution state.** Typestate would require
//!    duplicating `escalate()` across four `impl` blocks with identical
//!    logic but different source state types.
//!
//! 2. **Serialization frequency.** Disputes are persisted and exchanged
//!    where the state is not known at compile time; a validated enum
//!    serializes directly via serde.
//!
//! The dispute aggregate is pure. Escrow-side coupling — the "at most one
//! active dispute per escrow" rule, the escrow's own Disputed transition,
//! and the execution of the [`SettlementDirective`] a resolution produces —
//! is orchestrated by `escrow-engine`.

use serde::{Deserialize, Serialize};

use escrow_core::{Actor, Address, Amount, ContentDigest, DisputeId, EscrowId, EvidenceId, Timestamp};

use crate::error::ArbitrationError;

// ── Dispute Status ─────────────────────────────────────────────────────

/// The lifecycle state of a dispute.
///
/// ## Transition Graph
///
/// ```text
/// Open ──assign_arbiter()──▶ UnderReview ──begin_evidence_collection()──▶
///                                                    EvidenceCollection
///                                                            │
///                                                  begin_arbitration()
///                                                            │
///                                                            ▼
///                                                       Arbitration
///                                                            │
///                                                        resolve()
///                                                            │
///                                                            ▼
///                                                        Resolved ──close()──▶ Closed
///
/// escalate(): {Open, UnderReview, EvidenceCollection, Arbitration} ──▶ Escalated
/// ```
///
/// Closed and Escalated are terminal for this cycle; an escalation spawns
/// an oversight cycle outside this engine through the escalation hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DisputeStatus {
    /// Dispute has been opened by a trade party.
    Open,
    /// An arbiter is assigned and reviewing the claim.
    UnderReview,
    /// Evidence collection phase is open.
    EvidenceCollection,
    /// The arbiter is deliberating; evidence is closed.
    Arbitration,
    /// The arbiter has rendered a resolution.
    Resolved,
    /// Dispute lifecycle complete. Terminal state.
    Closed,
    /// Appealed out of this engine's jurisdiction. Terminal state.
    Escalated,
}

impl DisputeStatus {
    /// The canonical string name of this state.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::UnderReview => "UNDER_REVIEW",
            Self::EvidenceCollection => "EVIDENCE_COLLECTION",
            Self::Arbitration => "ARBITRATION",
            Self::Resolved => "RESOLVED",
            Self::Closed => "CLOSED",
            Self::Escalated => "ESCALATED",
        }
    }

    /// Whether this state is terminal (no further transitions allowed).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Escalated)
    }

    /// Whether a resolution has not yet been rendered in this state.
    pub fn is_pre_resolution(&self) -> bool {
        matches!(
            self,
            Self::Open | Self::UnderReview | Self::EvidenceCollection | Self::Arbitration
        )
    }

    /// Valid target states from this state.
    pub fn valid_transitions(&self) -> &'static [DisputeStatus] {
        match self {
            Self::Open => &[Self::UnderReview, Self::Escalated],
            Self::UnderReview => &[Self::EvidenceCollection, Self::Escalated],
            Self::EvidenceCollection => &[Self::Arbitration, Self::Escalated],
            Self::Arbitration => &[Self::Resolved, Self::Escalated],
            Self::Resolved => &[Self::Closed],
            Self::Closed | Self::Escalated => &[],
        }
    }
}

impl std::fmt::Display for DisputeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Dispute Types ──────────────────────────────────────────────────────

/// Categories of dispute supported by the arbitration module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DisputeType {
    /// Goods or services were never delivered.
    NonDelivery,
    /// Delivered work does not meet the agreed quality.
    QualityClaim,
    /// An agreed deadline was missed.
    DeadlineMissed,
    /// The parties disagree on the amount owed.
    AmountDisagreement,
    /// Any other claim.
    Other,
}

impl DisputeType {
    /// All dispute types as a slice.
    pub fn all() -> &'static [DisputeType] {
        &[
            Self::NonDelivery,
            Self::QualityClaim,
            Self::DeadlineMissed,
            Self::AmountDisagreement,
            Self::Other,
        ]
    }

    /// The canonical string identifier for serialization.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NonDelivery => "non_delivery",
            Self::QualityClaim => "quality_claim",
            Self::DeadlineMissed => "deadline_missed",
            Self::AmountDisagreement => "amount_disagreement",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for DisputeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Parties & Arbiter ──────────────────────────────────────────────────

/// A trade party in a dispute, tagged with its escrow role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Party {
    /// The party's address.
    pub address: Address,
    /// The party's role in the underlying escrow (Buyer or Seller).
    pub role: Actor,
}

impl Party {
    /// Construct a party record.
    ///
    /// # Errors
    ///
    /// Returns an error for roles other than Buyer or Seller: arbiters and
    /// the system are never dispute parties.
    pub fn new(address: Address, role: Actor) -> Result<Self, ArbitrationError> {
        if !matches!(role, Actor::Buyer | Actor::Seller) {
            return Err(ArbitrationError::InvalidResolution {
                reason: format!("dispute party role must be buyer or seller, got {role}"),
            });
        }
        Ok(Self { address, role })
    }
}

/// The neutral third party assigned to decide a dispute.
///
/// Exactly one arbiter is active at a time; replacement is allowed while
/// evidence is still being gathered, never once arbitration has begun.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Arbiter {
    /// Stable identifier of the arbiter (operator account, service id).
    pub id: String,
    /// Display name.
    pub name: String,
}

// ── Evidence & Timeline ────────────────────────────────────────────────

/// One item of submitted evidence.
///
/// The artifact itself lives outside the engine; the item carries a content
/// digest so later tampering with the artifact is detectable against the
/// recorded digest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceItem {
    /// Unique evidence identifier.
    pub id: EvidenceId,
    /// Who submitted the evidence.
    pub submitted_by: Actor,
    /// Human-readable description of the artifact.
    pub description: String,
    /// Content digest of the artifact.
    pub digest: ContentDigest,
    /// When the evidence was submitted (UTC).
    pub submitted_at: Timestamp,
}

impl EvidenceItem {
    /// Whether an artifact still matches the digest recorded at submission.
    pub fn verify_integrity(&self, artifact: &escrow_core::CanonicalBytes) -> bool {
        escrow_core::sha256_digest(artifact) == self.digest
    }
}

/// A typed lifecycle event, recorded in the append-only timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DisputeEvent {
    /// The dispute was opened.
    Opened,
    /// Evidence was submitted.
    EvidenceSubmitted {
        /// The submitted item.
        evidence_id: EvidenceId,
    },
    /// An arbiter was assigned.
    ArbiterAssigned {
        /// The assigned arbiter's id.
        arbiter_id: String,
    },
    /// The active arbiter was replaced.
    ArbiterReplaced {
        /// The previous arbiter's id.
        previous: String,
        /// The replacement arbiter's id.
        replacement: String,
    },
    /// The evidence collection phase opened.
    EvidenceCollectionStarted,
    /// The arbiter began deliberation; evidence closed.
    ArbitrationStarted,
    /// A resolution was rendered.
    Resolved {
        /// The resolution category.
        resolution_type: ResolutionType,
    },
    /// The dispute was closed.
    Closed,
    /// The dispute was escalated out of this engine.
    Escalated {
        /// Why the dispute was escalated.
        reason: String,
    },
}

/// One entry of the append-only dispute timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEntry {
    /// Monotonic sequence number within this dispute, starting at 0.
    pub seq: u64,
    /// When the event occurred (UTC).
    pub at: Timestamp,
    /// What happened.
    pub event: DisputeEvent,
}

// ── Resolution ─────────────────────────────────────────────────────────

/// The category of a rendered resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResolutionType {
    /// Return the full custodied amount to the buyer.
    RefundBuyer,
    /// Pay the custodied amount out to the seller side.
    ReleaseSeller,
    /// Return part of the custodied amount to the buyer.
    PartialRefund,
    /// The seller reworks the deliverable; no fund movement.
    Rework,
    /// The seller replaces the deliverable; no fund movement.
    Replacement,
    /// The parties agreed a compromise outside the engine; no fund movement.
    Compromise,
    /// The claim was dismissed; no fund movement.
    Dismissed,
}

impl ResolutionType {
    /// All resolution types as a slice.
    pub fn all() -> &'static [ResolutionType] {
        &[
            Self::RefundBuyer,
            Self::ReleaseSeller,
            Self::PartialRefund,
            Self::Rework,
            Self::Replacement,
            Self::Compromise,
            Self::Dismissed,
        ]
    }

    /// The canonical string identifier for serialization.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RefundBuyer => "refund_buyer",
            Self::ReleaseSeller => "release_seller",
            Self::PartialRefund => "partial_refund",
            Self::Rework => "rework",
            Self::Replacement => "replacement",
            Self::Compromise => "compromise",
            Self::Dismissed => "dismissed",
        }
    }

    /// Whether this resolution type moves custodied funds.
    pub fn moves_funds(&self) -> bool {
        matches!(self, Self::RefundBuyer | Self::ReleaseSeller | Self::PartialRefund)
    }
}

impl std::fmt::Display for ResolutionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rendered resolution, recorded on the dispute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    /// The resolution category.
    pub resolution_type: ResolutionType,
    /// The amount involved, for [`ResolutionType::PartialRefund`].
    pub amount: Option<Amount>,
    /// The arbiter's written reasoning.
    pub reason: String,
    /// The id of the arbiter who decided.
    pub decided_by: String,
    /// When the resolution was rendered (UTC).
    pub decided_at: Timestamp,
}

impl Resolution {
    /// Whether another resolution carries the same decision.
    ///
    /// `decided_at` is excluded: a retried identical decision is the same
    /// decision regardless of when the retry arrived.
    fn same_decision(&self, other: &Resolution) -> bool {
        self.resolution_type == other.resolution_type
            && self.amount == other.amount
            && self.reason == other.reason
            && self.decided_by == other.decided_by
    }
}

/// The fund movement a resolution demands of the engine.
///
/// Produced by [`Dispute::resolve`], executed by the settlement layer, and
/// committed to the escrow through its resolution transition — the only
/// legal exit from the escrow's Disputed state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SettlementDirective {
    /// Return `amount` to the buyer (full total for RefundBuyer, the
    /// decided portion for PartialRefund).
    RefundBuyer {
        /// The amount to return.
        amount: Amount,
    },
    /// Pay the custodied total out through the escrow's payout split table.
    ReleaseSeller,
    /// No fund movement; the escrow returns to the state it held before
    /// the dispute.
    NoMovement,
}

// ── The Dispute ────────────────────────────────────────────────────────

/// A dispute over one escrow, advanced through the arbitration lifecycle.
///
/// Created via [`Dispute::open`], then advanced by lifecycle methods that
/// validate state and actor before mutating.
///
/// ## Security Invariant
///
/// Evidence and timeline are append-only: nothing removes or rewrites an
/// entry, so the record of how a resolution was reached survives intact.
/// Terminal states reject all further transitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dispute {
    /// Unique dispute identifier.
    pub id: DisputeId,
    /// The escrow this dispute concerns. At most one active dispute per
    /// escrow, enforced by the engine.
    pub escrow_id: EscrowId,
    /// Category of the claim.
    pub kind: DisputeType,
    /// Current lifecycle state.
    pub status: DisputeStatus,
    /// The party that opened the dispute.
    pub claimant: Party,
    /// The responding party.
    pub respondent: Party,
    /// The amount in contention, smallest currency unit.
    pub disputed_amount: Amount,
    /// The claimant's statement of the claim.
    pub reason: String,
    /// Submitted evidence, append-only.
    pub evidence: Vec<EvidenceItem>,
    /// Lifecycle timeline, append-only.
    pub timeline: Vec<TimelineEntry>,
    /// The assigned arbiter, if any. Exactly one active at a time.
    pub arbiter: Option<Arbiter>,
    /// The rendered resolution, once decided.
    pub resolution: Option<Resolution>,
    /// When the dispute was opened (UTC).
    pub opened_at: Timestamp,
    /// Advisory resolution deadline: past it the dispute is *eligible* for
    /// escalation; nothing auto-transitions.
    pub resolution_deadline: Timestamp,
    /// When the dispute was last mutated (UTC).
    pub updated_at: Timestamp,
}

impl Dispute {
    /// Open a dispute in the [`Open`](DisputeStatus::Open) state.
    ///
    /// This is the only constructor. The engine checks the escrow-side
    /// preconditions (escrow Pending or Funded, no active dispute) before
    /// calling and flips the escrow to Disputed afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`ArbitrationError::InvalidResolution`] for a zero disputed
    /// amount or identical claimant and respondent roles.
    #[allow(clippy::too_many_arguments)]
    pub fn open(
        escrow_id: EscrowId,
        claimant: Party,
        respondent: Party,
        disputed_amount: Amount,
        kind: DisputeType,
        reason: impl Into<String>,
        now: Timestamp,
        deadline_window_days: i64,
    ) -> Result<Self, ArbitrationError> {
        if disputed_amount.is_zero() {
            return Err(ArbitrationError::InvalidResolution {
                reason: "disputed amount must be positive".to_string(),
            });
        }
        if claimant.role == respondent.role {
            return Err(ArbitrationError::InvalidResolution {
                reason: "claimant and respondent must hold opposite roles".to_string(),
            });
        }
        let mut dispute = Self {
            id: DisputeId::new(),
            escrow_id,
            kind,
            status: DisputeStatus::Open,
            claimant,
            respondent,
            disputed_amount,
            reason: reason.into(),
            evidence: Vec::new(),
            timeline: Vec::new(),
            arbiter: None,
            resolution: None,
            opened_at: now,
            resolution_deadline: now.plus_days(deadline_window_days),
            updated_at: now,
        };
        dispute.record(DisputeEvent::Opened, now);
        Ok(dispute)
    }

    /// Append an item of evidence.
    ///
    /// Allowed only while evidence is still being gathered: Open,
    /// UnderReview, or EvidenceCollection.
    ///
    /// # Errors
    ///
    /// Returns [`ArbitrationError::EvidenceClosed`] in any other state.
    pub fn submit_evidence(
        &mut self,
        submitted_by: Actor,
        description: impl Into<String>,
        digest: ContentDigest,
        now: Timestamp,
    ) -> Result<EvidenceId, ArbitrationError> {
        let accepting = matches!(
            self.status,
            DisputeStatus::Open | DisputeStatus::UnderReview | DisputeStatus::EvidenceCollection
        );
        if !accepting {
            return Err(ArbitrationError::EvidenceClosed {
                dispute_id: self.id.to_string(),
                status: self.status.as_str().to_string(),
            });
        }
        let evidence_id = EvidenceId::new();
        self.evidence.push(EvidenceItem {
            id: evidence_id,
            submitted_by,
            description: description.into(),
            digest,
            submitted_at: now,
        });
        self.record(DisputeEvent::EvidenceSubmitted { evidence_id }, now);
        Ok(evidence_id)
    }

    /// Assign or replace the arbiter.
    ///
    /// First assignment transitions Open → UnderReview. Replacement is
    /// allowed while evidence is still being gathered (UnderReview or
    /// EvidenceCollection, no status change), never once arbitration has
    /// begun.
    ///
    /// # Errors
    ///
    /// Returns [`ArbitrationError::ArbiterLocked`] from Arbitration onward
    /// and terminal-state errors past that.
    pub fn assign_arbiter(
        &mut self,
        arbiter: Arbiter,
        now: Timestamp,
    ) -> Result<(), ArbitrationError> {
        if self.status.is_terminal() {
            return Err(ArbitrationError::TerminalState {
                dispute_id: self.id.to_string(),
                status: self.status.as_str().to_string(),
            });
        }
        match self.status {
            DisputeStatus::Open => {
                let arbiter_id = arbiter.id.clone();
                self.arbiter = Some(arbiter);
                self.status = DisputeStatus::UnderReview;
                self.record(DisputeEvent::ArbiterAssigned { arbiter_id }, now);
                Ok(())
            }
            DisputeStatus::UnderReview | DisputeStatus::EvidenceCollection => {
                let previous = self
                    .arbiter
                    .replace(arbiter)
                    .map(|a| a.id)
                    .unwrap_or_default();
                let replacement = self.arbiter.as_ref().map(|a| a.id.clone()).unwrap_or_default();
                self.record(
                    DisputeEvent::ArbiterReplaced {
                        previous,
                        replacement,
                    },
                    now,
                );
                Ok(())
            }
            DisputeStatus::Arbitration | DisputeStatus::Resolved => {
                Err(ArbitrationError::ArbiterLocked {
                    dispute_id: self.id.to_string(),
                    status: self.status.as_str().to_string(),
                    reason: "arbiter replacement ends when arbitration begins".to_string(),
                })
            }
            DisputeStatus::Closed | DisputeStatus::Escalated => unreachable!("terminal handled"),
        }
    }

    /// Transition UnderReview → EvidenceCollection.
    ///
    /// # Errors
    ///
    /// Returns [`ArbitrationError::NotAssignedArbiter`] unless `actor_id`
    /// is the assigned arbiter, and transition errors outside UnderReview.
    pub fn begin_evidence_collection(
        &mut self,
        actor_id: &str,
        now: Timestamp,
    ) -> Result<(), ArbitrationError> {
        self.require_arbiter(actor_id)?;
        self.require_status(DisputeStatus::UnderReview, DisputeStatus::EvidenceCollection)?;
        self.status = DisputeStatus::EvidenceCollection;
        self.record(DisputeEvent::EvidenceCollectionStarted, now);
        Ok(())
    }

    /// Transition EvidenceCollection → Arbitration. Evidence closes.
    ///
    /// # Errors
    ///
    /// Returns [`ArbitrationError::NotAssignedArbiter`] unless `actor_id`
    /// is the assigned arbiter, and transition errors outside
    /// EvidenceCollection.
    pub fn begin_arbitration(
        &mut self,
        actor_id: &str,
        now: Timestamp,
    ) -> Result<(), ArbitrationError> {
        self.require_arbiter(actor_id)?;
        self.require_status(DisputeStatus::EvidenceCollection, DisputeStatus::Arbitration)?;
        self.status = DisputeStatus::Arbitration;
        self.record(DisputeEvent::ArbitrationStarted, now);
        Ok(())
    }

    /// Render a resolution: Arbitration → Resolved.
    ///
    /// Returns the [`SettlementDirective`] the engine must execute before
    /// committing the escrow-side resolution.
    ///
    /// Idempotent on retry: a repeated call carrying the identical decision
    /// on an already-resolved dispute returns the same directive without
    /// mutating; a differing decision is a
    /// [`ArbitrationError::ResolutionConflict`].
    ///
    /// # Errors
    ///
    /// Returns [`ArbitrationError::NotAssignedArbiter`] unless `decided_by`
    /// is the assigned arbiter, [`ArbitrationError::InvalidResolution`] for
    /// a malformed PartialRefund amount, and transition errors outside
    /// Arbitration.
    pub fn resolve(
        &mut self,
        resolution_type: ResolutionType,
        amount: Option<Amount>,
        reason: impl Into<String>,
        decided_by: &str,
        now: Timestamp,
    ) -> Result<SettlementDirective, ArbitrationError> {
        let reason = reason.into();
        self.require_arbiter(decided_by)?;

        // Retry of an identical decision on a resolved dispute is a no-op.
        if self.status == DisputeStatus::Resolved {
            let existing = self.resolution.as_ref().ok_or_else(|| {
                ArbitrationError::InvalidResolution {
                    reason: "resolved dispute carries no resolution record".to_string(),
                }
            })?;
            let incoming = Resolution {
                resolution_type,
                amount,
                reason: reason.clone(),
                decided_by: decided_by.to_string(),
                decided_at: now,
            };
            if existing.same_decision(&incoming) {
                return Ok(self.directive_for(existing.resolution_type, existing.amount));
            }
            return Err(ArbitrationError::ResolutionConflict {
                dispute_id: self.id.to_string(),
            });
        }

        self.require_status(DisputeStatus::Arbitration, DisputeStatus::Resolved)?;
        if resolution_type == ResolutionType::PartialRefund {
            let partial = amount.ok_or_else(|| ArbitrationError::InvalidResolution {
                reason: "partial refund requires an amount".to_string(),
            })?;
            if partial.is_zero() || partial > self.disputed_amount {
                return Err(ArbitrationError::InvalidResolution {
                    reason: format!(
                        "partial refund {} outside (0, {}]",
                        partial.value(),
                        self.disputed_amount.value()
                    ),
                });
            }
        } else if amount.is_some() {
            return Err(ArbitrationError::InvalidResolution {
                reason: format!("{resolution_type} does not take an amount"),
            });
        }

        self.resolution = Some(Resolution {
            resolution_type,
            amount,
            reason,
            decided_by: decided_by.to_string(),
            decided_at: now,
        });
        self.status = DisputeStatus::Resolved;
        self.record(DisputeEvent::Resolved { resolution_type }, now);
        Ok(self.directive_for(resolution_type, amount))
    }

    /// Transition Resolved → Closed. Terminal.
    ///
    /// # Errors
    ///
    /// Returns transition errors outside Resolved.
    pub fn close(&mut self, now: Timestamp) -> Result<(), ArbitrationError> {
        self.require_status(DisputeStatus::Resolved, DisputeStatus::Closed)?;
        self.status = DisputeStatus::Closed;
        self.record(DisputeEvent::Closed, now);
        Ok(())
    }

    /// Escalate from any pre-resolution state. Terminal for this cycle.
    ///
    /// The engine invokes the escalation hook fire-and-forget; the
    /// oversight cycle it spawns lives outside this engine.
    ///
    /// # Errors
    ///
    /// Returns [`ArbitrationError::InvalidTransition`] from Resolved and
    /// terminal-state errors past that.
    pub fn escalate(
        &mut self,
        reason: impl Into<String>,
        now: Timestamp,
    ) -> Result<(), ArbitrationError> {
        if self.status.is_terminal() {
            return Err(ArbitrationError::TerminalState {
                dispute_id: self.id.to_string(),
                status: self.status.as_str().to_string(),
            });
        }
        if !self.status.is_pre_resolution() {
            return Err(ArbitrationError::InvalidTransition {
                from: self.status.as_str().to_string(),
                to: DisputeStatus::Escalated.as_str().to_string(),
                reason: "a resolved dispute closes instead of escalating".to_string(),
            });
        }
        self.status = DisputeStatus::Escalated;
        self.record(
            DisputeEvent::Escalated {
                reason: reason.into(),
            },
            now,
        );
        Ok(())
    }

    /// Whether the advisory resolution deadline has passed.
    ///
    /// Past the deadline the dispute is *eligible* for escalation; the
    /// engine's sweep reports it through the notifier but never
    /// auto-transitions.
    pub fn is_past_deadline(&self, now: Timestamp) -> bool {
        self.status.is_pre_resolution() && now > self.resolution_deadline
    }

    fn directive_for(
        &self,
        resolution_type: ResolutionType,
        amount: Option<Amount>,
    ) -> SettlementDirective {
        match resolution_type {
            ResolutionType::RefundBuyer => SettlementDirective::RefundBuyer {
                amount: self.disputed_amount,
            },
            ResolutionType::PartialRefund => SettlementDirective::RefundBuyer {
                // resolve() validated presence; default never fires.
                amount: amount.unwrap_or(self.disputed_amount),
            },
            ResolutionType::ReleaseSeller => SettlementDirective::ReleaseSeller,
            ResolutionType::Rework
            | ResolutionType::Replacement
            | ResolutionType::Compromise
            | ResolutionType::Dismissed => SettlementDirective::NoMovement,
        }
    }

    /// Check the acting id against the assigned arbiter.
    fn require_arbiter(&self, actor_id: &str) -> Result<(), ArbitrationError> {
        match &self.arbiter {
            None => Err(ArbitrationError::NoArbiter {
                dispute_id: self.id.to_string(),
            }),
            Some(a) if a.id != actor_id => Err(ArbitrationError::NotAssignedArbiter {
                dispute_id: self.id.to_string(),
                actor: actor_id.to_string(),
            }),
            Some(_) => Ok(()),
        }
    }

    /// Check the dispute is in the expected state for a transition.
    fn require_status(
        &self,
        expected: DisputeStatus,
        target: DisputeStatus,
    ) -> Result<(), ArbitrationError> {
        if self.status.is_terminal() {
            return Err(ArbitrationError::TerminalState {
                dispute_id: self.id.to_string(),
                status: self.status.as_str().to_string(),
            });
        }
        if self.status != expected {
            return Err(ArbitrationError::InvalidTransition {
                from: self.status.as_str().to_string(),
                to: target.as_str().to_string(),
                reason: format!("expected state {}, got {}", expected, self.status),
            });
        }
        Ok(())
    }

    /// Append to the timeline and bump `updated_at`.
    fn record(&mut self, event: DisputeEvent, now: Timestamp) {
        self.timeline.push(TimelineEntry {
            seq: self.timeline.len() as u64,
            at: now,
            event,
        });
        self.updated_at = now;
    }
}

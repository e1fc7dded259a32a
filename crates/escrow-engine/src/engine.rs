//! # Escrow Engine
//!
//! Orchestrates the whole lifecycle: per-escrow serialization, versioned
//! storage, custody key issuance, settlement coupling, dispute
//! arbitration, notifications, and scheduler sweeps.
//!
//! ## Concurrency
//!
//! All state transitions for a given escrow are serialized: the engine
//! holds that escrow's mutex (a [`DashMap`] registry of
//! `Arc<parking_lot::Mutex<()>>`) across validate → settle → commit, and
//! the store's compare-and-swap is the backstop. Dispute operations lock
//! the owning escrow's mutex. Two racing operations on one escrow yield
//! exactly one success.
//!
//! ## Settlement Coupling
//!
//! Fund-moving operations run the settlement executor between the
//! aggregate's `authorize_*` and `commit_*` steps. On executor failure
//! nothing commits and the error is returned (retryable where the
//! executor says so); the executor's idempotency ledger makes the retry
//! safe.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

use escrow_arbitration::{
    Arbiter, Dispute, DisputeType, Party, ResolutionType, SettlementDirective,
};
use escrow_core::{Actor, Address, Amount, ContentDigest, DisputeId, EscrowId, MilestoneId, Timestamp, TxHash};
use escrow_settlement::{
    ChainProvider, SettlementExecutor, SettlementIntent, SettlementRequest,
};
use escrow_split::{allocate_with_policy, validate as validate_recipients, Recipient};
use escrow_state::{
    Escrow, EscrowKind, EscrowParams, EscrowStatus, MilestonePlan, ResolutionOutcome, StateError,
};
use escrow_vault::{KeyVault, MasterSecret};

use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::notify::{EscalationHook, EscrowNotification, Notifier};
use crate::store::{EscrowStore, Versioned};

/// Parameters for [`EscrowEngine::create_escrow`].
///
/// The engine issues the custody wallet itself; callers supply only the
/// trade terms.
#[derive(Debug, Clone)]
pub struct CreateEscrowRequest {
    /// The funding party.
    pub buyer: Address,
    /// The delivering party.
    pub seller: Address,
    /// Total custodied amount, smallest currency unit.
    pub total_amount: Amount,
    /// Currency code (uppercase, 3–8 letters).
    pub currency: String,
    /// Release rule variant.
    pub kind: EscrowKind,
    /// Release deadline; required for time-locked escrows.
    pub release_date: Option<Timestamp>,
    /// Whether the engine may release automatically at `release_date`.
    pub auto_release: bool,
    /// Payout split table. Empty means the seller receives 100%.
    pub recipients: Vec<Recipient>,
    /// Milestone plan, for milestone escrows.
    pub milestones: Vec<MilestonePlan>,
}

/// The escrow lifecycle orchestrator.
///
/// Explicitly constructed with its collaborators (store, provider, vault,
/// clock, notifier, escalation hook); no global statics.
pub struct EscrowEngine {
    store: Arc<dyn EscrowStore>,
    executor: SettlementExecutor,
    vault: KeyVault,
    master: MasterSecret,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn Notifier>,
    escalation: Arc<dyn EscalationHook>,
    config: EngineConfig,
    locks: DashMap<EscrowId, Arc<Mutex<()>>>,
}

impl EscrowEngine {
    /// Create an engine.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn EscrowStore>,
        provider: Arc<dyn ChainProvider>,
        vault: KeyVault,
        master: MasterSecret,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn Notifier>,
        escalation: Arc<dyn EscalationHook>,
        config: EngineConfig,
    ) -> Self {
        let executor = SettlementExecutor::new(vault.clone(), master.clone(), provider);
        Self {
            store,
            executor,
            vault,
            master,
            clock,
            notifier,
            escalation,
            config,
            locks: DashMap::new(),
        }
    }

    // ── Escrow operations ──────────────────────────────────────────

    /// Create an escrow: issues a custody wallet, encrypts its seed, and
    /// stores the aggregate in Pending state.
    ///
    /// # Errors
    ///
    /// Returns validation, split, or vault errors; nothing is stored on
    /// failure.
    pub fn create_escrow(&self, request: CreateEscrowRequest) -> Result<Escrow, EngineError> {
        validate_recipients_if_present(&request.recipients, &self.config)?;

        let keypair = self.vault.generate();
        let deposit_address = keypair.address();
        let encrypted_custody_key = self.vault.encrypt(&keypair.seed(), &self.master)?;
        drop(keypair);

        let escrow = Escrow::create(
            EscrowParams {
                buyer: request.buyer,
                seller: request.seller,
                total_amount: request.total_amount,
                currency: request.currency,
                kind: request.kind,
                release_date: request.release_date,
                auto_release: request.auto_release,
                recipients: request.recipients,
                milestones: request.milestones,
                deposit_address,
                encrypted_custody_key,
            },
            self.config.residual_policy,
            &self.config.split,
            self.clock.now(),
        )?;
        self.store.insert_escrow(escrow.clone())?;
        tracing::info!(
            escrow_id = %escrow.id,
            kind = escrow.kind.as_str(),
            amount = escrow.total_amount.value(),
            "escrow created"
        );
        self.publish(EscrowNotification::EscrowCreated {
            escrow_id: escrow.id,
        });
        Ok(escrow)
    }

    /// Confirm the buyer's deposit.
    ///
    /// # Errors
    ///
    /// Returns state or concurrency errors.
    pub fn mark_funded(
        &self,
        escrow_id: EscrowId,
        proof: TxHash,
        actor: Actor,
    ) -> Result<Escrow, EngineError> {
        let guard = self.lock_for(escrow_id);
        let _serialized = guard.lock();

        let Versioned { mut record, version } = self.load_escrow(&escrow_id)?;
        if actor == Actor::Buyer
            && record.status == EscrowStatus::Funded
            && record.funding_proof.as_ref() == Some(&proof)
        {
            // Idempotent replay of the same deposit confirmation.
            return Ok(record);
        }
        record.mark_funded(proof, actor, self.clock.now())?;
        self.store.put_escrow(record.clone(), version)?;
        self.publish(EscrowNotification::EscrowFunded { escrow_id });
        Ok(record)
    }

    /// Release the full custodied amount through the payout split table.
    ///
    /// Settlement runs one leg per recipient between authorization and
    /// commit; the escrow transitions to Released only after every leg
    /// has confirmed.
    ///
    /// # Errors
    ///
    /// Returns state, settlement, or concurrency errors. On settlement
    /// failure the escrow stays Funded and the call is retryable.
    pub fn release(&self, escrow_id: EscrowId, actor: Actor) -> Result<Escrow, EngineError> {
        let guard = self.lock_for(escrow_id);
        let _serialized = guard.lock();

        let Versioned { mut record, version } = self.load_escrow(&escrow_id)?;
        let now = self.clock.now();
        record.authorize_release(actor, now)?;

        let tx_ids = self.settle_split_legs(&record)?;
        record.commit_release(tx_ids, actor, now)?;
        self.store.put_escrow(record.clone(), version)?;
        tracing::info!(escrow_id = %escrow_id, "escrow released");
        self.publish(EscrowNotification::EscrowReleased { escrow_id });
        Ok(record)
    }

    /// Mark a milestone's work delivered.
    ///
    /// # Errors
    ///
    /// Returns state or concurrency errors.
    pub fn complete_milestone(
        &self,
        escrow_id: EscrowId,
        milestone_id: MilestoneId,
        actor: Actor,
    ) -> Result<Escrow, EngineError> {
        let guard = self.lock_for(escrow_id);
        let _serialized = guard.lock();

        let Versioned { mut record, version } = self.load_escrow(&escrow_id)?;
        record.complete_milestone(milestone_id, actor, self.clock.now())?;
        self.store.put_escrow(record.clone(), version)?;
        self.publish(EscrowNotification::MilestoneCompleted {
            escrow_id,
            milestone_id,
        });
        Ok(record)
    }

    /// Release one completed milestone's amount to the seller.
    ///
    /// # Errors
    ///
    /// Returns state, settlement, or concurrency errors. On settlement
    /// failure the milestone stays Completed and the call is retryable.
    pub fn release_milestone(
        &self,
        escrow_id: EscrowId,
        milestone_id: MilestoneId,
        actor: Actor,
    ) -> Result<Escrow, EngineError> {
        let guard = self.lock_for(escrow_id);
        let _serialized = guard.lock();

        let Versioned { mut record, version } = self.load_escrow(&escrow_id)?;
        let now = self.clock.now();
        let amount = record.authorize_milestone_release(milestone_id, actor)?;

        let receipt = self.executor.execute(&SettlementRequest {
            escrow_id,
            milestone_id: Some(milestone_id),
            intent: SettlementIntent::MilestoneRelease,
            leg: 0,
            source: record.deposit_address.clone(),
            destination: record.seller.clone(),
            amount,
            encrypted_custody_key: record.encrypted_custody_key.clone(),
        })?;
        record.commit_milestone_release(milestone_id, receipt.tx_id.to_string(), actor, now)?;
        self.store.put_escrow(record.clone(), version)?;
        self.publish(EscrowNotification::MilestoneReleased {
            escrow_id,
            milestone_id,
        });
        if record.status == EscrowStatus::Released {
            tracing::info!(escrow_id = %escrow_id, "final milestone released, escrow released");
            self.publish(EscrowNotification::EscrowReleased { escrow_id });
        }
        Ok(record)
    }

    /// Cancel an unfunded escrow.
    ///
    /// # Errors
    ///
    /// Returns state or concurrency errors.
    pub fn cancel(&self, escrow_id: EscrowId, actor: Actor) -> Result<Escrow, EngineError> {
        let guard = self.lock_for(escrow_id);
        let _serialized = guard.lock();

        let Versioned { mut record, version } = self.load_escrow(&escrow_id)?;
        record.cancel(actor, self.clock.now())?;
        self.store.put_escrow(record.clone(), version)?;
        self.publish(EscrowNotification::EscrowCancelled { escrow_id });
        Ok(record)
    }

    // ── Dispute operations ─────────────────────────────────────────

    /// Open a dispute against an escrow.
    ///
    /// At most one active dispute per escrow; the escrow transitions to
    /// Disputed and the dispute starts Open with the configured advisory
    /// resolution window.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::DisputeAlreadyActive`], state, or
    /// concurrency errors.
    pub fn open_dispute(
        &self,
        escrow_id: EscrowId,
        actor: Actor,
        kind: DisputeType,
        reason: impl Into<String>,
    ) -> Result<Dispute, EngineError> {
        let guard = self.lock_for(escrow_id);
        let _serialized = guard.lock();

        let Versioned { mut record, version } = self.load_escrow(&escrow_id)?;
        if let Some(active) = self.store.active_dispute_for(&escrow_id) {
            return Err(EngineError::DisputeAlreadyActive {
                escrow_id: escrow_id.to_string(),
                dispute_id: active.record.id.to_string(),
            });
        }
        let (claimant, respondent) = match actor {
            Actor::Buyer => (
                Party::new(record.buyer.clone(), Actor::Buyer)?,
                Party::new(record.seller.clone(), Actor::Seller)?,
            ),
            Actor::Seller => (
                Party::new(record.seller.clone(), Actor::Seller)?,
                Party::new(record.buyer.clone(), Actor::Buyer)?,
            ),
            Actor::Arbiter | Actor::System => {
                return Err(StateError::UnauthorizedActor {
                    actor,
                    operation: "open_dispute",
                    reason: "only a trade party opens a dispute".to_string(),
                }
                .into());
            }
        };

        let now = self.clock.now();
        let dispute = Dispute::open(
            escrow_id,
            claimant,
            respondent,
            record.total_amount,
            kind,
            reason,
            now,
            self.config.dispute_window_days,
        )?;
        record.open_dispute(dispute.id, actor, now)?;

        self.store.insert_dispute(dispute.clone())?;
        self.store.put_escrow(record, version)?;
        tracing::info!(
            escrow_id = %escrow_id,
            dispute_id = %dispute.id,
            kind = kind.as_str(),
            "dispute opened"
        );
        self.publish(EscrowNotification::DisputeOpened {
            escrow_id,
            dispute_id: dispute.id,
        });
        Ok(dispute)
    }

    /// Append evidence to a dispute.
    ///
    /// # Errors
    ///
    /// Returns arbitration or concurrency errors.
    pub fn submit_evidence(
        &self,
        dispute_id: DisputeId,
        submitted_by: Actor,
        description: impl Into<String>,
        digest: ContentDigest,
    ) -> Result<Dispute, EngineError> {
        self.with_dispute(dispute_id, |dispute, now| {
            dispute
                .submit_evidence(submitted_by, description, digest, now)
                .map(|_| ())
        })
    }

    /// Assign or replace a dispute's arbiter.
    ///
    /// # Errors
    ///
    /// Returns arbitration or concurrency errors.
    pub fn assign_arbiter(
        &self,
        dispute_id: DisputeId,
        arbiter: Arbiter,
    ) -> Result<Dispute, EngineError> {
        self.with_dispute(dispute_id, |dispute, now| dispute.assign_arbiter(arbiter, now))
    }

    /// Open a dispute's evidence collection phase.
    ///
    /// # Errors
    ///
    /// Returns arbitration or concurrency errors.
    pub fn begin_evidence_collection(
        &self,
        dispute_id: DisputeId,
        actor_id: &str,
    ) -> Result<Dispute, EngineError> {
        self.with_dispute(dispute_id, |dispute, now| {
            dispute.begin_evidence_collection(actor_id, now)
        })
    }

    /// Begin a dispute's arbitration phase; evidence closes.
    ///
    /// # Errors
    ///
    /// Returns arbitration or concurrency errors.
    pub fn begin_arbitration(
        &self,
        dispute_id: DisputeId,
        actor_id: &str,
    ) -> Result<Dispute, EngineError> {
        self.with_dispute(dispute_id, |dispute, now| {
            dispute.begin_arbitration(actor_id, now)
        })
    }

    /// Resolve a dispute and apply its settlement directive.
    ///
    /// Executes the directive's fund movement (if any) and then commits
    /// the escrow-side resolution — the only exit from the escrow's
    /// Disputed state. A repeated call carrying the identical decision is
    /// a no-op returning the resolved dispute.
    ///
    /// # Errors
    ///
    /// Returns arbitration, state, settlement, or concurrency errors. On
    /// settlement failure nothing commits and the call is retryable.
    pub fn resolve_dispute(
        &self,
        dispute_id: DisputeId,
        resolution_type: ResolutionType,
        amount: Option<Amount>,
        reason: impl Into<String>,
        decided_by: &str,
    ) -> Result<Dispute, EngineError> {
        let escrow_id = self.load_dispute(&dispute_id)?.record.escrow_id;
        let guard = self.lock_for(escrow_id);
        let _serialized = guard.lock();

        let Versioned {
            record: mut dispute,
            version: dispute_version,
        } = self.load_dispute(&dispute_id)?;
        let now = self.clock.now();

        let replay = dispute.resolution.is_some();
        let directive = dispute.resolve(resolution_type, amount, reason, decided_by, now)?;
        if replay {
            tracing::warn!(
                dispute_id = %dispute_id,
                "identical resolution replayed, returning resolved dispute"
            );
            return Ok(dispute);
        }

        let Versioned {
            record: mut escrow,
            version: escrow_version,
        } = self.load_escrow(&escrow_id)?;

        let outcome = match directive {
            SettlementDirective::RefundBuyer { amount } => {
                let intent = if resolution_type == ResolutionType::PartialRefund {
                    SettlementIntent::PartialRefund
                } else {
                    SettlementIntent::RefundBuyer
                };
                let receipt = self.executor.execute(&SettlementRequest {
                    escrow_id,
                    milestone_id: None,
                    intent,
                    leg: 0,
                    source: escrow.deposit_address.clone(),
                    destination: escrow.buyer.clone(),
                    amount,
                    encrypted_custody_key: escrow.encrypted_custody_key.clone(),
                })?;
                ResolutionOutcome::RefundedToBuyer {
                    tx_id: receipt.tx_id.to_string(),
                }
            }
            SettlementDirective::ReleaseSeller => {
                let tx_ids = self.settle_split_legs(&escrow)?;
                ResolutionOutcome::ReleasedToSeller { tx_ids }
            }
            SettlementDirective::NoMovement => ResolutionOutcome::ReturnedToPrior,
        };

        escrow.commit_resolution(outcome, now)?;
        self.store.put_dispute(dispute.clone(), dispute_version)?;
        self.store.put_escrow(escrow, escrow_version)?;
        tracing::info!(
            escrow_id = %escrow_id,
            dispute_id = %dispute_id,
            resolution = resolution_type.as_str(),
            "dispute resolved"
        );
        self.publish(EscrowNotification::DisputeResolved {
            escrow_id,
            dispute_id,
            resolution_type,
        });
        Ok(dispute)
    }

    /// Close a resolved dispute.
    ///
    /// # Errors
    ///
    /// Returns arbitration or concurrency errors.
    pub fn close_dispute(&self, dispute_id: DisputeId) -> Result<Dispute, EngineError> {
        self.with_dispute(dispute_id, |dispute, now| dispute.close(now))
    }

    /// Escalate a dispute out of this engine's jurisdiction.
    ///
    /// Fires the escalation hook and the notifier; the escrow stays
    /// Disputed pending the external oversight cycle.
    ///
    /// # Errors
    ///
    /// Returns arbitration or concurrency errors.
    pub fn escalate_dispute(
        &self,
        dispute_id: DisputeId,
        reason: impl Into<String>,
    ) -> Result<Dispute, EngineError> {
        let reason = reason.into();
        let dispute = self.with_dispute(dispute_id, |dispute, now| {
            dispute.escalate(reason.clone(), now)
        })?;
        self.escalation
            .escalated(dispute.escrow_id, dispute.id, &reason);
        self.publish(EscrowNotification::DisputeEscalated {
            escrow_id: dispute.escrow_id,
            dispute_id: dispute.id,
        });
        Ok(dispute)
    }

    // ── Scheduler sweeps ───────────────────────────────────────────

    /// Process overdue time-locked escrows: auto-release the ones with
    /// `auto_release` set, freeze the rest to Expired.
    ///
    /// Per-escrow failures are warn-logged and skipped; the sweep always
    /// covers every escrow. Returns the ids acted upon.
    pub fn sweep_expirations(&self) -> Vec<EscrowId> {
        let now = self.clock.now();
        let mut acted = Vec::new();
        for escrow_id in self.store.escrow_ids() {
            let Some(snapshot) = self.store.get_escrow(&escrow_id) else {
                continue;
            };
            let escrow = &snapshot.record;
            if escrow.kind != EscrowKind::TimeLocked || escrow.status != EscrowStatus::Funded {
                continue;
            }
            let Some(release_date) = escrow.release_date else {
                continue;
            };

            let outcome = if escrow.auto_release && now >= release_date {
                self.release(escrow_id, Actor::System).map(|_| ())
            } else if !escrow.auto_release && now > release_date {
                self.expire(escrow_id).map(|_| ())
            } else {
                continue;
            };
            match outcome {
                Ok(()) => acted.push(escrow_id),
                Err(e) => {
                    // A racing operation may have moved the escrow; the
                    // next sweep re-evaluates.
                    tracing::warn!(
                        escrow_id = %escrow_id,
                        error = %e,
                        "expiration sweep skipped escrow"
                    );
                }
            }
        }
        acted
    }

    /// Report disputes past their advisory resolution deadline through
    /// the notifier. Never transitions state — exceeding the deadline only
    /// makes a dispute eligible for escalation.
    pub fn sweep_dispute_deadlines(&self) -> Vec<DisputeId> {
        let now = self.clock.now();
        let mut overdue = Vec::new();
        for dispute_id in self.store.dispute_ids() {
            let Some(snapshot) = self.store.get_dispute(&dispute_id) else {
                continue;
            };
            let dispute = &snapshot.record;
            if dispute.is_past_deadline(now) {
                self.publish(EscrowNotification::DisputeOverdue {
                    escrow_id: dispute.escrow_id,
                    dispute_id,
                    deadline: dispute.resolution_deadline,
                });
                overdue.push(dispute_id);
            }
        }
        overdue
    }

    // ── Reads ──────────────────────────────────────────────────────

    /// Fetch an escrow.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotFound`] for an unknown id.
    pub fn get_escrow(&self, escrow_id: EscrowId) -> Result<Escrow, EngineError> {
        Ok(self.load_escrow(&escrow_id)?.record)
    }

    /// Fetch a dispute.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotFound`] for an unknown id.
    pub fn get_dispute(&self, dispute_id: DisputeId) -> Result<Dispute, EngineError> {
        Ok(self.load_dispute(&dispute_id)?.record)
    }

    // ── Internals ──────────────────────────────────────────────────

    /// Freeze an overdue time-locked escrow.
    fn expire(&self, escrow_id: EscrowId) -> Result<Escrow, EngineError> {
        let guard = self.lock_for(escrow_id);
        let _serialized = guard.lock();

        let Versioned { mut record, version } = self.load_escrow(&escrow_id)?;
        record.expire(self.clock.now())?;
        self.store.put_escrow(record.clone(), version)?;
        self.publish(EscrowNotification::EscrowExpired { escrow_id });
        Ok(record)
    }

    /// Settle one leg per split-table recipient; returns the tx ids in
    /// table order.
    fn settle_split_legs(&self, escrow: &Escrow) -> Result<Vec<String>, EngineError> {
        let allocation = allocate_with_policy(
            escrow.total_amount,
            &escrow.recipients,
            self.config.residual_policy,
        );
        let mut tx_ids = Vec::with_capacity(allocation.entries.len());
        for (leg, entry) in allocation.entries.iter().enumerate() {
            let receipt = self.executor.execute(&SettlementRequest {
                escrow_id: escrow.id,
                milestone_id: None,
                intent: SettlementIntent::Release,
                leg: leg as u32,
                source: escrow.deposit_address.clone(),
                destination: entry.address.clone(),
                amount: entry.amount,
                encrypted_custody_key: escrow.encrypted_custody_key.clone(),
            })?;
            tx_ids.push(receipt.tx_id.to_string());
        }
        Ok(tx_ids)
    }

    /// Run a dispute mutation under the owning escrow's lock and CAS-put
    /// the result.
    fn with_dispute<F>(&self, dispute_id: DisputeId, op: F) -> Result<Dispute, EngineError>
    where
        F: FnOnce(&mut Dispute, Timestamp) -> Result<(), escrow_arbitration::ArbitrationError>,
    {
        let escrow_id = self.load_dispute(&dispute_id)?.record.escrow_id;
        let guard = self.lock_for(escrow_id);
        let _serialized = guard.lock();

        let Versioned { mut record, version } = self.load_dispute(&dispute_id)?;
        op(&mut record, self.clock.now())?;
        self.store.put_dispute(record.clone(), version)?;
        Ok(record)
    }

    fn lock_for(&self, escrow_id: EscrowId) -> Arc<Mutex<()>> {
        self.locks
            .entry(escrow_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn load_escrow(&self, escrow_id: &EscrowId) -> Result<Versioned<Escrow>, EngineError> {
        self.store
            .get_escrow(escrow_id)
            .ok_or_else(|| EngineError::NotFound {
                kind: "escrow",
                id: escrow_id.to_string(),
            })
    }

    fn load_dispute(&self, dispute_id: &DisputeId) -> Result<Versioned<Dispute>, EngineError> {
        self.store
            .get_dispute(dispute_id)
            .ok_or_else(|| EngineError::NotFound {
                kind: "dispute",
                id: dispute_id.to_string(),
            })
    }

    /// Fire-and-forget notification; failures are logged, never raised.
    fn publish(&self, notification: EscrowNotification) {
        if let Err(e) = self.notifier.notify(&notification) {
            tracing::warn!(
                notification = ?notification,
                error = %e,
                "notification delivery failed, continuing"
            );
        }
    }
}

fn validate_recipients_if_present(
    recipients: &[Recipient],
    config: &EngineConfig,
) -> Result<(), EngineError> {
    if recipients.is_empty() {
        // Escrow::create substitutes the seller at 100%.
        return Ok(());
    }
    validate_recipients(recipients, &config.split)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::notify::{NullEscalationHook, RecordingNotifier};
    use crate::store::InMemoryEscrowStore;
    use escrow_settlement::MockChainProvider;
    use escrow_vault::VaultConfig;

    struct Fixture {
        engine: EscrowEngine,
        provider: Arc<MockChainProvider>,
        notifier: Arc<RecordingNotifier>,
        clock: Arc<ManualClock>,
    }

    fn fixture() -> Fixture {
        let provider = Arc::new(MockChainProvider::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let clock = Arc::new(ManualClock::new(
            Timestamp::parse("2026-01-01T00:00:00Z").unwrap(),
        ));
        let engine = EscrowEngine::new(
            Arc::new(InMemoryEscrowStore::new()),
            Arc::clone(&provider) as Arc<dyn ChainProvider>,
            KeyVault::new(VaultConfig { kdf_iterations: 1_000 }),
            MasterSecret::new(b"engine test master secret".to_vec()).unwrap(),
            Arc::clone(&clock) as Arc<dyn Clock>,
            Arc::clone(&notifier) as Arc<dyn Notifier>,
            Arc::new(NullEscalationHook),
            EngineConfig::default(),
        );
        Fixture {
            engine,
            provider,
            notifier,
            clock,
        }
    }

    fn addr(s: &str) -> Address {
        Address::new(s).unwrap()
    }

    fn request(kind: EscrowKind) -> CreateEscrowRequest {
        CreateEscrowRequest {
            buyer: addr("buyer-main"),
            seller: addr("seller-main"),
            total_amount: Amount::new(1000),
            currency: "USD".to_string(),
            kind,
            release_date: match kind {
                EscrowKind::TimeLocked => Some(Timestamp::parse("2026-03-01T00:00:00Z").unwrap()),
                _ => None,
            },
            auto_release: false,
            recipients: Vec::new(),
            milestones: match kind {
                EscrowKind::Milestone => vec![
                    MilestonePlan::new("Design", 40.0),
                    MilestonePlan::new("Deliver", 60.0),
                ],
                _ => Vec::new(),
            },
        }
    }

    /// Create and fund an escrow, mirroring a confirmed deposit on the
    /// provider side.
    fn funded_escrow(f: &Fixture, kind: EscrowKind) -> Escrow {
        let escrow = f.engine.create_escrow(request(kind)).unwrap();
        f.provider
            .set_balance(escrow.deposit_address.clone(), escrow.total_amount);
        f.engine
            .mark_funded(escrow.id, TxHash::new("0xabc1234501").unwrap(), Actor::Buyer)
            .unwrap()
    }

    #[test]
    fn create_issues_custody_wallet() {
        let f = fixture();
        let escrow = f.engine.create_escrow(request(EscrowKind::Simple)).unwrap();
        // Deposit address is the custody public key, hex-rendered.
        assert_eq!(escrow.deposit_address.as_str().len(), 64);
        assert_eq!(escrow.status, EscrowStatus::Pending);
        assert_eq!(
            f.notifier.events(),
            vec![EscrowNotification::EscrowCreated {
                escrow_id: escrow.id
            }]
        );
    }

    #[test]
    fn release_pays_seller_and_commits() {
        let f = fixture();
        let escrow = funded_escrow(&f, EscrowKind::Simple);
        let released = f.engine.release(escrow.id, Actor::Buyer).unwrap();

        assert_eq!(released.status, EscrowStatus::Released);
        assert_eq!(
            f.provider.balance_of(&addr("seller-main")),
            Amount::new(1000)
        );
        assert_eq!(f.provider.balance_of(&escrow.deposit_address), Amount::ZERO);
    }

    #[test]
    fn failed_settlement_leaves_escrow_funded_and_retryable() {
        let f = fixture();
        let escrow = funded_escrow(&f, EscrowKind::Simple);
        // Drain the custody balance so settlement cannot proceed.
        f.provider.set_balance(escrow.deposit_address.clone(), Amount::ZERO);

        let err = f.engine.release(escrow.id, Actor::Buyer).unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(
            f.engine.get_escrow(escrow.id).unwrap().status,
            EscrowStatus::Funded
        );

        // Re-fund and re-drive: exactly one payout.
        f.provider
            .set_balance(escrow.deposit_address.clone(), Amount::new(1000));
        f.engine.release(escrow.id, Actor::Buyer).unwrap();
        assert_eq!(
            f.provider.balance_of(&addr("seller-main")),
            Amount::new(1000)
        );
    }

    #[test]
    fn milestone_flow_releases_in_order() {
        let f = fixture();
        let escrow = funded_escrow(&f, EscrowKind::Milestone);
        let m0 = escrow.milestones[0].id;
        let m1 = escrow.milestones[1].id;

        f.engine
            .complete_milestone(escrow.id, m0, Actor::Seller)
            .unwrap();
        f.engine
            .release_milestone(escrow.id, m0, Actor::Buyer)
            .unwrap();
        assert_eq!(f.provider.balance_of(&addr("seller-main")), Amount::new(400));

        f.engine
            .complete_milestone(escrow.id, m1, Actor::Seller)
            .unwrap();
        let done = f.engine.release_milestone(escrow.id, m1, Actor::Buyer).unwrap();
        assert_eq!(done.status, EscrowStatus::Released);
        assert_eq!(
            f.provider.balance_of(&addr("seller-main")),
            Amount::new(1000)
        );
    }

    #[test]
    fn dispute_refund_flow() {
        let f = fixture();
        let escrow = funded_escrow(&f, EscrowKind::Simple);
        let dispute = f
            .engine
            .open_dispute(escrow.id, Actor::Buyer, DisputeType::NonDelivery, "nothing arrived")
            .unwrap();
        assert_eq!(
            f.engine.get_escrow(escrow.id).unwrap().status,
            EscrowStatus::Disputed
        );

        f.engine
            .assign_arbiter(
                dispute.id,
                Arbiter {
                    id: "arb-1".to_string(),
                    name: "Desk".to_string(),
                },
            )
            .unwrap();
        f.engine
            .begin_evidence_collection(dispute.id, "arb-1")
            .unwrap();
        f.engine.begin_arbitration(dispute.id, "arb-1").unwrap();
        f.engine
            .resolve_dispute(
                dispute.id,
                ResolutionType::RefundBuyer,
                None,
                "seller never shipped",
                "arb-1",
            )
            .unwrap();

        assert_eq!(
            f.engine.get_escrow(escrow.id).unwrap().status,
            EscrowStatus::ResolvedRefunded
        );
        assert_eq!(f.provider.balance_of(&addr("buyer-main")), Amount::new(1000));

        // Identical replay is a no-op: no double refund.
        f.engine
            .resolve_dispute(
                dispute.id,
                ResolutionType::RefundBuyer,
                None,
                "seller never shipped",
                "arb-1",
            )
            .unwrap();
        assert_eq!(f.provider.balance_of(&addr("buyer-main")), Amount::new(1000));
    }

    #[test]
    fn second_dispute_rejected_while_active() {
        let f = fixture();
        let escrow = funded_escrow(&f, EscrowKind::Simple);
        f.engine
            .open_dispute(escrow.id, Actor::Buyer, DisputeType::NonDelivery, "claim")
            .unwrap();
        let err = f
            .engine
            .open_dispute(escrow.id, Actor::Seller, DisputeType::Other, "counter-claim")
            .unwrap_err();
        assert!(matches!(err, EngineError::DisputeAlreadyActive { .. }));
    }

    #[test]
    fn expiration_sweep_freezes_overdue_time_lock() {
        let f = fixture();
        let escrow = funded_escrow(&f, EscrowKind::TimeLocked);

        // Before the deadline nothing happens.
        assert!(f.engine.sweep_expirations().is_empty());

        f.clock.set(Timestamp::parse("2026-03-02T00:00:00Z").unwrap());
        let acted = f.engine.sweep_expirations();
        assert_eq!(acted, vec![escrow.id]);
        assert_eq!(
            f.engine.get_escrow(escrow.id).unwrap().status,
            EscrowStatus::Expired
        );
        // Funds remain custodied.
        assert_eq!(
            f.provider.balance_of(&escrow.deposit_address),
            Amount::new(1000)
        );
    }

    #[test]
    fn expiration_sweep_auto_releases_when_enabled() {
        let f = fixture();
        let mut req = request(EscrowKind::TimeLocked);
        req.auto_release = true;
        let escrow = f.engine.create_escrow(req).unwrap();
        f.provider
            .set_balance(escrow.deposit_address.clone(), escrow.total_amount);
        f.engine
            .mark_funded(escrow.id, TxHash::new("0xabc1234501").unwrap(), Actor::Buyer)
            .unwrap();

        f.clock.set(Timestamp::parse("2026-03-01T00:00:00Z").unwrap());
        let acted = f.engine.sweep_expirations();
        assert_eq!(acted, vec![escrow.id]);
        assert_eq!(
            f.engine.get_escrow(escrow.id).unwrap().status,
            EscrowStatus::Released
        );
        assert_eq!(
            f.provider.balance_of(&addr("seller-main")),
            Amount::new(1000)
        );
    }

    #[test]
    fn deadline_sweep_reports_without_transitioning() {
        let f = fixture();
        let escrow = funded_escrow(&f, EscrowKind::Simple);
        let dispute = f
            .engine
            .open_dispute(escrow.id, Actor::Seller, DisputeType::AmountDisagreement, "claim")
            .unwrap();

        f.clock.advance_days(15);
        let overdue = f.engine.sweep_dispute_deadlines();
        assert_eq!(overdue, vec![dispute.id]);
        // Advisory only: still Open, escrow still Disputed.
        assert_eq!(
            f.engine.get_dispute(dispute.id).unwrap().status,
            escrow_arbitration::DisputeStatus::Open
        );
        assert!(f.notifier.events().iter().any(|n| matches!(
            n,
            EscrowNotification::DisputeOverdue { dispute_id, .. } if *dispute_id == dispute.id
        )));
    }

    #[test]
    fn notifier_failure_never_blocks_operations() {
        let f = fixture();
        f.notifier.fail_with("webhook down");
        let escrow = f.engine.create_escrow(request(EscrowKind::Simple)).unwrap();
        assert_eq!(escrow.status, EscrowStatus::Pending);
    }

    #[test]
    fn custom_split_pays_every_leg() {
        let f = fixture();
        let mut req = request(EscrowKind::Simple);
        req.recipients = vec![
            Recipient::new(addr("seller-main"), 50.0),
            Recipient::new(addr("partner-one"), 30.0),
            Recipient::new(addr("partner-two"), 20.0),
        ];
        let escrow = f.engine.create_escrow(req).unwrap();
        f.provider
            .set_balance(escrow.deposit_address.clone(), escrow.total_amount);
        f.engine
            .mark_funded(escrow.id, TxHash::new("0xabc1234501").unwrap(), Actor::Buyer)
            .unwrap();
        let released = f.engine.release(escrow.id, Actor::Buyer).unwrap();

        assert_eq!(released.status, EscrowStatus::Released);
        assert_eq!(f.provider.balance_of(&addr("seller-main")), Amount::new(500));
        assert_eq!(f.provider.balance_of(&addr("partner-one")), Amount::new(300));
        assert_eq!(f.provider.balance_of(&addr("partner-two")), Amount::new(200));
    }
}

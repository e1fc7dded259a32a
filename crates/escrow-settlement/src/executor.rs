//! # Settlement Executor
//!
//! Moves custodied funds: decrypts the escrow's custody key for one signing
//! operation, signs the payout intent over its canonical bytes, submits it
//! with bounded retry on transient provider errors, awaits provider
//! confirmation, and returns a content-addressed receipt.
//!
//! ## Security Invariant
//!
//! Every execution is keyed in the idempotency ledger by
//! `(escrow_id, milestone_id?, intent, leg)`. A completed attempt returns
//! its recorded receipt without re-sending; an in-flight attempt (sent but
//! unconfirmed) re-awaits the recorded transaction instead of re-sending.
//! Re-driving a failed or timed-out settlement therefore never double-pays.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use escrow_core::{
    sha256_digest, Address, Amount, CanonicalBytes, ContentDigest, EscrowId, MilestoneId,
    Timestamp,
};
use escrow_vault::{CustodyKeypair, EncryptedKeyBlob, KeyVault, MasterSecret};

use crate::error::SettlementError;
use crate::provider::{ChainProvider, SignedIntent, TxId};

/// Maximum number of retry attempts after the initial send.
const MAX_RETRIES: u32 = 3;

/// Base delay between retries (doubles each attempt: 200ms, 400ms, 800ms).
const BASE_DELAY_MS: u64 = 200;

// ── Requests & Receipts ────────────────────────────────────────────────

/// The kind of fund movement being executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SettlementIntent {
    /// Full release to a payout leg.
    Release,
    /// Release of one milestone's amount.
    MilestoneRelease,
    /// Full refund to the buyer after a dispute.
    RefundBuyer,
    /// Partial refund to the buyer after a dispute.
    PartialRefund,
}

impl SettlementIntent {
    /// The canonical string identifier for serialization and signing.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Release => "release",
            Self::MilestoneRelease => "milestone_release",
            Self::RefundBuyer => "refund_buyer",
            Self::PartialRefund => "partial_refund",
        }
    }
}

impl std::fmt::Display for SettlementIntent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One fund movement to execute.
#[derive(Debug, Clone)]
pub struct SettlementRequest {
    /// The escrow being settled.
    pub escrow_id: EscrowId,
    /// The milestone, for milestone releases.
    pub milestone_id: Option<MilestoneId>,
    /// The kind of movement.
    pub intent: SettlementIntent,
    /// Split-table leg index; 0 for single-destination intents.
    pub leg: u32,
    /// The custody address funds leave from.
    pub source: Address,
    /// The payout destination.
    pub destination: Address,
    /// The amount to move, smallest currency unit.
    pub amount: Amount,
    /// The escrow's encrypted custody key seed.
    pub encrypted_custody_key: EncryptedKeyBlob,
}

impl SettlementRequest {
    fn idempotency_key(&self) -> IdempotencyKey {
        IdempotencyKey {
            escrow_id: self.escrow_id,
            milestone_id: self.milestone_id,
            intent: self.intent,
            leg: self.leg,
        }
    }
}

/// Ledger key: one logical fund movement, however many times it is driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct IdempotencyKey {
    escrow_id: EscrowId,
    milestone_id: Option<MilestoneId>,
    intent: SettlementIntent,
    leg: u32,
}

/// The recorded progress of one logical fund movement.
#[derive(Debug, Clone)]
enum AttemptState {
    /// Sent to the provider, confirmation not yet recorded.
    InFlight { tx_id: TxId },
    /// Confirmed and receipted.
    Completed { receipt: SettlementReceipt },
}

/// Proof of one confirmed fund movement.
///
/// `receipt_digest` is computed over the canonical bytes of the receipt's
/// payload (everything except the digest itself), making the receipt
/// content-addressed and tamper-evident.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementReceipt {
    /// Unique receipt identifier.
    pub receipt_id: Uuid,
    /// The settled escrow.
    pub escrow_id: EscrowId,
    /// The settled milestone, for milestone releases.
    pub milestone_id: Option<MilestoneId>,
    /// The kind of movement.
    pub intent: SettlementIntent,
    /// Where the funds went.
    pub destination: Address,
    /// The amount moved, smallest currency unit.
    pub amount: Amount,
    /// The provider's transaction id.
    pub tx_id: TxId,
    /// When the provider confirmed finality (UTC).
    pub confirmed_at: Timestamp,
    /// Digest over the receipt's canonical payload.
    pub receipt_digest: ContentDigest,
}

// ── The Executor ───────────────────────────────────────────────────────

/// Executes settlement requests against a chain provider.
///
/// Explicitly constructed with its vault, master secret, and provider;
/// no process-wide instance. Calls are blocking network I/O and belong
/// off latency-sensitive paths.
pub struct SettlementExecutor {
    vault: KeyVault,
    master: MasterSecret,
    provider: Arc<dyn ChainProvider>,
    ledger: DashMap<IdempotencyKey, AttemptState>,
}

impl SettlementExecutor {
    /// Create an executor.
    pub fn new(vault: KeyVault, master: MasterSecret, provider: Arc<dyn ChainProvider>) -> Self {
        Self {
            vault,
            master,
            provider,
            ledger: DashMap::new(),
        }
    }

    /// Execute one fund movement and return its receipt.
    ///
    /// Idempotent per `(escrow_id, milestone_id?, intent, leg)`: a repeat
    /// of a completed movement returns the recorded receipt; a repeat of an
    /// in-flight movement re-awaits the recorded transaction.
    ///
    /// # Errors
    ///
    /// Returns [`SettlementError`] on key-material, balance, or provider
    /// failure. The caller must not commit its state transition on error;
    /// retryable errors (`is_retryable()`) may be re-driven safely.
    pub fn execute(
        &self,
        request: &SettlementRequest,
    ) -> Result<SettlementReceipt, SettlementError> {
        let key = request.idempotency_key();

        match self.ledger.get(&key).map(|entry| entry.clone()) {
            Some(AttemptState::Completed { receipt }) => {
                tracing::debug!(
                    escrow_id = %request.escrow_id,
                    intent = %request.intent,
                    leg = request.leg,
                    tx_id = %receipt.tx_id,
                    "settlement already completed, returning recorded receipt"
                );
                return Ok(receipt);
            }
            Some(AttemptState::InFlight { tx_id }) => {
                tracing::info!(
                    escrow_id = %request.escrow_id,
                    intent = %request.intent,
                    leg = request.leg,
                    tx_id = %tx_id,
                    "settlement in flight, re-awaiting confirmation"
                );
                return self.confirm_and_record(request, key, tx_id);
            }
            None => {}
        }

        // Custody key exists decrypted only for this signing operation.
        let keypair = self.decrypt_custody_key(request)?;

        let available = self.provider.get_balance(&request.source)?;
        if available < request.amount {
            return Err(SettlementError::InsufficientBalance {
                escrow_id: request.escrow_id.to_string(),
                source_address: request.source.to_string(),
                required: request.amount.value(),
                available: available.value(),
            });
        }

        let intent = self.build_signed_intent(request, &keypair)?;
        drop(keypair);

        let tx_id = self.send_with_retry(request, &intent)?;
        self.ledger
            .insert(key, AttemptState::InFlight { tx_id: tx_id.clone() });
        self.confirm_and_record(request, key, tx_id)
    }

    fn decrypt_custody_key(
        &self,
        request: &SettlementRequest,
    ) -> Result<CustodyKeypair, SettlementError> {
        let seed = self
            .vault
            .decrypt(&request.encrypted_custody_key, &self.master)
            .map_err(|e| {
                // Key-material failure: fatal for this escrow's settlement
                // path, flagged for manual review. The log carries no
                // plaintext.
                tracing::error!(
                    escrow_id = %request.escrow_id,
                    intent = %request.intent,
                    error = %e,
                    "custody key decryption failed, settlement requires manual review"
                );
                e
            })?;
        Ok(CustodyKeypair::from_seed(&seed)?)
    }

    fn build_signed_intent(
        &self,
        request: &SettlementRequest,
        keypair: &CustodyKeypair,
    ) -> Result<SignedIntent, SettlementError> {
        let payload = json!({
            "escrow_id": request.escrow_id.to_string(),
            "milestone_id": request.milestone_id.map(|m| m.to_string()),
            "intent": request.intent.as_str(),
            "leg": request.leg,
            "source": request.source.as_str(),
            "destination": request.destination.as_str(),
            "amount": request.amount.value(),
        });
        let canonical = CanonicalBytes::new(&payload)?;
        let signature = keypair.sign(&canonical);
        let signature_hex: String = signature
            .to_bytes()
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect();
        Ok(SignedIntent {
            source: request.source.clone(),
            destination: request.destination.clone(),
            amount: request.amount,
            payload_digest: sha256_digest(&canonical),
            signature: signature_hex,
            signer: keypair.address(),
        })
    }

    /// Submit with bounded exponential backoff on transient errors only.
    fn send_with_retry(
        &self,
        request: &SettlementRequest,
        intent: &SignedIntent,
    ) -> Result<TxId, SettlementError> {
        for attempt in 0..MAX_RETRIES {
            match self.provider.send_funds(intent) {
                Ok(tx_id) => return Ok(tx_id),
                Err(e) if e.is_transient() => {
                    let delay = Duration::from_millis(BASE_DELAY_MS * 2u64.pow(attempt));
                    tracing::warn!(
                        escrow_id = %request.escrow_id,
                        intent = %request.intent,
                        attempt = attempt + 1,
                        max_retries = MAX_RETRIES,
                        "transient provider failure, retrying in {delay:?}: {e}"
                    );
                    std::thread::sleep(delay);
                }
                Err(e) => {
                    tracing::error!(
                        escrow_id = %request.escrow_id,
                        intent = %request.intent,
                        amount = request.amount.value(),
                        destination = %request.destination,
                        error = %e,
                        "provider rejected settlement intent"
                    );
                    return Err(e.into());
                }
            }
        }
        // Final attempt without retry.
        self.provider.send_funds(intent).map_err(|e| {
            tracing::error!(
                escrow_id = %request.escrow_id,
                intent = %request.intent,
                amount = request.amount.value(),
                destination = %request.destination,
                error = %e,
                "settlement send failed after {MAX_RETRIES} retries"
            );
            e.into()
        })
    }

    fn confirm_and_record(
        &self,
        request: &SettlementRequest,
        key: IdempotencyKey,
        tx_id: TxId,
    ) -> Result<SettlementReceipt, SettlementError> {
        // The in-flight entry stays on failure so a retry re-awaits this
        // transaction instead of re-sending.
        let confirmation = self.provider.wait_for_confirmation(&tx_id)?;
        let receipt = build_receipt(request, &tx_id, confirmation.confirmed_at)?;
        self.ledger.insert(
            key,
            AttemptState::Completed {
                receipt: receipt.clone(),
            },
        );
        tracing::info!(
            escrow_id = %request.escrow_id,
            intent = %request.intent,
            leg = request.leg,
            amount = request.amount.value(),
            tx_id = %tx_id,
            "settlement confirmed"
        );
        Ok(receipt)
    }
}

/// Assemble a receipt, digesting its canonical payload.
fn build_receipt(
    request: &SettlementRequest,
    tx_id: &TxId,
    confirmed_at: Timestamp,
) -> Result<SettlementReceipt, SettlementError> {
    let receipt_id = Uuid::new_v4();
    let payload = json!({
        "receipt_id": receipt_id.to_string(),
        "escrow_id": request.escrow_id.to_string(),
        "milestone_id": request.milestone_id.map(|m| m.to_string()),
        "intent": request.intent.as_str(),
        "destination": request.destination.as_str(),
        "amount": request.amount.value(),
        "tx_id": tx_id.as_str(),
        "confirmed_at": confirmed_at.to_iso8601(),
    });
    let canonical = CanonicalBytes::new(&payload)?;
    Ok(SettlementReceipt {
        receipt_id,
        escrow_id: request.escrow_id,
        milestone_id: request.milestone_id,
        intent: request.intent,
        destination: request.destination.clone(),
        amount: request.amount,
        tx_id: tx_id.clone(),
        confirmed_at,
        receipt_digest: sha256_digest(&canonical),
    })
}

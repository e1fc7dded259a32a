//! # Chain Provider
//!
//! The outbound boundary for fund movement. [`ChainProvider`] abstracts the
//! chain or payment rail; the executor signs an intent with the escrow's
//! custody key, submits it, and awaits provider-confirmed finality.
//!
//! [`MockChainProvider`] is the deterministic test double: it tracks
//! balances, records every sent intent, and supports scripted failure
//! injection.

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use escrow_core::{Address, Amount, ContentDigest, Timestamp};

// ── Provider Errors ────────────────────────────────────────────────────

/// Errors from the chain/payment provider.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// The provider was unreachable or the connection dropped. Transient.
    #[error("provider network failure: {reason}")]
    Network {
        /// The transport-level failure.
        reason: String,
    },

    /// The provider did not answer in time. Transient.
    #[error("provider timed out: {reason}")]
    Timeout {
        /// What was being awaited.
        reason: String,
    },

    /// The provider refused the intent. Permanent.
    #[error("provider rejected the intent: {reason}")]
    Rejected {
        /// The provider's stated reason.
        reason: String,
    },

    /// The provider does not know the transaction id. Permanent.
    #[error("unknown transaction {tx_id}")]
    UnknownTransaction {
        /// The id the provider could not find.
        tx_id: String,
    },
}

impl ProviderError {
    /// Whether a retry of the same call can succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network { .. } | Self::Timeout { .. })
    }
}

// ── Wire Types ─────────────────────────────────────────────────────────

/// A provider-assigned transaction identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxId(String);

impl TxId {
    /// Wrap a provider-assigned id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw id string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TxId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Provider-confirmed finality for one transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Confirmation {
    /// The confirmed transaction.
    pub tx_id: TxId,
    /// When the provider confirmed it (UTC).
    pub confirmed_at: Timestamp,
}

/// A payout intent signed by the escrow's custody key.
///
/// The signature covers the canonical bytes of the intent payload
/// (escrow, intent kind, leg, source, destination, amount), so the
/// provider-bound message is tamper-evident end to end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedIntent {
    /// The custody address funds leave from.
    pub source: Address,
    /// The payout destination.
    pub destination: Address,
    /// The amount to move, smallest currency unit.
    pub amount: Amount,
    /// Digest of the canonical intent payload the signature covers.
    pub payload_digest: ContentDigest,
    /// Ed25519 signature over the canonical payload bytes, lowercase hex.
    pub signature: String,
    /// The signing custody address (hex-encoded public key).
    pub signer: Address,
}

// ── The Provider Trait ─────────────────────────────────────────────────

/// A chain or payment rail capable of holding balances and moving funds.
///
/// Implementations are injected as `Arc<dyn ChainProvider>`; calls are
/// blocking network I/O and belong off latency-sensitive paths.
pub trait ChainProvider: Send + Sync {
    /// The current balance of an address.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] on provider failure.
    fn get_balance(&self, address: &Address) -> Result<Amount, ProviderError>;

    /// Submit a signed intent; returns the provider's transaction id.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] on provider failure or rejection.
    fn send_funds(&self, intent: &SignedIntent) -> Result<TxId, ProviderError>;

    /// Block until the provider confirms finality for a transaction.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] on provider failure or an unknown id.
    fn wait_for_confirmation(&self, tx_id: &TxId) -> Result<Confirmation, ProviderError>;
}

// ── Mock Provider ──────────────────────────────────────────────────────

#[derive(Default)]
struct MockState {
    balances: HashMap<Address, u64>,
    sent: Vec<SignedIntent>,
    confirmed: HashMap<TxId, Confirmation>,
    send_failures: VecDeque<ProviderError>,
    confirmation_failures: VecDeque<ProviderError>,
    next_tx: u64,
}

/// Deterministic in-memory provider for tests and local runs.
///
/// Transaction ids are assigned sequentially (`mocktx-0`, `mocktx-1`, …).
/// `send_funds` debits the source and credits the destination immediately;
/// scripted failures are consumed front-to-back before any real send.
#[derive(Default)]
pub struct MockChainProvider {
    state: Mutex<MockState>,
}

impl MockChainProvider {
    /// Create an empty provider (all balances zero).
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the balance of an address.
    pub fn set_balance(&self, address: Address, amount: Amount) {
        self.state.lock().balances.insert(address, amount.value());
    }

    /// Queue a failure for the next `send_funds` call. Queued failures are
    /// consumed in order before any send succeeds.
    pub fn fail_next_send(&self, error: ProviderError) {
        self.state.lock().send_failures.push_back(error);
    }

    /// Queue a failure for the next `wait_for_confirmation` call.
    pub fn fail_next_confirmation(&self, error: ProviderError) {
        self.state.lock().confirmation_failures.push_back(error);
    }

    /// All intents successfully sent so far, in order.
    pub fn sent_intents(&self) -> Vec<SignedIntent> {
        self.state.lock().sent.clone()
    }

    /// The current balance of an address (0 if never set).
    pub fn balance_of(&self, address: &Address) -> Amount {
        Amount::new(*self.state.lock().balances.get(address).unwrap_or(&0))
    }
}

impl ChainProvider for MockChainProvider {
    fn get_balance(&self, address: &Address) -> Result<Amount, ProviderError> {
        Ok(self.balance_of(address))
    }

    fn send_funds(&self, intent: &SignedIntent) -> Result<TxId, ProviderError> {
        let mut state = self.state.lock();
        if let Some(err) = state.send_failures.pop_front() {
            return Err(err);
        }
        let available = *state.balances.get(&intent.source).unwrap_or(&0);
        if available < intent.amount.value() {
            return Err(ProviderError::Rejected {
                reason: format!(
                    "balance {available} below intent amount {}",
                    intent.amount.value()
                ),
            });
        }
        state
            .balances
            .insert(intent.source.clone(), available - intent.amount.value());
        *state.balances.entry(intent.destination.clone()).or_insert(0) +=
            intent.amount.value();

        let tx_id = TxId::new(format!("mocktx-{}", state.next_tx));
        state.next_tx += 1;
        state.sent.push(intent.clone());
        state.confirmed.insert(
            tx_id.clone(),
            Confirmation {
                tx_id: tx_id.clone(),
                confirmed_at: Timestamp::now(),
            },
        );
        Ok(tx_id)
    }

    fn wait_for_confirmation(&self, tx_id: &TxId) -> Result<Confirmation, ProviderError> {
        let mut state = self.state.lock();
        if let Some(err) = state.confirmation_failures.pop_front() {
            return Err(err);
        }
        state
            .confirmed
            .get(tx_id)
            .cloned()
            .ok_or_else(|| ProviderError::UnknownTransaction {
                tx_id: tx_id.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use escrow_core::{sha256_digest, CanonicalBytes};
    use serde_json::json;

    fn addr(s: &str) -> Address {
        Address::new(s).unwrap()
    }

    fn intent(source: &str, destination: &str, amount: u64) -> SignedIntent {
        let canonical = CanonicalBytes::new(&json!({"intent": "test"})).unwrap();
        SignedIntent {
            source: addr(source),
            destination: addr(destination),
            amount: Amount::new(amount),
            payload_digest: sha256_digest(&canonical),
            signature: "00".repeat(64),
            signer: addr(source),
        }
    }

    #[test]
    fn send_moves_balance_and_assigns_sequential_ids() {
        let provider = MockChainProvider::new();
        provider.set_balance(addr("custody-1"), Amount::new(1000));

        let tx0 = provider.send_funds(&intent("custody-1", "seller-1", 600)).unwrap();
        let tx1 = provider.send_funds(&intent("custody-1", "seller-1", 400)).unwrap();
        assert_eq!(tx0.as_str(), "mocktx-0");
        assert_eq!(tx1.as_str(), "mocktx-1");
        assert_eq!(provider.balance_of(&addr("custody-1")), Amount::ZERO);
        assert_eq!(provider.balance_of(&addr("seller-1")), Amount::new(1000));
        assert_eq!(provider.sent_intents().len(), 2);
    }

    #[test]
    fn overdraw_is_rejected_permanently() {
        let provider = MockChainProvider::new();
        provider.set_balance(addr("custody-1"), Amount::new(100));
        let err = provider
            .send_funds(&intent("custody-1", "seller-1", 500))
            .unwrap_err();
        assert!(matches!(err, ProviderError::Rejected { .. }));
        assert!(!err.is_transient());
        // Balance untouched on rejection.
        assert_eq!(provider.balance_of(&addr("custody-1")), Amount::new(100));
    }

    #[test]
    fn scripted_failures_consume_in_order() {
        let provider = MockChainProvider::new();
        provider.set_balance(addr("custody-1"), Amount::new(1000));
        provider.fail_next_send(ProviderError::Network {
            reason: "reset".to_string(),
        });

        assert!(provider.send_funds(&intent("custody-1", "seller-1", 100)).is_err());
        assert!(provider.send_funds(&intent("custody-1", "seller-1", 100)).is_ok());
    }

    #[test]
    fn confirmation_known_only_for_sent_transactions() {
        let provider = MockChainProvider::new();
        provider.set_balance(addr("custody-1"), Amount::new(1000));
        let tx = provider.send_funds(&intent("custody-1", "seller-1", 100)).unwrap();

        assert!(provider.wait_for_confirmation(&tx).is_ok());
        let err = provider
            .wait_for_confirmation(&TxId::new("mocktx-99"))
            .unwrap_err();
        assert!(matches!(err, ProviderError::UnknownTransaction { .. }));
    }
}

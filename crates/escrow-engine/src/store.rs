//! # Versioned Storage
//!
//! The persistence boundary for escrows and disputes. Records are wrapped
//! in [`Versioned`] and written with compare-and-swap on the version
//! number: the per-escrow mutex serializes writers, CAS is the backstop —
//! a lost CAS surfaces as a version conflict and the caller retries the
//! whole operation.
//!
//! [`InMemoryEscrowStore`] backs tests and local runs with `DashMap`s.

use dashmap::DashMap;
use thiserror::Error;

use escrow_arbitration::Dispute;
use escrow_core::{DisputeId, EscrowId};
use escrow_state::Escrow;

/// A stored record with its optimistic-concurrency version.
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<T> {
    /// The stored record.
    pub record: T,
    /// Version number, incremented on every successful put.
    pub version: u64,
}

/// Errors from store operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// An insert collided with an existing record.
    #[error("record {id} already exists")]
    AlreadyExists {
        /// The colliding identifier.
        id: String,
    },

    /// A put targeted a record that does not exist.
    #[error("record {id} not found")]
    NotFound {
        /// The missing identifier.
        id: String,
    },

    /// A compare-and-swap lost: the stored version moved underneath the
    /// writer.
    #[error("version conflict on {id}: expected {expected}, found {found}")]
    VersionConflict {
        /// The contended identifier.
        id: String,
        /// The version the writer read.
        expected: u64,
        /// The version actually stored.
        found: u64,
    },
}

/// Storage for escrows and disputes.
///
/// Injected as `Arc<dyn EscrowStore>`; implementations must be safe for
/// concurrent readers and writers.
pub trait EscrowStore: Send + Sync {
    /// Fetch an escrow with its version.
    fn get_escrow(&self, id: &EscrowId) -> Option<Versioned<Escrow>>;

    /// Insert a new escrow at version 0.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::AlreadyExists`] on id collision.
    fn insert_escrow(&self, escrow: Escrow) -> Result<(), StoreError>;

    /// Replace an escrow iff the stored version equals `expected_version`;
    /// returns the new version.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::VersionConflict`] on a lost CAS and
    /// [`StoreError::NotFound`] for an unknown id.
    fn put_escrow(&self, escrow: Escrow, expected_version: u64) -> Result<u64, StoreError>;

    /// Fetch a dispute with its version.
    fn get_dispute(&self, id: &DisputeId) -> Option<Versioned<Dispute>>;

    /// Insert a new dispute at version 0.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::AlreadyExists`] on id collision.
    fn insert_dispute(&self, dispute: Dispute) -> Result<(), StoreError>;

    /// Replace a dispute iff the stored version equals `expected_version`;
    /// returns the new version.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::VersionConflict`] on a lost CAS and
    /// [`StoreError::NotFound`] for an unknown id.
    fn put_dispute(&self, dispute: Dispute, expected_version: u64) -> Result<u64, StoreError>;

    /// The dispute currently active (pre-resolution) for an escrow, if any.
    fn active_dispute_for(&self, escrow_id: &EscrowId) -> Option<Versioned<Dispute>>;

    /// All stored escrow ids, for scheduler sweeps.
    fn escrow_ids(&self) -> Vec<EscrowId>;

    /// All stored dispute ids, for scheduler sweeps.
    fn dispute_ids(&self) -> Vec<DisputeId>;
}

/// `DashMap`-backed store for tests and local runs.
#[derive(Default)]
pub struct InMemoryEscrowStore {
    escrows: DashMap<EscrowId, Versioned<Escrow>>,
    disputes: DashMap<DisputeId, Versioned<Dispute>>,
    /// Index of the active (pre-resolution) dispute per escrow.
    active_disputes: DashMap<EscrowId, DisputeId>,
}

impl InMemoryEscrowStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn index_dispute(&self, dispute: &Dispute) {
        if dispute.status.is_pre_resolution() {
            self.active_disputes.insert(dispute.escrow_id, dispute.id);
        } else if self
            .active_disputes
            .get(&dispute.escrow_id)
            .is_some_and(|entry| *entry == dispute.id)
        {
            self.active_disputes.remove(&dispute.escrow_id);
        }
    }
}

impl EscrowStore for InMemoryEscrowStore {
    fn get_escrow(&self, id: &EscrowId) -> Option<Versioned<Escrow>> {
        self.escrows.get(id).map(|entry| entry.clone())
    }

    fn insert_escrow(&self, escrow: Escrow) -> Result<(), StoreError> {
        let id = escrow.id;
        match self.escrows.entry(id) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(StoreError::AlreadyExists {
                id: id.to_string(),
            }),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(Versioned {
                    record: escrow,
                    version: 0,
                });
                Ok(())
            }
        }
    }

    fn put_escrow(&self, escrow: Escrow, expected_version: u64) -> Result<u64, StoreError> {
        let id = escrow.id;
        let mut entry = self.escrows.get_mut(&id).ok_or_else(|| StoreError::NotFound {
            id: id.to_string(),
        })?;
        if entry.version != expected_version {
            return Err(StoreError::VersionConflict {
                id: id.to_string(),
                expected: expected_version,
                found: entry.version,
            });
        }
        entry.record = escrow;
        entry.version += 1;
        Ok(entry.version)
    }

    fn get_dispute(&self, id: &DisputeId) -> Option<Versioned<Dispute>> {
        self.disputes.get(id).map(|entry| entry.clone())
    }

    fn insert_dispute(&self, dispute: Dispute) -> Result<(), StoreError> {
        let id = dispute.id;
        match self.disputes.entry(id) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(StoreError::AlreadyExists {
                id: id.to_string(),
            }),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                self.index_dispute(&dispute);
                slot.insert(Versioned {
                    record: dispute,
                    version: 0,
                });
                Ok(())
            }
        }
    }

    fn put_dispute(&self, dispute: Dispute, expected_version: u64) -> Result<u64, StoreError> {
        let id = dispute.id;
        let mut entry = self.disputes.get_mut(&id).ok_or_else(|| StoreError::NotFound {
            id: id.to_string(),
        })?;
        if entry.version != expected_version {
            return Err(StoreError::VersionConflict {
                id: id.to_string(),
                expected: expected_version,
                found: entry.version,
            });
        }
        self.index_dispute(&dispute);
        entry.record = dispute;
        entry.version += 1;
        Ok(entry.version)
    }

    fn active_dispute_for(&self, escrow_id: &EscrowId) -> Option<Versioned<Dispute>> {
        let dispute_id = *self.active_disputes.get(escrow_id)?;
        self.get_dispute(&dispute_id)
    }

    fn escrow_ids(&self) -> Vec<EscrowId> {
        self.escrows.iter().map(|entry| *entry.key()).collect()
    }

    fn dispute_ids(&self) -> Vec<DisputeId> {
        self.disputes.iter().map(|entry| *entry.key()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use escrow_core::{Actor, Address, Amount, Timestamp};
    use escrow_split::{ResidualPolicy, SplitConfig};
    use escrow_state::{EscrowKind, EscrowParams};
    use escrow_vault::EncryptedKeyBlob;

    fn escrow() -> Escrow {
        Escrow::create(
            EscrowParams {
                buyer: Address::new("buyer-main").unwrap(),
                seller: Address::new("seller-main").unwrap(),
                total_amount: Amount::new(1000),
                currency: "USD".to_string(),
                kind: EscrowKind::Simple,
                release_date: None,
                auto_release: false,
                recipients: Vec::new(),
                milestones: Vec::new(),
                deposit_address: Address::new("deposit-addr").unwrap(),
                encrypted_custody_key: EncryptedKeyBlob::from_bytes(vec![
                    0u8;
                    EncryptedKeyBlob::MIN_LEN
                ])
                .unwrap(),
            },
            ResidualPolicy::AssignToFirst,
            &SplitConfig::default(),
            Timestamp::parse("2026-01-01T00:00:00Z").unwrap(),
        )
        .unwrap()
    }

    fn dispute_for(escrow: &Escrow) -> Dispute {
        Dispute::open(
            escrow.id,
            escrow_arbitration::Party::new(escrow.buyer.clone(), Actor::Buyer).unwrap(),
            escrow_arbitration::Party::new(escrow.seller.clone(), Actor::Seller).unwrap(),
            escrow.total_amount,
            escrow_arbitration::DisputeType::Other,
            "claim",
            Timestamp::parse("2026-01-05T00:00:00Z").unwrap(),
            14,
        )
        .unwrap()
    }

    #[test]
    fn insert_then_get_at_version_zero() {
        let store = InMemoryEscrowStore::new();
        let e = escrow();
        let id = e.id;
        store.insert_escrow(e).unwrap();
        let stored = store.get_escrow(&id).unwrap();
        assert_eq!(stored.version, 0);
        assert_eq!(stored.record.id, id);
    }

    #[test]
    fn double_insert_rejected() {
        let store = InMemoryEscrowStore::new();
        let e = escrow();
        store.insert_escrow(e.clone()).unwrap();
        assert!(matches!(
            store.insert_escrow(e).unwrap_err(),
            StoreError::AlreadyExists { .. }
        ));
    }

    #[test]
    fn cas_put_increments_version() {
        let store = InMemoryEscrowStore::new();
        let e = escrow();
        let id = e.id;
        store.insert_escrow(e.clone()).unwrap();
        let v1 = store.put_escrow(e.clone(), 0).unwrap();
        assert_eq!(v1, 1);
        assert_eq!(store.get_escrow(&id).unwrap().version, 1);
    }

    #[test]
    fn stale_cas_put_conflicts() {
        let store = InMemoryEscrowStore::new();
        let e = escrow();
        store.insert_escrow(e.clone()).unwrap();
        store.put_escrow(e.clone(), 0).unwrap();
        let err = store.put_escrow(e, 0).unwrap_err();
        assert!(matches!(
            err,
            StoreError::VersionConflict {
                expected: 0,
                found: 1,
                ..
            }
        ));
    }

    #[test]
    fn active_dispute_index_follows_lifecycle() {
        let store = InMemoryEscrowStore::new();
        let e = escrow();
        let escrow_id = e.id;
        store.insert_escrow(e.clone()).unwrap();

        let mut d = dispute_for(&e);
        store.insert_dispute(d.clone()).unwrap();
        assert!(store.active_dispute_for(&escrow_id).is_some());

        // Resolution drops the dispute from the active index.
        d.assign_arbiter(
            escrow_arbitration::Arbiter {
                id: "arb-1".to_string(),
                name: "Desk".to_string(),
            },
            Timestamp::parse("2026-01-06T00:00:00Z").unwrap(),
        )
        .unwrap();
        d.begin_evidence_collection("arb-1", Timestamp::parse("2026-01-07T00:00:00Z").unwrap())
            .unwrap();
        d.begin_arbitration("arb-1", Timestamp::parse("2026-01-08T00:00:00Z").unwrap())
            .unwrap();
        d.resolve(
            escrow_arbitration::ResolutionType::Dismissed,
            None,
            "no merit",
            "arb-1",
            Timestamp::parse("2026-01-09T00:00:00Z").unwrap(),
        )
        .unwrap();
        store.put_dispute(d, 0).unwrap();
        assert!(store.active_dispute_for(&escrow_id).is_none());
    }
}

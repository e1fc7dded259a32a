//! # Identifiers
//!
//! UUID-backed newtype identifiers for the escrow domain. Each identifier
//! renders with a distinct prefix (`escrow:`, `milestone:`, `dispute:`,
//! `evidence:`) so log lines and error messages are unambiguous about which
//! aggregate they reference.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A unique identifier for an escrow aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EscrowId(Uuid);

impl EscrowId {
    /// Create a new random escrow identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create an escrow identifier from an existing UUID.
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Access the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for EscrowId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EscrowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "escrow:{}", self.0)
    }
}

/// A unique identifier for a milestone within an escrow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MilestoneId(Uuid);

impl MilestoneId {
    /// Create a new random milestone identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a milestone identifier from an existing UUID.
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Access the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for MilestoneId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MilestoneId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "milestone:{}", self.0)
    }
}

/// A unique identifier for a dispute proceeding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DisputeId(Uuid);

impl DisputeId {
    /// Create a new random dispute identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a dispute identifier from an existing UUID.
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Access the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for DisputeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for DisputeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "dispute:{}", self.0)
    }
}

/// A unique identifier for a submitted piece of dispute evidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EvidenceId(Uuid);

impl EvidenceId {
    /// Create a new random evidence identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create an evidence identifier from an existing UUID.
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Access the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for EvidenceId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EvidenceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "evidence:{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escrow_id_display_prefix() {
        let id = EscrowId::new();
        assert!(format!("{id}").starts_with("escrow:"));
    }

    #[test]
    fn milestone_id_display_prefix() {
        let id = MilestoneId::new();
        assert!(format!("{id}").starts_with("milestone:"));
    }

    #[test]
    fn dispute_id_display_prefix() {
        let id = DisputeId::new();
        assert!(format!("{id}").starts_with("dispute:"));
    }

    #[test]
    fn evidence_id_display_prefix() {
        let id = EvidenceId::new();
        assert!(format!("{id}").starts_with("evidence:"));
    }

    #[test]
    fn ids_are_unique() {
        assert_ne!(EscrowId::new(), EscrowId::new());
        assert_ne!(DisputeId::new(), DisputeId::new());
    }

    #[test]
    fn from_uuid_roundtrip() {
        let uuid = Uuid::new_v4();
        let id = EscrowId::from_uuid(uuid);
        assert_eq!(*id.as_uuid(), uuid);
    }

    #[test]
    fn id_serialization_roundtrip() {
        let id = MilestoneId::new();
        let json = serde_json::to_string(&id).unwrap();
        let back: MilestoneId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}

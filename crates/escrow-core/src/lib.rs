//! # escrow-core — Foundational Types
//!
//! Shared kernel for the escrow custody & settlement engine. Everything in
//! this crate is a leaf: identifiers, monetary amounts, validated addresses,
//! UTC-only timestamps, canonical byte production, and content digests.
//!
//! ## Security Invariant
//!
//! All digest computation in the workspace flows through
//! [`CanonicalBytes`] → [`sha256_digest()`]. There is no other path from a
//! serializable value to a digest, which makes "hashed the wrong bytes"
//! defects structurally impossible.

pub mod amount;
pub mod canonical;
pub mod digest;
pub mod error;
pub mod ids;
pub mod party;
pub mod temporal;

pub use amount::{validate_currency, Amount};
pub use canonical::CanonicalBytes;
pub use digest::{sha256_digest, ContentDigest, DigestAlgorithm};
pub use error::{CanonicalizationError, ValidationError};
pub use ids::{DisputeId, EscrowId, EvidenceId, MilestoneId};
pub use party::{Actor, Address, TxHash};
pub use temporal::Timestamp;

//! # Parties and Addresses
//!
//! Validated address and transaction-hash newtypes, plus the `Actor`
//! role tag attached to every state-machine operation.
//!
//! Addresses compare case-insensitively: two recipient entries that differ
//! only in letter case refer to the same destination, and the split
//! validator treats them as duplicates.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Characters permitted inside an address beyond ASCII alphanumerics.
const ADDRESS_PUNCTUATION: &[char] = &[':', '-', '_', '.'];

/// A validated payment address.
///
/// The engine treats addresses as opaque provider-side destinations; only
/// shape is validated here (length 4–128, alphanumerics plus `:-_.`).
/// Equality on the wire-preserving string is exact; use
/// [`Address::normalized`] or [`Address::eq_normalized`] for the
/// case-insensitive comparisons the split validator and stores rely on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    /// Validate and wrap an address string.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyAddress`] for empty input and
    /// [`ValidationError::InvalidAddress`] for out-of-range length or
    /// characters outside the permitted set.
    pub fn new(addr: impl Into<String>) -> Result<Self, ValidationError> {
        let addr = addr.into();
        if addr.trim().is_empty() {
            return Err(ValidationError::EmptyAddress);
        }
        if !(4..=128).contains(&addr.len()) {
            return Err(ValidationError::InvalidAddress {
                address: addr.clone(),
                reason: format!("length {} outside 4..=128", addr.len()),
            });
        }
        if let Some(bad) = addr
            .chars()
            .find(|c| !c.is_ascii_alphanumeric() && !ADDRESS_PUNCTUATION.contains(c))
        {
            return Err(ValidationError::InvalidAddress {
                address: addr.clone(),
                reason: format!("character {bad:?} not permitted"),
            });
        }
        Ok(Self(addr))
    }

    /// The address string as given.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The lowercase normalization used for case-insensitive comparison.
    pub fn normalized(&self) -> String {
        self.0.to_ascii_lowercase()
    }

    /// Case-insensitive equality.
    pub fn eq_normalized(&self, other: &Address) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A provider-side transaction hash used as a funding proof.
///
/// Lowercase-normalized at construction so the idempotent funded check
/// (`mark_funded` with a repeated identical proof) is not defeated by
/// letter-case differences.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxHash(String);

impl TxHash {
    /// Validate and wrap a transaction hash: 8–128 hex characters,
    /// optional `0x` prefix (stripped).
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidTxHash`] on violation.
    pub fn new(hash: impl Into<String>) -> Result<Self, ValidationError> {
        let raw = hash.into();
        let stripped = raw.strip_prefix("0x").unwrap_or(&raw);
        if !(8..=128).contains(&stripped.len()) {
            return Err(ValidationError::InvalidTxHash {
                hash: raw.clone(),
                reason: format!("length {} outside 8..=128", stripped.len()),
            });
        }
        if !stripped.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ValidationError::InvalidTxHash {
                hash: raw.clone(),
                reason: "non-hex character".to_string(),
            });
        }
        Ok(Self(stripped.to_ascii_lowercase()))
    }

    /// The normalized (lowercase, unprefixed) hash string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TxHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The role performing a state-machine operation.
///
/// `System` tags scheduler-driven operations (auto-release sweeps,
/// expiration sweeps) that no human party initiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Actor {
    /// The party that funds the escrow.
    Buyer,
    /// The party that delivers and is paid out.
    Seller,
    /// A designated third party empowered to decide a dispute.
    Arbiter,
    /// The engine itself, acting on a scheduler tick.
    System,
}

impl Actor {
    /// The canonical string name of this role.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buyer => "buyer",
            Self::Seller => "seller",
            Self::Arbiter => "arbiter",
            Self::System => "system",
        }
    }
}

impl std::fmt::Display for Actor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

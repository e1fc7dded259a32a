//! # Content Digest — Content-Addressed Identifiers
//!
//! Defines `ContentDigest` for content-addressing settlement receipts and
//! dispute evidence.
//!
//! ## Security Invariant
//!
//! `ContentDigest` can only be computed from `CanonicalBytes`, ensuring
//! every digest in the system is produced through the canonicalization
//! pipeline. This is enforced by the signature of [`sha256_digest()`].

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::canonical::CanonicalBytes;

/// The hash algorithm used to produce a content digest.
///
/// SHA-256 only today; the tag keeps stored digests self-describing if an
/// algorithm migration ever becomes necessary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DigestAlgorithm {
    /// SHA-256 — standard content addressing.
    Sha256,
}

impl DigestAlgorithm {
    /// Returns the algorithm identifier string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
        }
    }
}

impl std::fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A content-addressed digest with its algorithm tag.
///
/// Produced exclusively from `CanonicalBytes` via [`sha256_digest()`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentDigest {
    /// The hash algorithm that produced this digest.
    pub algorithm: DigestAlgorithm,
    /// The raw 32-byte digest value.
    pub bytes: [u8; 32],
}

impl ContentDigest {
    /// Render the digest as a lowercase hex string.
    pub fn to_hex(&self) -> String {
        self.bytes.iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl std::fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.to_hex())
    }
}

/// Compute a SHA-256 content digest from canonical bytes.
///
/// The signature accepts only `&CanonicalBytes`, not raw `&[u8]`, so no
/// code path can compute a digest over non-canonical serialization.
pub fn sha256_digest(bytes: &CanonicalBytes) -> ContentDigest {
    let mut hasher = Sha256::new();
    hasher.update(bytes.as_bytes());
    let out = hasher.finalize();
    let mut digest = [0u8; 32];
    digest.copy_from_slice(&out);
    ContentDigest {
        algorithm: DigestAlgorithm::Sha256,
        bytes: digest,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_deterministic() {
        let cb = CanonicalBytes::new(&serde_json::json!({"a": 1})).unwrap();
        assert_eq!(sha256_digest(&cb), sha256_digest(&cb));
    }

    #[test]
    fn different_values_different_digests() {
        let a = sha256_digest(&CanonicalBytes::new(&serde_json::json!({"a": 1})).unwrap());
        let b = sha256_digest(&CanonicalBytes::new(&serde_json::json!({"a": 2})).unwrap());
        assert_ne!(a, b);
    }

    #[test]
    fn hex_is_64_chars() {
        let d = sha256_digest(&CanonicalBytes::new(&serde_json::json!("x")).unwrap());
        assert_eq!(d.to_hex().len(), 64);
    }

    #[test]
    fn display_carries_algorithm_tag() {
        let d = sha256_digest(&CanonicalBytes::new(&serde_json::json!("x")).unwrap());
        assert!(format!("{d}").starts_with("sha256:"));
    }

    #[test]
    fn known_vector() {
        // SHA-256 of the canonical form {"a":1}
        let cb = CanonicalBytes::new(&serde_json::json!({"a": 1})).unwrap();
        assert_eq!(cb.as_bytes(), br#"{"a":1}"#);
        let d = sha256_digest(&cb);
        assert_eq!(
            d.to_hex(),
            "015abd7f5cc57a2dd94b7590f04ad8084273905ee33ec5cebeae62276a97f862"
        );
    }
}

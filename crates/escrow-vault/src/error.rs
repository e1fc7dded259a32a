//! # Vault Error Types
//!
//! Structured errors for custody key operations. Error values never carry
//! key plaintext or the master secret — only lengths and variable names.

use thiserror::Error;

/// Errors from custody key generation, encryption, and decryption.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VaultError {
    /// The encrypted blob is too short to contain salt, nonce, and tag.
    #[error("malformed key blob: {len} bytes, need at least {min}")]
    MalformedBlob {
        /// Actual blob length in bytes.
        len: usize,
        /// Minimum structural length in bytes.
        min: usize,
    },

    /// AES-GCM authentication failed: tampered ciphertext or wrong master
    /// secret. The two are indistinguishable by design.
    #[error("key decryption failed: authentication tag mismatch")]
    DecryptionFailed,

    /// AES-GCM encryption failed.
    #[error("key encryption failed")]
    EncryptionFailed,

    /// Decrypted or supplied key material has the wrong shape.
    #[error("invalid key material: {reason}")]
    InvalidKeyMaterial {
        /// Why the material was rejected (never the material itself).
        reason: String,
    },

    /// A required environment variable is not set.
    #[error("environment variable {var} not set")]
    MissingEnv {
        /// The variable name.
        var: &'static str,
    },

    /// An environment variable is set but unparseable.
    #[error("environment variable {var} invalid: {reason}")]
    InvalidEnv {
        /// The variable name.
        var: &'static str,
        /// Why parsing failed.
        reason: String,
    },
}

impl VaultError {
    /// Whether this failure requires manual review of the escrow's
    /// settlement path rather than a retry.
    ///
    /// Corrupt key material and failed authentication are fatal for the
    /// affected escrow: retrying cannot recover the custody key.
    pub fn requires_manual_review(&self) -> bool {
        matches!(self, Self::MalformedBlob { .. } | Self::DecryptionFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decryption_failures_require_manual_review() {
        assert!(VaultError::DecryptionFailed.requires_manual_review());
        assert!(VaultError::MalformedBlob { len: 3, min: 44 }.requires_manual_review());
        assert!(!VaultError::MissingEnv { var: "X" }.requires_manual_review());
    }

    #[test]
    fn display_never_mentions_plaintext() {
        let err = VaultError::InvalidKeyMaterial {
            reason: "expected 32 bytes, got 16".to_string(),
        };
        assert!(format!("{err}").contains("32 bytes"));
    }
}

//! # Custody Keypairs
//!
//! Escrow-scoped Ed25519 keypairs. The public key's hex rendering is the
//! escrow's deposit address; the private seed signs outbound settlement
//! intents.
//!
//! ## Security Invariants
//!
//! - The private seed is exposed only as a `Zeroizing` buffer; the caller
//!   must encrypt it immediately and let the plaintext drop.
//! - `Debug` for [`CustodyKeypair`] prints the address only, never key
//!   material.

use ed25519_dalek::{Signer, SigningKey, VerifyingKey};
use rand_core::OsRng;
use zeroize::Zeroizing;

use escrow_core::{Address, CanonicalBytes};

use crate::error::VaultError;

/// Length of an Ed25519 private seed in bytes.
pub const SEED_LEN: usize = 32;

/// An escrow-scoped custodial keypair.
///
/// Generated once per escrow. The address is derived from the verifying
/// key and serves as the deposit target; the signing key authorizes
/// outbound settlement and exists in plaintext only transiently.
pub struct CustodyKeypair {
    signing_key: SigningKey,
}

impl CustodyKeypair {
    /// Generate a fresh keypair from the OS CSPRNG.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Reconstruct a keypair from a decrypted 32-byte seed.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::InvalidKeyMaterial`] if `seed` is not exactly
    /// 32 bytes.
    pub fn from_seed(seed: &[u8]) -> Result<Self, VaultError> {
        let seed: &[u8; SEED_LEN] =
            seed.try_into()
                .map_err(|_| VaultError::InvalidKeyMaterial {
                    reason: format!("expected {SEED_LEN}-byte seed, got {} bytes", seed.len()),
                })?;
        Ok(Self {
            signing_key: SigningKey::from_bytes(seed),
        })
    }

    /// The deposit address derived from the verifying key (lowercase hex).
    pub fn address(&self) -> Address {
        address_for(&self.signing_key.verifying_key())
    }

    /// The private seed, zeroized on drop.
    ///
    /// Callers must encrypt this immediately and let the buffer drop; the
    /// plaintext seed is never persisted.
    pub fn seed(&self) -> Zeroizing<Vec<u8>> {
        Zeroizing::new(self.signing_key.to_bytes().to_vec())
    }

    /// Sign canonical bytes with this keypair.
    ///
    /// Signing input is `&CanonicalBytes`, never raw bytes, so a signature
    /// always covers the canonical serialization of its payload.
    pub fn sign(&self, data: &CanonicalBytes) -> ed25519_dalek::Signature {
        self.signing_key.sign(data.as_bytes())
    }

    /// The verifying (public) key.
    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }
}

impl std::fmt::Debug for CustodyKeypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustodyKeypair")
            .field("address", &self.address().as_str())
            .finish_non_exhaustive()
    }
}

/// Derive the deposit address for a verifying key (lowercase hex of the
/// 32 public key bytes).
pub fn address_for(key: &VerifyingKey) -> Address {
    let hex: String = key.to_bytes().iter().map(|b| format!("{b:02x}")).collect();
    // 64 lowercase hex characters always satisfy the address shape rules.
    Address::new(hex).expect("hex-encoded public key is a valid address")
}

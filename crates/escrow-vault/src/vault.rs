//! # Key Vault — Envelope Encryption for Custody Seeds
//!
//! Encrypts custody key seeds under a master secret: PBKDF2-HMAC-SHA256
//! with a deliberately slow iteration count derives a fresh AES-256-GCM key
//! per record, and the blob layout is `salt || nonce || ciphertext+tag`.
//!
//! ## Security Invariants
//!
//! - A fresh random 16-byte salt is drawn per `encrypt()` call, so every
//!   stored secret is protected by a unique symmetric key even under one
//!   master secret.
//! - A fresh random 96-bit nonce is drawn per call; salt and nonce travel
//!   inside the blob.
//! - GCM authentication makes silent-garbage decryption structurally
//!   impossible: a tampered blob or wrong secret fails with
//!   [`VaultError::DecryptionFailed`].
//! - Key derivation is CPU-bound by design; callers schedule encrypt and
//!   decrypt off latency-sensitive paths.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use pbkdf2::pbkdf2_hmac;
use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::error::VaultError;
use crate::keypair::CustodyKeypair;

/// Per-record KDF salt length in bytes.
const SALT_LEN: usize = 16;
/// AES-GCM nonce length in bytes (96 bits).
const NONCE_LEN: usize = 12;
/// AES-GCM authentication tag length in bytes.
const TAG_LEN: usize = 16;

/// Environment variable overriding the KDF iteration count.
pub const KDF_ITERATIONS_ENV: &str = "ESCROW_VAULT_KDF_ITERATIONS";
/// Environment variable holding the master secret.
pub const MASTER_SECRET_ENV: &str = "ESCROW_MASTER_SECRET";

/// Vault tuning parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VaultConfig {
    /// PBKDF2-HMAC-SHA256 iteration count. The production default is slow
    /// on purpose; tests lower it.
    pub kdf_iterations: u32,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            kdf_iterations: 600_000,
        }
    }
}

impl VaultConfig {
    /// Read the configuration from the environment, falling back to the
    /// default iteration count when `ESCROW_VAULT_KDF_ITERATIONS` is unset.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::InvalidEnv`] if the variable is set but not a
    /// positive integer.
    pub fn from_env() -> Result<Self, VaultError> {
        match std::env::var(KDF_ITERATIONS_ENV) {
            Err(_) => Ok(Self::default()),
            Ok(raw) => {
                let kdf_iterations: u32 =
                    raw.parse()
                        .ok()
                        .filter(|n| *n > 0)
                        .ok_or(VaultError::InvalidEnv {
                            var: KDF_ITERATIONS_ENV,
                            reason: format!("expected a positive integer, got {raw:?}"),
                        })?;
                Ok(Self { kdf_iterations })
            }
        }
    }
}

/// The master secret that protects all custody key blobs.
///
/// Held in a zeroize-on-drop buffer; clones zeroize independently.
/// `Debug` prints a fixed placeholder.
#[derive(Clone)]
pub struct MasterSecret(Zeroizing<Vec<u8>>);

impl MasterSecret {
    /// Wrap raw secret bytes.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::InvalidKeyMaterial`] for an empty secret.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self, VaultError> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(VaultError::InvalidKeyMaterial {
                reason: "master secret must be non-empty".to_string(),
            });
        }
        Ok(Self(Zeroizing::new(bytes)))
    }

    /// Load the master secret from `ESCROW_MASTER_SECRET`.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::MissingEnv`] if the variable is unset and
    /// [`VaultError::InvalidKeyMaterial`] if it is empty.
    pub fn from_env() -> Result<Self, VaultError> {
        let raw = std::env::var(MASTER_SECRET_ENV).map_err(|_| VaultError::MissingEnv {
            var: MASTER_SECRET_ENV,
        })?;
        Self::new(raw.into_bytes())
    }

    fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for MasterSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MasterSecret(..)")
    }
}

/// An encrypted custody key blob: `salt || nonce || ciphertext+tag`.
///
/// Opaque to everything except [`KeyVault::decrypt`]. Stored on the escrow
/// aggregate and passed to the settlement executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncryptedKeyBlob(Vec<u8>);

impl EncryptedKeyBlob {
    /// Minimum structural length: salt, nonce, and an authentication tag.
    pub const MIN_LEN: usize = SALT_LEN + NONCE_LEN + TAG_LEN;

    /// Wrap stored blob bytes, checking the structural minimum length.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::MalformedBlob`] if the bytes cannot contain a
    /// salt, nonce, and tag.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, VaultError> {
        if bytes.len() < Self::MIN_LEN {
            return Err(VaultError::MalformedBlob {
                len: bytes.len(),
                min: Self::MIN_LEN,
            });
        }
        Ok(Self(bytes))
    }

    /// The raw blob bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Generates custody keypairs and encrypts/decrypts their seeds.
///
/// Constructed explicitly with its configuration; there is no process-wide
/// vault instance.
#[derive(Debug, Clone)]
pub struct KeyVault {
    config: VaultConfig,
}

impl KeyVault {
    /// Create a vault with the given configuration.
    pub fn new(config: VaultConfig) -> Self {
        Self { config }
    }

    /// Generate a fresh escrow-scoped custody keypair.
    ///
    /// The caller must immediately encrypt the seed via
    /// [`encrypt`](Self::encrypt) and let the plaintext drop.
    pub fn generate(&self) -> CustodyKeypair {
        CustodyKeypair::generate()
    }

    /// Encrypt a custody key seed under the master secret.
    ///
    /// Draws a fresh salt and nonce, derives a record-specific AES-256-GCM
    /// key via PBKDF2-HMAC-SHA256, and returns `salt || nonce || ct+tag`.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::EncryptionFailed`] if the cipher rejects the
    /// input.
    pub fn encrypt(
        &self,
        plaintext: &[u8],
        master: &MasterSecret,
    ) -> Result<EncryptedKeyBlob, VaultError> {
        let mut salt = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);

        let key = self.derive_key(master, &salt);
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&*key));
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| VaultError::EncryptionFailed)?;

        let mut blob = Vec::with_capacity(SALT_LEN + NONCE_LEN + ciphertext.len());
        blob.extend_from_slice(&salt);
        blob.extend_from_slice(&nonce);
        blob.extend_from_slice(&ciphertext);
        Ok(EncryptedKeyBlob(blob))
    }

    /// Decrypt a custody key blob.
    ///
    /// The returned plaintext is zeroized on drop; it must live only for
    /// the duration of one signing operation and is never logged.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::MalformedBlob`] for a structurally short blob
    /// and [`VaultError::DecryptionFailed`] when authentication fails
    /// (tampered ciphertext or wrong master secret).
    pub fn decrypt(
        &self,
        blob: &EncryptedKeyBlob,
        master: &MasterSecret,
    ) -> Result<Zeroizing<Vec<u8>>, VaultError> {
        let bytes = blob.as_bytes();
        if bytes.len() < EncryptedKeyBlob::MIN_LEN {
            return Err(VaultError::MalformedBlob {
                len: bytes.len(),
                min: EncryptedKeyBlob::MIN_LEN,
            });
        }
        let (salt, rest) = bytes.split_at(SALT_LEN);
        let (nonce, ciphertext) = rest.split_at(NONCE_LEN);

        let key = self.derive_key(master, salt);
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&*key));
        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| VaultError::DecryptionFailed)?;
        Ok(Zeroizing::new(plaintext))
    }

    /// Derive the record-specific symmetric key (zeroized on drop).
    fn derive_key(&self, master: &MasterSecret, salt: &[u8]) -> Zeroizing<[u8; 32]> {
        let mut key = Zeroizing::new([0u8; 32]);
        pbkdf2_hmac::<Sha256>(
            master.as_bytes(),
            salt,
            self.config.kdf_iterations,
            &mut *key,
        );
        key
    }
}

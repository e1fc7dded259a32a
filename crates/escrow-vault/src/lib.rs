//! # escrow-vault — Custodial Key Management
//!
//! Generates escrow-scoped Ed25519 custody keypairs and protects their
//! seeds at rest with envelope encryption: PBKDF2-HMAC-SHA256 key
//! derivation (slow by design, fresh salt per record) and AES-256-GCM.
//!
//! The vault never signs or sends anything itself: it hands the decrypted
//! seed to the settlement executor for the duration of one signing
//! operation, in a zeroize-on-drop buffer, and retains nothing.

pub mod error;
pub mod keypair;
pub mod vault;

pub use error::VaultError;
pub use keypair::{address_for, CustodyKeypair, SEED_LEN};
pub use vault::{
    EncryptedKeyBlob, KeyVault, MasterSecret, VaultConfig, KDF_ITERATIONS_ENV, MASTER_SECRET_ENV,
};

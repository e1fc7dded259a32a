//! # escrow-settlement — Settlement Execution
//!
//! Executes fund movements for the escrow engine: custody-key-signed payout
//! intents, bounded retry on transient provider errors, provider-confirmed
//! finality, and content-addressed receipts.
//!
//! The executor is idempotent per logical movement; the engine couples it
//! to state transitions so a movement and its commit form one logical unit.

pub mod error;
pub mod executor;
pub mod provider;

pub use error::SettlementError;
pub use executor::{SettlementExecutor, SettlementIntent, SettlementReceipt, SettlementRequest};
pub use provider::{
    ChainProvider, Confirmation, MockChainProvider, ProviderError, SignedIntent, TxId,
};

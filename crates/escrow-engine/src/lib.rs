//! # Escrow Engine
//!
//! The orchestration layer of the escrow stack. [`EscrowEngine`] wires
//! the state machines ([`escrow_state`], [`escrow_arbitration`]) to the
//! settlement executor ([`escrow_settlement`]) over a versioned store,
//! serializing all transitions for one escrow and coupling every
//! fund-moving transition to a confirmed settlement.
//!
//! Collaborators are injected: a [`store::EscrowStore`], a
//! [`escrow_settlement::ChainProvider`], a [`clock::Clock`], a
//! [`notify::Notifier`], and a [`notify::EscalationHook`]. In-memory and
//! null/recording implementations ship here for embedding and tests.

pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod notify;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::EngineConfig;
pub use engine::{CreateEscrowRequest, EscrowEngine};
pub use error::EngineError;
pub use notify::{
    EscalationHook, EscrowNotification, Notifier, NotifyError, NullEscalationHook, NullNotifier,
    RecordingEscalationHook, RecordingNotifier,
};
pub use store::{EscrowStore, InMemoryEscrowStore, StoreError, Versioned};

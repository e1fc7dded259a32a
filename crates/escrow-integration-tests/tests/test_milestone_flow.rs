//! # Milestone Escrows — Integration Tests
//!
//! Staged delivery: milestones complete and release strictly in plan
//! order, each release pays the seller its derived amount, and releasing
//! the last milestone releases the whole escrow. Derived amounts always
//! sum exactly to the escrow total.

use std::sync::Arc;

use escrow_core::{Actor, Address, Amount, Timestamp, TxHash};
use escrow_engine::{
    Clock, CreateEscrowRequest, EngineConfig, EscrowEngine, InMemoryEscrowStore, ManualClock,
    Notifier, NullEscalationHook, RecordingNotifier,
};
use escrow_settlement::{ChainProvider, MockChainProvider};
use escrow_state::{EscrowKind, EscrowStatus, MilestonePlan, MilestoneStatus, StateError};
use escrow_vault::{KeyVault, MasterSecret, VaultConfig};

use proptest::prelude::*;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct Harness {
    engine: EscrowEngine,
    provider: Arc<MockChainProvider>,
}

fn harness() -> Harness {
    let provider = Arc::new(MockChainProvider::new());
    let clock = Arc::new(ManualClock::new(
        Timestamp::parse("2026-02-01T00:00:00Z").unwrap(),
    ));
    let engine = EscrowEngine::new(
        Arc::new(InMemoryEscrowStore::new()),
        Arc::clone(&provider) as Arc<dyn ChainProvider>,
        KeyVault::new(VaultConfig { kdf_iterations: 1_000 }),
        MasterSecret::new(b"integration master secret".to_vec()).unwrap(),
        clock as Arc<dyn Clock>,
        Arc::new(RecordingNotifier::new()) as Arc<dyn Notifier>,
        Arc::new(NullEscalationHook),
        EngineConfig::default(),
    );
    Harness { engine, provider }
}

fn addr(s: &str) -> Address {
    Address::new(s).unwrap()
}

fn milestone_request(total: u64, plan: Vec<MilestonePlan>) -> CreateEscrowRequest {
    CreateEscrowRequest {
        buyer: addr("acct:buyer-01"),
        seller: addr("acct:seller-01"),
        total_amount: Amount::new(total),
        currency: "USD".to_string(),
        kind: EscrowKind::Milestone,
        release_date: None,
        auto_release: false,
        recipients: Vec::new(),
        milestones: plan,
    }
}

fn funded(h: &Harness, total: u64, plan: Vec<MilestonePlan>) -> escrow_state::Escrow {
    let escrow = h.engine.create_escrow(milestone_request(total, plan)).unwrap();
    h.provider
        .set_balance(escrow.deposit_address.clone(), escrow.total_amount);
    h.engine
        .mark_funded(
            escrow.id,
            TxHash::new("0xfeedface0011").unwrap(),
            Actor::Buyer,
        )
        .unwrap()
}

// ---------------------------------------------------------------------------
// Test: three-stage delivery in order
// ---------------------------------------------------------------------------

#[test]
fn three_milestones_release_in_order() {
    let h = harness();
    let escrow = funded(
        &h,
        10_000,
        vec![
            MilestonePlan::new("Design", 20.0),
            MilestonePlan::new("Build", 50.0),
            MilestonePlan::new("Handover", 30.0),
        ],
    );
    assert_eq!(escrow.milestones.len(), 3);
    assert_eq!(escrow.milestones[0].amount, Amount::new(2_000));
    assert_eq!(escrow.milestones[1].amount, Amount::new(5_000));
    assert_eq!(escrow.milestones[2].amount, Amount::new(3_000));

    let mut paid = 0u64;
    for plan_index in 0..3 {
        let milestone_id = escrow.milestones[plan_index].id;
        h.engine
            .complete_milestone(escrow.id, milestone_id, Actor::Seller)
            .unwrap();
        let after = h
            .engine
            .release_milestone(escrow.id, milestone_id, Actor::Buyer)
            .unwrap();
        assert_eq!(
            after.milestones[plan_index].status,
            MilestoneStatus::Released
        );
        paid += escrow.milestones[plan_index].amount.value();
        assert_eq!(
            h.provider.balance_of(&addr("acct:seller-01")),
            Amount::new(paid)
        );
    }

    // Last release flips the escrow.
    let done = h.engine.get_escrow(escrow.id).unwrap();
    assert_eq!(done.status, EscrowStatus::Released);
    assert_eq!(paid, 10_000);
}

// ---------------------------------------------------------------------------
// Test: order enforcement
// ---------------------------------------------------------------------------

#[test]
fn out_of_order_completion_rejected() {
    let h = harness();
    let escrow = funded(
        &h,
        10_000,
        vec![
            MilestonePlan::new("First", 50.0),
            MilestonePlan::new("Second", 50.0),
        ],
    );

    // The seller cannot skip ahead.
    let err = h
        .engine
        .complete_milestone(escrow.id, escrow.milestones[1].id, Actor::Seller)
        .unwrap_err();
    assert!(matches!(
        err,
        escrow_engine::EngineError::State(StateError::InvalidTransition { .. })
    ));

    // Nothing changed.
    let unchanged = h.engine.get_escrow(escrow.id).unwrap();
    assert_eq!(unchanged.milestones[1].status, MilestoneStatus::Pending);
}

#[test]
fn out_of_order_release_rejected() {
    let h = harness();
    let escrow = funded(
        &h,
        10_000,
        vec![
            MilestonePlan::new("First", 50.0),
            MilestonePlan::new("Second", 50.0),
        ],
    );
    let first = escrow.milestones[0].id;
    let second = escrow.milestones[1].id;

    // Both completed, but the buyer must release the first one first.
    h.engine
        .complete_milestone(escrow.id, first, Actor::Seller)
        .unwrap();
    h.engine
        .release_milestone(escrow.id, first, Actor::Buyer)
        .unwrap();
    h.engine
        .complete_milestone(escrow.id, second, Actor::Seller)
        .unwrap();

    // Re-releasing the first is rejected; releasing the second works.
    assert!(h
        .engine
        .release_milestone(escrow.id, first, Actor::Buyer)
        .is_err());
    h.engine
        .release_milestone(escrow.id, second, Actor::Buyer)
        .unwrap();
    assert_eq!(
        h.provider.balance_of(&addr("acct:seller-01")),
        Amount::new(10_000)
    );
}

// ---------------------------------------------------------------------------
// Test: role enforcement
// ---------------------------------------------------------------------------

#[test]
fn milestone_roles_enforced() {
    let h = harness();
    let escrow = funded(&h, 10_000, vec![MilestonePlan::new("Only", 100.0)]);
    let milestone_id = escrow.milestones[0].id;

    // Only the seller completes; only the buyer releases.
    assert!(h
        .engine
        .complete_milestone(escrow.id, milestone_id, Actor::Buyer)
        .is_err());
    h.engine
        .complete_milestone(escrow.id, milestone_id, Actor::Seller)
        .unwrap();
    assert!(h
        .engine
        .release_milestone(escrow.id, milestone_id, Actor::Seller)
        .is_err());

    // A milestone escrow has no whole-escrow release path.
    assert!(h.engine.release(escrow.id, Actor::Buyer).is_err());

    h.engine
        .release_milestone(escrow.id, milestone_id, Actor::Buyer)
        .unwrap();
    assert_eq!(
        h.engine.get_escrow(escrow.id).unwrap().status,
        EscrowStatus::Released
    );
}

// ---------------------------------------------------------------------------
// Test: derived amounts always sum to the total
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn milestone_amounts_sum_to_total(total in 1u64..10_000_000) {
        let h = harness();
        let escrow = funded(
            &h,
            total,
            vec![
                MilestonePlan::new("A", 33.33),
                MilestonePlan::new("B", 33.33),
                MilestonePlan::new("C", 33.34),
            ],
        );
        let sum: u64 = escrow
            .milestones
            .iter()
            .map(|m| m.amount.value())
            .sum();
        prop_assert_eq!(sum, total);
    }
}

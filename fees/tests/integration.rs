use std::sync::Arc;

use fees::{fee_amount, FeeEngine, FeeError};
use fountain_core::constants::PROTOCOL_PROJECT;
use fountain_core::testing::{
    RecordingTerminal, StaticController, StaticCycles, StaticDirectory, StaticPrices,
};
use fountain_core::{Currency, FundingCycle, FundingCycleMetadata, ProjectId, TerminalContext};
use ledger::LedgerStore;

const NATIVE: Currency = Currency(1);
const PROJECT: ProjectId = ProjectId(7);
const RATE: u64 = 25_000_000;
const ONE: u128 = 1_000_000_000_000_000_000;

fn ctx() -> TerminalContext {
    TerminalContext {
        address: "term-1".to_string(),
        token: "native".to_string(),
        decimals: 18,
        currency: NATIVE,
        base_weight_currency: NATIVE,
    }
}

fn cycle() -> FundingCycle {
    FundingCycle {
        number: 1,
        configuration: 100,
        start: 0,
        duration: 86400,
        weight: ONE,
        discount_rate: 0,
        metadata: FundingCycleMetadata::default(),
    }
}

struct Fixture {
    directory: Arc<StaticDirectory>,
    store: LedgerStore,
    engine: FeeEngine,
}

fn fixture() -> Fixture {
    let cycles = Arc::new(StaticCycles::new());
    cycles.set_cycle(PROTOCOL_PROJECT, cycle());
    let controller = Arc::new(StaticController::new());
    let prices = Arc::new(StaticPrices::new());
    let directory = Arc::new(StaticDirectory::new());
    let store = LedgerStore::new(cycles, controller, prices, directory.clone());
    let engine = FeeEngine::new(RATE, None, directory.clone()).unwrap();
    Fixture {
        directory,
        store,
        engine,
    }
}

#[test]
fn test_same_terminal_settlement_credits_protocol_balance() {
    let mut fx = fixture();
    // This terminal is also the protocol project's primary terminal
    let own = Arc::new(RecordingTerminal::new("term-1", "native", 18, NATIVE));
    fx.directory.set_primary(PROTOCOL_PROJECT, own);

    fx.engine.hold_fee(PROJECT, 1_000_000_000_000, 0, "owner");
    let settled = fx
        .engine
        .process_fees(&ctx(), &mut fx.store, PROJECT)
        .unwrap();

    let expected = fee_amount(1_000_000_000_000, RATE, 0).unwrap();
    assert_eq!(settled, expected);
    assert_eq!(fx.store.balance_of("term-1", PROTOCOL_PROJECT), expected);
    assert!(fx.engine.held_fees_of(PROJECT).is_empty());
}

#[test]
fn test_peer_terminal_settlement_invokes_pay() {
    let mut fx = fixture();
    let peer = Arc::new(RecordingTerminal::new("term-9", "native", 18, NATIVE));
    fx.directory.set_primary(PROTOCOL_PROJECT, peer.clone());

    fx.engine.hold_fee(PROJECT, 1_000_000_000_000, 0, "owner");
    let settled = fx
        .engine
        .process_fees(&ctx(), &mut fx.store, PROJECT)
        .unwrap();

    let paid = peer.paid.lock().unwrap();
    assert_eq!(paid.len(), 1);
    assert_eq!(paid[0].project, PROTOCOL_PROJECT);
    assert_eq!(paid[0].amount, settled);
    assert_eq!(paid[0].counterparty, "owner");
}

#[test]
fn test_settlement_requires_protocol_terminal() {
    let mut fx = fixture();
    fx.engine.hold_fee(PROJECT, 1_000_000, 0, "owner");

    let result = fx.engine.process_fees(&ctx(), &mut fx.store, PROJECT);
    assert!(matches!(
        result,
        Err(FeeError::ProtocolTerminalNotFound { .. })
    ));
    // The unsettled entry is still queued for a later attempt
    assert_eq!(fx.engine.held_fees_of(PROJECT).len(), 1);
}

#[test]
fn test_process_fees_is_idempotent_on_empty_queue() {
    let mut fx = fixture();
    let own = Arc::new(RecordingTerminal::new("term-1", "native", 18, NATIVE));
    fx.directory.set_primary(PROTOCOL_PROJECT, own);

    fx.engine.hold_fee(PROJECT, 1_000_000_000_000, 0, "owner");
    fx.engine
        .process_fees(&ctx(), &mut fx.store, PROJECT)
        .unwrap();

    // Nothing left: repeat calls settle zero and do not error
    assert_eq!(
        fx.engine
            .process_fees(&ctx(), &mut fx.store, PROJECT)
            .unwrap(),
        0
    );
    assert_eq!(
        fx.engine
            .process_fees(&ctx(), &mut fx.store, PROJECT)
            .unwrap(),
        0
    );
}

#[test]
fn test_faulted_settlement_requeues_unsettled_tail() {
    let mut fx = fixture();
    let peer = Arc::new(RecordingTerminal::new("term-9", "native", 18, NATIVE));
    fx.directory.set_primary(PROTOCOL_PROJECT, peer.clone());

    fx.engine.hold_fee(PROJECT, 100_000_000, 0, "first");
    fx.engine.hold_fee(PROJECT, 200_000_000, 0, "second");
    peer.fail.store(true, std::sync::atomic::Ordering::SeqCst);

    let result = fx.engine.process_fees(&ctx(), &mut fx.store, PROJECT);
    assert!(matches!(result, Err(FeeError::TerminalFault(_))));
    assert_eq!(fx.engine.held_fees_of(PROJECT).len(), 2);

    // Once the peer recovers, settlement drains the queue
    peer.fail.store(false, std::sync::atomic::Ordering::SeqCst);
    fx.engine
        .process_fees(&ctx(), &mut fx.store, PROJECT)
        .unwrap();
    assert!(fx.engine.held_fees_of(PROJECT).is_empty());
    assert_eq!(peer.paid.lock().unwrap().len(), 2);
}

#[test]
fn test_snapshot_roundtrip() {
    let mut fx = fixture();
    fx.engine.set_feeless("alice", true);
    fx.engine.hold_fee(PROJECT, 500, 0, "owner");

    let snapshot = fx.engine.snapshot();
    let mut restored = FeeEngine::new(0, None, fx.directory.clone()).unwrap();
    restored.restore(snapshot);

    assert_eq!(restored.fee_rate(), RATE);
    assert!(restored.is_feeless("alice"));
    assert_eq!(restored.held_fees_of(PROJECT).len(), 1);
}

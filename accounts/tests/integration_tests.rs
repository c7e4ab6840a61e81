//! End-to-end tests of the account cache:
//! events → router → engine → reconciliation → store → readback.
//!
//! Collaborators are the in-memory nullables except where a test exercises
//! the LMDB backend explicitly.

use std::sync::Arc;
use std::time::Duration;

use relay_accounts::{
    AccountCache, AccountCacheConfig, AccountEngine, AccountError, AccountMetrics,
    AccountService, Applied,
};
use relay_nullables::{ChainCall, NullChain, NullLock, NullStore};
use relay_store::layout::{balance_key, block_changes_key};
use relay_store::KvStore;
use relay_store_lmdb::{LmdbEnvironment, LmdbKvStore};
use relay_types::{
    Address, BalanceKey, BlockTag, ChainEvent, ForkEvent, NativeTransferEvent, TransferEvent,
    TxStatus, NATIVE_ASSET, U256,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn addr(n: u8) -> Address {
    Address::repeat_byte(n)
}

fn engine_with(config: AccountCacheConfig) -> (Arc<NullStore>, Arc<NullChain>, AccountEngine) {
    let store = Arc::new(NullStore::new());
    let chain = Arc::new(NullChain::new());
    let engine = AccountEngine::new(
        &config,
        store.clone(),
        chain.clone(),
        Arc::new(AccountMetrics::new()),
    );
    (store, chain, engine)
}

fn engine() -> (Arc<NullStore>, Arc<NullChain>, AccountEngine) {
    engine_with(AccountCacheConfig::default())
}

fn transfer(sender: u8, receiver: u8, status: TxStatus) -> ChainEvent {
    ChainEvent::Transfer(TransferEvent {
        from: addr(sender),
        to: addr(0xC0),
        protocol: addr(0xAA),
        sender: addr(sender),
        receiver: addr(receiver),
        value: U256::from(1_000u64),
        status,
        block_number: 0,
    })
}

fn native(from: u8, to: u8) -> ChainEvent {
    ChainEvent::NativeTransfer(NativeTransferEvent {
        from: addr(from),
        to: addr(to),
        value: U256::from(1u64),
        status: TxStatus::Success,
        block_number: 0,
    })
}

fn run_block(engine: &mut AccountEngine, block: u64, events: Vec<ChainEvent>) {
    engine.handle(ChainEvent::BlockNew { number: block }).unwrap();
    for event in events {
        engine.handle(event).unwrap();
    }
    engine.handle(ChainEvent::BlockEnd { number: block }).unwrap();
}

// ---------------------------------------------------------------------------
// 1. Marking and block-end
// ---------------------------------------------------------------------------

#[test]
fn duplicate_marks_produce_one_write() {
    let (store, _chain, mut engine) = engine();
    engine.handle(ChainEvent::BlockNew { number: 1 }).unwrap();
    assert!(engine.mark_balance_dirty(addr(1), addr(2)));
    assert!(!engine.mark_balance_dirty(addr(1), addr(2)));

    engine.handle(ChainEvent::BlockEnd { number: 1 }).unwrap();
    let key = balance_key(&BalanceKey::new(addr(1), addr(2)));
    assert_eq!(store.write_count(&key), 1);
}

#[test]
fn second_reconcile_without_events_writes_nothing() {
    let (store, _chain, mut engine) = engine();
    run_block(&mut engine, 1, vec![native(1, 2)]);
    assert!(!store.writes().is_empty());

    store.clear_write_log();
    let report = engine.reconcile(1);
    assert_eq!(report.written(), 0);
    assert!(store.writes().is_empty());
}

#[test]
fn non_success_transfer_inserts_nothing() {
    let (store, chain, mut engine) = engine();
    engine.handle(ChainEvent::BlockNew { number: 1 }).unwrap();
    assert_eq!(
        engine.handle(transfer(1, 2, TxStatus::Failed)).unwrap(),
        Applied::Dropped
    );
    assert_eq!(
        engine.handle(transfer(1, 2, TxStatus::Pending)).unwrap(),
        Applied::Dropped
    );
    assert_eq!(engine.pending_count(), 0);
    assert!(chain.calls().is_empty());

    engine.handle(ChainEvent::BlockEnd { number: 1 }).unwrap();
    assert!(store.writes().is_empty());
}

#[test]
fn reconciled_values_are_readable_through_the_cache() {
    let (store, chain, mut engine) = engine();
    chain.set_balance(addr(1), addr(0xAA), U256::from(900u64));
    chain.set_balance(addr(2), addr(0xAA), U256::from(100u64));
    chain.set_spender(addr(0xC0), addr(0x5E));
    chain.set_allowance(addr(1), addr(0xAA), addr(0x5E), U256::from(50u64));

    run_block(&mut engine, 7, vec![transfer(1, 2, TxStatus::Success)]);

    let cache = AccountCache::new(store, Duration::from_secs(60));
    let sender = cache.balance(addr(1), addr(0xAA)).unwrap().unwrap();
    assert_eq!(sender.value, U256::from(900u64));
    assert_eq!(sender.derived_at, BlockTag::Number(7));
    let receiver = cache.balance(addr(2), addr(0xAA)).unwrap().unwrap();
    assert_eq!(receiver.value, U256::from(100u64));
    let allowance = cache
        .allowance(addr(1), addr(0xAA), addr(0x5E))
        .unwrap()
        .unwrap();
    assert_eq!(allowance.value, U256::from(50u64));
    assert!(cache.balance(addr(1), NATIVE_ASSET).unwrap().is_some());
}

#[test]
fn reconciliation_converges_when_repeated() {
    let (store, chain, mut engine) = engine();
    chain.set_balance(addr(1), NATIVE_ASSET, U256::from(5u64));
    engine.handle(ChainEvent::BlockNew { number: 3 }).unwrap();
    engine.mark_balance_dirty(addr(1), NATIVE_ASSET);
    engine.reconcile(3);
    let key = balance_key(&BalanceKey::new(addr(1), NATIVE_ASSET));
    let first = store.get(&key).unwrap();

    engine.mark_balance_dirty(addr(1), NATIVE_ASSET);
    engine.reconcile(3);
    assert_eq!(store.get(&key).unwrap(), first);
}

#[test]
fn partial_failure_still_writes_other_keys() {
    let (store, chain, mut engine) = engine();
    chain.fail_reads_for(addr(2));
    run_block(&mut engine, 4, vec![native(1, 2), native(3, 4)]);

    for ok in [1, 3, 4] {
        assert!(store.contains_raw(&balance_key(&BalanceKey::new(addr(ok), NATIVE_ASSET))));
    }
    assert!(!store.contains_raw(&balance_key(&BalanceKey::new(addr(2), NATIVE_ASSET))));
    assert_eq!(engine.pending_count(), 0);
    assert_eq!(engine.last_finalized(), Some(4));
    assert_eq!(engine.metrics().key_failures.get(), 1);
}

// ---------------------------------------------------------------------------
// 2. Forks
// ---------------------------------------------------------------------------

#[test]
fn fork_replays_blocks_in_descending_order() {
    let (_store, chain, mut engine) = engine();
    for block in 100..=105u64 {
        run_block(&mut engine, block, vec![native(block as u8, 0xEE)]);
    }
    chain.clear_calls();

    let applied = engine
        .handle(ChainEvent::ForkDetected(ForkEvent {
            detected_block: 105,
            fork_block: 100,
        }))
        .unwrap();
    let Applied::ForkReplayed(reports) = applied else {
        panic!("expected a fork replay");
    };
    let blocks: Vec<u64> = reports.iter().map(|r| r.block).collect();
    assert_eq!(blocks, vec![105, 104, 103, 102, 101, 100]);

    // Each block re-reads its own sender first, always at the head.
    let senders: Vec<Address> = chain
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            ChainCall::Balance(key, BlockTag::Latest) if key.owner != addr(0xEE) => Some(key.owner),
            _ => None,
        })
        .collect();
    assert_eq!(
        senders,
        (100..=105u8).rev().map(addr).collect::<Vec<_>>()
    );
}

#[test]
fn fork_then_new_branch_resumes_from_fork_block() {
    let (store, _chain, mut engine) = engine();
    for block in 10..=12u64 {
        run_block(&mut engine, block, vec![native(block as u8, 1)]);
    }
    engine
        .handle(ChainEvent::ForkDetected(ForkEvent {
            detected_block: 12,
            fork_block: 11,
        }))
        .unwrap();
    assert_eq!(engine.cursor(), Some(11));
    assert_eq!(engine.last_finalized(), Some(10));
    assert!(!store.contains_raw(&block_changes_key(12)));

    run_block(&mut engine, 11, vec![native(0x31, 1)]);
    run_block(&mut engine, 12, vec![native(0x32, 1)]);
    assert_eq!(engine.last_finalized(), Some(12));
    assert!(store.contains_raw(&block_changes_key(12)));
}

#[test]
fn inverted_fork_is_rejected_and_state_kept() {
    let (_store, _chain, mut engine) = engine();
    run_block(&mut engine, 50, vec![native(1, 2)]);
    let result = engine.handle(ChainEvent::ForkDetected(ForkEvent {
        detected_block: 40,
        fork_block: 45,
    }));
    assert!(matches!(result, Err(AccountError::MalformedEvent(_))));
    assert_eq!(engine.cursor(), Some(50));
    assert_eq!(engine.last_finalized(), Some(50));
}

// ---------------------------------------------------------------------------
// 3. Retention
// ---------------------------------------------------------------------------

#[test]
fn retention_window_of_500_at_block_1000() {
    let (store, _chain, engine) = engine();
    let book = relay_accounts::BlockBook::new(store.clone());
    for block in [400u64, 500, 1000] {
        book.record(&relay_store::BlockChanges {
            block,
            balances: vec![BalanceKey::new(addr(1), NATIVE_ASSET)],
            allowances: vec![],
        })
        .unwrap();
    }

    engine.sweep(1000, 500).unwrap();
    assert!(!store.contains_raw(&block_changes_key(400)));
    assert!(store.contains_raw(&block_changes_key(500)));
    assert!(store.contains_raw(&block_changes_key(1000)));
}

#[test]
fn block_end_sweeps_with_configured_window() {
    let config = AccountCacheConfig {
        retention_blocks: 2,
        ..Default::default()
    };
    let (store, _chain, mut engine) = engine_with(config);
    for block in 1..=6u64 {
        run_block(&mut engine, block, vec![native(block as u8, 9)]);
    }
    for evicted in 1..=3 {
        assert!(!store.contains_raw(&block_changes_key(evicted)), "{evicted}");
    }
    for kept in 4..=6 {
        assert!(store.contains_raw(&block_changes_key(kept)), "{kept}");
    }
}

// ---------------------------------------------------------------------------
// 4. Service lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn service_processes_events_and_hands_back_the_engine() {
    relay_utils::init_test_logging();
    let store = Arc::new(NullStore::new());
    let chain = Arc::new(NullChain::new());
    chain.set_balance(addr(1), NATIVE_ASSET, U256::from(12u64));
    let service = AccountService::builder(AccountCacheConfig {
        holder_id: Some("relay-test".into()),
        ..Default::default()
    })
    .store(store.clone())
    .chain(chain)
    .lock(Arc::new(NullLock::new()))
    .build()
    .unwrap();

    let running = service.start().await.unwrap();
    let events = running.events();
    events.send(ChainEvent::BlockNew { number: 1 }).await.unwrap();
    events.send(native(1, 2)).await.unwrap();
    events.send(ChainEvent::BlockEnd { number: 1 }).await.unwrap();
    drop(events);
    let cache = running.cache();

    let engine = running.stop().await.unwrap();
    assert_eq!(engine.last_finalized(), Some(1));
    let cached = cache.balance(addr(1), NATIVE_ASSET).unwrap().unwrap();
    assert_eq!(cached.value, U256::from(12u64));
}

#[tokio::test]
async fn second_service_waits_for_the_first_to_stop() {
    relay_utils::init_test_logging();
    let lock = Arc::new(NullLock::new());
    let config = |holder: &str| AccountCacheConfig {
        holder_id: Some(holder.into()),
        lock_retry_initial_ms: 1,
        lock_retry_max_ms: 5,
        ..Default::default()
    };
    let build = |holder: &str| {
        AccountService::builder(config(holder))
            .store(Arc::new(NullStore::new()))
            .chain(Arc::new(NullChain::new()))
            .lock(lock.clone())
            .build()
            .unwrap()
    };

    let first = build("a").start().await.unwrap();
    let second = tokio::spawn(build("b").start());
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(!second.is_finished());
    assert_eq!(lock.holder("account_manager").as_deref(), Some("a"));

    first.stop().await.unwrap();
    let second = tokio::time::timeout(Duration::from_secs(5), second)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(lock.holder("account_manager").as_deref(), Some("b"));
    second.stop().await.unwrap();
}

#[tokio::test]
async fn lease_takeover_stops_the_service() {
    relay_utils::init_test_logging();
    let lock = Arc::new(NullLock::new());
    let service = AccountService::builder(AccountCacheConfig {
        lock_lease_secs: 1,
        ..Default::default()
    })
    .store(Arc::new(NullStore::new()))
    .chain(Arc::new(NullChain::new()))
    .lock(lock.clone())
    .build()
    .unwrap();

    let running = service.start().await.unwrap();
    let shutdown = running.shutdown_controller();
    lock.steal("account_manager", "intruder");

    let mut rx = shutdown.subscribe();
    if !shutdown.is_triggered() {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
    }
    assert!(!running.holds_lease());
    let result = running.stop().await;
    assert!(matches!(result, Err(AccountError::LeaseLost(_))));
    assert_eq!(lock.holder("account_manager").as_deref(), Some("intruder"));
}

#[tokio::test]
async fn lease_is_renewed_while_a_slow_block_end_runs() {
    relay_utils::init_test_logging();
    let lock = Arc::new(NullLock::new());
    let chain = Arc::new(NullChain::new());
    chain.delay_reads(Duration::from_millis(400));
    let service = AccountService::builder(AccountCacheConfig {
        lock_lease_secs: 1,
        ..Default::default()
    })
    .store(Arc::new(NullStore::new()))
    .chain(chain)
    .lock(lock.clone())
    .build()
    .unwrap();

    let running = service.start().await.unwrap();
    let events = running.events();
    events.send(ChainEvent::BlockNew { number: 1 }).await.unwrap();
    events.send(native(1, 2)).await.unwrap();
    events.send(native(3, 4)).await.unwrap();
    events.send(ChainEvent::BlockEnd { number: 1 }).await.unwrap();
    drop(events);

    // Four keys at 400ms each keep the block end busy for well over a
    // lease period.
    let renewed_before = lock.renewals();
    let started = std::time::Instant::now();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(started.elapsed() < Duration::from_millis(500));

    tokio::time::sleep(Duration::from_millis(900)).await;
    assert!(lock.renewals() > renewed_before);
    assert!(running.holds_lease());

    let engine = running.stop().await.unwrap();
    assert_eq!(engine.last_finalized(), Some(1));
}

// ---------------------------------------------------------------------------
// 5. LMDB backend
// ---------------------------------------------------------------------------

fn temp_env() -> (tempfile::TempDir, LmdbEnvironment) {
    let dir = tempfile::tempdir().expect("temp dir");
    let env = LmdbEnvironment::open(dir.path(), 64 * 1024 * 1024).expect("open env");
    (dir, env)
}

#[test]
fn lmdb_backed_engine_survives_reopen() {
    let (dir, env) = temp_env();
    let chain = Arc::new(NullChain::new());
    chain.set_balance(addr(1), NATIVE_ASSET, U256::from(31u64));
    {
        let store: Arc<LmdbKvStore> = Arc::new(env.kv_store());
        let mut engine = AccountEngine::new(
            &AccountCacheConfig::default(),
            store,
            chain,
            Arc::new(AccountMetrics::new()),
        );
        run_block(&mut engine, 8, vec![native(1, 2)]);
    }
    drop(env);

    let env = LmdbEnvironment::open(dir.path(), 64 * 1024 * 1024).expect("reopen env");
    let cache = AccountCache::new(Arc::new(env.kv_store()), Duration::from_secs(60));
    let cached = cache.balance(addr(1), NATIVE_ASSET).unwrap().unwrap();
    assert_eq!(cached.value, U256::from(31u64));
    assert_eq!(cached.derived_at, BlockTag::Number(8));
    assert!(env.kv_store().get(&block_changes_key(8)).unwrap().is_some());
}

#[test]
fn lmdb_unlock_flag_round_trip() {
    let (_dir, env) = temp_env();
    let cache = AccountCache::new(Arc::new(env.kv_store()), Duration::from_secs(3600));
    cache
        .set_wallet_unlocked("0x52908400098527886E0F7030069857D2E4169EE7")
        .unwrap();
    let owner = relay_types::parse_address("0x52908400098527886e0f7030069857d2e4169ee7").unwrap();
    assert!(cache.is_wallet_unlocked(&owner).unwrap());
    assert!(matches!(
        cache.set_wallet_unlocked("not-an-address"),
        Err(AccountError::InvalidAddress(_))
    ));
    assert_eq!(env.kv_store().len().unwrap(), 1);
}

//! Ledger persistence across restarts
//! Entries written through the engine must survive closing and reopening the store

use shopcore::{
    config::{LedgerBackend, LedgerConfig},
    CauseKind, Collaborators, CollectingNotifier, Credits, DirectChange, Identity, InMemoryEconomy, ItemInfo,
    LedgerAction, LedgerStore, ShopConfig, ShopEngine, ShopMetrics, StaticDirectory,
};
use std::sync::Arc;
use tempfile::TempDir;

fn rocks_config(dir: &TempDir) -> ShopConfig {
    let mut config = ShopConfig::testing();
    config.ledger = LedgerConfig {
        backend: LedgerBackend::RocksDb,
        data_directory: dir.path().join("shop_ledger").to_string_lossy().to_string(),
        auto_sync_structure: true,
        ..LedgerConfig::default()
    };
    config
}

fn engine(config: ShopConfig, economy: Arc<InMemoryEconomy>) -> ShopEngine {
    let directory: StaticDirectory = [(Identity(1), "alice"), (Identity(2), "bob")].into_iter().collect();
    let collaborators = Collaborators::new(economy, Arc::new(CollectingNotifier::new()), Arc::new(directory));
    ShopEngine::new(config, collaborators).expect("Failed to create engine")
}

#[test]
fn test_ledger_persistence_across_restarts() {
    let dir = TempDir::new().unwrap();
    let config = rocks_config(&dir);
    let economy = Arc::new(InMemoryEconomy::new());

    // === PHASE 1: write entries and shut down ===
    {
        let engine = engine(config.clone(), economy.clone());
        assert!(engine.ledger_mode().starts_with("rocksdb("));

        engine.queue_reward(Identity(1), CauseKind::kill(), Credits::from_whole(5));
        engine.queue_reward(Identity(1), CauseKind::headshot(), Credits::from_whole(3));
        engine.queue_reward(Identity(2), CauseKind::assist(), Credits::from_whole(1));
        let report = engine.flush_now();
        assert_eq!(report.entries_written, 3);

        let change = DirectChange::new(Identity(1), LedgerAction::Purchase, Credits::from_whole(4))
            .with_item(ItemInfo::new("tracer_red").with_display_name("Red Tracer"));
        assert_eq!(engine.record_direct(change).unwrap(), Credits::from_whole(4));

        engine.unload();
    }

    // === PHASE 2: reopen and verify ===
    let engine = engine(config, economy);
    let all = engine.get_recent(10);
    assert_eq!(all.len(), 4);

    let mut sequences: Vec<u64> = all.iter().map(|e| e.sequence_id).collect();
    sequences.sort_unstable();
    assert_eq!(sequences, vec![1, 2, 3, 4]);

    let alice = engine.get_recent_for_identity(Identity(1), 10);
    assert_eq!(alice.len(), 3);
    assert_eq!(alice[0].action, LedgerAction::Purchase);
    assert_eq!(alice[0].amount, Credits::from_whole(-4));
    assert_eq!(alice[0].balance_after, Credits::from_whole(4));
    assert_eq!(alice[0].item_display_name.as_deref(), Some("Red Tracer"));
    assert!(alice.iter().all(|e| e.display_name == "alice"));

    // Sequence ids continue after the restart
    engine.queue_reward(Identity(2), CauseKind::kill(), Credits::from_whole(2));
    engine.flush_now();
    let newest = &engine.get_recent(1)[0];
    assert_eq!(newest.sequence_id, 5);
    assert_eq!(newest.identity, Identity(2));
}

#[test]
fn test_persistent_and_in_memory_agree_on_order() {
    let dir = TempDir::new().unwrap();
    let rocks = LedgerStore::open(&rocks_config(&dir).ledger, ShopMetrics::new()).unwrap();
    let memory = LedgerStore::in_memory(100);

    for (i, timestamp) in [100, 100, 99, 101, 100].into_iter().enumerate() {
        let entry = shopcore::NewLedgerEntry {
            timestamp,
            identity: Identity(1 + (i as u64 % 2)),
            display_name: "p".to_string(),
            action: LedgerAction::Credit,
            amount: Credits::from_whole(1),
            balance_after: Credits::from_whole(i as i64 + 1),
            item_id: None,
            item_display_name: None,
        };
        rocks.record(entry.clone());
        memory.record(entry);
    }

    assert_eq!(rocks.get_recent(10), memory.get_recent(10));
    assert_eq!(rocks.get_recent(3), memory.get_recent(3));
    assert_eq!(
        rocks.get_recent_for_identity(Identity(2), 10),
        memory.get_recent_for_identity(Identity(2), 10)
    );
}

#[test]
fn test_missing_store_without_structure_sync_fails() {
    let dir = TempDir::new().unwrap();
    let mut config = rocks_config(&dir);
    config.ledger.auto_sync_structure = false;

    let collaborators = Collaborators::new(
        Arc::new(InMemoryEconomy::new()),
        Arc::new(CollectingNotifier::new()),
        Arc::new(StaticDirectory::new()),
    );
    assert!(ShopEngine::new(config.clone(), collaborators).is_err());

    // Once created with sync enabled, it opens without sync
    config.ledger.auto_sync_structure = true;
    drop(LedgerStore::open(&config.ledger, ShopMetrics::new()).unwrap());
    config.ledger.auto_sync_structure = false;
    assert!(LedgerStore::open(&config.ledger, ShopMetrics::new()).is_ok());
}

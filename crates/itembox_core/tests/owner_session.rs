mod common;

use common::{stack, MemoryStore};
use itembox_core::{
    move_item, Attr, AttrPatch, EngineConfig, Engine, ItemRepository, Owner, OwnerRef,
    OwnerSession, SequenceRepository, SyncOutcome,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

const USER: OwnerRef = OwnerRef::User(8);

fn session(store: &Arc<MemoryStore>, interval: Duration) -> OwnerSession {
    OwnerSession::open(
        USER,
        Arc::clone(store) as Arc<dyn ItemRepository>,
        Arc::clone(store) as Arc<dyn SequenceRepository>,
        interval,
    )
    .unwrap()
}

#[test]
fn box_is_loaded_once_on_first_access() {
    let store = Arc::new(MemoryStore::with_rows([stack(1, USER, "herb", 2)]));
    let session = session(&store, Duration::from_secs(60));
    assert_eq!(store.load_calls.load(Ordering::SeqCst), 0);

    assert_eq!(session.item_box().item_ids(), vec![1]);
    assert!(Arc::ptr_eq(session.item_box(), session.item_box()));
    assert_eq!(store.load_calls.load(Ordering::SeqCst), 1);
    assert!(session.item_box().need_sync());
}

#[test]
fn session_mints_ids_from_its_window() {
    let store = Arc::new(MemoryStore::new());
    let session = session(&store, Duration::from_secs(60));
    let start = session.ids().window().window_start;

    assert_eq!(session.new_id().unwrap(), start);
    assert_eq!(session.new_id().unwrap(), start + 1);
    assert_eq!(session.owner_ref(), USER);
    assert!(!session.bypasses_checks());
    assert!(session
        .with_privileges(true)
        .bypasses_checks());
}

#[test]
fn offline_stops_task_syncs_and_persists_window() {
    let store = Arc::new(MemoryStore::with_rows([stack(1, USER, "herb", 2)]));
    let session = session(&store, Duration::from_secs(60));

    session.go_online().unwrap();
    session.go_online().unwrap();
    assert!(session.is_online());

    session.new_id().unwrap();
    session.new_id().unwrap();
    let window_saves = store.window_saves.load(Ordering::SeqCst);

    MemoryStore::set_fail(&store.fail_saves, true);
    let _ = session.item_box().change_one(1, Attr::Quality, 12);
    MemoryStore::set_fail(&store.fail_saves, false);

    let SyncOutcome::Completed(report) = session.go_offline() else {
        panic!("loaded box must sync");
    };
    assert_eq!(report.failed, 0);
    assert!(!session.is_online());
    assert_eq!(store.row(1).unwrap().attrs.int(Attr::Quality), 12);
    assert_eq!(store.window_saves.load(Ordering::SeqCst), window_saves + 1);
    assert_eq!(store.stored_window(USER).unwrap().cursor, 2);
}

#[test]
fn offline_without_loaded_box_skips_sync() {
    let store = Arc::new(MemoryStore::new());
    let session = session(&store, Duration::from_secs(60));
    assert_eq!(session.go_offline(), SyncOutcome::Skipped);
    assert_eq!(store.load_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn online_session_flushes_in_background() {
    let store = Arc::new(MemoryStore::with_rows([stack(1, USER, "herb", 2)]));
    let session = session(&store, Duration::from_millis(10));
    MemoryStore::set_fail(&store.fail_saves, true);
    let _ = session.item_box().change_one(1, Attr::Quality, 3);
    MemoryStore::set_fail(&store.fail_saves, false);

    session.go_online().unwrap();
    let deadline = Instant::now() + Duration::from_secs(5);
    while store.row(1).unwrap().attrs.int(Attr::Quality) != 3 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(store.row(1).unwrap().attrs.int(Attr::Quality), 3);
    session.go_offline();
}

#[test]
fn engine_sessions_move_items_between_owners() {
    let engine = Engine::start(&EngineConfig::default()).unwrap();
    let buyer = engine.open_session(OwnerRef::User(1)).unwrap();
    let seller = engine.open_session(OwnerRef::User(2)).unwrap();
    engine
        .store()
        .save_item(&stack(buyer.new_id().unwrap(), OwnerRef::User(2), "herb", 9))
        .unwrap();
    let herb_id = buyer.ids().window().window_start;

    let moved = move_item(
        seller.item_box(),
        herb_id,
        4,
        false,
        buyer.item_box(),
        &seller,
        &AttrPatch::new(),
    )
    .unwrap();

    assert_ne!(moved.id(), herb_id);
    assert_eq!(moved.record().owner(), OwnerRef::User(1));
    let reloaded = engine.load_box(OwnerRef::User(1), false);
    assert_eq!(reloaded.item_ids(), vec![moved.id()]);
    assert_eq!(
        engine.load_box(OwnerRef::User(2), false)
            .find_item(herb_id)
            .unwrap()
            .record()
            .count(),
        5
    );
}

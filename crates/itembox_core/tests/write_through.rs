mod common;

use common::{child_of, stack, CountingIds, MemoryStore};
use itembox_core::{
    Attr, BoxError, FailureClass, Item, ItemBox, ItemRepository, OwnerRef, SyncOutcome,
    SyncReport,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;

const USER: OwnerRef = OwnerRef::User(5);

fn boxed(store: &Arc<MemoryStore>, need_sync: bool) -> ItemBox {
    ItemBox::init(Arc::clone(store) as Arc<dyn ItemRepository>, USER, need_sync)
}

#[test]
fn failed_save_keeps_memory_and_is_retried_by_sync() {
    let store = Arc::new(MemoryStore::with_rows([stack(1, USER, "herb", 5)]));
    let item_box = boxed(&store, true);

    MemoryStore::set_fail(&store.fail_saves, true);
    let err = item_box.change_one(1, Attr::Quality, 40).unwrap_err();
    assert_eq!(err.class(), FailureClass::Adapter);
    assert_eq!(item_box.find_item(1).unwrap().record().get_int(Attr::Quality), 40);
    assert_eq!(store.row(1).unwrap().attrs.int(Attr::Quality), 0);
    assert_eq!(item_box.pending_saves(), vec![1]);

    let SyncOutcome::Completed(report) = item_box.sync() else {
        panic!("sync must run");
    };
    assert_eq!(report.failed, 1);

    MemoryStore::set_fail(&store.fail_saves, false);
    assert_eq!(
        item_box.sync(),
        SyncOutcome::Completed(SyncReport {
            saved: 1,
            deleted: 0,
            failed: 0
        })
    );
    assert_eq!(store.row(1).unwrap().attrs.int(Attr::Quality), 40);
    assert!(item_box.pending_saves().is_empty());
}

#[test]
fn failed_delete_is_queued_and_replayed() {
    let store = Arc::new(MemoryStore::with_rows([
        stack(1, USER, "rifle", 0),
        child_of(1, stack(2, USER, "9mm", 10)),
    ]));
    let item_box = boxed(&store, true);

    MemoryStore::set_fail(&store.fail_deletes, true);
    let err = item_box.delete_item(1, 0).unwrap_err();
    assert!(matches!(err, BoxError::Adapter { id: 1, .. }));
    assert!(item_box.find_item(1).is_none());
    assert!(store.row(1).is_some());
    assert_eq!(item_box.pending_deletes(), vec![1]);

    MemoryStore::set_fail(&store.fail_deletes, false);
    let SyncOutcome::Completed(report) = item_box.sync() else {
        panic!("sync must run");
    };
    assert_eq!(report.deleted, 2);
    assert_eq!(store.row_count(), 0);
    assert!(item_box.pending_deletes().is_empty());
}

#[test]
fn queued_delete_skips_rows_now_owned_elsewhere() {
    let store = Arc::new(MemoryStore::with_rows([stack(1, USER, "herb", 3)]));
    let item_box = boxed(&store, true);

    MemoryStore::set_fail(&store.fail_deletes, true);
    let _ = item_box.delete_item(1, 0);
    MemoryStore::set_fail(&store.fail_deletes, false);

    // The item was handed to a warehouse that already saved it.
    store
        .save_item(&stack(1, OwnerRef::Building(9), "herb", 3))
        .unwrap();
    item_box.sync();

    assert_eq!(store.row(1).unwrap().owner, OwnerRef::Building(9));
    assert!(item_box.pending_deletes().is_empty());
}

#[test]
fn split_still_returns_piece_when_remainder_save_fails() {
    let store = Arc::new(MemoryStore::with_rows([stack(1, USER, "bolt", 10)]));
    let item_box = boxed(&store, true);
    MemoryStore::set_fail(&store.fail_saves, true);

    let piece = item_box
        .get_split_item(1, 3, false, &CountingIds::starting_at(90))
        .unwrap();

    assert_eq!(piece.record().count(), 3);
    assert_eq!(item_box.find_item(1).unwrap().record().count(), 7);
    assert_eq!(store.row(1).unwrap().count(), 10);
    assert_eq!(item_box.pending_saves(), vec![1]);
}

#[test]
fn lazy_box_touches_store_only_on_sync() {
    let store = Arc::new(MemoryStore::with_rows([stack(1, USER, "herb", 5)]));
    let item_box = boxed(&store, false);

    item_box.delete_item(1, 2).unwrap();
    item_box
        .add_item(Arc::new(Item::new(stack(2, USER, "bolt", 1))))
        .unwrap();
    item_box.delete_item(2, 0).unwrap();
    assert_eq!(store.save_calls.load(Ordering::SeqCst), 0);
    assert_eq!(store.delete_calls.load(Ordering::SeqCst), 0);
    assert_eq!(store.row(1).unwrap().count(), 5);

    item_box.sync();
    assert_eq!(store.row(1).unwrap().count(), 3);
    assert!(store.row(2).is_none());
}

#[test]
fn placeholders_are_never_saved() {
    let store = Arc::new(MemoryStore::with_rows([child_of(
        40,
        stack(41, USER, "9mm", 10),
    )]));
    let item_box = boxed(&store, true);
    assert!(item_box.find_item(40).is_some());

    let SyncOutcome::Completed(report) = item_box.sync() else {
        panic!("sync must run");
    };
    assert_eq!(report.saved, 1);
    assert!(store.row(40).is_none());
    assert_eq!(store.row(41).unwrap().parent, Some(40));
}

#[test]
fn memory_only_box_skips_sync() {
    let item_box = ItemBox::detached(USER);
    item_box.load(vec![stack(1, USER, "herb", 5)]);
    assert_eq!(item_box.sync(), SyncOutcome::Skipped);
}

mod common;

use common::{stack, MemoryStore, TestOwner};
use itembox_core::{
    join_move_item, move_item, Attr, AttrPatch, BoxError, ItemBox, ItemRepository, OwnerRef,
};
use std::sync::Arc;

const USER: OwnerRef = OwnerRef::User(1);
const PORTAL: OwnerRef = OwnerRef::Building(77);

fn ore(id: i64, owner: OwnerRef, count: i32) -> itembox_core::ItemData {
    let mut data = stack(id, owner, "ore", count);
    data.attrs.set(Attr::Type, 0.191);
    data.attrs.set(Attr::Weight, 2);
    data
}

#[test]
fn move_splits_reowns_and_patches() {
    let store = Arc::new(MemoryStore::with_rows([stack(1, USER, "bolt", 10)]));
    let repo = Arc::clone(&store) as Arc<dyn ItemRepository>;
    let user_box = ItemBox::init(Arc::clone(&repo), USER, true);
    let portal_box = ItemBox::init(repo, PORTAL, true);
    let actor = TestOwner::new(USER, 500);
    let patch = AttrPatch::new().reset(Attr::Section).set(Attr::Slot, "W");

    let moved = move_item(&user_box, 1, 4, false, &portal_box, &actor, &patch).unwrap();

    assert_eq!(moved.id(), 500);
    assert_eq!(moved.record().owner(), PORTAL);
    assert_eq!(moved.record().get_str(Attr::Slot), "W");
    assert_eq!(user_box.find_item(1).unwrap().record().count(), 6);
    assert_eq!(portal_box.item_ids(), vec![500]);
    assert_eq!(store.row(500).unwrap().owner, PORTAL);
    assert_eq!(store.row(1).unwrap().count(), 6);
}

#[test]
fn whole_stack_move_keeps_the_row_with_new_owner() {
    let store = Arc::new(MemoryStore::with_rows([stack(1, USER, "rifle", 0)]));
    let repo = Arc::clone(&store) as Arc<dyn ItemRepository>;
    let user_box = ItemBox::init(Arc::clone(&repo), USER, true);
    let portal_box = ItemBox::init(repo, PORTAL, true);
    let actor = TestOwner::new(USER, 500);

    move_item(&user_box, 1, 0, true, &portal_box, &actor, &AttrPatch::new()).unwrap();

    assert!(user_box.is_empty());
    assert_eq!(portal_box.item_ids(), vec![1]);
    assert_eq!(store.row(1).unwrap().owner, PORTAL);
}

#[test]
fn join_move_absorbs_into_existing_stack() {
    let store = Arc::new(MemoryStore::with_rows([
        ore(1, USER, 5),
        ore(9, PORTAL, 20),
    ]));
    let repo = Arc::clone(&store) as Arc<dyn ItemRepository>;
    let user_box = ItemBox::init(Arc::clone(&repo), USER, true);
    let portal_box = ItemBox::init(repo, PORTAL, true);
    let actor = TestOwner::new(USER, 500);

    let target = join_move_item(&user_box, 1, 3, &portal_box, &actor, &AttrPatch::new()).unwrap();
    assert_eq!(target.id(), 9);
    assert_eq!(target.record().count(), 23);
    assert_eq!(user_box.find_item(1).unwrap().record().count(), 2);

    join_move_item(&user_box, 1, 0, &portal_box, &actor, &AttrPatch::new()).unwrap();
    assert!(user_box.is_empty());
    assert_eq!(portal_box.len(), 1);
    assert_eq!(store.row(9).unwrap().count(), 25);
    assert!(store.row(1).is_none());
}

#[test]
fn join_move_of_empty_stack_moves_the_item_whole() {
    let store = Arc::new(MemoryStore::with_rows([ore(1, USER, 0), ore(9, PORTAL, 20)]));
    let repo = Arc::clone(&store) as Arc<dyn ItemRepository>;
    let user_box = ItemBox::init(Arc::clone(&repo), USER, true);
    let portal_box = ItemBox::init(repo, PORTAL, true);
    let actor = TestOwner::new(USER, 500);

    let moved = join_move_item(&user_box, 1, 0, &portal_box, &actor, &AttrPatch::new()).unwrap();

    assert_eq!(moved.id(), 1);
    assert!(user_box.is_empty());
    assert_eq!(portal_box.item_ids(), vec![9, 1]);
    assert_eq!(portal_box.find_item(9).unwrap().record().count(), 20);
    assert_eq!(store.row(1).unwrap().owner, PORTAL);
}

#[test]
fn join_move_without_match_falls_back_to_move() {
    let store = Arc::new(MemoryStore::with_rows([ore(1, USER, 5)]));
    let repo = Arc::clone(&store) as Arc<dyn ItemRepository>;
    let user_box = ItemBox::init(Arc::clone(&repo), USER, true);
    let portal_box = ItemBox::init(repo, PORTAL, true);
    let actor = TestOwner::new(USER, 500);

    let moved = join_move_item(&user_box, 1, 2, &portal_box, &actor, &AttrPatch::new()).unwrap();
    assert_eq!(moved.id(), 500);
    assert_eq!(moved.record().count(), 2);
    assert_eq!(portal_box.item_ids(), vec![500]);
}

#[test]
fn foreign_actor_needs_privileges() {
    let user_box = ItemBox::detached(USER);
    user_box.load(vec![stack(1, USER, "bolt", 3)]);
    let portal_box = ItemBox::detached(PORTAL);
    let mut stranger = TestOwner::new(OwnerRef::User(2), 100);

    let err = move_item(&user_box, 1, 1, false, &portal_box, &stranger, &AttrPatch::new())
        .unwrap_err();
    assert!(matches!(err, BoxError::Forbidden { id: 1, .. }));
    assert_eq!(user_box.find_item(1).unwrap().record().count(), 3);

    stranger.privileged = true;
    move_item(&user_box, 1, 1, false, &portal_box, &stranger, &AttrPatch::new()).unwrap();
    assert_eq!(portal_box.len(), 1);
}

#[test]
fn protected_items_do_not_move() {
    let mut badge = stack(1, USER, "badge", 0);
    badge.attrs.set(Attr::NoTransfer, 1);
    let user_box = ItemBox::detached(USER);
    user_box.load(vec![badge]);
    let portal_box = ItemBox::detached(PORTAL);
    let actor = TestOwner::new(USER, 100);

    let err = move_item(&user_box, 1, 0, true, &portal_box, &actor, &AttrPatch::new())
        .unwrap_err();
    assert!(matches!(err, BoxError::Protected(1)));
    assert_eq!(user_box.len(), 1);
    assert!(portal_box.is_empty());
}

mod common;

use common::{stack, CountingIds, MemoryStore};
use itembox_core::{
    AllocError, AllocResult, Attr, IdSource, Item, ItemData, ItemError, ItemId, ItemRecord,
    ItemRepository, OwnerRef,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;

const USER: OwnerRef = OwnerRef::User(7);

struct NoIds;

impl IdSource for NoIds {
    fn next_id(&self) -> AllocResult<ItemId> {
        Err(AllocError::EmptyBatch)
    }
}

#[test]
fn split_conserves_the_stack_for_every_valid_count() {
    for total in 2..=12 {
        for count in 1..total {
            let ids = CountingIds::starting_at(1_000);
            let source = ItemRecord::new(stack(1, USER, "bolt", total));

            let piece = source.split(count, false, &ids).unwrap();

            assert_eq!(source.count() + piece.count(), total);
            assert_eq!(piece.count(), count);
            assert_eq!(piece.id(), 1_000);
            assert_eq!(piece.parent_id(), None);
        }
    }
}

#[test]
fn split_out_of_range_fails_and_mutates_nothing() {
    let ids = CountingIds::starting_at(50);
    let source = ItemRecord::new(stack(1, USER, "bolt", 5));
    let before = source.data();

    for count in [-1, 0, 5, 6] {
        let err = source.split(count, false, &ids).unwrap_err();
        assert!(matches!(
            err,
            ItemError::InsufficientCount { id: 1, available: 5, .. }
        ));
    }
    assert_eq!(source.data(), before);
    assert_eq!(ids.next_id().unwrap(), 50, "no id may be consumed by a failed split");
}

#[test]
fn split_allocation_failure_leaves_source_intact() {
    let source = ItemRecord::new(stack(1, USER, "bolt", 5));
    let err = source.split(2, false, &NoIds).unwrap_err();
    assert!(matches!(err, ItemError::Alloc(_)));
    assert_eq!(source.count(), 5);
}

#[test]
fn split_keeps_id_on_request_except_for_ammo() {
    let ids = CountingIds::starting_at(900);
    let plain = ItemRecord::new(stack(3, USER, "herb", 4));
    assert_eq!(plain.split(1, true, &ids).unwrap().id(), 3);

    let mut ammo = stack(4, USER, "9mm", 30);
    ammo.attrs.set(Attr::Calibre, 9.0);
    let ammo = ItemRecord::new(ammo);
    assert_eq!(ammo.split(10, true, &ids).unwrap().id(), 900);
}

#[test]
fn set_attribute_reports_write_through_failure_but_keeps_value() {
    let store = MemoryStore::new();
    let record = ItemRecord::new(stack(1, USER, "bolt", 5));

    assert!(record.set_attribute(Attr::Quality, 80, Some(&store as &dyn ItemRepository)));
    assert_eq!(store.row(1).unwrap().attrs.int(Attr::Quality), 80);

    MemoryStore::set_fail(&store.fail_saves, true);
    assert!(!record.set_attribute(Attr::Quality, 10, Some(&store as &dyn ItemRepository)));
    assert_eq!(record.get_int(Attr::Quality), 10);
    assert_eq!(store.row(1).unwrap().attrs.int(Attr::Quality), 80);

    assert!(record.reset_attribute(Attr::Quality, None));
    assert_eq!(record.get_int(Attr::Quality), 0);
    assert_eq!(store.save_calls.load(Ordering::SeqCst), 2);
}

#[test]
fn set_attribute_refuses_negative_count() {
    let store = MemoryStore::new();
    let record = ItemRecord::new(stack(1, USER, "bolt", 5));

    assert!(!record.set_attribute(Attr::Count, -1, Some(&store as &dyn ItemRepository)));
    assert!(!record.set_attribute(Attr::Count, "-3", None));
    assert_eq!(record.count(), 5);
    assert_eq!(store.save_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn getters_coerce_and_never_fail() {
    let mut data = stack(1, USER, "12.6", 5);
    data.attrs.set(Attr::Txt, "not a number");
    let record = ItemRecord::new(data);

    assert_eq!(record.get_int(Attr::Name), 13);
    assert_eq!(record.get_double(Attr::Txt), 0.0);
    assert_eq!(record.get_long(Attr::Count), 5);
    assert_eq!(record.get_str(Attr::Count), "5");
}

#[test]
fn clone_is_detached_and_independent() {
    let parent = Item::new(stack(1, USER, "rifle", 0));
    let child = Arc::new(ItemRecord::new(stack(2, USER, "9mm", 10)));
    parent.include(Arc::clone(&child));

    let copy = child.clone_detached();
    copy.update(|data| data.attrs.set(Attr::Count, 1));

    assert_eq!(copy.parent_id(), None);
    assert_eq!(child.parent_id(), Some(1));
    assert_eq!(child.count(), 10);
}

#[test]
fn xml_lists_non_empty_attrs_in_schema_order_then_children() {
    let mut rifle = stack(5, USER, "rifle", 0);
    rifle.attrs.set(Attr::Section, 2);
    rifle.attrs.set(Attr::Made, "workshop-3");
    let item = Item::new(rifle);

    let mut ammo = stack(6, USER, "9mm \"AP\"", 3);
    ammo.attrs.set(Attr::Calibre, 9.0);
    item.include(Arc::new(ItemRecord::new(ammo)));

    assert_eq!(
        item.to_xml(true),
        "<O id=\"5\" section=\"2\" name=\"rifle\">\
<O id=\"6\" name=\"9mm &quot;AP&quot;\" calibre=\"9\" count=\"3\"/></O>"
    );
    assert_eq!(item.to_xml(false), "<O id=\"5\" section=\"2\" name=\"rifle\"/>");
}

#[test]
fn include_reparents_and_rejects_duplicates() {
    let parent = Item::new(stack(1, OwnerRef::Building(4), "crate", 0));
    let child = Arc::new(ItemRecord::new(stack(2, USER, "bolt", 1)));

    assert!(parent.include(Arc::clone(&child)));
    assert!(!parent.include(Arc::new(ItemRecord::new(stack(2, USER, "bolt", 1)))));
    assert_eq!(child.parent_id(), Some(1));
    assert_eq!(child.owner(), OwnerRef::Building(4));
    assert_eq!(parent.included_len(), 1);
}

#[test]
fn protection_covers_included_records() {
    let parent = Item::new(stack(3, USER, "case", 0));
    assert!(!parent.is_protected());

    let mut badge = stack(2, USER, "badge", 0);
    badge.attrs.set(Attr::NoTransfer, 1);
    parent.include(Arc::new(ItemRecord::new(badge)));
    assert!(parent.is_protected());
}

#[test]
fn joinable_requires_same_name_and_matching_class() {
    let mut ore = stack(1, USER, "ore", 5);
    ore.attrs.set(Attr::Type, 0.191);
    ore.attrs.set(Attr::Weight, 10);
    let mut other_ore = ore.clone();
    other_ore.attrs.set(Attr::Id, 2_i64);
    assert!(other_ore.is_joinable_with(&ore));

    other_ore.attrs.set(Attr::Weight, 11);
    assert!(!other_ore.is_joinable_with(&ore));

    let mut pill = stack(3, USER, "pill", 2);
    pill.attrs.set(Attr::Type, 796.002);
    let mut same_pill = pill.clone();
    same_pill.attrs.set(Attr::Id, 4_i64);
    assert!(same_pill.is_joinable_with(&pill));
    same_pill.attrs.set(Attr::Type, 796.003);
    assert!(!same_pill.is_joinable_with(&pill));

    let renamed = ItemData {
        attrs: {
            let mut attrs = ore.attrs.clone();
            attrs.set(Attr::Name, "rock");
            attrs
        },
        ..ore.clone()
    };
    assert!(!renamed.is_joinable_with(&ore));
}

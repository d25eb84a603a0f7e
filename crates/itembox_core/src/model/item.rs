//! Item records and their one-level inclusion tree.
//!
//! # Responsibility
//! - Hold one item's identity, parent, owner and attributes (`ItemData`).
//! - Serialize attribute mutation per record (`ItemRecord`).
//! - Model a top-level item with its included records (`Item`).
//!
//! # Invariants
//! - Nesting depth is 0 or 1: an `Item` owns plain records, never items.
//! - A record's id lives in `Attr::Id` and changes only when it is re-minted.
//! - `count` never goes negative; split and take validate before mutating.

use crate::alloc::{AllocError, IdSource};
use crate::model::attribute::{Attr, AttrValue, AttributeTable};
use crate::model::owner::OwnerRef;
use crate::model::snapshot::{CowList, Snapshot};
use crate::repo::ItemRepository;
use log::{debug, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::ops::RangeInclusive;
use std::sync::Arc;

pub type ItemId = i64;

/// Base type shared by raw resources.
pub const BASE_TYPE_RESOURCE: i64 = 0;
/// Resource sub-types: metals, precious metals, polymetals.
pub const RESOURCE_SUB_TYPES: RangeInclusive<i64> = 191..=193;
pub const BASE_TYPE_DRUG: i64 = 796;
pub const BASE_TYPE_BUILDING_KEY: i64 = 782;

/// Plain data of one item record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemData {
    pub parent: Option<ItemId>,
    pub owner: OwnerRef,
    pub attrs: AttributeTable,
}

impl ItemData {
    pub fn new(id: ItemId, owner: OwnerRef) -> Self {
        let mut attrs = AttributeTable::new();
        attrs.set(Attr::Id, id);
        Self {
            parent: None,
            owner,
            attrs,
        }
    }

    pub fn id(&self) -> ItemId {
        self.attrs.long(Attr::Id)
    }

    pub fn count(&self) -> i32 {
        self.attrs.int(Attr::Count)
    }

    pub fn name(&self) -> String {
        self.attrs.str(Attr::Name)
    }

    pub fn is_no_transfer(&self) -> bool {
        self.attrs.int(Attr::NoTransfer) != 0
    }

    /// Whether the expiry timestamp (`dt`, unix seconds) is set and reached.
    pub fn is_expired_at(&self, now_secs: i64) -> bool {
        let expiry = self.attrs.long(Attr::Expiry);
        expiry > 0 && expiry <= now_secs
    }

    /// Integer part of the `type` attribute.
    pub fn base_type(&self) -> i64 {
        self.attrs.double(Attr::Type).trunc() as i64
    }

    /// Fractional part of the `type` attribute in thousandths (`0.191` -> 191).
    pub fn sub_type(&self) -> i64 {
        (self.attrs.double(Attr::Type).fract() * 1000.0).round() as i64
    }

    pub fn is_resource(&self) -> bool {
        self.base_type() == BASE_TYPE_RESOURCE && RESOURCE_SUB_TYPES.contains(&self.sub_type())
    }

    pub fn is_drug(&self) -> bool {
        self.base_type() == BASE_TYPE_DRUG
    }

    pub fn is_building_key(&self) -> bool {
        self.base_type() == BASE_TYPE_BUILDING_KEY
    }

    pub fn is_ammo(&self) -> bool {
        self.attrs.double(Attr::Calibre) > 0.0
    }

    /// Whether `self` can absorb the count of `sample`.
    ///
    /// Same name, and either resources of equal weight or drugs of equal
    /// sub-type.
    pub fn is_joinable_with(&self, sample: &ItemData) -> bool {
        if self.name() != sample.name() {
            return false;
        }
        let resources = sample.is_resource()
            && self.is_resource()
            && self.attrs.int(Attr::Weight) == sample.attrs.int(Attr::Weight);
        let drugs =
            sample.is_drug() && self.is_drug() && self.sub_type() == sample.sub_type();
        resources || drugs
    }

    fn write_xml_open(&self, out: &mut String) {
        out.push_str("<O");
        self.attrs.write_wire_attrs(out);
    }
}

pub type ItemResult<T> = Result<T, ItemError>;

#[derive(Debug)]
pub enum ItemError {
    InsufficientCount {
        id: ItemId,
        requested: i32,
        available: i32,
    },
    Alloc(AllocError),
}

impl Display for ItemError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InsufficientCount {
                id,
                requested,
                available,
            } => write!(
                f,
                "item {id} cannot give {requested} out of a stack of {available}"
            ),
            Self::Alloc(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ItemError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InsufficientCount { .. } => None,
            Self::Alloc(err) => Some(err),
        }
    }
}

impl From<AllocError> for ItemError {
    fn from(value: AllocError) -> Self {
        Self::Alloc(value)
    }
}

/// One item record guarded by its own lock.
#[derive(Debug)]
pub struct ItemRecord {
    data: Mutex<ItemData>,
}

impl ItemRecord {
    pub fn new(data: ItemData) -> Self {
        Self {
            data: Mutex::new(data),
        }
    }

    pub fn id(&self) -> ItemId {
        self.data.lock().id()
    }

    pub fn parent_id(&self) -> Option<ItemId> {
        self.data.lock().parent
    }

    pub fn owner(&self) -> OwnerRef {
        self.data.lock().owner
    }

    pub fn count(&self) -> i32 {
        self.data.lock().count()
    }

    pub fn name(&self) -> String {
        self.data.lock().name()
    }

    /// Copy of the current data.
    pub fn data(&self) -> ItemData {
        self.data.lock().clone()
    }

    pub fn read<R>(&self, f: impl FnOnce(&ItemData) -> R) -> R {
        f(&self.data.lock())
    }

    pub fn update<R>(&self, f: impl FnOnce(&mut ItemData) -> R) -> R {
        f(&mut self.data.lock())
    }

    pub fn get(&self, attr: Attr) -> AttrValue {
        self.data.lock().attrs.get(attr).clone()
    }

    pub fn get_str(&self, attr: Attr) -> String {
        self.data.lock().attrs.str(attr)
    }

    pub fn get_int(&self, attr: Attr) -> i32 {
        self.data.lock().attrs.int(attr)
    }

    pub fn get_long(&self, attr: Attr) -> i64 {
        self.data.lock().attrs.long(attr)
    }

    pub fn get_double(&self, attr: Attr) -> f64 {
        self.data.lock().attrs.double(attr)
    }

    /// Sets an attribute and, when `store` is given, writes the record through.
    ///
    /// Returns `false` when the value is a negative count (nothing changes) or
    /// when the write-through failed (memory keeps the new value).
    pub fn set_attribute(
        &self,
        attr: Attr,
        value: impl Into<AttrValue>,
        store: Option<&dyn ItemRepository>,
    ) -> bool {
        let value = value.into();
        if is_negative_count(attr, &value) {
            warn!(
                "event=item_set_attribute module=item status=error item_id={} attr={attr} error_code=negative_count",
                self.id()
            );
            return false;
        }
        let snapshot = {
            let mut data = self.data.lock();
            data.attrs.set(attr, value);
            data.clone()
        };
        write_through(&snapshot, attr, store)
    }

    /// Restores an attribute to its schema default; see [`Self::set_attribute`].
    pub fn reset_attribute(&self, attr: Attr, store: Option<&dyn ItemRepository>) -> bool {
        let snapshot = {
            let mut data = self.data.lock();
            data.attrs.reset(attr);
            data.clone()
        };
        write_through(&snapshot, attr, store)
    }

    /// Copy with independent storage and no parent.
    pub fn clone_detached(&self) -> ItemRecord {
        let mut data = self.data();
        data.parent = None;
        ItemRecord::new(data)
    }

    /// Splits `count` off this stack into a new detached record.
    ///
    /// Requires `0 < count < self.count()`. The piece keeps this record's id
    /// when `keep_same_id` is set, except for ammunition which is always
    /// re-minted. Nothing is mutated on failure.
    pub fn split(
        &self,
        count: i32,
        keep_same_id: bool,
        ids: &dyn IdSource,
    ) -> ItemResult<ItemRecord> {
        let mut data = self.data.lock();
        let available = data.count();
        if count <= 0 || count >= available {
            return Err(ItemError::InsufficientCount {
                id: data.id(),
                requested: count,
                available,
            });
        }

        let fresh_id = if keep_same_id && !data.is_ammo() {
            None
        } else {
            Some(ids.next_id()?)
        };

        data.attrs.set(Attr::Count, available - count);
        let mut piece = data.clone();
        drop(data);

        piece.parent = None;
        piece.attrs.set(Attr::Count, count);
        if let Some(id) = fresh_id {
            piece.attrs.set(Attr::Id, id);
        }
        debug!(
            "event=item_split module=item status=ok source_id={} piece_id={} count={count} remaining={}",
            self.id(),
            piece.id(),
            available - count
        );
        Ok(ItemRecord::new(piece))
    }

    /// Removes `count` from the stack in place and returns what remains.
    ///
    /// Requires `0 < count < self.count()`.
    pub fn take(&self, count: i32) -> ItemResult<i32> {
        let mut data = self.data.lock();
        let available = data.count();
        if count <= 0 || count >= available {
            return Err(ItemError::InsufficientCount {
                id: data.id(),
                requested: count,
                available,
            });
        }
        let remaining = available - count;
        data.attrs.set(Attr::Count, remaining);
        Ok(remaining)
    }
}

/// Stack counts never go below zero.
pub(crate) fn is_negative_count(attr: Attr, value: &AttrValue) -> bool {
    attr == Attr::Count && value.as_i32() < 0
}

fn write_through(data: &ItemData, attr: Attr, store: Option<&dyn ItemRepository>) -> bool {
    let Some(store) = store else {
        return true;
    };
    match store.save_item(data) {
        Ok(()) => true,
        Err(err) => {
            warn!(
                "event=item_set_attribute module=item status=error item_id={} attr={attr} error_code=save_failed error={err}",
                data.id()
            );
            false
        }
    }
}

/// Attribute changes applied together with an ownership change.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttrPatch {
    reset: Vec<Attr>,
    set: Vec<(Attr, AttrValue)>,
}

impl AttrPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(mut self, attr: Attr) -> Self {
        self.reset.push(attr);
        self
    }

    pub fn set(mut self, attr: Attr, value: impl Into<AttrValue>) -> Self {
        self.set.push((attr, value.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.reset.is_empty() && self.set.is_empty()
    }

    /// Applies resets, then sets. `Attr::Id` is never touched.
    pub fn apply_to(&self, attrs: &mut AttributeTable) {
        for attr in self.reset.iter().filter(|attr| **attr != Attr::Id) {
            attrs.reset(*attr);
        }
        for (attr, value) in self.set.iter().filter(|(attr, _)| *attr != Attr::Id) {
            attrs.set(*attr, value.clone());
        }
    }
}

/// A top-level item and the records included in it.
#[derive(Debug)]
pub struct Item {
    record: Arc<ItemRecord>,
    included: CowList<ItemRecord>,
    placeholder: bool,
}

impl Item {
    pub fn new(data: ItemData) -> Self {
        Self::from_record(Arc::new(ItemRecord::new(data)))
    }

    pub fn from_record(record: Arc<ItemRecord>) -> Self {
        record.update(|data| data.parent = None);
        Self {
            record,
            included: CowList::new(),
            placeholder: false,
        }
    }

    /// View of an included record as a top-level item; the record keeps its
    /// parent reference.
    pub(crate) fn promoted(record: Arc<ItemRecord>) -> Self {
        Self {
            record,
            included: CowList::new(),
            placeholder: false,
        }
    }

    /// Empty stand-in for a parent that is missing from a load batch.
    pub(crate) fn placeholder(id: ItemId, owner: OwnerRef) -> Self {
        Self {
            record: Arc::new(ItemRecord::new(ItemData::new(id, owner))),
            included: CowList::new(),
            placeholder: true,
        }
    }

    /// Whether this item only stands in for a missing parent.
    ///
    /// Placeholders are never persisted.
    pub fn is_placeholder(&self) -> bool {
        self.placeholder
    }

    pub fn record(&self) -> &Arc<ItemRecord> {
        &self.record
    }

    pub fn id(&self) -> ItemId {
        self.record.id()
    }

    pub fn included(&self) -> Arc<Snapshot<ItemRecord>> {
        self.included.snapshot()
    }

    pub fn included_len(&self) -> usize {
        self.included.len()
    }

    /// Includes `child`, re-parenting it onto this item and its owner.
    ///
    /// Returns `false` when a record with the same id is already included.
    pub fn include(&self, child: Arc<ItemRecord>) -> bool {
        let (id, owner) = self.record.read(|data| (data.id(), data.owner));
        child.update(|data| {
            data.parent = Some(id);
            data.owner = owner;
        });
        self.included
            .push_if_absent(child, |existing, added| existing.id() == added.id())
    }

    pub fn exclude(&self, id: ItemId) -> Option<Arc<ItemRecord>> {
        self.included.remove_first(|record| record.id() == id)
    }

    pub fn find_included(&self, id: ItemId) -> Option<Arc<ItemRecord>> {
        self.included
            .snapshot()
            .iter()
            .find(|record| record.id() == id)
            .cloned()
    }

    /// Whether this item or anything included in it is no-transfer.
    pub fn is_protected(&self) -> bool {
        self.record.read(ItemData::is_no_transfer)
            || self
                .included
                .snapshot()
                .iter()
                .any(|record| record.read(ItemData::is_no_transfer))
    }

    /// This record followed by every included record.
    pub fn records(&self) -> Vec<Arc<ItemRecord>> {
        let included = self.included.snapshot();
        let mut records = Vec::with_capacity(included.len() + 1);
        records.push(Arc::clone(&self.record));
        records.extend(included.iter().cloned());
        records
    }

    pub fn to_xml(&self, with_included: bool) -> String {
        let mut out = String::new();
        self.write_xml(&mut out, with_included);
        out
    }

    pub fn write_xml(&self, out: &mut String, with_included: bool) {
        self.record.read(|data| data.write_xml_open(out));
        let included = self.included.snapshot();
        if !with_included || included.is_empty() {
            out.push_str("/>");
            return;
        }
        out.push('>');
        for record in &*included {
            record.read(|data| data.write_xml_open(out));
            out.push_str("/>");
        }
        out.push_str("</O>");
    }

    /// Copy of this item and its included records with independent storage.
    pub fn deep_copy(&self) -> Item {
        let copy = Item {
            record: Arc::new(ItemRecord::new(self.record.data())),
            included: CowList::new(),
            placeholder: self.placeholder,
        };
        for record in &*self.included.snapshot() {
            copy.included
                .push_if_absent(Arc::new(ItemRecord::new(record.data())), |a, b| {
                    a.id() == b.id()
                });
        }
        copy
    }

    /// Gives this item a new id and points every included record at it.
    pub(crate) fn reassign_id(&self, id: ItemId) {
        self.record.update(|data| data.attrs.set(Attr::Id, id));
        for record in &*self.included.snapshot() {
            record.update(|data| data.parent = Some(id));
        }
    }

    /// Moves this item and its included records to `owner` and applies `patch`
    /// to the top-level record.
    pub fn relocate(&self, owner: OwnerRef, patch: &AttrPatch) {
        self.record.update(|data| {
            data.owner = owner;
            patch.apply_to(&mut data.attrs);
        });
        for record in &*self.included.snapshot() {
            record.update(|data| data.owner = owner);
        }
    }
}

/// Location of an item found in a box.
#[derive(Debug, Clone)]
pub enum ItemRef {
    TopLevel(Arc<Item>),
    Included {
        parent: Arc<Item>,
        record: Arc<ItemRecord>,
    },
}

impl ItemRef {
    pub fn record(&self) -> &Arc<ItemRecord> {
        match self {
            Self::TopLevel(item) => item.record(),
            Self::Included { record, .. } => record,
        }
    }

    pub fn id(&self) -> ItemId {
        self.record().id()
    }

    pub fn is_top_level(&self) -> bool {
        matches!(self, Self::TopLevel(_))
    }

    /// The top-level item holding the found record (itself when top-level).
    pub fn top_level(&self) -> &Arc<Item> {
        match self {
            Self::TopLevel(item) => item,
            Self::Included { parent, .. } => parent,
        }
    }
}

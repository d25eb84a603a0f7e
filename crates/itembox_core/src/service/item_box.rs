//! One owner's item container.
//!
//! # Responsibility
//! - Hold the top-level items of one owner, each with its included records.
//! - Enforce split/delete/protection rules on every mutation.
//! - Write mutations through the persistence adapter when sync is enabled,
//!   and queue what could not be written for the next `sync()`.
//!
//! # Invariants
//! - Traversals run over an immutable snapshot; structural changes publish a
//!   new one.
//! - A failed adapter write never rolls memory back. Memory stays ahead of the
//!   store until a later sync succeeds.
//! - Placeholder parents synthesized for orphans are never persisted.

use crate::alloc::{AllocError, IdSource};
use crate::model::attribute::{Attr, AttrValue};
use crate::model::item::{
    is_negative_count, AttrPatch, Item, ItemData, ItemError, ItemId, ItemRecord, ItemRef,
};
use crate::model::owner::OwnerRef;
use crate::model::snapshot::{CowList, Snapshot};
use crate::repo::{ItemRepository, RepoError, RepoResult};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

pub type BoxResult<T> = Result<T, BoxError>;

/// Coarse failure taxonomy shared by every box operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Bad input or a rule refused the operation; nothing was mutated.
    Validation,
    /// Stored or in-memory structure is inconsistent.
    Integrity,
    /// The persistence adapter failed.
    Adapter,
}

impl Display for FailureClass {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Validation => "validation",
            Self::Integrity => "integrity",
            Self::Adapter => "adapter",
        })
    }
}

#[derive(Debug)]
pub enum BoxError {
    NotFound(ItemId),
    InsufficientCount {
        id: ItemId,
        requested: i32,
        available: i32,
    },
    InvalidCount {
        id: ItemId,
        count: i32,
    },
    /// The item or something included in it is no-transfer.
    Protected(ItemId),
    /// The acting owner may not take items out of this box.
    Forbidden {
        id: ItemId,
        actor: OwnerRef,
    },
    ReadOnlyAttribute(Attr),
    Integrity(String),
    Alloc(AllocError),
    /// Memory already reflects the change; the write is queued for `sync()`.
    Adapter {
        id: ItemId,
        source: RepoError,
    },
}

impl BoxError {
    pub fn class(&self) -> FailureClass {
        match self {
            Self::NotFound(_)
            | Self::InsufficientCount { .. }
            | Self::InvalidCount { .. }
            | Self::Protected(_)
            | Self::Forbidden { .. }
            | Self::ReadOnlyAttribute(_) => FailureClass::Validation,
            Self::Integrity(_) => FailureClass::Integrity,
            Self::Alloc(_) | Self::Adapter { .. } => FailureClass::Adapter,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "item_not_found",
            Self::InsufficientCount { .. } => "insufficient_count",
            Self::InvalidCount { .. } => "invalid_count",
            Self::Protected(_) => "item_protected",
            Self::Forbidden { .. } => "forbidden",
            Self::ReadOnlyAttribute(_) => "read_only_attribute",
            Self::Integrity(_) => "integrity",
            Self::Alloc(_) => "id_alloc_failed",
            Self::Adapter { .. } => "adapter_failed",
        }
    }
}

impl Display for BoxError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(id) => write!(f, "item not found: {id}"),
            Self::InsufficientCount {
                id,
                requested,
                available,
            } => write!(
                f,
                "item {id} cannot give {requested} out of a stack of {available}"
            ),
            Self::InvalidCount { id, count } => write!(f, "invalid count {count} for item {id}"),
            Self::Protected(id) => write!(f, "item {id} or an included item is no-transfer"),
            Self::Forbidden { id, actor } => {
                write!(f, "{actor} may not take item {id} out of this box")
            }
            Self::ReadOnlyAttribute(attr) => write!(f, "attribute `{attr}` cannot be changed"),
            Self::Integrity(message) => write!(f, "item box integrity failure: {message}"),
            Self::Alloc(err) => write!(f, "{err}"),
            Self::Adapter { id, source } => write!(f, "item {id} not persisted: {source}"),
        }
    }
}

impl Error for BoxError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Alloc(err) => Some(err),
            Self::Adapter { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<AllocError> for BoxError {
    fn from(value: AllocError) -> Self {
        Self::Alloc(value)
    }
}

impl From<ItemError> for BoxError {
    fn from(value: ItemError) -> Self {
        match value {
            ItemError::InsufficientCount {
                id,
                requested,
                available,
            } => Self::InsufficientCount {
                id,
                requested,
                available,
            },
            ItemError::Alloc(err) => Self::Alloc(err),
        }
    }
}

/// Outcome of attaching a flat load batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub top_level: usize,
    pub included: usize,
    /// Children whose parent was missing; attached to placeholders.
    pub orphans: usize,
    /// Children nested two or more levels deep; attached to their top-level
    /// ancestor.
    pub flattened: usize,
    /// Records lifted to top level to break a parent cycle.
    pub cycles: usize,
    pub duplicates: usize,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.orphans == 0 && self.flattened == 0 && self.cycles == 0 && self.duplicates == 0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub saved: usize,
    pub deleted: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The box has no store.
    Skipped,
    /// Another sync was already running.
    Coalesced,
    Completed(SyncReport),
}

#[derive(Debug, Default)]
struct PendingWork {
    saves: BTreeSet<ItemId>,
    deletes: BTreeSet<ItemId>,
}

struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Top-level items of one owner.
pub struct ItemBox {
    owner: OwnerRef,
    items: CowList<Item>,
    store: Option<Arc<dyn ItemRepository>>,
    need_sync: bool,
    sync_in_flight: AtomicBool,
    pending: Mutex<PendingWork>,
}

impl ItemBox {
    /// Empty box. Mutations write through when `need_sync` is set and a store
    /// is given.
    pub fn new(owner: OwnerRef, store: Option<Arc<dyn ItemRepository>>, need_sync: bool) -> Self {
        Self {
            owner,
            items: CowList::new(),
            store,
            need_sync,
            sync_in_flight: AtomicBool::new(false),
            pending: Mutex::new(PendingWork::default()),
        }
    }

    /// Memory-only box.
    pub fn detached(owner: OwnerRef) -> Self {
        Self::new(owner, None, false)
    }

    /// Box populated from the store. A load failure yields an empty box.
    pub fn init(store: Arc<dyn ItemRepository>, owner: OwnerRef, need_sync: bool) -> Self {
        let started_at = Instant::now();
        let item_box = Self::new(owner, Some(Arc::clone(&store)), need_sync);
        match store.load_items(owner) {
            Ok(rows) => {
                let report = item_box.load(rows);
                info!(
                    "event=box_load module=item_box status=ok owner={owner} top_level={} included={} orphans={} duration_ms={}",
                    report.top_level,
                    report.included,
                    report.orphans,
                    started_at.elapsed().as_millis()
                );
            }
            Err(err) => error!(
                "event=box_load module=item_box status=error owner={owner} duration_ms={} error_code=load_failed error={err}",
                started_at.elapsed().as_millis()
            ),
        }
        item_box
    }

    /// Attaches a flat batch of records as a parent/child tree.
    ///
    /// Children of a missing parent hang off an empty placeholder carrying the
    /// missing id. Records nested deeper than one level go to their top-level
    /// ancestor. In a parent cycle the lowest id becomes top-level.
    pub fn load(&self, records: Vec<ItemData>) -> LoadReport {
        let mut report = LoadReport::default();
        let mut parents: HashMap<ItemId, Arc<Item>> = HashMap::new();
        let mut children = Vec::new();

        for data in records {
            if data.parent.is_some() {
                children.push(data);
                continue;
            }
            let item = Arc::new(Item::new(data));
            if self.push_top_level(Arc::clone(&item)) {
                parents.insert(item.id(), item);
                report.top_level += 1;
            } else {
                report.duplicates += 1;
            }
        }

        let child_parent: HashMap<ItemId, ItemId> = children
            .iter()
            .filter_map(|data| data.parent.map(|parent| (data.id(), parent)))
            .collect();
        let roots: HashMap<ItemId, ItemId> = child_parent
            .keys()
            .map(|id| (*id, top_level_ancestor(*id, &child_parent)))
            .collect();

        let (cycle_roots, children): (Vec<ItemData>, Vec<ItemData>) = children
            .into_iter()
            .partition(|data| roots.get(&data.id()) == Some(&data.id()));
        for data in cycle_roots {
            warn!(
                "event=box_load module=item_box status=warn owner={} item_id={} error_code=parent_cycle",
                self.owner,
                data.id()
            );
            report.cycles += 1;
            let item = Arc::new(Item::new(data));
            if self.push_top_level(Arc::clone(&item)) {
                parents.insert(item.id(), item);
                report.top_level += 1;
            } else {
                report.duplicates += 1;
            }
        }

        for data in children {
            let id = data.id();
            let Some(parent_id) = data.parent else {
                continue;
            };
            let target = roots.get(&id).copied().unwrap_or(parent_id);
            if target != parent_id {
                warn!(
                    "event=box_load module=item_box status=warn owner={} item_id={id} parent_id={parent_id} ancestor_id={target} error_code=nested_too_deep",
                    self.owner
                );
                report.flattened += 1;
            }
            let holder = match parents.get(&target) {
                Some(parent) => Arc::clone(parent),
                None => {
                    let placeholder = Arc::new(Item::placeholder(target, self.owner));
                    self.push_top_level(Arc::clone(&placeholder));
                    parents.insert(target, Arc::clone(&placeholder));
                    placeholder
                }
            };
            if holder.is_placeholder() {
                warn!(
                    "event=box_load module=item_box status=warn owner={} item_id={id} parent_id={target} error_code=orphaned_child",
                    self.owner
                );
                report.orphans += 1;
            }

            if holder.include(Arc::new(ItemRecord::new(data))) {
                report.included += 1;
            } else {
                report.duplicates += 1;
            }
        }
        report
    }

    pub fn owner(&self) -> OwnerRef {
        self.owner
    }

    pub fn need_sync(&self) -> bool {
        self.need_sync
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Ids of the top-level items.
    pub fn item_ids(&self) -> Vec<ItemId> {
        self.items.snapshot().iter().map(|item| item.id()).collect()
    }

    pub fn items(&self) -> Arc<Snapshot<Item>> {
        self.items.snapshot()
    }

    pub fn for_each(&self, mut action: impl FnMut(&Arc<Item>)) {
        for item in &*self.items.snapshot() {
            action(item);
        }
    }

    /// Every top-level item followed by its included records.
    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        for item in &*self.items.snapshot() {
            item.write_xml(&mut out, true);
        }
        out
    }

    /// Depth-first lookup over top-level items and their included records.
    pub fn find_item(&self, id: ItemId) -> Option<ItemRef> {
        for item in &*self.items.snapshot() {
            if item.id() == id {
                return Some(ItemRef::TopLevel(Arc::clone(item)));
            }
            if let Some(record) = item.find_included(id) {
                return Some(ItemRef::Included {
                    parent: Arc::clone(item),
                    record,
                });
            }
        }
        None
    }

    /// Memory-only box of every match; matched included records are promoted
    /// to the top level of the result.
    pub fn find_items(&self, predicate: impl Fn(&ItemData) -> bool) -> ItemBox {
        let found = ItemBox::detached(self.owner);
        for item in &*self.items.snapshot() {
            if item.record().read(&predicate) {
                found.push_top_level(Arc::clone(item));
            }
            for record in &*item.included() {
                if record.read(&predicate) {
                    found.push_top_level(Arc::new(Item::promoted(Arc::clone(record))));
                }
            }
        }
        found
    }

    pub fn find_first(&self, predicate: impl Fn(&ItemData) -> bool) -> Option<Arc<Item>> {
        self.items
            .snapshot()
            .iter()
            .find(|item| item.record().read(&predicate))
            .cloned()
    }

    /// Everything whose expiry (unix seconds) is at or before `now_secs`.
    pub fn find_expired(&self, now_secs: i64) -> ItemBox {
        self.find_items(|data| data.is_expired_at(now_secs))
    }

    /// First top-level item that can absorb `sample`'s count.
    pub fn find_joinable_item(&self, sample: &ItemData) -> Option<Arc<Item>> {
        let sample_id = sample.id();
        self.find_first(|data| data.id() != sample_id && data.is_joinable_with(sample))
    }

    /// Adds a top-level item unless one with the same id is present.
    ///
    /// The item and its included records are re-owned to this box's owner.
    pub fn add_item(&self, item: Arc<Item>) -> BoxResult<bool> {
        let id = item.id();
        match self.find_item(id) {
            Some(ItemRef::TopLevel(_)) => return Ok(false),
            Some(ItemRef::Included { parent, .. }) => {
                return Err(self.fail(
                    "box_add_item",
                    BoxError::Integrity(format!(
                        "item {id} is already included in item {}",
                        parent.id()
                    )),
                ));
            }
            None => {}
        }

        if item.record().owner() != self.owner {
            item.relocate(self.owner, &AttrPatch::default());
        }
        if !self.push_top_level(Arc::clone(&item)) {
            return Ok(false);
        }
        debug!(
            "event=box_add_item module=item_box status=ok owner={} item_id={id} included={}",
            self.owner,
            item.included_len()
        );
        self.persist_item(&item).map(|()| true)
    }

    /// Deletes `count` from a stack, or the whole item when `count` is zero,
    /// negative, or covers the stack.
    pub fn delete_item(&self, id: ItemId, count: i32) -> BoxResult<()> {
        let (_, persisted) = self.remove_count("box_delete_item", id, count, false)?;
        persisted
    }

    /// Removes `count` from item `id` like [`Self::delete_item`] and returns
    /// how much left the box, read under the record lock.
    ///
    /// An empty stack is refused with `InvalidCount` and left in place.
    /// Adapter failures are logged and queued; the amount is still returned.
    pub fn withdraw(&self, id: ItemId, count: i32) -> BoxResult<i32> {
        let (removed, persisted) = self.remove_count("box_withdraw_item", id, count, true)?;
        if let Err(err) = persisted {
            debug!(
                "event=box_withdraw_item module=item_box status=queued owner={} item_id={id} error={err}",
                self.owner
            );
        }
        Ok(removed)
    }

    /// Takes `count` out of item `id` for a transfer.
    ///
    /// A partial count splits the stack; the piece always gets a fresh id and
    /// the remainder is persisted. A whole stack is removed through the delete
    /// path and returned as is, re-minted only for ammunition when
    /// `keep_same_id` is unset. Adapter failures are logged and queued; the
    /// item is still returned.
    pub fn get_split_item(
        &self,
        id: ItemId,
        count: i32,
        keep_same_id: bool,
        ids: &dyn IdSource,
    ) -> BoxResult<Arc<Item>> {
        let found = self.find("box_split_item", id)?;
        self.ensure_transferable("box_split_item", &found)?;

        let record = found.record();
        let available = record.count();
        if count > 0 && count < available {
            let piece = record
                .split(count, false, ids)
                .map_err(|err| self.fail("box_split_item", err.into()))?;
            if let Err(err) = self.persist_records(std::slice::from_ref(record)) {
                debug!(
                    "event=box_split_item module=item_box status=queued owner={} item_id={id} error={err}",
                    self.owner
                );
            }
            return Ok(Arc::new(Item::from_record(Arc::new(piece))));
        }

        let fresh_id = if !keep_same_id && available > 0 && record.read(ItemData::is_ammo) {
            Some(ids.next_id().map_err(|err| self.fail("box_split_item", err.into()))?)
        } else {
            None
        };

        self.detach(&found)?;
        if let Err(err) = self.persist_delete(id) {
            debug!(
                "event=box_split_item module=item_box status=queued owner={} item_id={id} error={err}",
                self.owner
            );
        }

        let item = match found {
            ItemRef::TopLevel(item) => item,
            ItemRef::Included { record, .. } => Arc::new(Item::from_record(record)),
        };
        if let Some(fresh_id) = fresh_id {
            item.reassign_id(fresh_id);
        }
        debug!(
            "event=box_split_item module=item_box status=ok owner={} item_id={id} returned_id={} whole_stack=true",
            self.owner,
            item.id()
        );
        Ok(item)
    }

    /// Clones item `id` under a fresh id after refreshing its count, then
    /// decrements the source (partial) or deletes it (whole stack).
    ///
    /// The clone carries no included records.
    pub fn get_cloned_item(
        &self,
        id: ItemId,
        requested: i32,
        ids: &dyn IdSource,
    ) -> BoxResult<Arc<Item>> {
        let found = self.find("box_clone_item", id)?;
        self.ensure_transferable("box_clone_item", &found)?;

        let record = Arc::clone(found.record());
        self.refresh_count(&record)?;
        let fresh_id = ids
            .next_id()
            .map_err(|err| self.fail("box_clone_item", err.into()))?;

        let clone = record.clone_detached();
        clone.update(|data| data.attrs.set(Attr::Id, fresh_id));

        if requested > 0 && requested < record.count() {
            record
                .take(requested)
                .map_err(|err| self.fail("box_clone_item", err.into()))?;
            clone.update(|data| data.attrs.set(Attr::Count, requested));
            if let Err(err) = self.persist_records(std::slice::from_ref(&record)) {
                debug!(
                    "event=box_clone_item module=item_box status=queued owner={} item_id={id} error={err}",
                    self.owner
                );
            }
        } else {
            self.detach(&found)?;
            if let Err(err) = self.persist_delete(id) {
                debug!(
                    "event=box_clone_item module=item_box status=queued owner={} item_id={id} error={err}",
                    self.owner
                );
            }
        }

        debug!(
            "event=box_clone_item module=item_box status=ok owner={} item_id={id} clone_id={fresh_id} count={}",
            self.owner,
            clone.count()
        );
        Ok(Arc::new(Item::from_record(Arc::new(clone))))
    }

    /// Sets one attribute of item `id` and writes it through.
    pub fn change_one(&self, id: ItemId, attr: Attr, value: impl Into<AttrValue>) -> BoxResult<()> {
        if attr == Attr::Id {
            return Err(self.fail("box_change_one", BoxError::ReadOnlyAttribute(attr)));
        }
        let value = value.into();
        if is_negative_count(attr, &value) {
            let count = value.as_i32();
            return Err(self.fail("box_change_one", BoxError::InvalidCount { id, count }));
        }
        let found = self.find("box_change_one", id)?;
        let record = found.record();
        record.update(|data| data.attrs.set(attr, value));
        debug!(
            "event=box_change_one module=item_box status=ok owner={} item_id={id} attr={attr}",
            self.owner
        );
        self.persist_records(std::slice::from_ref(record))
    }

    /// Adds `delta` to the stack of item `id` and returns the new count.
    pub fn add_count(&self, id: ItemId, delta: i32) -> BoxResult<i32> {
        if delta <= 0 {
            return Err(self.fail("box_add_count", BoxError::InvalidCount { id, count: delta }));
        }
        let found = self.find("box_add_count", id)?;
        let record = found.record();
        let total = record.update(|data| {
            let total = data.count().saturating_add(delta);
            data.attrs.set(Attr::Count, total);
            total
        });
        debug!(
            "event=box_add_count module=item_box status=ok owner={} item_id={id} delta={delta} total={total}",
            self.owner
        );
        self.persist_records(std::slice::from_ref(record))?;
        Ok(total)
    }

    /// Copy of every item with independent storage.
    pub fn deep_copy(&self, need_sync: bool) -> ItemBox {
        let copy = ItemBox::new(self.owner, self.store.clone(), need_sync);
        for item in &*self.items.snapshot() {
            copy.push_top_level(Arc::new(item.deep_copy()));
        }
        copy
    }

    /// Ids whose cascading delete is still waiting for a sync.
    pub fn pending_deletes(&self) -> Vec<ItemId> {
        self.pending.lock().deletes.iter().copied().collect()
    }

    /// Ids whose last save failed.
    pub fn pending_saves(&self) -> Vec<ItemId> {
        self.pending.lock().saves.iter().copied().collect()
    }

    /// Retries queued deletes, then saves every record.
    ///
    /// A sync started while another is in flight returns `Coalesced` without
    /// touching the store.
    pub fn sync(&self) -> SyncOutcome {
        let Some(store) = self.store.as_deref() else {
            return SyncOutcome::Skipped;
        };
        if self
            .sync_in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("event=box_sync module=item_box status=coalesced owner={}", self.owner);
            return SyncOutcome::Coalesced;
        }
        let _in_flight = InFlight(&self.sync_in_flight);

        let started_at = Instant::now();
        let mut report = SyncReport::default();

        for id in self.pending_deletes() {
            match self.retry_delete(store, id) {
                Ok(removed) => {
                    report.deleted += removed;
                    self.pending.lock().deletes.remove(&id);
                }
                Err(err) => {
                    report.failed += 1;
                    warn!(
                        "event=box_sync module=item_box status=warn owner={} item_id={id} error_code=delete_failed error={err}",
                        self.owner
                    );
                }
            }
        }

        for item in &*self.items.snapshot() {
            for record in persistable_records(item) {
                let data = record.data();
                match store.save_item(&data) {
                    Ok(()) => {
                        report.saved += 1;
                        self.pending.lock().saves.remove(&data.id());
                    }
                    Err(err) => {
                        report.failed += 1;
                        self.pending.lock().saves.insert(data.id());
                        warn!(
                            "event=box_sync module=item_box status=warn owner={} item_id={} error_code=save_failed error={err}",
                            self.owner,
                            data.id()
                        );
                    }
                }
            }
        }

        info!(
            "event=box_sync module=item_box status={} owner={} saved={} deleted={} failed={} duration_ms={}",
            if report.failed == 0 { "ok" } else { "warn" },
            self.owner,
            report.saved,
            report.deleted,
            report.failed,
            started_at.elapsed().as_millis()
        );
        SyncOutcome::Completed(report)
    }

    /// Takes `count` off a stack, or detaches the whole item. Returns the
    /// amount removed and the outcome of persisting the change.
    fn remove_count(
        &self,
        event: &'static str,
        id: ItemId,
        count: i32,
        refuse_empty: bool,
    ) -> BoxResult<(i32, BoxResult<()>)> {
        let found = self.find(event, id)?;
        self.ensure_transferable(event, &found)?;

        let record = found.record();
        if count > 0 {
            match record.take(count) {
                Ok(remaining) => {
                    debug!(
                        "event={event} module=item_box status=ok owner={} item_id={id} count={count} remaining={remaining}",
                        self.owner
                    );
                    return Ok((count, self.persist_records(std::slice::from_ref(record))));
                }
                Err(ItemError::InsufficientCount { available, .. }) if count >= available => {}
                Err(err) => return Err(self.fail(event, err.into())),
            }
        }

        if refuse_empty {
            let available = record.count();
            if available <= 0 {
                return Err(self.fail(event, BoxError::InvalidCount { id, count: available }));
            }
        }
        self.detach(&found)?;
        let available = record.count();
        debug!(
            "event={event} module=item_box status=ok owner={} item_id={id} whole_stack=true",
            self.owner
        );
        Ok((available, self.persist_delete(id)))
    }

    fn push_top_level(&self, item: Arc<Item>) -> bool {
        self.items
            .push_if_absent(item, |existing, added| existing.id() == added.id())
    }

    fn write_store(&self) -> Option<&dyn ItemRepository> {
        if self.need_sync {
            self.store.as_deref()
        } else {
            None
        }
    }

    fn find(&self, event: &'static str, id: ItemId) -> BoxResult<ItemRef> {
        self.find_item(id)
            .ok_or_else(|| self.fail(event, BoxError::NotFound(id)))
    }

    fn ensure_transferable(&self, event: &'static str, found: &ItemRef) -> BoxResult<()> {
        let protected = match found {
            ItemRef::TopLevel(item) => item.is_protected(),
            ItemRef::Included { record, .. } => record.read(ItemData::is_no_transfer),
        };
        if protected {
            return Err(self.fail(event, BoxError::Protected(found.id())));
        }
        Ok(())
    }

    fn detach(&self, found: &ItemRef) -> BoxResult<()> {
        let id = found.id();
        let removed = match found {
            ItemRef::TopLevel(item) => self
                .items
                .remove_first(|existing| Arc::ptr_eq(existing, item))
                .is_some(),
            ItemRef::Included { parent, .. } => parent.exclude(id).is_some(),
        };
        if removed {
            Ok(())
        } else {
            Err(self.fail(
                "box_detach_item",
                BoxError::Integrity(format!("item {id} vanished during removal")),
            ))
        }
    }

    fn refresh_count(&self, record: &ItemRecord) -> BoxResult<()> {
        let Some(store) = self.write_store() else {
            return Ok(());
        };
        let id = record.id();
        match store.load_item(id) {
            Ok(Some(row)) => {
                record.update(|data| data.attrs.set(Attr::Count, row.count()));
                Ok(())
            }
            Ok(None) => Err(self.fail("box_refresh_item", BoxError::NotFound(id))),
            Err(source) => Err(self.fail("box_refresh_item", BoxError::Adapter { id, source })),
        }
    }

    fn persist_item(&self, item: &Item) -> BoxResult<()> {
        self.persist_records(&persistable_records(item))
    }

    fn persist_records(&self, records: &[Arc<ItemRecord>]) -> BoxResult<()> {
        let Some(store) = self.write_store() else {
            return Ok(());
        };
        let mut first_failure = None;
        for record in records {
            let data = record.data();
            let id = data.id();
            match store.save_item(&data) {
                Ok(()) => {
                    self.pending.lock().saves.remove(&id);
                }
                Err(source) => {
                    self.pending.lock().saves.insert(id);
                    let err = self.fail("box_save_item", BoxError::Adapter { id, source });
                    first_failure.get_or_insert(err);
                }
            }
        }
        first_failure.map_or(Ok(()), Err)
    }

    fn persist_delete(&self, id: ItemId) -> BoxResult<()> {
        let Some(store) = self.store.as_deref() else {
            return Ok(());
        };
        if !self.need_sync {
            self.pending.lock().deletes.insert(id);
            return Ok(());
        }
        match store.cascading_delete(id) {
            Ok(_) => Ok(()),
            Err(source) => {
                self.pending.lock().deletes.insert(id);
                Err(self.fail("box_delete_row", BoxError::Adapter { id, source }))
            }
        }
    }

    /// Runs a queued delete unless the row has since moved to another owner
    /// or the item is back in this box.
    fn retry_delete(&self, store: &dyn ItemRepository, id: ItemId) -> RepoResult<usize> {
        if self.find_item(id).is_some() {
            return Ok(0);
        }
        match store.load_item(id)? {
            None => Ok(0),
            Some(row) if row.owner != self.owner => {
                info!(
                    "event=box_sync module=item_box status=skip owner={} item_id={id} row_owner={}",
                    self.owner, row.owner
                );
                Ok(0)
            }
            Some(_) => store.cascading_delete(id),
        }
    }

    fn fail(&self, event: &'static str, err: BoxError) -> BoxError {
        let class = err.class();
        if class == FailureClass::Validation {
            warn!(
                "event={event} module=item_box status=error owner={} class={class} error_code={} error={err}",
                self.owner,
                err.code()
            );
        } else {
            error!(
                "event={event} module=item_box status=error owner={} class={class} error_code={} error={err}",
                self.owner,
                err.code()
            );
        }
        err
    }
}

/// Walks the parent chain of child record `id` up to the first id that is not
/// itself a child in the batch. On a cycle, returns the lowest id in it.
fn top_level_ancestor(id: ItemId, child_parent: &HashMap<ItemId, ItemId>) -> ItemId {
    let mut path = vec![id];
    let mut current = id;
    while let Some(&parent) = child_parent.get(&current) {
        if let Some(position) = path.iter().position(|seen| *seen == parent) {
            return path[position..].iter().copied().min().unwrap_or(parent);
        }
        path.push(parent);
        current = parent;
    }
    current
}

fn persistable_records(item: &Item) -> Vec<Arc<ItemRecord>> {
    let mut records = item.records();
    if item.is_placeholder() {
        records.remove(0);
    }
    records
}

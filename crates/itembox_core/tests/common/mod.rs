#![allow(dead_code)]

use itembox_core::{
    AllocResult, Attr, IdSource, IdWindow, ItemData, ItemId, ItemRepository, ItemTemplate, Owner,
    OwnerRef, RepoError, RepoResult, SequenceRepository, TemplateRepository,
};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};

/// In-memory adapter with switchable failures and call counters.
#[derive(Default)]
pub struct MemoryStore {
    rows: Mutex<BTreeMap<ItemId, ItemData>>,
    windows: Mutex<HashMap<OwnerRef, IdWindow>>,
    templates: Mutex<BTreeMap<String, ItemTemplate>>,
    next_value: AtomicI64,
    pub fail_loads: AtomicBool,
    pub fail_saves: AtomicBool,
    pub fail_deletes: AtomicBool,
    pub fail_sequence: AtomicBool,
    pub fail_window_saves: AtomicBool,
    pub load_calls: AtomicUsize,
    pub save_calls: AtomicUsize,
    pub delete_calls: AtomicUsize,
    pub sequence_calls: AtomicUsize,
    pub window_saves: AtomicUsize,
    pub template_loads: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            next_value: AtomicI64::new(1),
            ..Self::default()
        }
    }

    pub fn with_rows(rows: impl IntoIterator<Item = ItemData>) -> Self {
        let store = Self::new();
        for row in rows {
            store.rows.lock().insert(row.id(), row);
        }
        store
    }

    pub fn row(&self, id: ItemId) -> Option<ItemData> {
        self.rows.lock().get(&id).cloned()
    }

    pub fn row_count(&self) -> usize {
        self.rows.lock().len()
    }

    pub fn set_fail(flag: &AtomicBool, value: bool) {
        flag.store(value, Ordering::SeqCst);
    }

    pub fn stored_window(&self, owner: OwnerRef) -> Option<IdWindow> {
        self.windows.lock().get(&owner).copied()
    }

    fn refuse(flag: &AtomicBool, what: &str) -> RepoResult<()> {
        if flag.load(Ordering::SeqCst) {
            return Err(RepoError::Unavailable(format!("{what} disabled")));
        }
        Ok(())
    }
}

impl ItemRepository for MemoryStore {
    fn load_items(&self, owner: OwnerRef) -> RepoResult<Vec<ItemData>> {
        self.load_calls.fetch_add(1, Ordering::SeqCst);
        Self::refuse(&self.fail_loads, "load")?;
        Ok(self
            .rows
            .lock()
            .values()
            .filter(|row| row.owner == owner)
            .cloned()
            .collect())
    }

    fn load_item(&self, id: ItemId) -> RepoResult<Option<ItemData>> {
        self.load_calls.fetch_add(1, Ordering::SeqCst);
        Self::refuse(&self.fail_loads, "load")?;
        Ok(self.row(id))
    }

    fn save_item(&self, item: &ItemData) -> RepoResult<()> {
        self.save_calls.fetch_add(1, Ordering::SeqCst);
        Self::refuse(&self.fail_saves, "save")?;
        self.rows.lock().insert(item.id(), item.clone());
        Ok(())
    }

    fn cascading_delete(&self, id: ItemId) -> RepoResult<usize> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        Self::refuse(&self.fail_deletes, "delete")?;
        let mut rows = self.rows.lock();
        let before = rows.len();
        rows.retain(|row_id, row| *row_id != id && row.parent != Some(id));
        Ok(before - rows.len())
    }
}

impl SequenceRepository for MemoryStore {
    fn allocate_sequence_batch(&self, count: u32) -> RepoResult<ItemId> {
        self.sequence_calls.fetch_add(1, Ordering::SeqCst);
        Self::refuse(&self.fail_sequence, "sequence")?;
        Ok(self.next_value.fetch_add(i64::from(count), Ordering::SeqCst))
    }

    fn load_window(&self, owner: OwnerRef) -> RepoResult<Option<IdWindow>> {
        Ok(self.stored_window(owner))
    }

    fn save_window(&self, owner: OwnerRef, window: &IdWindow) -> RepoResult<()> {
        self.window_saves.fetch_add(1, Ordering::SeqCst);
        Self::refuse(&self.fail_window_saves, "window save")?;
        self.windows.lock().insert(owner, *window);
        Ok(())
    }
}

impl TemplateRepository for MemoryStore {
    fn load_template(&self, name: &str) -> RepoResult<Option<ItemTemplate>> {
        self.template_loads.fetch_add(1, Ordering::SeqCst);
        Ok(self.templates.lock().get(name).cloned())
    }

    fn save_template(&self, template: &ItemTemplate) -> RepoResult<()> {
        self.templates
            .lock()
            .insert(template.name().to_string(), template.clone());
        Ok(())
    }

    fn list_template_names(&self) -> RepoResult<Vec<String>> {
        Ok(self.templates.lock().keys().cloned().collect())
    }
}

/// Id source counting up from a fixed start.
pub struct CountingIds(AtomicI64);

impl CountingIds {
    pub fn starting_at(first: ItemId) -> Self {
        Self(AtomicI64::new(first))
    }
}

impl IdSource for CountingIds {
    fn next_id(&self) -> AllocResult<ItemId> {
        Ok(self.0.fetch_add(1, Ordering::SeqCst))
    }
}

/// Owner stub minting ids from a counter.
pub struct TestOwner {
    pub owner: OwnerRef,
    pub privileged: bool,
    ids: CountingIds,
}

impl TestOwner {
    pub fn new(owner: OwnerRef, first_id: ItemId) -> Self {
        Self {
            owner,
            privileged: false,
            ids: CountingIds::starting_at(first_id),
        }
    }
}

impl Owner for TestOwner {
    fn owner_ref(&self) -> OwnerRef {
        self.owner
    }

    fn new_id(&self) -> AllocResult<ItemId> {
        self.ids.next_id()
    }

    fn bypasses_checks(&self) -> bool {
        self.privileged
    }
}

pub fn stack(id: ItemId, owner: OwnerRef, name: &str, count: i32) -> ItemData {
    let mut data = ItemData::new(id, owner);
    data.attrs.set(Attr::Name, name);
    data.attrs.set(Attr::Count, count);
    data
}

pub fn child_of(parent: ItemId, mut data: ItemData) -> ItemData {
    data.parent = Some(parent);
    data
}

//! Owner abstraction and the online session of one owner.

use super::item_box::{ItemBox, SyncOutcome};
use super::sync_task::SyncTask;
use crate::alloc::{AllocResult, IdSource, WindowAllocator};
use crate::model::item::ItemId;
use crate::model::owner::OwnerRef;
use crate::repo::{ItemRepository, SequenceRepository};
use log::{info, warn};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Anything that owns items and can mint ids for them.
pub trait Owner: Send + Sync {
    fn owner_ref(&self) -> OwnerRef;
    fn new_id(&self) -> AllocResult<ItemId>;
    /// Whether ownership checks are skipped for this owner.
    fn bypasses_checks(&self) -> bool {
        false
    }
}

/// Adapts an [`Owner`] into an id source.
pub struct OwnerIds<'a>(pub &'a dyn Owner);

impl IdSource for OwnerIds<'_> {
    fn next_id(&self) -> AllocResult<ItemId> {
        self.0.new_id()
    }
}

/// One owner's box, id window and background sync.
///
/// The box is loaded on first access and writes through.
pub struct OwnerSession {
    owner: OwnerRef,
    store: Arc<dyn ItemRepository>,
    ids: WindowAllocator,
    privileged: bool,
    sync_interval: Duration,
    item_box: OnceCell<Arc<ItemBox>>,
    sync_task: Mutex<Option<SyncTask>>,
}

impl OwnerSession {
    pub fn open(
        owner: OwnerRef,
        store: Arc<dyn ItemRepository>,
        sequences: Arc<dyn SequenceRepository>,
        sync_interval: Duration,
    ) -> AllocResult<Self> {
        Ok(Self {
            owner,
            store,
            ids: WindowAllocator::open(owner, sequences)?,
            privileged: false,
            sync_interval,
            item_box: OnceCell::new(),
            sync_task: Mutex::new(None),
        })
    }

    pub fn with_privileges(mut self, privileged: bool) -> Self {
        self.privileged = privileged;
        self
    }

    pub fn item_box(&self) -> &Arc<ItemBox> {
        self.item_box
            .get_or_init(|| Arc::new(ItemBox::init(Arc::clone(&self.store), self.owner, true)))
    }

    pub fn ids(&self) -> &WindowAllocator {
        &self.ids
    }

    pub fn is_online(&self) -> bool {
        self.sync_task.lock().is_some()
    }

    /// Starts the background sync task; a no-op when already online.
    pub fn go_online(&self) -> std::io::Result<()> {
        let mut task = self.sync_task.lock();
        if task.is_none() {
            *task = Some(SyncTask::spawn(Arc::clone(self.item_box()), self.sync_interval)?);
            info!("event=owner_online module=owner status=ok owner={}", self.owner);
        }
        Ok(())
    }

    /// Cancels the sync task, runs a final sync and persists the id window.
    pub fn go_offline(&self) -> SyncOutcome {
        if let Some(task) = self.sync_task.lock().take() {
            task.cancel();
        }
        let outcome = match self.item_box.get() {
            Some(item_box) => item_box.sync(),
            None => SyncOutcome::Skipped,
        };
        if let Err(err) = self.ids.persist() {
            warn!(
                "event=owner_offline module=owner status=warn owner={} error_code=window_save_failed error={err}",
                self.owner
            );
        }
        info!("event=owner_offline module=owner status=ok owner={}", self.owner);
        outcome
    }
}

impl Owner for OwnerSession {
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

use super::{AllocResult, GlobalAllocator, IdSource, ID_WINDOW_SIZE};
use crate::model::item::ItemId;
use crate::model::owner::OwnerRef;
use crate::repo::SequenceRepository;
use log::{info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Per-owner identifier window.
///
/// The next identifier is `window_start + cursor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdWindow {
    pub window_start: ItemId,
    pub next_window_start: ItemId,
    pub cursor: i64,
}

/// Hands out one owner's identifiers from pre-reserved windows.
pub struct WindowAllocator {
    owner: OwnerRef,
    global: GlobalAllocator,
    store: Arc<dyn SequenceRepository>,
    window: Mutex<IdWindow>,
    slides: AtomicU64,
}

impl WindowAllocator {
    /// Opens the owner's allocator.
    ///
    /// A persisted window is never resumed in place: identifiers handed out
    /// after its last save may already be in use, so the allocator moves on to
    /// the stored upcoming window and reserves a new one behind it.
    pub fn open(owner: OwnerRef, store: Arc<dyn SequenceRepository>) -> AllocResult<Self> {
        let global = GlobalAllocator::new(Arc::clone(&store));
        let window = match store.load_window(owner)? {
            Some(saved) => IdWindow {
                window_start: saved.next_window_start,
                next_window_start: global.allocate_batch(window_batch())?.start,
                cursor: 0,
            },
            None => IdWindow {
                window_start: global.allocate_batch(window_batch())?.start,
                next_window_start: global.allocate_batch(window_batch())?.start,
                cursor: 0,
            },
        };

        // Stored before any id of this window is issued.
        if let Err(err) = store.save_window(owner, &window) {
            warn!(
                "event=id_window_open module=alloc status=error owner={owner} error_code=window_save_failed error={err}"
            );
            return Err(err.into());
        }
        info!(
            "event=id_window_open module=alloc status=ok owner={owner} window_start={} next_window_start={}",
            window.window_start, window.next_window_start
        );

        Ok(Self {
            owner,
            global,
            store,
            window: Mutex::new(window),
            slides: AtomicU64::new(0),
        })
    }

    pub fn owner(&self) -> OwnerRef {
        self.owner
    }

    /// Current window state.
    pub fn window(&self) -> IdWindow {
        *self.window.lock()
    }

    /// Number of window slides since the allocator was opened.
    pub fn slide_count(&self) -> u64 {
        self.slides.load(Ordering::Relaxed)
    }

    /// Persists the current window, cursor included.
    pub fn persist(&self) -> AllocResult<()> {
        let window = self.window();
        self.store.save_window(self.owner, &window)?;
        Ok(())
    }

    /// Moves to the upcoming window and reserves the one after it.
    ///
    /// The move only takes effect once the new state is stored; on any failure
    /// `window` is left as it was. A reserved batch that never got stored is
    /// skipped, not reused.
    fn slide(&self, window: &mut IdWindow) -> AllocResult<()> {
        let upcoming = self.global.allocate_batch(window_batch())?.start;
        let slid = IdWindow {
            window_start: window.next_window_start,
            next_window_start: upcoming,
            cursor: 0,
        };
        if let Err(err) = self.store.save_window(self.owner, &slid) {
            warn!(
                "event=id_window_slide module=alloc status=error owner={} error_code=window_save_failed error={err}",
                self.owner
            );
            return Err(err.into());
        }

        *window = slid;
        self.slides.fetch_add(1, Ordering::Relaxed);
        info!(
            "event=id_window_slide module=alloc status=ok owner={} window_start={} next_window_start={}",
            self.owner, window.window_start, window.next_window_start
        );
        Ok(())
    }
}

impl IdSource for WindowAllocator {
    fn next_id(&self) -> AllocResult<ItemId> {
        let mut window = self.window.lock();
        if window.cursor >= ID_WINDOW_SIZE {
            self.slide(&mut window)?;
        }

        let id = window.window_start + window.cursor;
        window.cursor += 1;

        if window.cursor == ID_WINDOW_SIZE {
            // The id above is already reserved; a failed slide is retried on the next call.
            if let Err(err) = self.slide(&mut window) {
                warn!(
                    "event=id_window_slide module=alloc status=warn owner={} error_code=slide_deferred error={err}",
                    self.owner
                );
            }
        }
        Ok(id)
    }
}

fn window_batch() -> u32 {
    ID_WINDOW_SIZE as u32
}

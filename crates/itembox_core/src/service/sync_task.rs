//! Periodic background sync of one box.

use super::item_box::{ItemBox, SyncOutcome};
use crossbeam_channel::{bounded, select, tick, Sender};
use log::{info, warn};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Background thread running `ItemBox::sync()` every interval.
///
/// Dropping the task cancels it and waits for the thread. A sync already
/// running finishes first; adapter calls cannot be interrupted.
pub struct SyncTask {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
    passes: Arc<AtomicU64>,
}

impl SyncTask {
    pub fn spawn(item_box: Arc<ItemBox>, interval: Duration) -> std::io::Result<Self> {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let passes = Arc::new(AtomicU64::new(0));
        let thread_passes = Arc::clone(&passes);
        let owner = item_box.owner();

        let handle = std::thread::Builder::new()
            .name(format!("itembox-sync-{}-{}", owner.kind_str(), owner.id()))
            .spawn(move || {
                let ticker = tick(interval);
                info!("event=sync_task module=sync_task status=start owner={owner} interval_ms={}", interval.as_millis());
                loop {
                    select! {
                        recv(stop_rx) -> _ => break,
                        recv(ticker) -> _ => {
                            if let SyncOutcome::Completed(report) = item_box.sync() {
                                thread_passes.fetch_add(1, Ordering::Relaxed);
                                if report.failed > 0 {
                                    warn!(
                                        "event=sync_task module=sync_task status=warn owner={owner} failed={}",
                                        report.failed
                                    );
                                }
                            }
                        }
                    }
                }
                info!("event=sync_task module=sync_task status=stopped owner={owner}");
            })?;

        Ok(Self {
            stop: Some(stop_tx),
            handle: Some(handle),
            passes,
        })
    }

    /// Completed sync passes so far.
    pub fn passes(&self) -> u64 {
        self.passes.load(Ordering::Relaxed)
    }

    /// Stops the task and waits for the thread to exit.
    pub fn cancel(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        // Dropping the sender disconnects the channel and wakes the select.
        self.stop.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("event=sync_task module=sync_task status=error error_code=thread_panicked");
            }
        }
    }
}

impl Drop for SyncTask {
    fn drop(&mut self) {
        self.shutdown();
    }
}

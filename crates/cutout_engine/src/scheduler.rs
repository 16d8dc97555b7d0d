use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use cutout_core::{Collection, ItemId};
use cutout_logging::{cutout_debug, cutout_info, cutout_warn};
use tokio::sync::watch;

use crate::transform::{ProgressSink, TransformAdapter};
use crate::{ProgressUpdate, RunOutcome, RunSummary};

pub type SharedCollection = Arc<Mutex<Collection>>;

/// Drives pending items through the transform, one at a time.
///
/// The collection lock is only held between suspension points; callers may
/// add items or toggle `keep_original` while a run is in flight.
pub struct BatchScheduler {
    collection: SharedCollection,
    adapter: TransformAdapter,
    running: AtomicBool,
    cancel_requested: AtomicBool,
    progress_tx: watch::Sender<Option<ProgressUpdate>>,
}

impl BatchScheduler {
    pub fn new(collection: SharedCollection, adapter: TransformAdapter) -> Self {
        let (progress_tx, _) = watch::channel(None);
        Self {
            collection,
            adapter,
            running: AtomicBool::new(false),
            cancel_requested: AtomicBool::new(false),
            progress_tx,
        }
    }

    pub fn collection(&self) -> &SharedCollection {
        &self.collection
    }

    pub fn adapter(&self) -> &TransformAdapter {
        &self.adapter
    }

    /// Locks the collection, recovering from a poisoned lock.
    pub fn lock(&self) -> MutexGuard<'_, Collection> {
        self.collection.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Most recent progress of the active item; `None` while idle.
    pub fn subscribe(&self) -> watch::Receiver<Option<ProgressUpdate>> {
        self.progress_tx.subscribe()
    }

    /// Stops the current run once the in-flight item settles.
    pub fn cancel(&self) {
        if self.is_running() {
            cutout_info!("cancel requested; stopping after the current item");
            self.cancel_requested.store(true, Ordering::Release);
        }
    }

    /// Processes every runnable item in collection order.
    ///
    /// The scan only moves forward: items appended during the run are picked
    /// up when it reaches them, while items at positions already passed wait
    /// for the next run. A call made while another run is active returns
    /// immediately.
    pub async fn run_all(&self) -> RunOutcome {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            cutout_debug!("run_all ignored: a run is already active");
            return RunOutcome::AlreadyRunning;
        }
        self.cancel_requested.store(false, Ordering::Release);
        let mut run = ActiveRun {
            scheduler: self,
            active: None,
        };
        let mut cursor = None;
        let mut summary = RunSummary::default();
        cutout_info!("run started");

        loop {
            if self.cancel_requested.load(Ordering::Acquire) {
                summary.cancelled = true;
                break;
            }
            let Some((id, input)) = self.pick_next(&mut cursor) else {
                break;
            };
            run.active = Some(id);
            self.progress_tx
                .send_replace(Some(ProgressUpdate { item_id: id, percent: 0 }));

            let sink = ItemProgress {
                scheduler: self,
                item_id: id,
            };
            let result = self.adapter.apply(input, &sink).await;

            let mut collection = self.lock();
            let settled = match result {
                Ok(output) => collection.complete(id, output).map(|()| true),
                Err(err) => collection.fail(id, err.to_string()).map(|()| false),
            };
            drop(collection);
            run.active = None;

            match settled {
                Ok(true) => summary.succeeded += 1,
                Ok(false) => summary.failed += 1,
                Err(err) => cutout_warn!("result for item {id} dropped: {err}"),
            }
            summary.processed += 1;
        }

        cutout_info!(
            "run finished: processed={} succeeded={} failed={} cancelled={}",
            summary.processed,
            summary.succeeded,
            summary.failed,
            summary.cancelled
        );
        RunOutcome::Finished(summary)
    }

    fn pick_next(&self, cursor: &mut Option<ItemId>) -> Option<(ItemId, bytes::Bytes)> {
        let mut collection = self.lock();
        loop {
            let id = collection.next_runnable(*cursor)?;
            *cursor = Some(id);
            match collection.begin_processing(id) {
                Ok(input) => return Some((id, input)),
                Err(err) => cutout_warn!("skipping item {id}: {err}"),
            }
        }
    }
}

/// Clears the running flag and returns an interrupted item when the run
/// ends, including when the `run_all` future is dropped mid-item.
struct ActiveRun<'a> {
    scheduler: &'a BatchScheduler,
    active: Option<ItemId>,
}

impl Drop for ActiveRun<'_> {
    fn drop(&mut self) {
        if let Some(id) = self.active.take() {
            self.scheduler.lock().abandon_processing(id);
        }
        self.scheduler.progress_tx.send_replace(None);
        self.scheduler.cancel_requested.store(false, Ordering::Release);
        self.scheduler.running.store(false, Ordering::Release);
    }
}

struct ItemProgress<'a> {
    scheduler: &'a BatchScheduler,
    item_id: ItemId,
}

impl ProgressSink for ItemProgress<'_> {
    fn emit(&self, percent: u8) {
        let stored = self.scheduler.lock().record_progress(self.item_id, percent);
        if let Some(percent) = stored {
            self.scheduler.progress_tx.send_replace(Some(ProgressUpdate {
                item_id: self.item_id,
                percent,
            }));
        }
    }
}

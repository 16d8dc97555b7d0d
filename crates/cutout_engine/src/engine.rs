use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use cutout_core::{AddReport, SourceFile};
use cutout_logging::{cutout_debug, cutout_error, cutout_info};

use crate::scheduler::BatchScheduler;
use crate::{ProgressUpdate, RunOutcome};

enum EngineCommand {
    RunAll,
    Cancel,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    Progress(ProgressUpdate),
    RunFinished(RunOutcome),
    /// The run task ended without an outcome, e.g. because the transform panicked.
    RunAborted,
}

/// Runs a [`BatchScheduler`] on a background thread with its own tokio runtime.
///
/// Commands go in over a channel; progress and run results come back as
/// [`EngineEvent`]s.
pub struct EngineHandle {
    scheduler: Arc<BatchScheduler>,
    cmd_tx: mpsc::Sender<EngineCommand>,
    event_rx: mpsc::Receiver<EngineEvent>,
    auto_run: AtomicBool,
}

impl EngineHandle {
    pub fn new(scheduler: Arc<BatchScheduler>) -> std::io::Result<Self> {
        let (cmd_tx, cmd_rx) = mpsc::channel();
        let (event_tx, event_rx) = mpsc::channel();
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()?;

        let worker = scheduler.clone();
        thread::Builder::new()
            .name("cutout-engine".to_string())
            .spawn(move || {
                runtime.spawn(relay_progress(worker.clone(), event_tx.clone()));
                while let Ok(command) = cmd_rx.recv() {
                    match command {
                        EngineCommand::RunAll => {
                            let scheduler = worker.clone();
                            let event_tx = event_tx.clone();
                            runtime.spawn(async move {
                                let report = RunReport {
                                    event_tx,
                                    sent: false,
                                };
                                let outcome = scheduler.run_all().await;
                                report.finish(outcome);
                            });
                        }
                        EngineCommand::Cancel => worker.cancel(),
                    }
                }
                cutout_info!("engine command channel closed; shutting down");
                runtime.shutdown_timeout(Duration::from_secs(5));
            })?;

        Ok(Self {
            scheduler,
            cmd_tx,
            event_rx,
            auto_run: AtomicBool::new(false),
        })
    }

    pub fn scheduler(&self) -> &Arc<BatchScheduler> {
        &self.scheduler
    }

    /// Explicit trigger: items are never processed just because they were added.
    pub fn run_all(&self) {
        if self.cmd_tx.send(EngineCommand::RunAll).is_err() {
            cutout_error!("engine thread is gone; run request dropped");
        }
    }

    /// Opt in to starting a run whenever [`EngineHandle::add_sources`] adds items.
    pub fn set_auto_run(&self, enabled: bool) {
        self.auto_run.store(enabled, Ordering::SeqCst);
    }

    pub fn add_sources<I>(&self, files: I) -> AddReport
    where
        I: IntoIterator<Item = SourceFile>,
    {
        let report = self.scheduler.lock().add_sources(files);
        if !report.added.is_empty() && self.auto_run.load(Ordering::SeqCst) {
            cutout_debug!("auto-run after adding {} item(s)", report.added.len());
            self.run_all();
        }
        report
    }

    pub fn cancel(&self) {
        let _ = self.cmd_tx.send(EngineCommand::Cancel);
    }

    pub fn try_recv(&self) -> Option<EngineEvent> {
        self.event_rx.try_recv().ok()
    }

    /// Fails with `Disconnected` once the engine thread is gone.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<EngineEvent, RecvTimeoutError> {
        self.event_rx.recv_timeout(timeout)
    }
}

/// Reports the end of one run task; sends `RunAborted` if dropped unfinished.
struct RunReport {
    event_tx: mpsc::Sender<EngineEvent>,
    sent: bool,
}

impl RunReport {
    fn finish(mut self, outcome: RunOutcome) {
        self.sent = true;
        let _ = self.event_tx.send(EngineEvent::RunFinished(outcome));
    }
}

impl Drop for RunReport {
    fn drop(&mut self) {
        if !self.sent {
            cutout_error!("run task ended without an outcome");
            let _ = self.event_tx.send(EngineEvent::RunAborted);
        }
    }
}

async fn relay_progress(scheduler: Arc<BatchScheduler>, event_tx: mpsc::Sender<EngineEvent>) {
    let mut rx = scheduler.subscribe();
    while rx.changed().await.is_ok() {
        let latest = *rx.borrow_and_update();
        if let Some(update) = latest {
            if event_tx.send(EngineEvent::Progress(update)).is_err() {
                break;
            }
        }
    }
}

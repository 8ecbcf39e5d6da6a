//src/remote.rs
use serde::{Deserialize, Serialize};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use strum_macros::{Display, EnumString};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::model::{DurationUnit, ExerciseLog, TrackingMode};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("No remote account is connected")]
    NotConnected,
    #[error("Remote ledger unavailable: {0}")]
    RemoteUnavailable(String),
    #[error("Remote authorization expired")]
    AuthExpired,
    #[error("Remote ledger returned malformed data: {0}")]
    Malformed(String),
}

/// One performed set as mirrored to the remote ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetRow {
    /// `YYYY-MM-DD`
    pub date: String,
    pub workout_id: String,
    pub exercise_name: String,
    pub mode: TrackingMode,
    /// Unit of `quantity` for duration rows.
    #[serde(default)]
    pub unit: DurationUnit,
    pub set_number: u32,
    pub quantity: f64,
    pub weight: f64,
    pub rest_secs: u32,
}

/// Pre-aggregated per-session record kept by the remote ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryRecord {
    pub date: String,
    pub workout_id: String,
    pub workout_name: String,
    pub total_volume: f64,
    pub duration_secs: u64,
    pub exercise_count: usize,
}

/// The exercises logged in the latest remote session of a workout.
#[derive(Debug, Clone, PartialEq)]
pub struct PreviousSession {
    pub date: String,
    pub exercises: Vec<ExerciseLog>,
}

/// Optional spreadsheet-like history store. All calls may fail; an expired
/// authorization that cannot be refreshed leaves the ledger disconnected.
pub trait RemoteLedger: Send + Sync {
    fn is_connected(&self) -> bool;
    fn append_set_record(&self, row: &SetRow) -> Result<(), RemoteError>;
    fn append_session_summary(&self, summary: &SummaryRecord) -> Result<(), RemoteError>;
    fn read_previous_session(
        &self,
        workout_id: &str,
    ) -> Result<Option<PreviousSession>, RemoteError>;
    fn read_all_summaries(&self) -> Result<Vec<SummaryRecord>, RemoteError>;

    /// Date of the newest logged entry; a bulk sync pushes what is newer.
    fn last_logged_date(&self) -> Result<Option<String>, RemoteError> {
        Ok(self.read_all_summaries()?.into_iter().map(|s| s.date).max())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum SyncStatus {
    #[default]
    Offline,
    Syncing,
    Synced,
    Failed,
}

enum SyncJob {
    Set(SetRow),
    Summary(SummaryRecord),
    Flush(Sender<()>),
}

/// Fire-and-forget outbox in front of a `RemoteLedger`. Appends are handed to
/// a background worker; failures only move the status indicator.
pub struct RemoteSync {
    ledger: Option<Arc<dyn RemoteLedger>>,
    status: Arc<Mutex<SyncStatus>>,
    sender: Option<Sender<SyncJob>>,
    worker: Option<JoinHandle<()>>,
}

impl RemoteSync {
    pub fn new(ledger: Option<Arc<dyn RemoteLedger>>) -> Self {
        let status = Arc::new(Mutex::new(SyncStatus::Offline));
        let Some(ledger_ref) = ledger.clone() else {
            return Self {
                ledger,
                status,
                sender: None,
                worker: None,
            };
        };

        let (sender, receiver) = mpsc::channel();
        let worker_status = Arc::clone(&status);
        let worker = std::thread::Builder::new()
            .name("remote-sync".to_string())
            .spawn(move || run_worker(ledger_ref.as_ref(), &worker_status, &receiver));
        match worker {
            Ok(handle) => Self {
                ledger,
                status,
                sender: Some(sender),
                worker: Some(handle),
            },
            Err(e) => {
                warn!("Could not start remote sync worker, staying offline: {e}");
                Self {
                    ledger: None,
                    status,
                    sender: None,
                    worker: None,
                }
            }
        }
    }

    pub fn disabled() -> Self {
        Self::new(None)
    }

    pub fn ledger(&self) -> Option<&Arc<dyn RemoteLedger>> {
        self.ledger.as_ref()
    }

    pub fn is_connected(&self) -> bool {
        self.ledger.as_ref().is_some_and(|l| l.is_connected())
    }

    pub fn status(&self) -> SyncStatus {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn submit_set(&self, row: SetRow) {
        self.submit(SyncJob::Set(row));
    }

    pub fn submit_summary(&self, summary: SummaryRecord) {
        self.submit(SyncJob::Summary(summary));
    }

    fn submit(&self, job: SyncJob) {
        if !self.is_connected() {
            debug!("Remote not connected, skipping mirror");
            return;
        }
        if let Some(sender) = &self.sender {
            if sender.send(job).is_err() {
                warn!("Remote sync worker has stopped; mirror dropped");
            }
        }
    }

    /// Blocks until every job submitted so far has been attempted.
    pub fn flush(&self) {
        let Some(sender) = &self.sender else {
            return;
        };
        let (done_tx, done_rx) = mpsc::channel();
        if sender.send(SyncJob::Flush(done_tx)).is_ok() {
            let _ = done_rx.recv();
        }
    }
}

impl Drop for RemoteSync {
    fn drop(&mut self) {
        // Closing the channel ends the worker loop once the queue is drained.
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("Remote sync worker panicked");
            }
        }
    }
}

fn run_worker(
    ledger: &dyn RemoteLedger,
    status: &Mutex<SyncStatus>,
    receiver: &Receiver<SyncJob>,
) {
    let set_status = |s: SyncStatus| {
        *status.lock().unwrap_or_else(PoisonError::into_inner) = s;
    };

    for job in receiver {
        let (what, result) = match job {
            SyncJob::Flush(done) => {
                let _ = done.send(());
                continue;
            }
            SyncJob::Set(row) => {
                if !ledger.is_connected() {
                    set_status(SyncStatus::Offline);
                    continue;
                }
                set_status(SyncStatus::Syncing);
                let what = format!("set {} of {}", row.set_number, row.exercise_name);
                (what, ledger.append_set_record(&row))
            }
            SyncJob::Summary(summary) => {
                if !ledger.is_connected() {
                    set_status(SyncStatus::Offline);
                    continue;
                }
                set_status(SyncStatus::Syncing);
                let what = format!("summary for {}", summary.workout_id);
                (what, ledger.append_session_summary(&summary))
            }
        };

        match result {
            Ok(()) => {
                debug!("Mirrored {what}");
                set_status(SyncStatus::Synced);
            }
            Err(RemoteError::AuthExpired | RemoteError::NotConnected) => {
                info!("Remote disconnected while mirroring {what}");
                set_status(SyncStatus::Offline);
            }
            Err(e) => {
                warn!("Failed to mirror {what}: {e}");
                set_status(SyncStatus::Failed);
            }
        }
    }
}

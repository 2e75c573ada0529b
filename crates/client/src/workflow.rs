//! Sequential upload-and-poll pipeline over a caller-owned queue.
//!
//! For each pending record: validate, upload with progress, trigger the
//! analysis exactly once, poll until terminal, then record the outcome.
//! Files are processed one after another; a failure is confined to its
//! own record and never stops the rest of the batch. Nothing is retried.

use std::sync::Arc;
use std::time::Duration;

use deepcheck_core::error::CoreError;
use deepcheck_core::job::AnalysisJob;
use deepcheck_core::record::{ClientFileRecord, FileStatus};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::aggregator::ResultSet;
use crate::api::{ApiError, DetectorApi};
use crate::config::ClientConfig;
use crate::events::WorkflowEvent;
use crate::poller::{PollError, StatusPoller};
use crate::upload::{ProgressFn, UploadSource, UploadTicket};

/// Broadcast channel capacity for workflow events.
const EVENT_CHANNEL_CAPACITY: usize = 256;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Outcome of a single file's pipeline when it does not complete.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    /// The file failed local validation; nothing was sent.
    #[error("{0}")]
    Validation(CoreError),

    /// Network failure or non-success response from the backend.
    #[error("{0}")]
    Transport(ApiError),

    /// The backend reported the job as failed.
    #[error("{message}")]
    JobFailed {
        message: String,
        /// Last snapshot of the failed job, when one was received.
        job: Option<Box<AnalysisJob>>,
    },

    #[error("Job did not finish within {0:?}")]
    Timeout(Duration),

    #[error("Cancelled")]
    Cancelled,

    /// Reading the local file failed.
    #[error("I/O error: {0}")]
    Io(std::io::Error),

    /// The record was not in a state the pipeline can start from.
    #[error("{0}")]
    Conflict(CoreError),
}

impl From<ApiError> for WorkflowError {
    fn from(e: ApiError) -> Self {
        match e {
            ApiError::Validation(core) => Self::Validation(core),
            ApiError::Io(io) => Self::Io(io),
            ApiError::Cancelled => Self::Cancelled,
            other => Self::Transport(other),
        }
    }
}

impl From<PollError> for WorkflowError {
    fn from(e: PollError) -> Self {
        match e {
            PollError::Api(api) => api.into(),
            PollError::JobFailed(message) => Self::JobFailed { message, job: None },
            PollError::Timeout(d) => Self::Timeout(d),
            PollError::Cancelled => Self::Cancelled,
        }
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Queue of selected files plus collected results, owned by the caller.
#[derive(Debug, Default)]
pub struct WorkflowState {
    records: Vec<ClientFileRecord>,
    results: ResultSet,
}

impl WorkflowState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a file. Returns the new record's local ID.
    pub fn enqueue(&mut self, source: UploadSource) -> Uuid {
        let record = source.into_record();
        let id = record.id();
        self.records.push(record);
        id
    }

    pub fn records(&self) -> &[ClientFileRecord] {
        &self.records
    }

    pub fn record(&self, id: Uuid) -> Option<&ClientFileRecord> {
        self.records.iter().find(|r| r.id() == id)
    }

    pub fn results(&self) -> &ResultSet {
        &self.results
    }

    pub fn pending_count(&self) -> usize {
        self.records
            .iter()
            .filter(|r| r.status() == FileStatus::Pending)
            .count()
    }

    /// Drop every queued record and every collected result.
    pub fn clear(&mut self) {
        self.records.clear();
        self.results.clear();
    }
}

/// Counts from one [`Workflow::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub completed: usize,
    pub failed: usize,
    /// Whether the batch stopped early because of cancellation.
    pub cancelled: bool,
}

// ---------------------------------------------------------------------------
// Workflow
// ---------------------------------------------------------------------------

/// Drives records through upload, analysis and polling.
pub struct Workflow {
    api: DetectorApi,
    poller: StatusPoller,
    event_tx: broadcast::Sender<WorkflowEvent>,
}

impl Workflow {
    pub fn new(api: DetectorApi, poller: StatusPoller) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            api,
            poller,
            event_tx,
        }
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self, ApiError> {
        let api = DetectorApi::from_config(config)?;
        let poller = StatusPoller::from_config(api.clone(), config);
        Ok(Self::new(api, poller))
    }

    pub fn api(&self) -> &DetectorApi {
        &self.api
    }

    /// Subscribe to workflow events. Drop the receiver to unsubscribe.
    pub fn subscribe(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.event_tx.subscribe()
    }

    /// Process every pending record in queue order, one at a time.
    ///
    /// Completed jobs, and failed jobs the backend reported, are added to
    /// the state's results. Stops early only on cancellation.
    pub async fn run(&self, state: &mut WorkflowState, cancel: &CancellationToken) -> BatchSummary {
        let mut summary = BatchSummary::default();
        tracing::info!(pending = state.pending_count(), "Starting batch");

        for idx in 0..state.records.len() {
            if state.records[idx].status() != FileStatus::Pending {
                continue;
            }
            if cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }

            match self.process(&mut state.records[idx], cancel).await {
                Ok(job) => {
                    summary.completed += 1;
                    state.results.record(job);
                }
                Err(WorkflowError::Cancelled) => {
                    summary.failed += 1;
                    summary.cancelled = true;
                    break;
                }
                Err(WorkflowError::JobFailed { job, .. }) => {
                    summary.failed += 1;
                    if let Some(job) = job {
                        state.results.record(*job);
                    }
                }
                Err(_) => summary.failed += 1,
            }
        }

        tracing::info!(
            completed = summary.completed,
            failed = summary.failed,
            cancelled = summary.cancelled,
            "Batch finished",
        );
        self.emit(WorkflowEvent::BatchFinished {
            completed: summary.completed,
            failed: summary.failed,
        });
        summary
    }

    /// Run one record through the full pipeline.
    ///
    /// The record must be pending. On error the record is moved to
    /// `error` with the error's message, and a `FileFailed` event is sent.
    pub async fn process(
        &self,
        record: &mut ClientFileRecord,
        cancel: &CancellationToken,
    ) -> Result<AnalysisJob, WorkflowError> {
        if record.status() != FileStatus::Pending {
            return Err(WorkflowError::Conflict(CoreError::Conflict(format!(
                "Record {} is already {}",
                record.id(),
                record.status()
            ))));
        }

        self.emit(WorkflowEvent::FileStarted {
            record_id: record.id(),
            filename: record.filename().to_string(),
        });

        match self.drive(record, cancel).await {
            Ok(job) => {
                tracing::info!(
                    filename = %record.filename(),
                    job_id = %job.id,
                    "Analysis completed",
                );
                self.emit(WorkflowEvent::FileCompleted {
                    record_id: record.id(),
                    job: Box::new(job.clone()),
                });
                Ok(job)
            }
            Err(e) => {
                let message = e.to_string();
                tracing::error!(filename = %record.filename(), error = %message, "Analysis failed");
                if let Err(conflict) = record.fail(message.clone()) {
                    tracing::warn!(error = %conflict, "Could not mark record failed");
                }
                self.emit(WorkflowEvent::FileFailed {
                    record_id: record.id(),
                    error: message,
                });
                Err(e)
            }
        }
    }

    // ---- private helpers ----

    async fn drive(
        &self,
        record: &mut ClientFileRecord,
        cancel: &CancellationToken,
    ) -> Result<AnalysisJob, WorkflowError> {
        let source = UploadSource::from_record(record);
        source.validate().map_err(WorkflowError::Validation)?;

        record
            .advance(FileStatus::Uploading)
            .map_err(WorkflowError::Conflict)?;
        let ticket = self.upload_with_progress(record, &source, cancel).await?;
        let job_id = ticket.job_id;

        record
            .assign_job(job_id.clone())
            .map_err(WorkflowError::Conflict)?;
        self.emit(WorkflowEvent::Uploaded {
            record_id: record.id(),
            job_id: job_id.clone(),
        });

        record
            .advance(FileStatus::Processing)
            .map_err(WorkflowError::Conflict)?;
        if cancel.is_cancelled() {
            return Err(WorkflowError::Cancelled);
        }
        self.api.start_analysis(&job_id).await?;

        let record_id = record.id();
        let mut last_seen: Option<AnalysisJob> = None;
        let polled = self
            .poller
            .wait_for_terminal(&job_id, cancel, |job| {
                self.emit(WorkflowEvent::StatusChanged {
                    record_id,
                    job_id: job.id.clone(),
                    status: job.status(),
                });
                last_seen = Some(job.clone());
            })
            .await;

        let job = match polled {
            Ok(job) => job,
            Err(PollError::JobFailed(message)) => {
                return Err(WorkflowError::JobFailed {
                    message,
                    job: last_seen.map(Box::new),
                });
            }
            Err(e) => return Err(e.into()),
        };

        match job.result() {
            Some(result) => record
                .complete(result.clone())
                .map_err(WorkflowError::Conflict)?,
            None => {
                return Err(WorkflowError::Conflict(CoreError::InvalidPayload(format!(
                    "Completed job {} has no result",
                    job.id
                ))))
            }
        }
        Ok(job)
    }

    /// Upload while folding progress updates into `record` on the same task.
    async fn upload_with_progress(
        &self,
        record: &mut ClientFileRecord,
        source: &UploadSource,
        cancel: &CancellationToken,
    ) -> Result<UploadTicket, ApiError> {
        let (tx, mut rx) = mpsc::unbounded_channel::<u8>();
        let on_progress: ProgressFn = Arc::new(move |pct| {
            let _ = tx.send(pct);
        });

        let upload = self.api.upload(source, on_progress, cancel);
        tokio::pin!(upload);

        let result = loop {
            tokio::select! {
                biased;
                Some(pct) = rx.recv() => self.apply_progress(record, pct),
                result = &mut upload => break result,
            }
        };
        while let Ok(pct) = rx.try_recv() {
            self.apply_progress(record, pct);
        }
        result
    }

    fn apply_progress(&self, record: &mut ClientFileRecord, pct: u8) {
        record.set_progress(pct);
        tracing::debug!(filename = %record.filename(), percent = pct, "Upload progress");
        self.emit(WorkflowEvent::UploadProgress {
            record_id: record.id(),
            percent: pct,
        });
    }

    fn emit(&self, event: WorkflowEvent) {
        // Ignore the SendError; it only means there are no subscribers.
        let _ = self.event_tx.send(event);
    }
}

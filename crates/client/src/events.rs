//! Events emitted while a batch is processed.
//!
//! Published on a [`tokio::sync::broadcast`] channel owned by the
//! [`Workflow`](crate::workflow::Workflow). Subscribers receive every
//! event sent after they subscribed; dropping the receiver unsubscribes.

use deepcheck_core::job::{AnalysisJob, StatusKind};
use deepcheck_core::types::JobId;
use serde::Serialize;
use uuid::Uuid;

/// A workflow-level event, keyed by the local record ID.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowEvent {
    /// A queued file entered the pipeline.
    FileStarted { record_id: Uuid, filename: String },

    /// Upload progress for a file (0-100, strictly increasing).
    UploadProgress { record_id: Uuid, percent: u8 },

    /// The upload finished and the backend assigned a job.
    Uploaded { record_id: Uuid, job_id: JobId },

    /// The poller observed a job status.
    StatusChanged {
        record_id: Uuid,
        job_id: JobId,
        status: StatusKind,
    },

    /// The file's job completed; carries the final snapshot.
    FileCompleted { record_id: Uuid, job: Box<AnalysisJob> },

    /// The file's pipeline ended in an error.
    FileFailed { record_id: Uuid, error: String },

    /// Every pending record has been processed.
    BatchFinished { completed: usize, failed: usize },
}

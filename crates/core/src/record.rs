//! Local bookkeeping for a file the user queued for analysis.
//!
//! A [`ClientFileRecord`] only moves forward along
//! `pending -> uploading -> processing -> {completed | error}`; the
//! mutators return [`CoreError::Conflict`] for any other transition. A
//! result is only ever attached together with the `completed` status.

use std::path::{Path, PathBuf};

use serde::Serialize;
use uuid::Uuid;

use crate::error::CoreError;
use crate::result::AnalysisResult;
use crate::types::JobId;

/// Display status of a queued file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Pending,
    Uploading,
    Processing,
    Completed,
    Error,
}

impl FileStatus {
    fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Uploading => 1,
            Self::Processing => 2,
            Self::Completed | Self::Error => 3,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Uploading => "uploading",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for FileStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal payload of a record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordOutcome {
    Result(AnalysisResult),
    Error(String),
}

/// A file selected for analysis and its local progress.
#[derive(Debug, Clone, Serialize)]
pub struct ClientFileRecord {
    id: Uuid,
    path: PathBuf,
    filename: String,
    size: u64,
    mime: String,
    progress: u8,
    status: FileStatus,
    job_id: Option<JobId>,
    outcome: Option<RecordOutcome>,
}

impl ClientFileRecord {
    pub fn new(
        path: impl Into<PathBuf>,
        filename: impl Into<String>,
        size: u64,
        mime: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            path: path.into(),
            filename: filename.into(),
            size,
            mime: mime.into(),
            progress: 0,
            status: FileStatus::Pending,
            job_id: None,
            outcome: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn mime(&self) -> &str {
        &self.mime
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    pub fn status(&self) -> FileStatus {
        self.status
    }

    pub fn job_id(&self) -> Option<&JobId> {
        self.job_id.as_ref()
    }

    pub fn result(&self) -> Option<&AnalysisResult> {
        match &self.outcome {
            Some(RecordOutcome::Result(result)) => Some(result),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            Some(RecordOutcome::Error(msg)) => Some(msg),
            _ => None,
        }
    }

    /// Move to a non-terminal status. Re-entering the current status is a no-op.
    ///
    /// Use [`complete`](Self::complete) or [`fail`](Self::fail) for the
    /// terminal states.
    pub fn advance(&mut self, to: FileStatus) -> Result<(), CoreError> {
        if to.is_terminal() {
            return Err(CoreError::Conflict(format!(
                "Terminal status '{to}' must be set via complete() or fail()"
            )));
        }
        self.check_transition(to)?;
        self.status = to;
        Ok(())
    }

    /// Record the server-assigned job ID once the upload succeeded.
    pub fn assign_job(&mut self, job_id: JobId) -> Result<(), CoreError> {
        if let Some(existing) = &self.job_id {
            return Err(CoreError::Conflict(format!(
                "Record {} already bound to job {existing}",
                self.id
            )));
        }
        self.job_id = Some(job_id);
        Ok(())
    }

    /// Update upload progress. Values are clamped to 100 and never decrease.
    pub fn set_progress(&mut self, pct: u8) {
        self.progress = self.progress.max(pct.min(100));
    }

    /// Attach the analysis result and mark the record completed.
    pub fn complete(&mut self, result: AnalysisResult) -> Result<(), CoreError> {
        if self.status != FileStatus::Processing {
            return Err(CoreError::Conflict(format!(
                "Cannot complete record {} from status '{}'",
                self.id, self.status
            )));
        }
        self.status = FileStatus::Completed;
        self.progress = 100;
        self.outcome = Some(RecordOutcome::Result(result));
        Ok(())
    }

    /// Mark the record failed with a human-readable message.
    pub fn fail(&mut self, message: impl Into<String>) -> Result<(), CoreError> {
        self.check_transition(FileStatus::Error)?;
        self.status = FileStatus::Error;
        self.outcome = Some(RecordOutcome::Error(message.into()));
        Ok(())
    }

    fn check_transition(&self, to: FileStatus) -> Result<(), CoreError> {
        let allowed = if self.status.is_terminal() {
            false
        } else {
            to.rank() >= self.status.rank()
        };
        if !allowed {
            return Err(CoreError::Conflict(format!(
                "Record {} cannot move from '{}' to '{to}'",
                self.id, self.status
            )));
        }
        Ok(())
    }
}

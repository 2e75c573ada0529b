//! Server-tracked analysis jobs.
//!
//! The backend reports a job as a flat JSON object with a `status`
//! string and optional `result` / `error` fields. [`AnalysisJob`]
//! replaces that with a closed [`JobState`] union in which each variant
//! carries only the fields valid for its status.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::media::MediaKind;
use crate::result::AnalysisResult;
use crate::types::{parse_timestamp, JobId, Timestamp};

/// Error message used when the backend marks a job failed without one.
pub const DEFAULT_FAILURE_MESSAGE: &str = "Analysis failed";

// ---------------------------------------------------------------------------
// Status kind
// ---------------------------------------------------------------------------

/// Status of a job without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusKind {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl StatusKind {
    /// Position in the lifecycle. Both terminal states share the top rank.
    pub fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Processing => 1,
            Self::Completed | Self::Failed => 2,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether observing `self` after `prev` respects the lifecycle order.
    ///
    /// Repeating a status is allowed; moving backwards or between the two
    /// terminal states is not.
    pub fn can_follow(self, prev: StatusKind) -> bool {
        if prev.is_terminal() {
            return self == prev;
        }
        self.rank() >= prev.rank()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for StatusKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Job state
// ---------------------------------------------------------------------------

/// Lifecycle state of a job together with the data valid in that state.
#[derive(Debug, Clone, PartialEq)]
pub enum JobState {
    Pending,
    Processing {
        started_at: Option<Timestamp>,
        /// Backend-reported progress (0-100), when it provides one.
        progress: Option<u8>,
    },
    Completed {
        started_at: Option<Timestamp>,
        completed_at: Option<Timestamp>,
        result: AnalysisResult,
    },
    Failed {
        started_at: Option<Timestamp>,
        completed_at: Option<Timestamp>,
        error: String,
    },
}

impl JobState {
    pub fn kind(&self) -> StatusKind {
        match self {
            Self::Pending => StatusKind::Pending,
            Self::Processing { .. } => StatusKind::Processing,
            Self::Completed { .. } => StatusKind::Completed,
            Self::Failed { .. } => StatusKind::Failed,
        }
    }
}

// ---------------------------------------------------------------------------
// AnalysisJob
// ---------------------------------------------------------------------------

/// Snapshot of a server-side job as returned by `GET /api/jobs/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WireJob", into = "WireJob")]
pub struct AnalysisJob {
    pub id: JobId,
    pub filename: String,
    pub file_type: MediaKind,
    pub file_size: u64,
    pub created_at: Timestamp,
    pub state: JobState,
}

impl AnalysisJob {
    pub fn status(&self) -> StatusKind {
        self.state.kind()
    }

    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }

    pub fn result(&self) -> Option<&AnalysisResult> {
        match &self.state {
            JobState::Completed { result, .. } => Some(result),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.state {
            JobState::Failed { error, .. } => Some(error),
            _ => None,
        }
    }
}

/// Response body of `GET /api/jobs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobList {
    #[serde(default)]
    pub jobs: Vec<AnalysisJob>,
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub limit: Option<u64>,
    #[serde(default)]
    pub offset: Option<u64>,
}

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

/// Flat job shape used by the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireJob {
    #[serde(alias = "job_id")]
    id: JobId,
    filename: String,
    file_type: MediaKind,
    #[serde(default)]
    file_size: u64,
    status: StatusKind,
    created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    started_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    completed_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    result: Option<AnalysisResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    progress: Option<f64>,
}

fn parse_optional(raw: Option<String>) -> Result<Option<Timestamp>, CoreError> {
    raw.as_deref().map(parse_timestamp).transpose()
}

impl TryFrom<WireJob> for AnalysisJob {
    type Error = CoreError;

    fn try_from(wire: WireJob) -> Result<Self, Self::Error> {
        let created_at = parse_timestamp(&wire.created_at)?;
        let started_at = parse_optional(wire.started_at)?;
        let completed_at = parse_optional(wire.completed_at)?;

        let state = match wire.status {
            StatusKind::Pending => JobState::Pending,
            StatusKind::Processing => JobState::Processing {
                started_at,
                progress: wire.progress.map(|p| p.clamp(0.0, 100.0).round() as u8),
            },
            StatusKind::Completed => {
                let result = wire.result.ok_or_else(|| {
                    CoreError::InvalidPayload(format!(
                        "Job {} is completed but carries no result",
                        wire.id
                    ))
                })?;
                JobState::Completed {
                    started_at,
                    completed_at,
                    result,
                }
            }
            StatusKind::Failed => JobState::Failed {
                started_at,
                completed_at,
                error: wire
                    .error
                    .filter(|e| !e.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_FAILURE_MESSAGE.to_string()),
            },
        };

        Ok(Self {
            id: wire.id,
            filename: wire.filename,
            file_type: wire.file_type,
            file_size: wire.file_size,
            created_at,
            state,
        })
    }
}

impl From<AnalysisJob> for WireJob {
    fn from(job: AnalysisJob) -> Self {
        let status = job.status();
        let (started_at, completed_at, result, error, progress) = match job.state {
            JobState::Pending => (None, None, None, None, None),
            JobState::Processing {
                started_at,
                progress,
            } => (started_at, None, None, None, progress.map(f64::from)),
            JobState::Completed {
                started_at,
                completed_at,
                result,
            } => (started_at, completed_at, Some(result), None, None),
            JobState::Failed {
                started_at,
                completed_at,
                error,
            } => (started_at, completed_at, None, Some(error), None),
        };

        Self {
            id: job.id,
            filename: job.filename,
            file_type: job.file_type,
            file_size: job.file_size,
            status,
            created_at: job.created_at.to_rfc3339(),
            started_at: started_at.map(|t| t.to_rfc3339()),
            completed_at: completed_at.map(|t| t.to_rfc3339()),
            result,
            error,
            progress,
        }
    }
}

//! REST API client for the detection backend.
//!
//! Wraps the backend HTTP endpoints (single and bulk upload, analysis
//! trigger, job status, listing, statistics, export, health) using
//! [`reqwest`].

use std::sync::{Arc, Mutex};
use std::time::Duration;

use deepcheck_core::error::CoreError;
use deepcheck_core::job::{AnalysisJob, JobList, StatusKind};
use deepcheck_core::progress::ProgressTracker;
use deepcheck_core::types::JobId;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::config::ClientConfig;
use crate::upload::{progress_body, ProgressFn, UploadSource, UploadTicket};

/// HTTP client for a single backend instance.
#[derive(Clone)]
pub struct DetectorApi {
    client: reqwest::Client,
    api_url: String,
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

/// Response of `POST /api/upload`.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadResponse {
    #[serde(default = "default_true")]
    pub success: bool,
    pub job_id: JobId,
    pub filename: String,
    #[serde(default)]
    pub file_size: u64,
    #[serde(default)]
    pub file_type: String,
    #[serde(default)]
    pub message: Option<String>,
}

/// Response of `POST /api/analyze/bulk`. Files the backend refused are
/// skipped, so `job_ids` may be shorter than the upload.
#[derive(Debug, Clone, Deserialize)]
pub struct BulkUploadResponse {
    #[serde(default)]
    pub job_ids: Vec<JobId>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Response of `POST /api/analyze`.
#[derive(Debug, Clone, Deserialize)]
pub struct AnalyzeResponse {
    #[serde(default = "default_true")]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

/// Export formats offered by `GET /api/export/{format}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Json,
}

impl ExportFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
        }
    }
}

/// Largest page the backend serves from `GET /api/jobs`.
pub const MAX_JOB_PAGE_SIZE: u32 = 100;

/// Paging and status filter for `GET /api/jobs`. Unset fields are left
/// to the backend defaults (50 jobs from offset 0, any status).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct JobQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    offset: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<StatusKind>,
}

impl JobQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Page size, clamped to `1..=MAX_JOB_PAGE_SIZE`.
    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit.clamp(1, MAX_JOB_PAGE_SIZE));
        self
    }

    pub fn with_offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Only list jobs in this status.
    pub fn with_status(mut self, status: StatusKind) -> Self {
        self.status = Some(status);
        self
    }

    pub fn limit(&self) -> Option<u32> {
        self.limit
    }

    pub fn offset(&self) -> Option<u32> {
        self.offset
    }

    pub fn status(&self) -> Option<StatusKind> {
        self.status
    }
}

/// Memory figures reported by the health endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryUsage {
    pub used: u64,
    pub total: u64,
    pub percentage: f64,
}

/// Response of `GET /api/health`. Only used for a connectivity indicator,
/// so every field tolerates being absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SystemHealth {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub model_status: Option<String>,
    #[serde(default, alias = "version")]
    pub api_version: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub uptime: Option<f64>,
    #[serde(default)]
    pub memory_usage: Option<MemoryUsage>,
}

impl SystemHealth {
    pub fn is_healthy(&self) -> bool {
        self.status.eq_ignore_ascii_case("healthy")
    }
}

/// Response of `GET /api/statistics`. Display-only aggregate counters;
/// anything the backend adds beyond the known fields lands in `extra`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Statistics {
    #[serde(default, alias = "total_files")]
    pub total_jobs: Option<u64>,
    #[serde(default)]
    pub completed_jobs: Option<u64>,
    #[serde(default)]
    pub pending_jobs: Option<u64>,
    #[serde(default)]
    pub failed_jobs: Option<u64>,
    #[serde(default)]
    pub success_rate: Option<f64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Error body shape used by the backend (`{"error": ..., "details": ...}`).
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    details: Option<serde_json::Value>,
}

fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from the backend API layer.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The file violates a local constraint; nothing was sent.
    #[error("{0}")]
    Validation(#[from] CoreError),

    /// The HTTP request itself failed (network, DNS, TLS, body decode, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The backend returned a non-2xx status code.
    #[error("Backend error ({status}): {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Backend-provided error text, or the raw body.
        message: String,
    },

    /// The backend answered 2xx but reported `success: false`.
    #[error("Backend rejected request: {0}")]
    Rejected(String),

    /// Reading the local file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The operation was cancelled by the caller.
    #[error("Operation cancelled")]
    Cancelled,
}

impl ApiError {
    /// Whether this is a network or server-side failure (as opposed to a
    /// local validation, I/O or cancellation outcome).
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Request(_) | Self::Status { .. } | Self::Rejected(_)
        )
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

impl DetectorApi {
    /// Create a client for a backend with the default 30-second timeout.
    ///
    /// * `api_url` - Base HTTP URL, e.g. `http://host:5000`.
    pub fn new(api_url: impl Into<String>) -> Result<Self, ApiError> {
        Self::with_timeout(api_url, Duration::from_secs(30))
    }

    pub fn with_timeout(api_url: impl Into<String>, timeout: Duration) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, api_url))
    }

    /// Create a client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, api_url: impl Into<String>) -> Self {
        let api_url = api_url.into().trim_end_matches('/').to_string();
        Self { client, api_url }
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self, ApiError> {
        Self::with_timeout(config.api_url.clone(), config.request_timeout())
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// `GET /api/health`.
    pub async fn health(&self) -> Result<SystemHealth, ApiError> {
        let response = self.client.get(self.url("/api/health")).send().await?;
        Self::parse_response(response).await
    }

    /// `GET /api/models/status`. The payload shape varies between backend
    /// modes and is returned as raw JSON.
    pub async fn model_status(&self) -> Result<serde_json::Value, ApiError> {
        let response = self
            .client
            .get(self.url("/api/models/status"))
            .send()
            .await?;
        Self::parse_response(response).await
    }

    /// Upload a file as multipart field `file`.
    ///
    /// The source is validated before the file is opened; an invalid
    /// source returns [`ApiError::Validation`] without any network call.
    /// `on_progress` receives strictly increasing percentages up to 100.
    pub async fn upload(
        &self,
        source: &UploadSource,
        on_progress: ProgressFn,
        cancel: &CancellationToken,
    ) -> Result<UploadTicket, ApiError> {
        source.validate()?;
        if cancel.is_cancelled() {
            return Err(ApiError::Cancelled);
        }

        let file = tokio::fs::File::open(source.path()).await?;
        let tracker = Arc::new(Mutex::new(ProgressTracker::new(source.size())));
        let body = progress_body(
            file,
            source.size(),
            Arc::clone(&tracker),
            Arc::clone(&on_progress),
            cancel.clone(),
        );

        let part = reqwest::multipart::Part::stream_with_length(body, source.size())
            .file_name(source.filename().to_string())
            .mime_str(source.mime())?;
        let form = reqwest::multipart::Form::new().part("file", part);

        tracing::debug!(
            filename = %source.filename(),
            size = source.size(),
            mime = %source.mime(),
            "Uploading file",
        );

        let request = self.client.post(self.url("/api/upload")).multipart(form);
        let response = Self::send_cancellable(request, cancel).await?;

        let upload: UploadResponse = Self::parse_response(response).await?;
        if !upload.success {
            return Err(ApiError::Rejected(
                upload.message.unwrap_or_else(|| "Upload rejected".to_string()),
            ));
        }

        let finished = tracker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .finish();
        if let Some(pct) = finished {
            on_progress(pct);
        }

        tracing::info!(
            job_id = %upload.job_id,
            filename = %upload.filename,
            "File uploaded",
        );

        Ok(UploadTicket {
            job_id: upload.job_id,
            filename: upload.filename,
            file_size: upload.file_size,
            file_type: upload.file_type,
        })
    }

    /// Upload several files in one request as repeated multipart field
    /// `files`. The backend creates a pending job per accepted file and
    /// does not start analysis.
    ///
    /// Every source is validated before anything is opened; one invalid
    /// source fails the whole call with [`ApiError::Validation`].
    /// `on_progress` tracks the combined size of all files.
    pub async fn bulk_upload(
        &self,
        sources: &[UploadSource],
        on_progress: ProgressFn,
        cancel: &CancellationToken,
    ) -> Result<BulkUploadResponse, ApiError> {
        if sources.is_empty() {
            return Err(CoreError::Validation("No files provided".to_string()).into());
        }
        for source in sources {
            source.validate()?;
        }
        if cancel.is_cancelled() {
            return Err(ApiError::Cancelled);
        }

        let total: u64 = sources.iter().map(UploadSource::size).sum();
        let tracker = Arc::new(Mutex::new(ProgressTracker::new(total)));
        let mut form = reqwest::multipart::Form::new();
        for source in sources {
            let file = tokio::fs::File::open(source.path()).await?;
            let body = progress_body(
                file,
                source.size(),
                Arc::clone(&tracker),
                Arc::clone(&on_progress),
                cancel.clone(),
            );
            let part = reqwest::multipart::Part::stream_with_length(body, source.size())
                .file_name(source.filename().to_string())
                .mime_str(source.mime())?;
            form = form.part("files", part);
        }

        tracing::debug!(files = sources.len(), size = total, "Uploading files in bulk");

        let request = self
            .client
            .post(self.url("/api/analyze/bulk"))
            .multipart(form);
        let response = Self::send_cancellable(request, cancel).await?;
        let bulk: BulkUploadResponse = Self::parse_response(response).await?;

        let finished = tracker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .finish();
        if let Some(pct) = finished {
            on_progress(pct);
        }

        if bulk.job_ids.len() < sources.len() {
            tracing::warn!(
                sent = sources.len(),
                accepted = bulk.job_ids.len(),
                "Backend skipped some files",
            );
        }
        tracing::info!(jobs = bulk.job_ids.len(), "Bulk upload finished");
        Ok(bulk)
    }

    /// `POST /api/analyze` for a previously uploaded job.
    ///
    /// A backend rejection (unknown job, job already processing) is
    /// returned as an error; this method never retries.
    pub async fn start_analysis(&self, job_id: &JobId) -> Result<AnalyzeResponse, ApiError> {
        let body = serde_json::json!({ "job_id": job_id });

        let response = self
            .client
            .post(self.url("/api/analyze"))
            .json(&body)
            .send()
            .await?;

        let analyze: AnalyzeResponse = Self::parse_response(response).await?;
        if !analyze.success {
            return Err(ApiError::Rejected(
                analyze
                    .message
                    .unwrap_or_else(|| "Analysis request rejected".to_string()),
            ));
        }

        tracing::info!(job_id = %job_id, "Analysis started");
        Ok(analyze)
    }

    /// `GET /api/jobs/{id}`.
    pub async fn get_job(&self, job_id: &JobId) -> Result<AnalysisJob, ApiError> {
        let response = self
            .client
            .get(self.url(&format!("/api/jobs/{job_id}")))
            .send()
            .await?;
        Self::parse_response(response).await
    }

    /// `GET /api/jobs` with the backend's default paging.
    pub async fn list_jobs(&self) -> Result<JobList, ApiError> {
        self.list_jobs_with(&JobQuery::default()).await
    }

    /// `GET /api/jobs`, newest first, paged and filtered by `query`.
    pub async fn list_jobs_with(&self, query: &JobQuery) -> Result<JobList, ApiError> {
        let response = self
            .client
            .get(self.url("/api/jobs"))
            .query(query)
            .send()
            .await?;
        Self::parse_response(response).await
    }

    /// `GET /api/statistics`.
    pub async fn statistics(&self) -> Result<Statistics, ApiError> {
        let response = self.client.get(self.url("/api/statistics")).send().await?;
        Self::parse_response(response).await
    }

    /// `GET /api/export/{format}`. Returns the raw document bytes.
    pub async fn export(&self, format: ExportFormat) -> Result<Vec<u8>, ApiError> {
        let response = self
            .client
            .get(self.url(&format!("/api/export/{}", format.as_str())))
            .send()
            .await?;
        let response = Self::ensure_success(response).await?;
        Ok(response.bytes().await?.to_vec())
    }

    // ---- private helpers ----

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_url, path)
    }

    /// Send `request`, resolving to [`ApiError::Cancelled`] if `cancel`
    /// fires first or the body stream aborted because of it.
    async fn send_cancellable(
        request: reqwest::RequestBuilder,
        cancel: &CancellationToken,
    ) -> Result<reqwest::Response, ApiError> {
        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(ApiError::Cancelled),
            response = request.send() => response,
        };
        match response {
            Ok(response) => Ok(response),
            Err(_) if cancel.is_cancelled() => Err(ApiError::Cancelled),
            Err(e) => Err(e.into()),
        }
    }

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or an [`ApiError::Status`] carrying
    /// the backend's `error` text (or the raw body) on failure.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        let message = match serde_json::from_str::<ErrorBody>(&body) {
            Ok(parsed) => {
                let detail = parsed
                    .message
                    .or_else(|| parsed.details.map(|d| match d {
                        serde_json::Value::String(s) => s,
                        other => other.to_string(),
                    }));
                match detail {
                    Some(detail) => format!("{}: {detail}", parsed.error),
                    None => parsed.error,
                }
            }
            Err(_) => body,
        };

        tracing::warn!(status = status.as_u16(), message = %message, "Backend returned an error");
        Err(ApiError::Status {
            status: status.as_u16(),
            message,
        })
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }
}

//! Scripted in-process backend for integration tests.
//!
//! Each upload creates a job whose poll responses follow a script of
//! [`Step`]s. Before `/api/analyze` is called the job reports `pending`;
//! afterwards every poll returns the next step, repeating the last one
//! once the script is exhausted.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{DefaultBodyLimit, Multipart, Path as UrlPath, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use deepcheck_client::api::DetectorApi;
use deepcheck_client::poller::StatusPoller;
use deepcheck_client::upload::UploadSource;
use deepcheck_client::workflow::Workflow;

const CREATED_AT: &str = "2024-05-01T10:00:00.123456";
const STARTED_AT: &str = "2024-05-01T10:00:01.000000";
const COMPLETED_AT: &str = "2024-05-01T10:00:03.500000";
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// One scripted poll response.
#[derive(Debug, Clone)]
pub enum Step {
    Pending,
    Processing,
    Completed(Value),
    /// Failed job; `None` omits the `error` field.
    Failed(Option<String>),
    /// Non-2xx response with a backend error body.
    Error(u16),
}

impl Step {
    fn status(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed(_) => "completed",
            Self::Failed(_) | Self::Error(_) => "failed",
        }
    }
}

/// Request counters observed by the fake backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counters {
    pub uploads: usize,
    pub bulk_uploads: usize,
    pub analyze: usize,
    pub polls: usize,
}

struct FakeJob {
    filename: String,
    file_type: String,
    file_size: usize,
    steps: Vec<Step>,
    cursor: usize,
    analyze_calls: usize,
}

impl FakeJob {
    /// Step for the next poll; advances the cursor once analysis started.
    fn next_step(&mut self) -> Step {
        if self.analyze_calls == 0 {
            return Step::Pending;
        }
        let idx = self.cursor.min(self.steps.len().saturating_sub(1));
        self.cursor += 1;
        self.steps.get(idx).cloned().unwrap_or(Step::Pending)
    }

    fn current_step(&self) -> Step {
        if self.analyze_calls == 0 || self.cursor == 0 {
            return Step::Pending;
        }
        let idx = (self.cursor - 1).min(self.steps.len().saturating_sub(1));
        self.steps.get(idx).cloned().unwrap_or(Step::Pending)
    }

    fn to_json(&self, id: &str, step: &Step) -> Value {
        let mut value = json!({
            "job_id": id,
            "filename": self.filename,
            "file_type": self.file_type,
            "file_size": self.file_size,
            "status": step.status(),
            "created_at": CREATED_AT,
        });
        match step {
            Step::Pending | Step::Error(_) => {}
            Step::Processing => {
                value["started_at"] = json!(STARTED_AT);
                value["progress"] = json!(50.0);
            }
            Step::Completed(result) => {
                value["started_at"] = json!(STARTED_AT);
                value["completed_at"] = json!(COMPLETED_AT);
                value["result"] = result.clone();
            }
            Step::Failed(error) => {
                value["started_at"] = json!(STARTED_AT);
                value["completed_at"] = json!(COMPLETED_AT);
                if let Some(error) = error {
                    value["error"] = json!(error);
                }
            }
        }
        value
    }
}

#[derive(Default)]
struct Inner {
    scripts: VecDeque<Vec<Step>>,
    jobs: HashMap<String, FakeJob>,
    order: Vec<String>,
    counters: Counters,
    upload_status: Option<u16>,
}

impl Inner {
    /// Register an uploaded file as a pending job and return its ID.
    fn create_job(&mut self, filename: String, mime: &str, file_size: usize) -> String {
        let job_id = uuid::Uuid::new_v4().to_string();
        let file_type = mime.split('/').next().unwrap_or("image").to_string();
        let steps = self.scripts.pop_front().unwrap_or_else(default_script);
        self.jobs.insert(
            job_id.clone(),
            FakeJob {
                filename,
                file_type,
                file_size,
                steps,
                cursor: 0,
                analyze_calls: 0,
            },
        );
        self.order.push(job_id.clone());
        job_id
    }
}

/// Shared handle to the fake backend's state.
#[derive(Clone, Default)]
pub struct FakeBackend {
    inner: Arc<Mutex<Inner>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the poll script for the next upload. Uploads without a
    /// queued script get [`default_script`].
    pub fn script(self, steps: Vec<Step>) -> Self {
        self.inner.lock().unwrap().scripts.push_back(steps);
        self
    }

    /// Make every upload answer with the given status code.
    pub fn fail_uploads(self, status: u16) -> Self {
        self.inner.lock().unwrap().upload_status = Some(status);
        self
    }

    pub fn counters(&self) -> Counters {
        self.inner.lock().unwrap().counters
    }

    /// Job IDs in upload order.
    pub fn job_ids(&self) -> Vec<String> {
        self.inner.lock().unwrap().order.clone()
    }

    pub fn analyze_calls(&self, job_id: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .jobs
            .get(job_id)
            .map(|j| j.analyze_calls)
            .unwrap_or(0)
    }

    pub fn filename(&self, job_id: &str) -> Option<String> {
        self.inner
            .lock()
            .unwrap()
            .jobs
            .get(job_id)
            .map(|j| j.filename.clone())
    }

    pub fn bytes_received(&self, job_id: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .jobs
            .get(job_id)
            .map(|j| j.file_size)
            .unwrap_or(0)
    }

    fn router(self) -> Router {
        Router::new()
            .route("/api/health", get(health))
            .route("/api/models/status", get(model_status))
            .route("/api/upload", post(upload))
            .route("/api/analyze", post(analyze))
            .route("/api/analyze/bulk", post(bulk_upload))
            .route("/api/jobs", get(list_jobs))
            .route("/api/jobs/{id}", get(get_job))
            .route("/api/statistics", get(statistics))
            .route("/api/export/{format}", get(export))
            .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
            .with_state(self)
    }
}

/// Running fake backend bound to an ephemeral local port.
pub struct TestServer {
    pub url: String,
    pub backend: FakeBackend,
}

impl TestServer {
    pub fn api(&self) -> DetectorApi {
        DetectorApi::with_timeout(self.url.clone(), Duration::from_secs(5)).unwrap()
    }

    /// Poller with a short interval so tests finish quickly.
    pub fn poller(&self) -> StatusPoller {
        StatusPoller::new(self.api()).with_interval(Duration::from_millis(10))
    }

    pub fn workflow(&self) -> Workflow {
        Workflow::new(self.api(), self.poller())
    }
}

pub async fn spawn(backend: FakeBackend) -> TestServer {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = backend.clone().router();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    TestServer {
        url: format!("http://{addr}"),
        backend,
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub fn result_json(prediction: &str, confidence: f64) -> Value {
    json!({
        "prediction": prediction,
        "confidence": confidence,
        "is_authentic": prediction == "authentic",
        "models_used": ["efficientnet-b4", "xception"],
        "processing_time": 2.5,
        "evidence": {
            "facial_inconsistencies": 0.5,
            "temporal_artifacts": 0.123,
            "compression_anomalies": 0.0
        }
    })
}

pub fn default_script() -> Vec<Step> {
    vec![Step::Processing, Step::Completed(result_json("authentic", 0.82))]
}

/// Write `len` bytes to `dir/name` and describe it as an upload source.
pub async fn write_file(dir: &Path, name: &str, len: usize) -> UploadSource {
    let path = dir.join(name);
    tokio::fs::write(&path, vec![7u8; len]).await.unwrap();
    UploadSource::from_path(&path).await.unwrap()
}

fn error_response(status: StatusCode, error: &str) -> Response {
    (status, Json(json!({ "error": error }))).into_response()
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "model_status": "mock mode",
        "version": "2.0.0",
        "timestamp": CREATED_AT,
    }))
}

async fn model_status() -> Json<Value> {
    Json(json!({ "mode": "mock", "models": { "efficientnet-b4": "loaded" } }))
}

/// Read every multipart field named `name` as `(filename, mime, len)`.
/// `None` if the client aborted the body.
async fn read_files(multipart: &mut Multipart, name: &str) -> Option<Vec<(String, String, usize)>> {
    let mut files = Vec::new();
    while let Some(field) = multipart.next_field().await.ok()? {
        if field.name() != Some(name) {
            continue;
        }
        let filename = field.file_name().unwrap_or("upload").to_string();
        let mime = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = field.bytes().await.ok()?;
        files.push((filename, mime, bytes.len()));
    }
    Some(files)
}

async fn upload(State(backend): State<FakeBackend>, mut multipart: Multipart) -> Response {
    let Some(mut files) = read_files(&mut multipart, "file").await else {
        return error_response(StatusCode::BAD_REQUEST, "Upload interrupted");
    };

    let mut inner = backend.inner.lock().unwrap();
    inner.counters.uploads += 1;
    if let Some(code) = inner.upload_status {
        let status = StatusCode::from_u16(code).unwrap();
        return (status, Json(json!({ "error": "Upload failed", "details": "disk full" })))
            .into_response();
    }
    let Some((filename, mime, file_size)) = files.pop() else {
        return error_response(StatusCode::BAD_REQUEST, "No file provided");
    };

    let job_id = inner.create_job(filename.clone(), &mime, file_size);
    let file_type = inner.jobs[&job_id].file_type.clone();

    (
        StatusCode::CREATED,
        Json(json!({
            "job_id": job_id,
            "filename": filename,
            "file_type": file_type,
            "file_size": file_size,
            "status": "uploaded",
            "message": "File uploaded successfully",
        })),
    )
        .into_response()
}

/// Accepts the `files` fields; anything that is not image, video or
/// audio is skipped.
async fn bulk_upload(State(backend): State<FakeBackend>, mut multipart: Multipart) -> Response {
    let Some(files) = read_files(&mut multipart, "files").await else {
        return error_response(StatusCode::BAD_REQUEST, "Upload interrupted");
    };
    if files.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "No files provided");
    }

    let mut inner = backend.inner.lock().unwrap();
    inner.counters.bulk_uploads += 1;
    let mut job_ids = Vec::new();
    for (filename, mime, file_size) in files {
        let accepted = ["image/", "video/", "audio/"]
            .iter()
            .any(|prefix| mime.starts_with(prefix));
        if accepted {
            job_ids.push(inner.create_job(filename, &mime, file_size));
        }
    }

    (
        StatusCode::CREATED,
        Json(json!({
            "message": format!("{} files uploaded for analysis", job_ids.len()),
            "job_ids": job_ids,
        })),
    )
        .into_response()
}

async fn analyze(State(backend): State<FakeBackend>, Json(body): Json<Value>) -> Response {
    let mut inner = backend.inner.lock().unwrap();
    inner.counters.analyze += 1;
    let Some(job_id) = body["job_id"].as_str() else {
        return error_response(StatusCode::BAD_REQUEST, "job_id is required");
    };
    let Some(job) = inner.jobs.get_mut(job_id) else {
        return error_response(StatusCode::NOT_FOUND, "Job not found");
    };
    job.analyze_calls += 1;
    if job.analyze_calls > 1 {
        return error_response(StatusCode::BAD_REQUEST, "Job is already being processed");
    }
    Json(json!({ "success": true, "message": "Analysis started", "job_id": job_id }))
        .into_response()
}

async fn get_job(State(backend): State<FakeBackend>, UrlPath(id): UrlPath<String>) -> Response {
    let mut inner = backend.inner.lock().unwrap();
    inner.counters.polls += 1;
    let Some(job) = inner.jobs.get_mut(&id) else {
        return error_response(StatusCode::NOT_FOUND, "Job not found");
    };
    match job.next_step() {
        Step::Error(code) => {
            error_response(StatusCode::from_u16(code).unwrap(), "Internal server error")
        }
        step => Json(job.to_json(&id, &step)).into_response(),
    }
}

/// Newest first, with `limit` (default 50, at most 100), `offset` and
/// `status` query parameters.
async fn list_jobs(
    State(backend): State<FakeBackend>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<Value> {
    let limit = params
        .get("limit")
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(50)
        .min(100);
    let offset = params
        .get("offset")
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(0);
    let status = params.get("status");

    let inner = backend.inner.lock().unwrap();
    let matching: Vec<Value> = inner
        .order
        .iter()
        .rev()
        .filter_map(|id| inner.jobs.get(id).map(|job| job.to_json(id, &job.current_step())))
        .filter(|job| status.map_or(true, |s| job["status"].as_str() == Some(s.as_str())))
        .collect();
    let total = matching.len();
    let jobs: Vec<Value> = matching.into_iter().skip(offset).take(limit).collect();
    Json(json!({ "jobs": jobs, "total": total, "limit": limit, "offset": offset }))
}

async fn statistics(State(backend): State<FakeBackend>) -> Json<Value> {
    let inner = backend.inner.lock().unwrap();
    Json(json!({
        "total_jobs": inner.jobs.len(),
        "completed_jobs": 0,
        "model_mode": "mock",
    }))
}

async fn export(UrlPath(format): UrlPath<String>) -> Response {
    match format.as_str() {
        "csv" => "filename,prediction\nclip.mp4,deepfake\n".into_response(),
        "json" => Json(json!([{ "filename": "clip.mp4", "prediction": "deepfake" }])).into_response(),
        _ => error_response(StatusCode::BAD_REQUEST, "Unsupported export format"),
    }
}

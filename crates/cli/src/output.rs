//! Plain-text rendering of backend data and workflow events.

use std::collections::HashMap;

use deepcheck_client::aggregator::ResultSummary;
use deepcheck_client::api::{Statistics, SystemHealth};
use deepcheck_client::events::WorkflowEvent;
use deepcheck_client::workflow::BatchSummary;
use deepcheck_core::export::share_text;
use deepcheck_core::format::{format_duration, format_file_size, format_percentage};
use deepcheck_core::job::{AnalysisJob, JobList, StatusKind};
use uuid::Uuid;

pub fn health(health: &SystemHealth) -> String {
    let mut lines = vec![format!(
        "Backend: {}",
        if health.status.is_empty() { "unknown" } else { health.status.as_str() }
    )];
    if let Some(version) = &health.api_version {
        lines.push(format!("Version: {version}"));
    }
    if let Some(models) = &health.model_status {
        lines.push(format!("Models: {models}"));
    }
    if let Some(uptime) = health.uptime {
        lines.push(format!("Uptime: {}", format_duration(uptime)));
    }
    if let Some(memory) = &health.memory_usage {
        lines.push(format!(
            "Memory: {} / {} ({:.1}%)",
            format_file_size(memory.used),
            format_file_size(memory.total),
            memory.percentage,
        ));
    }
    lines.join("\n")
}

/// The verdict column: prediction with confidence, the failure message,
/// or a dash while the job is still running.
fn verdict(job: &AnalysisJob) -> String {
    match (job.result(), job.error()) {
        (Some(result), _) => format!(
            "{} {} ({})",
            result.prediction,
            format_percentage(result.confidence.value(), 1),
            result.confidence_band(),
        ),
        (None, Some(error)) => format!("error: {error}"),
        (None, None) => "-".to_string(),
    }
}

pub fn job_line(job: &AnalysisJob) -> String {
    format!(
        "{}  {}  {}  {}  {}  {}",
        job.id,
        job.filename,
        job.file_type,
        format_file_size(job.file_size),
        job.status(),
        verdict(job),
    )
}

pub fn job_table(jobs: &[AnalysisJob]) -> String {
    if jobs.is_empty() {
        return "No jobs".to_string();
    }
    jobs.iter().map(job_line).collect::<Vec<_>>().join("\n")
}

/// Position of a listed page within the backend's total, e.g.
/// `"Jobs 11-20 of 42"`.
pub fn page_footer(list: &JobList) -> String {
    let shown = list.jobs.len() as u64;
    let offset = list.offset.unwrap_or(0);
    let total = list.total.unwrap_or(offset + shown);
    if shown == 0 {
        return format!("No jobs at offset {offset} of {total}");
    }
    format!("Jobs {}-{} of {total}", offset + 1, offset + shown)
}

/// `"frame_consistency"` -> `"Frame consistency"`.
fn signal_label(key: &str) -> String {
    let spaced = key.replace('_', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => spaced,
    }
}

pub fn job_detail(job: &AnalysisJob) -> String {
    let mut lines = vec![
        format!("Job: {}", job.id),
        format!("Status: {}", job.status()),
    ];
    match job.status() {
        StatusKind::Completed => {
            lines.push(String::new());
            lines.push(share_text(job));
            if let Some(result) = job.result() {
                let evidence = &result.evidence;
                lines.push(String::new());
                let named = [
                    ("Facial inconsistencies", evidence.facial_inconsistencies),
                    ("Temporal artifacts", evidence.temporal_artifacts),
                    ("Compression anomalies", evidence.compression_anomalies),
                ];
                for (label, score) in named {
                    if let Some(score) = score {
                        lines.push(format!("{label}: {}", format_percentage(score.value(), 1)));
                    }
                }
                for (key, score) in &evidence.other {
                    lines.push(format!(
                        "{}: {}",
                        signal_label(key),
                        format_percentage(score.value(), 1)
                    ));
                }
                if !result.models_used.is_empty() {
                    lines.push(format!("Models: {}", result.models_used.join(", ")));
                }
                lines.push(format!(
                    "Processing time: {}",
                    format_duration(result.processing_time)
                ));
            }
        }
        StatusKind::Failed => {
            lines.push(format!("File: {}", job.filename));
            lines.push(format!("Error: {}", job.error().unwrap_or_default()));
        }
        StatusKind::Pending | StatusKind::Processing => {
            lines.push(format!("File: {}", job.filename));
        }
    }
    lines.join("\n")
}

pub fn statistics(stats: &Statistics) -> String {
    let counter = |v: Option<u64>| v.map_or_else(|| "-".to_string(), |n| n.to_string());
    let mut lines = vec![
        format!("Total jobs: {}", counter(stats.total_jobs)),
        format!("Completed: {}", counter(stats.completed_jobs)),
        format!("Pending: {}", counter(stats.pending_jobs)),
        format!("Failed: {}", counter(stats.failed_jobs)),
    ];
    if let Some(rate) = stats.success_rate {
        lines.push(format!("Success rate: {rate:.1}%"));
    }
    let mut extra: Vec<_> = stats.extra.iter().collect();
    extra.sort_by(|a, b| a.0.cmp(b.0));
    for (key, value) in extra {
        let value = match value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        lines.push(format!("{key}: {value}"));
    }
    lines.join("\n")
}

pub fn batch_summary(batch: &BatchSummary, results: &ResultSummary) -> String {
    let mut line = format!(
        "Processed {} file(s): {} completed, {} failed ({} authentic, {} deepfake)",
        batch.completed + batch.failed,
        batch.completed,
        batch.failed,
        results.authentic,
        results.deepfake,
    );
    if batch.cancelled {
        line.push_str("; cancelled");
    }
    line
}

/// Turns workflow events into progress lines, remembering file names by
/// record ID.
#[derive(Debug, Default)]
pub struct EventPrinter {
    names: HashMap<Uuid, String>,
}

impl EventPrinter {
    pub fn new() -> Self {
        Self::default()
    }

    fn name(&self, record_id: &Uuid) -> &str {
        self.names
            .get(record_id)
            .map(String::as_str)
            .unwrap_or("<unknown>")
    }

    /// Line to print for `event`, if any.
    pub fn line(&mut self, event: &WorkflowEvent) -> Option<String> {
        match event {
            WorkflowEvent::FileStarted { record_id, filename } => {
                self.names.insert(*record_id, filename.clone());
                Some(format!("{filename}: starting"))
            }
            WorkflowEvent::UploadProgress { record_id, percent } => {
                Some(format!("{}: uploading {percent}%", self.name(record_id)))
            }
            WorkflowEvent::Uploaded { record_id, job_id } => {
                Some(format!("{}: uploaded as job {job_id}", self.name(record_id)))
            }
            WorkflowEvent::StatusChanged {
                record_id, status, ..
            } => match status {
                StatusKind::Pending | StatusKind::Processing => {
                    Some(format!("{}: {status}", self.name(record_id)))
                }
                // Terminal statuses are reported by FileCompleted/FileFailed.
                StatusKind::Completed | StatusKind::Failed => None,
            },
            WorkflowEvent::FileCompleted { record_id, job } => Some(format!(
                "{}: {}",
                self.name(record_id),
                verdict(job)
            )),
            WorkflowEvent::FileFailed { record_id, error } => {
                Some(format!("{}: failed: {error}", self.name(record_id)))
            }
            WorkflowEvent::BatchFinished { .. } => None,
        }
    }
}

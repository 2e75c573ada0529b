//! Collected outcomes of finished jobs, most recent first.

use std::collections::VecDeque;

use deepcheck_core::export::build_csv;
use deepcheck_core::job::{AnalysisJob, StatusKind};
use deepcheck_core::result::Prediction;
use serde::Serialize;

/// Ordered list of terminal jobs; the newest is at the front.
#[derive(Debug, Clone, Default)]
pub struct ResultSet {
    jobs: VecDeque<AnalysisJob>,
}

/// Counts over a [`ResultSet`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResultSummary {
    pub authentic: usize,
    pub deepfake: usize,
    pub failed: usize,
}

impl ResultSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a terminal job at the head of the list. Non-terminal snapshots
    /// are ignored and `false` is returned.
    pub fn record(&mut self, job: AnalysisJob) -> bool {
        if !job.is_terminal() {
            tracing::debug!(job_id = %job.id, status = %job.status(), "Skipping non-terminal job");
            return false;
        }
        self.jobs.push_front(job);
        true
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Jobs, newest first.
    pub fn iter(&self) -> impl Iterator<Item = &AnalysisJob> {
        self.jobs.iter()
    }

    pub fn latest(&self) -> Option<&AnalysisJob> {
        self.jobs.front()
    }

    pub fn clear(&mut self) {
        self.jobs.clear();
    }

    /// CSV document of the completed jobs, newest first.
    pub fn to_csv(&self) -> String {
        build_csv(self.jobs.iter())
    }

    pub fn summary(&self) -> ResultSummary {
        self.jobs
            .iter()
            .fold(ResultSummary::default(), |mut acc, job| {
                match (job.status(), job.result().map(|r| r.prediction)) {
                    (StatusKind::Completed, Some(Prediction::Authentic)) => acc.authentic += 1,
                    (StatusKind::Completed, Some(Prediction::Deepfake)) => acc.deepfake += 1,
                    _ => acc.failed += 1,
                }
                acc
            })
    }
}

//! Job status polling.
//!
//! [`StatusPoller::watch`] turns repeated `GET /api/jobs/{id}` calls into
//! a lazy, finite stream of snapshots. The next request is scheduled only
//! after the previous response arrived, so a slow backend delays the
//! following poll by the same amount; requests never overlap.

use std::time::Duration;

use deepcheck_core::job::{AnalysisJob, StatusKind, DEFAULT_FAILURE_MESSAGE};
use deepcheck_core::types::JobId;
use futures::{Stream, StreamExt};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::api::{ApiError, DetectorApi};
use crate::config::ClientConfig;

/// Default delay between two status requests.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// Errors that end a polling session.
#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error(transparent)]
    Api(#[from] ApiError),

    /// The backend reported the job as failed.
    #[error("{0}")]
    JobFailed(String),

    /// `max_wait` elapsed before the job reached a terminal state.
    #[error("Job did not finish within {0:?}")]
    Timeout(Duration),

    #[error("Polling cancelled")]
    Cancelled,
}

/// Polls one job at a time until it reaches a terminal state.
#[derive(Clone)]
pub struct StatusPoller {
    api: DetectorApi,
    interval: Duration,
    max_wait: Option<Duration>,
}

impl StatusPoller {
    /// Create a poller with the default 1-second interval and no timeout.
    pub fn new(api: DetectorApi) -> Self {
        Self {
            api,
            interval: DEFAULT_POLL_INTERVAL,
            max_wait: None,
        }
    }

    pub fn from_config(api: DetectorApi, config: &ClientConfig) -> Self {
        Self::new(api)
            .with_interval(config.poll_interval())
            .with_max_wait(config.poll_timeout())
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Bound the total time spent waiting on one job. `None` (the
    /// default) waits indefinitely.
    pub fn with_max_wait(mut self, max_wait: Option<Duration>) -> Self {
        self.max_wait = max_wait;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Stream status snapshots for `job_id`.
    ///
    /// The first request is sent when the stream is first polled. The
    /// stream ends right after yielding a terminal snapshot or an error.
    /// Snapshots whose status would move backwards relative to the last
    /// yielded one are dropped, so the yielded statuses never regress.
    /// Cancellation is checked before every request and during the wait
    /// between requests.
    pub fn watch(
        &self,
        job_id: JobId,
        cancel: CancellationToken,
    ) -> impl Stream<Item = Result<AnalysisJob, PollError>> + Send + 'static {
        let state = WatchState {
            api: self.api.clone(),
            job_id,
            cancel,
            interval: self.interval,
            max_wait: self.max_wait,
            deadline: self.max_wait.map(|d| Instant::now() + d),
            last: None,
            polled: false,
            done: false,
        };

        futures::stream::unfold(state, |mut state| async move {
            let item = state.next_item().await?;
            Some((item, state))
        })
    }

    /// Poll until the job completes, reporting every yielded snapshot to
    /// `on_status`.
    ///
    /// Resolves with the completed job, or [`PollError::JobFailed`]
    /// carrying the backend's error message.
    pub async fn wait_for_terminal(
        &self,
        job_id: &JobId,
        cancel: &CancellationToken,
        mut on_status: impl FnMut(&AnalysisJob),
    ) -> Result<AnalysisJob, PollError> {
        let stream = self.watch(job_id.clone(), cancel.clone());
        futures::pin_mut!(stream);

        while let Some(item) = stream.next().await {
            let job = item?;
            on_status(&job);
            match job.status() {
                StatusKind::Completed => return Ok(job),
                StatusKind::Failed => {
                    let message = job.error().unwrap_or(DEFAULT_FAILURE_MESSAGE).to_string();
                    return Err(PollError::JobFailed(message));
                }
                StatusKind::Pending | StatusKind::Processing => {}
            }
        }

        // The stream only ends after a terminal snapshot or an error,
        // both handled above.
        Err(PollError::Cancelled)
    }
}

struct WatchState {
    api: DetectorApi,
    job_id: JobId,
    cancel: CancellationToken,
    interval: Duration,
    max_wait: Option<Duration>,
    deadline: Option<Instant>,
    last: Option<StatusKind>,
    polled: bool,
    done: bool,
}

impl WatchState {
    async fn next_item(&mut self) -> Option<Result<AnalysisJob, PollError>> {
        if self.done {
            return None;
        }

        loop {
            if self.polled {
                if let Err(e) = self.pause().await {
                    return self.finish_with(e);
                }
            }
            self.polled = true;

            if self.cancel.is_cancelled() {
                return self.finish_with(PollError::Cancelled);
            }
            if let (Some(deadline), Some(max_wait)) = (self.deadline, self.max_wait) {
                if Instant::now() >= deadline {
                    tracing::warn!(job_id = %self.job_id, "Gave up waiting for job");
                    return self.finish_with(PollError::Timeout(max_wait));
                }
            }

            let fetched = tokio::select! {
                _ = self.cancel.cancelled() => None,
                result = self.api.get_job(&self.job_id) => Some(result),
            };
            let job = match fetched {
                None => return self.finish_with(PollError::Cancelled),
                Some(Err(e)) => return self.finish_with(e.into()),
                Some(Ok(job)) => job,
            };

            let status = job.status();
            if let Some(last) = self.last {
                if !status.can_follow(last) {
                    tracing::warn!(
                        job_id = %self.job_id,
                        last = %last,
                        reported = %status,
                        "Ignoring out-of-order job status",
                    );
                    continue;
                }
            }

            tracing::debug!(job_id = %self.job_id, status = %status, "Job status");
            self.last = Some(status);
            self.done = status.is_terminal();
            return Some(Ok(job));
        }
    }

    /// Sleep for one interval (shortened to the deadline), waking early on
    /// cancellation.
    async fn pause(&self) -> Result<(), PollError> {
        let mut wait = self.interval;
        if let Some(deadline) = self.deadline {
            wait = wait.min(deadline.saturating_duration_since(Instant::now()));
        }
        tokio::select! {
            _ = self.cancel.cancelled() => Err(PollError::Cancelled),
            _ = tokio::time::sleep(wait) => Ok(()),
        }
    }

    fn finish_with(&mut self, error: PollError) -> Option<Result<AnalysisJob, PollError>> {
        self.done = true;
        Some(Err(error))
    }
}

//! Fixed-interval polling fallback for job progress.
//!
//! When streaming is not used, [`JobPoller`] asks the status endpoint
//! for the job once per second, up to a step-specific attempt ceiling.
//! Results are dispatched as the same [`JobEvent`]s the streaming
//! channel produces, so consumers never care which feed is active.

use std::future::Future;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use adstudio_core::job::JobStatus;
use adstudio_core::types::JobId;
use adstudio_core::workflow::WorkflowStep;

use crate::api::{JobStatusResponse, PipelineApi};
use crate::events::JobEvent;

/// Time between status requests.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Broadcast capacity for poll events. Must comfortably exceed the
/// largest attempt ceiling so a slow consumer never loses the terminal
/// event.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Attempt ceiling for a step's poll loop.
///
/// Production-pack generation runs a much longer pipeline than the
/// other steps, so it gets twice the budget.
pub fn max_poll_attempts(step: WorkflowStep) -> u32 {
    match step {
        WorkflowStep::Production => 120,
        _ => 60,
    }
}

/// The poll loop exhausted its attempt ceiling without observing a
/// terminal job status.
///
/// Raised explicitly rather than degrading silently: a caller that only
/// saw non-terminal statuses must be able to distinguish "still
/// running somewhere" from "finished".
#[derive(Debug, thiserror::Error)]
#[error("Polling timed out after {attempts} attempts without a terminal status")]
pub struct PollTimeout {
    pub attempts: u32,
}

/// A spawned polling feed for exactly one job.
///
/// Mirrors the streaming channel's surface: [`subscribe`](Self::subscribe)
/// for events, [`close`](Self::close) for deliberate teardown.
pub struct JobPoller {
    job_id: JobId,
    event_tx: broadcast::Sender<JobEvent>,
    cancel: CancellationToken,
    task_handle: tokio::task::JoinHandle<()>,
}

impl JobPoller {
    /// Spawn the poll loop for a job.
    pub fn spawn(api: std::sync::Arc<PipelineApi>, job_id: &str, step: WorkflowStep) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();

        let tx = event_tx.clone();
        let loop_cancel = cancel.clone();
        let loop_job_id: JobId = job_id.to_string();
        let task_handle = tokio::spawn(async move {
            let fetch_job_id = loop_job_id.clone();
            let fetch = move || {
                let api = std::sync::Arc::clone(&api);
                let job_id = fetch_job_id.clone();
                async move { api.job_status(&job_id).await }
            };
            if let Err(e) = run_poll_loop(&loop_job_id, step, fetch, &tx, &loop_cancel).await {
                tracing::error!(job_id = %loop_job_id, error = %e, "Poll loop timed out");
            }
        });

        Self {
            job_id: job_id.to_string(),
            event_tx,
            cancel,
            task_handle,
        }
    }

    /// The job this poller is attached to.
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Subscribe to this job's events.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.event_tx.subscribe()
    }

    /// Stop polling without emitting a terminal event.
    pub fn close(&self) {
        self.cancel.cancel();
        self.task_handle.abort();
    }
}

/// Poll the job status once per [`POLL_INTERVAL`] until a terminal
/// status arrives, the attempt ceiling is reached, or `cancel` fires.
///
/// Transient fetch failures are logged and skipped (they still consume
/// an attempt); the loop continues on the next interval. Ceiling
/// exhaustion dispatches a terminal [`JobEvent::Failed`] to subscribers
/// and returns [`PollTimeout`].
pub async fn run_poll_loop<F, Fut, E>(
    job_id: &str,
    step: WorkflowStep,
    mut fetch: F,
    event_tx: &broadcast::Sender<JobEvent>,
    cancel: &CancellationToken,
) -> Result<(), PollTimeout>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<JobStatusResponse, E>>,
    E: std::fmt::Display,
{
    let max_attempts = max_poll_attempts(step);

    for attempt in 1..=max_attempts {
        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            _ = tokio::time::sleep(POLL_INTERVAL) => {}
        }

        let response = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            result = fetch() => match result {
                Ok(response) => response,
                Err(e) => {
                    // Transient: skip this sample, keep polling.
                    tracing::warn!(job_id, attempt, error = %e, "Status request failed");
                    continue;
                }
            },
        };

        match response.status {
            JobStatus::Completed => {
                let _ = event_tx.send(JobEvent::Completed {
                    result: response.result.unwrap_or(serde_json::Value::Null),
                });
                return Ok(());
            }
            JobStatus::Failed => {
                let _ = event_tx.send(JobEvent::Failed {
                    message: response
                        .error
                        .unwrap_or_else(|| "Generation failed".to_string()),
                });
                return Ok(());
            }
            // Pending, running, and backend-side cancelled all keep the
            // loop alive until the ceiling.
            _ => {
                let _ = event_tx.send(JobEvent::Progress {
                    percent: response.progress,
                    step: step.as_str().to_string(),
                    message: None,
                    estimated_time_remaining: None,
                    current_cost: None,
                });
            }
        }
    }

    let _ = event_tx.send(JobEvent::Failed {
        message: format!("Generation timed out after {max_attempts} status checks"),
    });
    Err(PollTimeout {
        attempts: max_attempts,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Per-session generation tracker.
//!
//! [`GenerationTracker`] is the session's single source of truth for
//! generation activity: it submits jobs, attaches exactly one progress
//! feed (streaming channel or polling fallback) at a time, applies
//! incoming [`JobEvent`]s to the [`GenerationState`], and exposes
//! best-effort cancellation. One tracker per UI session; share it via
//! `Arc`.

use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::sync::broadcast;

use adstudio_core::generation::GenerationState;
use adstudio_core::types::JobId;
use adstudio_core::workflow::WorkflowStep;

use crate::api::{PipelineApi, PipelineApiError, StepParams, SubmitResponse};
use crate::channel::ProgressChannel;
use crate::config::PipelineConfig;
use crate::events::JobEvent;
use crate::poller::JobPoller;
use crate::reconnect::ReconnectConfig;

/// Handle returned from a successful submission.
///
/// The caller uses it to attach a progress subscription and to show
/// cost/time estimates up front.
#[derive(Debug, Clone)]
pub struct JobHandle {
    pub job_id: JobId,
    /// Expected duration in seconds.
    pub estimated_time: u64,
    /// Expected cost in currency units.
    pub estimated_cost: f64,
}

/// Which progress feed to attach for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressSource {
    /// Push-based streaming channel (preferred).
    Stream,
    /// Fixed-interval polling fallback.
    Poll,
}

/// Errors surfaced by the tracker.
///
/// Submission problems are returned to the caller and never transition
/// the state; everything that happens after a job exists resolves into
/// the state's `error` field instead.
#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    /// At most one job per session; the current one must finish, fail,
    /// or be cancelled first.
    #[error("A generation job is already running for this session")]
    AlreadyGenerating,

    /// The submission request failed or was rejected. Not retried.
    #[error("Failed to submit generation job: {0}")]
    Submission(#[from] PipelineApiError),

    /// `cancel_generation` was called while nothing was cancellable.
    #[error("No cancellable generation in progress")]
    NothingToCancel,
}

/// The active progress feed, either flavor.
enum Feed {
    Stream(ProgressChannel),
    Poll(JobPoller),
}

impl Feed {
    fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        match self {
            Self::Stream(channel) => channel.subscribe(),
            Self::Poll(poller) => poller.subscribe(),
        }
    }

    fn close(&self) {
        match self {
            Self::Stream(channel) => channel.close(),
            Self::Poll(poller) => poller.close(),
        }
    }
}

/// Bookkeeping for the one active subscription.
struct ActiveFeed {
    job_id: JobId,
    feed: Feed,
    /// Task applying feed events to the state.
    consumer: tokio::task::JoinHandle<()>,
}

/// Tracks one session's generation lifecycle.
pub struct GenerationTracker {
    api: Arc<PipelineApi>,
    ws_url: String,
    auth_token: Option<String>,
    reconnect: ReconnectConfig,
    state: Mutex<GenerationState>,
    active: Mutex<Option<ActiveFeed>>,
}

impl GenerationTracker {
    /// Build a tracker from pipeline connection settings.
    pub fn new(config: PipelineConfig) -> Arc<Self> {
        let api = Arc::new(PipelineApi::new(
            config.api_url,
            config.auth_token.clone(),
        ));
        Arc::new(Self {
            api,
            ws_url: config.ws_url,
            auth_token: config.auth_token,
            reconnect: ReconnectConfig::default(),
            state: Mutex::new(GenerationState::new()),
            active: Mutex::new(None),
        })
    }

    /// Snapshot of the current generation state.
    pub fn state(&self) -> GenerationState {
        self.state.lock().expect("state lock poisoned").clone()
    }

    /// Submit a generation job for one workflow step.
    ///
    /// The step is named by the [`StepParams`] variant, so a submission
    /// can only ever target a generable step with its own inputs.
    /// Enforces the at-most-one-job invariant *before* any network
    /// call: the generation slot is reserved atomically under the state
    /// lock, so of two submissions racing into the submit request
    /// exactly one wins and the other fails with
    /// [`TrackerError::AlreadyGenerating`] instead of overwriting
    /// state. On submission failure the reservation is rolled back and
    /// the state stays idle.
    pub async fn start_generation(
        &self,
        project_id: &str,
        params: &StepParams,
    ) -> Result<JobHandle, TrackerError> {
        if !self
            .state
            .lock()
            .expect("state lock poisoned")
            .try_reserve()
        {
            return Err(TrackerError::AlreadyGenerating);
        }

        let step = params.step();
        let response = match self.api.submit_step(project_id, params).await {
            Ok(response) => response,
            Err(e) => {
                self.state.lock().expect("state lock poisoned").release();
                return Err(e.into());
            }
        };

        tracing::info!(
            project_id,
            step = %step,
            job_id = %response.job_id,
            estimated_time = response.estimated_time,
            "Generation job submitted",
        );

        Ok(self.note_submission(step, &response))
    }

    /// Attach a progress feed for a job and return a subscription to
    /// its events.
    ///
    /// Any previously attached feed is torn down first: at most one
    /// progress source is ever active per session, so stream and poll
    /// events can never interleave.
    pub fn subscribe_to_progress(
        self: &Arc<Self>,
        job_id: &str,
        source: ProgressSource,
    ) -> broadcast::Receiver<JobEvent> {
        self.detach_feed();

        let feed = match source {
            ProgressSource::Stream => Feed::Stream(ProgressChannel::open(
                &self.ws_url,
                job_id,
                self.auth_token.as_deref(),
                self.reconnect.clone(),
            )),
            ProgressSource::Poll => Feed::Poll(JobPoller::spawn(
                Arc::clone(&self.api),
                job_id,
                self.state()
                    .step
                    .unwrap_or(WorkflowStep::Concept),
            )),
        };

        let caller_rx = feed.subscribe();
        let mut consumer_rx = feed.subscribe();

        let tracker = Arc::clone(self);
        let consumer = tokio::spawn(async move {
            loop {
                match consumer_rx.recv().await {
                    Ok(event) => {
                        let terminal = event.is_terminal();
                        tracker.apply_event(event);
                        if terminal {
                            tracker.clear_active();
                            return;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Event consumer lagged; continuing");
                    }
                    Err(broadcast::error::RecvError::Closed) => return,
                }
            }
        });

        *self.active.lock().expect("active lock poisoned") = Some(ActiveFeed {
            job_id: job_id.to_string(),
            feed,
            consumer,
        });

        caller_rx
    }

    /// Cancel the active generation.
    ///
    /// Valid only while the state is cancellable; otherwise returns
    /// [`TrackerError::NothingToCancel`] with no observable effect.
    /// The backend cancel is best-effort: failure to reach the pipeline
    /// is logged but never blocks local cancellation, and the backend
    /// job is not guaranteed to actually stop.
    pub async fn cancel_generation(&self) -> Result<(), TrackerError> {
        if !self.state().can_cancel {
            return Err(TrackerError::NothingToCancel);
        }

        let job_id = self
            .active
            .lock()
            .expect("active lock poisoned")
            .as_ref()
            .map(|active| active.job_id.clone());

        if let Some(ref job_id) = job_id {
            if let Err(e) = self.api.cancel_job(job_id).await {
                tracing::warn!(job_id = %job_id, error = %e, "Backend cancel request failed");
            }
        }

        self.detach_feed();

        // A terminal event may have landed while the cancel request was
        // in flight; the finished job wins and is left untouched.
        let mut state = self.state.lock().expect("state lock poisoned");
        if state.can_cancel {
            state.mark_cancelled();
            tracing::info!(job_id = job_id.as_deref(), "Generation cancelled locally");
        } else {
            tracing::info!(
                job_id = job_id.as_deref(),
                "Job reached a terminal state during cancellation; keeping it",
            );
        }
        Ok(())
    }

    /// Tear down any feed and return the state to idle.
    pub fn reset(&self) {
        self.detach_feed();
        self.state.lock().expect("state lock poisoned").reset();
    }

    // ---- private helpers ----

    /// Record a successful submission and hand back the job handle.
    fn note_submission(&self, step: WorkflowStep, response: &SubmitResponse) -> JobHandle {
        self.state.lock().expect("state lock poisoned").begin(
            step,
            response.estimated_time,
            response.estimated_cost,
            Utc::now(),
        );
        JobHandle {
            job_id: response.job_id.clone(),
            estimated_time: response.estimated_time,
            estimated_cost: response.estimated_cost,
        }
    }

    /// Apply one feed event to the state machine.
    fn apply_event(&self, event: JobEvent) {
        let mut state = self.state.lock().expect("state lock poisoned");
        match event {
            JobEvent::Progress {
                percent,
                estimated_time_remaining,
                ..
            } => state.record_progress(percent, estimated_time_remaining),
            JobEvent::Partial { artifact } => state.record_partial(artifact),
            JobEvent::Completed { result } => state.record_completion(result),
            JobEvent::Failed { message } => state.record_failure(message),
        }
    }

    /// Close and drop the active feed, if any.
    fn detach_feed(&self) {
        if let Some(active) = self.active.lock().expect("active lock poisoned").take() {
            active.feed.close();
            active.consumer.abort();
        }
    }

    /// Drop the active feed bookkeeping without aborting the consumer.
    /// Called from the consumer itself after a terminal event.
    fn clear_active(&self) {
        if let Some(active) = self.active.lock().expect("active lock poisoned").take() {
            active.feed.close();
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use adstudio_core::artifacts::{Concept, PartialArtifact};
    use adstudio_core::generation::CANCELLED_BY_USER;
    use assert_matches::assert_matches;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    /// Minimal HTTP server answering every request with a canned
    /// submission response. Returns the base URL to point the API at.
    async fn submit_server(requests: usize) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            for _ in 0..requests {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let body = r#"{"jobId":"j1","estimatedTime":20,"estimatedCost":2.5}"#;
                let response = format!(
                    "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\n\
                     content-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = socket.write_all(response.as_bytes()).await;
            }
        });
        format!("http://{addr}")
    }

    /// Tracker wired to an address nothing listens on. Tests below only
    /// exercise paths that are rejected before any request is sent, or
    /// that tolerate an unreachable backend by design.
    fn tracker() -> Arc<GenerationTracker> {
        GenerationTracker::new(PipelineConfig {
            api_url: "http://127.0.0.1:1".into(),
            ws_url: "ws://127.0.0.1:1".into(),
            auth_token: None,
        })
    }

    fn submitted(tracker: &GenerationTracker) -> JobHandle {
        tracker.note_submission(
            WorkflowStep::Concept,
            &SubmitResponse {
                job_id: "j1".into(),
                estimated_time: 20,
                estimated_cost: 2.5,
            },
        )
    }

    #[test]
    fn submission_transitions_state_to_generating() {
        let tracker = tracker();
        let handle = submitted(&tracker);

        assert_eq!(handle.job_id, "j1");
        let state = tracker.state();
        assert!(state.is_generating);
        assert_eq!(state.progress, 0);
        assert!(state.can_cancel);
        assert_eq!(state.estimated_time_secs, Some(20));
        assert_eq!(state.estimated_cost, Some(2.5));
    }

    #[tokio::test]
    async fn second_submission_is_rejected_before_any_network_call() {
        let tracker = tracker();
        submitted(&tracker);

        // The API target is unroutable; an attempted request would fail
        // with a Submission error, so AlreadyGenerating proves the
        // guard fired first.
        let params = StepParams::Screenplays { concept_id: "c1".into() };
        let result = tracker.start_generation("p1", &params).await;
        assert_matches!(result, Err(TrackerError::AlreadyGenerating));

        // State is untouched by the rejected attempt.
        assert_eq!(tracker.state().step, Some(WorkflowStep::Concept));
    }

    #[tokio::test]
    async fn concurrent_submissions_admit_only_one_job() {
        let api_url = submit_server(2).await;
        let tracker = GenerationTracker::new(PipelineConfig {
            api_url,
            ws_url: "ws://127.0.0.1:1".into(),
            auth_token: None,
        });

        // Both submissions reach their submit await; the slot is
        // reserved before the network call, so only one may win.
        let first = StepParams::Screenplays { concept_id: "c1".into() };
        let second = StepParams::Storyboard { screenplay_id: "s1".into() };
        let (r1, r2) = tokio::join!(
            tracker.start_generation("p1", &first),
            tracker.start_generation("p1", &second),
        );

        let winners = [r1.is_ok(), r2.is_ok()].iter().filter(|ok| **ok).count();
        assert_eq!(winners, 1, "exactly one submission may win");
        assert_matches!(r2, Err(TrackerError::AlreadyGenerating));

        let state = tracker.state();
        assert!(state.is_generating);
        assert_eq!(state.step, Some(WorkflowStep::Screenplays));
    }

    #[tokio::test]
    async fn failed_submission_leaves_state_idle() {
        let tracker = tracker();
        let params = StepParams::Storyboard { screenplay_id: "s1".into() };
        let result = tracker.start_generation("p1", &params).await;
        assert_matches!(result, Err(TrackerError::Submission(_)));
        assert!(!tracker.state().is_generating);
    }

    #[test]
    fn progress_events_advance_state_monotonically() {
        let tracker = tracker();
        submitted(&tracker);

        for percent in [10u8, 60, 30] {
            tracker.apply_event(JobEvent::Progress {
                percent,
                step: "concept".into(),
                message: None,
                estimated_time_remaining: None,
                current_cost: None,
            });
        }
        assert_eq!(tracker.state().progress, 60);
    }

    #[test]
    fn partial_events_overwrite_previous_partials() {
        let tracker = tracker();
        submitted(&tracker);

        for title in ["X", "Y"] {
            tracker.apply_event(JobEvent::Partial {
                artifact: PartialArtifact::Concept(Concept {
                    id: "c1".into(),
                    title: title.into(),
                    tagline: None,
                    summary: "...".into(),
                }),
            });
        }

        match tracker.state().partial {
            Some(PartialArtifact::Concept(c)) => assert_eq!(c.title, "Y"),
            other => panic!("Expected concept partial, got {other:?}"),
        }
    }

    #[test]
    fn completion_event_finalizes_state() {
        let tracker = tracker();
        submitted(&tracker);

        tracker.apply_event(JobEvent::Completed {
            result: serde_json::json!({"id": "c1"}),
        });

        let state = tracker.state();
        assert!(!state.is_generating);
        assert_eq!(state.progress, 100);
        assert!(!state.can_cancel);
        assert!(state.result.is_some());
    }

    #[test]
    fn failure_event_sets_opaque_error() {
        let tracker = tracker();
        submitted(&tracker);

        tracker.apply_event(JobEvent::Failed {
            message: "model unavailable".into(),
        });

        let state = tracker.state();
        assert!(!state.is_generating);
        assert_eq!(state.error.as_deref(), Some("model unavailable"));
    }

    #[tokio::test]
    async fn cancel_without_cancellable_job_has_no_observable_effect() {
        let tracker = tracker();
        let before = format!("{:?}", tracker.state());

        let result = tracker.cancel_generation().await;
        assert_matches!(result, Err(TrackerError::NothingToCancel));
        assert_eq!(format!("{:?}", tracker.state()), before);
    }

    #[tokio::test]
    async fn cancel_is_terminal_locally_even_if_backend_is_unreachable() {
        let tracker = tracker();
        submitted(&tracker);

        // Backend is unroutable; the cancel request fails and is logged,
        // but local cancellation must still take effect.
        tracker.cancel_generation().await.unwrap();

        let state = tracker.state();
        assert!(!state.is_generating);
        assert!(!state.can_cancel);
        assert_eq!(state.error.as_deref(), Some(CANCELLED_BY_USER));
    }

    #[tokio::test]
    async fn cancel_keeps_a_completion_that_lands_mid_request() {
        let tracker = tracker();
        submitted(&tracker);
        // Attach a feed so the cancel path issues its backend request.
        let _rx = tracker.subscribe_to_progress("j1", ProgressSource::Stream);

        // The cancel future passes its can_cancel check, then parks on
        // the (unroutable) backend request; the completion is applied at
        // that await point, exactly the interleaving the consumer task
        // produces in production.
        let (cancel_result, _) = tokio::join!(tracker.cancel_generation(), async {
            tracker.apply_event(JobEvent::Completed {
                result: serde_json::json!({"id": "c1"}),
            });
        });

        assert!(cancel_result.is_ok());
        let state = tracker.state();
        assert!(!state.is_generating);
        assert_eq!(state.progress, 100);
        assert!(state.result.is_some());
        assert!(
            state.error.is_none(),
            "a finished job must not be stamped as cancelled"
        );
    }

    #[tokio::test]
    async fn reset_returns_to_idle() {
        let tracker = tracker();
        submitted(&tracker);
        tracker.apply_event(JobEvent::Failed { message: "x".into() });

        tracker.reset();
        let state = tracker.state();
        assert!(!state.is_generating);
        assert!(state.step.is_none());
        assert!(state.error.is_none());
    }

    #[tokio::test]
    async fn subscribing_attaches_a_feed_and_detaching_clears_it() {
        let tracker = tracker();
        submitted(&tracker);

        // Attach a streaming feed (the unroutable socket just means the
        // channel sits in its backoff loop; events flow through the
        // same broadcast path the consumer listens on).
        let _rx = tracker.subscribe_to_progress("j1", ProgressSource::Stream);
        assert!(tracker.active.lock().unwrap().is_some());

        tracker.detach_feed();
        assert!(tracker.active.lock().unwrap().is_none());
    }
}

//! Per-session generation state and its pure transitions.
//!
//! [`GenerationState`] is the single source of truth for "is something
//! generating, how far along is it, can it be cancelled, what has
//! arrived so far". It is constructed explicitly and owned by the
//! tracker in `adstudio-pipeline`; the transition methods here are pure
//! so the state machine can be tested without any network.
//!
//! Invariants:
//! - `can_cancel` is true only while `is_generating` is true.
//! - once `error` is set, `is_generating` is false.
//! - `progress` never decreases until a terminal transition.

use serde::Serialize;

use crate::artifacts::PartialArtifact;
use crate::types::Timestamp;
use crate::workflow::WorkflowStep;

/// Message stored in `error` when the user cancels locally.
pub const CANCELLED_BY_USER: &str = "Generation cancelled by user";

/// Observable state of the session's generation lifecycle.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GenerationState {
    pub is_generating: bool,
    /// The workflow step being generated, if any.
    pub step: Option<WorkflowStep>,
    /// Completion percentage, 0..=100.
    pub progress: u8,
    /// Pipeline's latest estimate of remaining time in seconds.
    pub estimated_time_secs: Option<u64>,
    /// Pipeline's cost estimate in currency units.
    pub estimated_cost: Option<f64>,
    pub started_at: Option<Timestamp>,
    pub can_cancel: bool,
    /// Opaque user-facing error string; covers job failure, transport
    /// exhaustion, polling timeout, and local cancellation alike.
    pub error: Option<String>,
    /// Most recent partial result. Later partials overwrite earlier ones.
    pub partial: Option<PartialArtifact>,
    /// Final payload delivered on completion.
    pub result: Option<serde_json::Value>,
}

impl GenerationState {
    /// Fresh idle state for a new session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve the generation slot ahead of a submission.
    ///
    /// Returns `false` when a job is already active. A reservation only
    /// flips `is_generating`, so the holder must follow up with either
    /// [`begin`](Self::begin) once the submission succeeds or
    /// [`release`](Self::release) when it fails. Taking the reservation
    /// and the check as one step lets a caller hold its lock across
    /// both, closing the gap where two submissions pass the guard.
    pub fn try_reserve(&mut self) -> bool {
        if self.is_generating {
            return false;
        }
        self.is_generating = true;
        true
    }

    /// Roll back a reservation after a failed submission.
    pub fn release(&mut self) {
        self.is_generating = false;
    }

    /// Transition into `Generating` after a successful submission.
    ///
    /// Clears any leftovers from a previous run.
    pub fn begin(
        &mut self,
        step: WorkflowStep,
        estimated_time_secs: u64,
        estimated_cost: f64,
        started_at: Timestamp,
    ) {
        self.is_generating = true;
        self.step = Some(step);
        self.progress = 0;
        self.estimated_time_secs = Some(estimated_time_secs);
        self.estimated_cost = Some(estimated_cost);
        self.started_at = Some(started_at);
        self.can_cancel = true;
        self.error = None;
        self.partial = None;
        self.result = None;
    }

    /// Apply a progress sample.
    ///
    /// Values are clamped to 0..=100 and stale (lower) samples are
    /// ignored so observed progress is monotonic. Updates the remaining
    /// time estimate when the sample carries one.
    pub fn record_progress(&mut self, percent: u8, estimated_time_secs: Option<u64>) {
        let percent = percent.min(100);
        if percent > self.progress {
            self.progress = percent;
        }
        if let Some(eta) = estimated_time_secs {
            self.estimated_time_secs = Some(eta);
        }
    }

    /// Store a partial result, replacing any previous one.
    pub fn record_partial(&mut self, artifact: PartialArtifact) {
        self.partial = Some(artifact);
    }

    /// Terminal: the job finished successfully.
    pub fn record_completion(&mut self, result: serde_json::Value) {
        self.is_generating = false;
        self.progress = 100;
        self.can_cancel = false;
        self.result = Some(result);
    }

    /// Terminal: the job failed or the progress feed gave up.
    pub fn record_failure(&mut self, message: impl Into<String>) {
        self.is_generating = false;
        self.can_cancel = false;
        self.error = Some(message.into());
    }

    /// Terminal: the user cancelled. Always takes effect locally,
    /// regardless of whether the backend acknowledged the cancel.
    pub fn mark_cancelled(&mut self) {
        self.is_generating = false;
        self.can_cancel = false;
        self.error = Some(CANCELLED_BY_USER.to_string());
    }

    /// Return to idle from any state.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

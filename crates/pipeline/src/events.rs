//! Job events delivered to subscribers.
//!
//! These are the platform-level view of a job's life, produced by the
//! progress channel or the polling fallback after interpreting raw
//! backend responses. Fan-out uses [`tokio::sync::broadcast`], so every
//! subscriber holds an independent receiver: dropping one unsubscribes
//! it, and a failing consumer cannot block delivery to the others.

use serde::Serialize;

use adstudio_core::artifacts::PartialArtifact;

/// An event observed on one job's progress feed.
#[derive(Debug, Clone, Serialize)]
pub enum JobEvent {
    /// The job made progress.
    Progress {
        /// Completion percentage (0-100).
        percent: u8,
        /// The workflow step being generated.
        step: String,
        message: Option<String>,
        /// Updated remaining-time estimate in seconds, if known.
        estimated_time_remaining: Option<u64>,
        /// Cost accrued so far in currency units.
        current_cost: Option<f64>,
    },

    /// A typed partial result arrived before completion.
    Partial { artifact: PartialArtifact },

    /// Terminal: the job finished with a final result payload.
    Completed { result: serde_json::Value },

    /// Terminal: the job failed, the transport gave up after bounded
    /// reconnection, or the polling fallback timed out.
    Failed { message: String },
}

impl JobEvent {
    /// Whether this event ends the feed.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Failed { .. })
    }
}

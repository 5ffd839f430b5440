//! Wire message types and parser for the job event stream.
//!
//! The pipeline sends JSON frames with the shape
//! `{"type": "<kind>", "data": {...}}`. This module deserializes them
//! into a strongly-typed [`StreamMessage`] enum; partial payloads are
//! further validated against their declared kind via
//! [`PartialArtifact`].

use serde::Deserialize;

use adstudio_core::artifacts::PartialArtifact;

/// All known stream message types for one job.
///
/// Deserialized via the internally-tagged `"type"` field with
/// associated `"data"` content.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum StreamMessage {
    /// Progress update while the job runs.
    #[serde(rename = "progress")]
    Progress(ProgressData),

    /// A typed partial result produced before completion.
    #[serde(rename = "partial")]
    Partial(PartialArtifact),

    /// Terminal: the job finished; carries the final result payload.
    #[serde(rename = "complete")]
    Complete(serde_json::Value),

    /// Terminal: the job failed.
    #[serde(rename = "error")]
    Error(ErrorData),
}

/// Payload for `progress` messages.
#[derive(Debug, Clone, Deserialize)]
pub struct ProgressData {
    /// Completion percentage (0-100).
    pub progress: u8,
    /// The workflow step being generated.
    pub step: String,
    #[serde(default)]
    pub message: Option<String>,
    /// Updated remaining-time estimate in seconds, if the pipeline has one.
    #[serde(default, rename = "estimatedTimeRemaining")]
    pub estimated_time_remaining: Option<u64>,
    /// Cost accrued so far in currency units.
    #[serde(default, rename = "currentCost")]
    pub current_cost: Option<f64>,
}

/// Payload for `error` messages.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorData {
    pub message: String,
}

impl StreamMessage {
    /// Whether dispatching this message ends the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete(_) | Self::Error(_))
    }
}

/// Parse a stream text frame into a typed message.
///
/// Returns `Err` for malformed JSON, unknown `type` values, or partial
/// payloads that do not match their declared kind. Callers log and drop
/// such frames; they never close the connection.
pub fn parse_message(text: &str) -> Result<StreamMessage, serde_json::Error> {
    serde_json::from_str(text)
}

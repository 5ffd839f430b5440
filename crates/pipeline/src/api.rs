//! REST client for the production pipeline HTTP endpoints.
//!
//! Wraps job submission, status polling, and cancellation using
//! [`reqwest`]. Submission is a single attempt with no retry — retry
//! policy belongs to the progress feed once a job exists, not here.

use serde::{Deserialize, Serialize};

use adstudio_core::artifacts::Brief;
use adstudio_core::job::JobStatus;
use adstudio_core::types::JobId;
use adstudio_core::workflow::WorkflowStep;

/// HTTP client for one pipeline backend.
pub struct PipelineApi {
    client: reqwest::Client,
    api_url: String,
    auth_token: Option<String>,
}

/// Parameters accompanying a submission, one variant per generable
/// step.
///
/// The variant both names the step and carries exactly the inputs that
/// step needs, so a submission can never pair a step with the wrong
/// parameters. Serialized untagged: the body is just the step's fields.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum StepParams {
    /// Generate a concept from the client brief.
    Concept { brief: Brief },
    /// Generate screenplay variants from an approved concept.
    Screenplays {
        #[serde(rename = "conceptId")]
        concept_id: String,
    },
    /// Generate a storyboard for the selected screenplay.
    Storyboard {
        #[serde(rename = "screenplayId")]
        screenplay_id: String,
    },
    /// Generate the production pack from the storyboard.
    Production {
        #[serde(rename = "storyboardId")]
        storyboard_id: String,
    },
}

impl StepParams {
    /// The workflow step these parameters submit.
    pub fn step(&self) -> WorkflowStep {
        match self {
            Self::Concept { .. } => WorkflowStep::Concept,
            Self::Screenplays { .. } => WorkflowStep::Screenplays,
            Self::Storyboard { .. } => WorkflowStep::Storyboard,
            Self::Production { .. } => WorkflowStep::Production,
        }
    }
}

/// Response returned after successfully queuing a generation job.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitResponse {
    /// Server-assigned job identifier.
    #[serde(rename = "jobId")]
    pub job_id: JobId,
    /// Expected duration in seconds.
    #[serde(rename = "estimatedTime")]
    pub estimated_time: u64,
    /// Expected cost in currency units.
    #[serde(rename = "estimatedCost")]
    pub estimated_cost: f64,
}

/// Snapshot of a job returned by the status endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct JobStatusResponse {
    pub status: JobStatus,
    /// Completion percentage, 0-100.
    pub progress: u8,
    /// Final result payload, present once the job completes.
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    /// Error message, present when the job failed.
    #[serde(default)]
    pub error: Option<String>,
}

/// Errors from the pipeline REST layer.
#[derive(Debug, thiserror::Error)]
pub enum PipelineApiError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The pipeline returned a non-2xx status code.
    #[error("Pipeline API error ({status}): {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },
}

impl PipelineApi {
    /// Create a new API client.
    ///
    /// * `api_url` - base HTTP URL, e.g. `http://localhost:8000`.
    /// * `auth_token` - optional persisted bearer credential.
    pub fn new(api_url: String, auth_token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url,
            auth_token,
        }
    }

    /// Submit a generation job for one workflow step of a project.
    ///
    /// Sends `POST /api/projects/{project_id}/generate/{step}` with the
    /// step's parameters as the JSON body. The pipeline also validates
    /// prerequisites server-side (e.g. an unknown concept id) and
    /// rejects with a 4xx, surfaced as [`PipelineApiError::Api`].
    pub async fn submit_step(
        &self,
        project_id: &str,
        params: &StepParams,
    ) -> Result<SubmitResponse, PipelineApiError> {
        let step = params.step();
        let response = self
            .authorize(self.client.post(format!(
                "{}/api/projects/{project_id}/generate/{step}",
                self.api_url
            )))
            .json(params)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Fetch the current status of a job.
    ///
    /// Sends `GET /api/jobs/{job_id}`.
    pub async fn job_status(&self, job_id: &str) -> Result<JobStatusResponse, PipelineApiError> {
        let response = self
            .authorize(
                self.client
                    .get(format!("{}/api/jobs/{job_id}", self.api_url)),
            )
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Ask the pipeline to cancel a queued or running job.
    ///
    /// Sends `POST /api/jobs/{job_id}/cancel`. Success only means the
    /// request was accepted; the backend job is not guaranteed to stop.
    pub async fn cancel_job(&self, job_id: &str) -> Result<(), PipelineApiError> {
        let response = self
            .authorize(
                self.client
                    .post(format!("{}/api/jobs/{job_id}/cancel", self.api_url)),
            )
            .send()
            .await?;

        Self::check_status(response).await
    }

    // ---- private helpers ----

    /// Attach the bearer credential when one is configured.
    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or a [`PipelineApiError::Api`]
    /// containing the status and body text on failure.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, PipelineApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(PipelineApiError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, PipelineApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }

    /// Assert the response has a success status code, discarding the body.
    async fn check_status(response: reqwest::Response) -> Result<(), PipelineApiError> {
        Self::ensure_success(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_params_serialize_as_bare_bodies() {
        let body = serde_json::to_value(StepParams::Screenplays {
            concept_id: "c1".into(),
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({"conceptId": "c1"}));
    }

    #[test]
    fn step_params_name_their_step() {
        let params = StepParams::Production {
            storyboard_id: "sb1".into(),
        };
        assert_eq!(params.step(), WorkflowStep::Production);
    }

    #[test]
    fn submit_response_parses_wire_field_names() {
        let json = r#"{"jobId":"j1","estimatedTime":20,"estimatedCost":2.5}"#;
        let parsed: SubmitResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.job_id, "j1");
        assert_eq!(parsed.estimated_time, 20);
        assert_eq!(parsed.estimated_cost, 2.5);
    }

    #[test]
    fn job_status_response_parses_running() {
        let json = r#"{"status":"running","progress":40}"#;
        let parsed: JobStatusResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.status, JobStatus::Running);
        assert_eq!(parsed.progress, 40);
        assert!(parsed.result.is_none());
        assert!(parsed.error.is_none());
    }

    #[test]
    fn job_status_response_parses_failure_with_error() {
        let json = r#"{"status":"failed","progress":60,"error":"out of credits"}"#;
        let parsed: JobStatusResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.status, JobStatus::Failed);
        assert_eq!(parsed.error.as_deref(), Some("out of credits"));
    }
}

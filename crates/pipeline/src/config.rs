//! Pipeline client configuration loaded from environment variables.

/// Connection settings for the production pipeline backend.
///
/// All fields have defaults suitable for local development. In
/// production, override via environment variables (the CLI loads a
/// `.env` file via `dotenvy` first).
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Base HTTP URL of the pipeline API (default: `http://localhost:8000`).
    pub api_url: String,
    /// Base WebSocket URL for job event streams (default: `ws://localhost:8000`).
    pub ws_url: String,
    /// Persisted bearer credential, if any. Attached as an
    /// `Authorization: Bearer` header to every HTTP request and as a
    /// `token` query parameter to the streaming connection. Acquisition
    /// of the credential is out of scope here.
    pub auth_token: Option<String>,
}

impl PipelineConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var               | Default                 |
    /// |-----------------------|-------------------------|
    /// | `PIPELINE_API_URL`    | `http://localhost:8000` |
    /// | `PIPELINE_WS_URL`     | `ws://localhost:8000`   |
    /// | `PIPELINE_AUTH_TOKEN` | unset                   |
    pub fn from_env() -> Self {
        let api_url =
            std::env::var("PIPELINE_API_URL").unwrap_or_else(|_| "http://localhost:8000".into());
        let ws_url =
            std::env::var("PIPELINE_WS_URL").unwrap_or_else(|_| "ws://localhost:8000".into());
        let auth_token = std::env::var("PIPELINE_AUTH_TOKEN")
            .ok()
            .filter(|t| !t.is_empty());

        Self {
            api_url,
            ws_url,
            auth_token,
        }
    }
}

//! Generic JSON liveness endpoint.
//!
//! Request:
//!
//! ```json
//! { "image": { "mime_type": "image/jpeg", "data": "<base64>" }, "task": "<description>" }
//! ```
//!
//! Response: `{ "isReal": bool, "confidence": number, "reason": string }`.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info, instrument};

use super::http_client::{ClassifierHttpClient, ClassifierHttpConfig, RequestAuth};
use super::{ClassifierSource, LivenessAssessment, LivenessClassifier, TASK_DESCRIPTION};
use crate::error::{LiveIdError, Result};
use crate::frame::Frame;

/// Default request timeout for the generic endpoint.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for [`HttpLivenessClassifier`].
#[derive(Clone)]
pub struct HttpClassifierConfig {
    /// Full endpoint URL.
    pub api_url: String,
    /// Optional bearer token.
    pub api_key: Option<String>,
    /// Request timeout.
    pub timeout: Duration,
    /// Refuse plain-HTTP endpoints.
    pub https_only: bool,
}

impl std::fmt::Debug for HttpClassifierConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClassifierConfig")
            .field("api_url", &self.api_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("timeout", &self.timeout)
            .field("https_only", &self.https_only)
            .finish()
    }
}

impl HttpClassifierConfig {
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            api_key: None,
            timeout: DEFAULT_TIMEOUT,
            https_only: true,
        }
    }

    /// Create configuration from environment variables.
    ///
    /// Required: `LIVENESS_API_URL`
    /// Optional: `LIVENESS_API_KEY`, `LIVENESS_ALLOW_HTTP=true`
    pub fn from_env() -> Result<Self> {
        let api_url = std::env::var("LIVENESS_API_URL").map_err(|_| {
            LiveIdError::ClassifierError("LIVENESS_API_URL environment variable not set".into())
        })?;
        let https_only = !std::env::var("LIVENESS_ALLOW_HTTP")
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Ok(Self {
            api_url,
            api_key: std::env::var("LIVENESS_API_KEY").ok().filter(|k| !k.is_empty()),
            timeout: DEFAULT_TIMEOUT,
            https_only,
        })
    }
}

#[derive(Debug, Serialize)]
struct ImagePayload<'a> {
    mime_type: &'a str,
    data: String,
}

#[derive(Debug, Serialize)]
struct LivenessRequest<'a> {
    image: ImagePayload<'a>,
    task: &'a str,
}

/// Liveness classifier reached over a generic JSON endpoint.
pub struct HttpLivenessClassifier {
    http: ClassifierHttpClient,
    api_url: String,
    auth: RequestAuth,
}

impl HttpLivenessClassifier {
    #[instrument(level = "debug", skip_all, fields(api_url = %config.api_url))]
    pub fn new(config: HttpClassifierConfig) -> Result<Self> {
        debug!("Creating HTTP liveness classifier");
        let http = ClassifierHttpClient::new(&ClassifierHttpConfig {
            timeout: config.timeout,
            https_only: config.https_only,
        })?;
        let auth = config
            .api_key
            .map(RequestAuth::Bearer)
            .unwrap_or_default();

        info!("HTTP liveness classifier created");
        Ok(Self {
            http,
            api_url: config.api_url,
            auth,
        })
    }
}

#[async_trait]
impl LivenessClassifier for HttpLivenessClassifier {
    #[instrument(level = "info", skip_all, fields(source = "http"))]
    async fn assess(&self, frame: &Frame) -> Result<LivenessAssessment> {
        let request = LivenessRequest {
            image: ImagePayload {
                mime_type: frame.mime_type(),
                data: frame.to_base64(),
            },
            task: TASK_DESCRIPTION,
        };
        self.http
            .post_json(&self.api_url, &request, &self.auth, "Liveness API")
            .await
    }

    fn source_id(&self) -> ClassifierSource {
        ClassifierSource::Http
    }
}

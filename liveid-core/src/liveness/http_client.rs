//! Shared HTTP plumbing for remote liveness classifiers.
//!
//! One request per call: liveness checks are not retried, a failure is
//! reported to the gate which then denies.

use std::time::{Duration, Instant};

use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{LiveIdError, Result};

/// How a request authenticates against the classifier service.
#[derive(Clone, Default)]
pub enum RequestAuth {
    #[default]
    None,
    /// `Authorization: Bearer <token>`
    Bearer(String),
    /// Arbitrary API-key header, e.g. `x-goog-api-key`.
    Header { name: &'static str, value: String },
}

impl std::fmt::Debug for RequestAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::Bearer(_) => write!(f, "Bearer([REDACTED])"),
            Self::Header { name, .. } => write!(f, "Header({name}: [REDACTED])"),
        }
    }
}

/// Configuration for a classifier HTTP client.
#[derive(Debug, Clone)]
pub struct ClassifierHttpConfig {
    /// Request timeout.
    pub timeout: Duration,
    /// Refuse plain-HTTP endpoints.
    pub https_only: bool,
}

/// JSON-over-HTTP client shared by the remote classifiers.
pub struct ClassifierHttpClient {
    client: Client,
}

impl ClassifierHttpClient {
    pub fn new(config: &ClassifierHttpConfig) -> Result<Self> {
        let mut builder = Client::builder().timeout(config.timeout);
        if config.https_only {
            builder = builder
                .https_only(true)
                .min_tls_version(reqwest::tls::Version::TLS_1_2);
        }

        let client = builder.build().map_err(|e| {
            LiveIdError::ClassifierError(format!("Failed to create HTTP client: {e}"))
        })?;
        Ok(Self { client })
    }

    /// POST `body` as JSON and parse the JSON response as `R`.
    pub async fn post_json<B, R>(
        &self,
        url: &str,
        body: &B,
        auth: &RequestAuth,
        provider_name: &str,
    ) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let start = Instant::now();
        let request = apply_auth(self.client.post(url).json(body), auth);

        let response = request.send().await.map_err(|e| {
            warn!(
                error = %e,
                timeout = e.is_timeout(),
                connect = e.is_connect(),
                latency_ms = start.elapsed().as_millis() as u64,
                "Classifier request failed"
            );
            LiveIdError::ClassifierError(format!("{provider_name} request failed: {e}"))
        })?;

        let status = response.status();
        debug!(status = %status, "Received HTTP response");

        if !status.is_success() {
            warn!(
                status = %status,
                latency_ms = start.elapsed().as_millis() as u64,
                "Classifier returned error status"
            );
            return Err(LiveIdError::ClassifierError(format!(
                "{provider_name} returned status: {status}{}",
                status_hint(status)
            )));
        }

        let parsed: R = response.json().await.map_err(|e| {
            warn!(error = %e, "Failed to parse classifier response");
            LiveIdError::ClassifierError(format!("Failed to parse {provider_name} response: {e}"))
        })?;

        debug!(
            latency_ms = start.elapsed().as_millis() as u64,
            "Classifier request completed"
        );
        Ok(parsed)
    }
}

fn apply_auth(request: RequestBuilder, auth: &RequestAuth) -> RequestBuilder {
    match auth {
        RequestAuth::None => request,
        RequestAuth::Bearer(token) => request.bearer_auth(token),
        RequestAuth::Header { name, value } => request.header(*name, value),
    }
}

/// Operator-facing hint for common failure statuses.
fn status_hint(status: StatusCode) -> &'static str {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => " (check the API key)",
        StatusCode::TOO_MANY_REQUESTS => " (rate limited)",
        StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT | StatusCode::BAD_GATEWAY => {
            " (service unavailable)"
        }
        _ => "",
    }
}

//! Google Generative Language (Gemini) liveness classifier.
//!
//! Sends the frame as inline image data together with the task description
//! and a JSON response schema, then parses the model's JSON answer.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, instrument};

use super::http_client::{ClassifierHttpClient, ClassifierHttpConfig, RequestAuth};
use super::{ClassifierSource, LivenessAssessment, LivenessClassifier, TASK_DESCRIPTION};
use crate::error::{LiveIdError, Result};
use crate::frame::Frame;

/// Default Generative Language API base URL.
const DEFAULT_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Default model.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Default request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Configuration for [`GeminiLivenessClassifier`].
#[derive(Clone)]
pub struct GeminiClassifierConfig {
    /// API base URL (without the `/models/...` path).
    pub api_url: String,
    /// API key sent as `x-goog-api-key`.
    pub api_key: String,
    /// Model name, e.g. `gemini-2.5-flash`.
    pub model: String,
    /// Request timeout.
    pub timeout: Duration,
    /// Refuse plain-HTTP endpoints.
    pub https_only: bool,
}

impl std::fmt::Debug for GeminiClassifierConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClassifierConfig")
            .field("api_url", &self.api_url)
            .field("api_key", &"[REDACTED]")
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .field("https_only", &self.https_only)
            .finish()
    }
}

impl GeminiClassifierConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            https_only: true,
        }
    }

    /// Create configuration from environment variables.
    ///
    /// Required: `GEMINI_API_KEY` (or `API_KEY`)
    /// Optional: `GEMINI_MODEL`, `GEMINI_API_URL`
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .or_else(|_| std::env::var("API_KEY"))
            .ok()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                LiveIdError::ClassifierError("GEMINI_API_KEY environment variable not set".into())
            })?;

        let mut config = Self::new(api_key);
        if let Ok(model) = std::env::var("GEMINI_MODEL") {
            config.model = model;
        }
        if let Ok(api_url) = std::env::var("GEMINI_API_URL") {
            config.api_url = api_url;
        }
        Ok(config)
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.api_url.trim_end_matches('/'),
            self.model
        )
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum RequestPart<'a> {
    #[serde(rename_all = "camelCase")]
    Image { inline_data: InlineData<'a> },
    Text { text: &'a str },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData<'a> {
    mime_type: &'a str,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
    response_schema: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

fn response_schema() -> serde_json::Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "isReal": {
                "type": "BOOLEAN",
                "description": "True if real human face, false if spoof/screen/photo."
            },
            "confidence": {
                "type": "NUMBER",
                "description": "Confidence score between 0 and 1."
            },
            "reason": {
                "type": "STRING",
                "description": "Brief explanation of the visual cues used for decision."
            }
        },
        "required": ["isReal", "confidence", "reason"]
    })
}

/// Gemini-backed liveness classifier.
pub struct GeminiLivenessClassifier {
    http: ClassifierHttpClient,
    endpoint: String,
    model: String,
    auth: RequestAuth,
}

impl GeminiLivenessClassifier {
    #[instrument(level = "debug", skip_all, fields(model = %config.model))]
    pub fn new(config: GeminiClassifierConfig) -> Result<Self> {
        debug!("Creating Gemini liveness classifier");
        let http = ClassifierHttpClient::new(&ClassifierHttpConfig {
            timeout: config.timeout,
            https_only: config.https_only,
        })?;

        info!("Gemini liveness classifier created");
        Ok(Self {
            http,
            endpoint: config.endpoint(),
            auth: RequestAuth::Header {
                name: "x-goog-api-key",
                value: config.api_key,
            },
            model: config.model,
        })
    }

    /// Extract the JSON assessment from the first candidate's text part.
    fn parse_response(response: GenerateContentResponse) -> Result<LivenessAssessment> {
        let text = response
            .candidates
            .into_iter()
            .filter_map(|c| c.content)
            .flat_map(|c| c.parts)
            .find_map(|p| p.text)
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| LiveIdError::ClassifierError("No response from model".into()))?;

        serde_json::from_str(strip_code_fence(&text)).map_err(|e| {
            LiveIdError::ClassifierError(format!("Model returned malformed assessment: {e}"))
        })
    }
}

/// Models occasionally wrap JSON in a markdown code fence.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(trimmed)
}

#[async_trait]
impl LivenessClassifier for GeminiLivenessClassifier {
    #[instrument(level = "info", skip_all, fields(source = "gemini", model = %self.model))]
    async fn assess(&self, frame: &Frame) -> Result<LivenessAssessment> {
        let request = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![
                    RequestPart::Image {
                        inline_data: InlineData {
                            mime_type: frame.mime_type(),
                            data: frame.to_base64(),
                        },
                    },
                    RequestPart::Text {
                        text: TASK_DESCRIPTION,
                    },
                ],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json",
                response_schema: response_schema(),
            },
        };

        let response: GenerateContentResponse = self
            .http
            .post_json(&self.endpoint, &request, &self.auth, "Gemini API")
            .await?;
        Self::parse_response(response)
    }

    fn source_id(&self) -> ClassifierSource {
        ClassifierSource::Gemini {
            model: self.model.clone(),
        }
    }
}

//! Liveness (presentation-attack) detection.
//!
//! Scoring is delegated to an external classifier; the [`LivenessGate`]
//! normalizes its answer and applies the accept/reject policy. The gate is
//! fail-closed: any classifier failure becomes a spoof verdict.
//!
//! ## Classifier Providers
//!
//! - **Gemini** - Google Generative Language API with a JSON response schema
//! - **HTTP** - any JSON endpoint speaking `{ isReal, confidence, reason }`
//! - **Mock** - scripted verdicts for testing
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use liveid_core::liveness::{ClassifierConfig, ClassifierFactory, GateConfig, LivenessGate};
//! use liveid_core::Frame;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let classifier = ClassifierFactory::create(ClassifierConfig::Auto)?;
//! let gate = LivenessGate::new(classifier, GateConfig::default());
//! let frame = Frame::from_path(std::path::Path::new("face.jpg"))?;
//! let verdict = gate.check(&frame).await;
//! println!("live: {} ({:.2})", verdict.is_live, verdict.confidence);
//! # Ok(())
//! # }
//! ```

mod gate;
mod mock;

#[cfg(feature = "network")]
mod gemini;
#[cfg(feature = "network")]
mod http;
#[cfg(feature = "network")]
mod http_client;
mod provider;

pub use gate::{GateConfig, LivenessGate, LivenessVerdict, DEFAULT_LIVENESS_THRESHOLD, FALLBACK_REASON};
pub use mock::MockLivenessClassifier;
pub use provider::{ClassifierConfig, ClassifierFactory};

#[cfg(feature = "network")]
pub use gemini::{GeminiClassifierConfig, GeminiLivenessClassifier};
#[cfg(feature = "network")]
pub use http::{HttpClassifierConfig, HttpLivenessClassifier};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{LiveIdError, Result};
use crate::frame::Frame;

/// Task description sent to the classifier along with the image.
pub const TASK_DESCRIPTION: &str = "Analyze this image for a biometric security system \
(Face Liveness Detection). Determine if the face in the image is a real person present in \
front of the camera (\"Live\"), or a presentation attack such as a photo displayed on a \
screen, a printed paper mask, or a deepfake (\"Spoof\"). Respond with JSON containing \
isReal (boolean), confidence (number between 0 and 1) and reason (brief explanation of the \
visual cues used, e.g. 'Pixelation detected', 'Glare from screen', 'Natural skin texture').";

/// Raw judgment returned by a liveness classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LivenessAssessment {
    /// The classifier's boolean judgment (true = real person).
    pub is_real: bool,
    /// Confidence in `[0, 1]`.
    pub confidence: f32,
    /// Short explanation of the visual cues used.
    #[serde(default)]
    pub reason: String,
}

impl LivenessAssessment {
    pub fn new(is_real: bool, confidence: f32, reason: impl Into<String>) -> Self {
        Self {
            is_real,
            confidence,
            reason: reason.into(),
        }
    }

    /// Clamp confidence into `[0, 1]`; a non-finite confidence is malformed.
    pub fn normalized(mut self) -> Result<Self> {
        if !self.confidence.is_finite() {
            return Err(LiveIdError::ClassifierError(format!(
                "Malformed confidence: {}",
                self.confidence
            )));
        }
        self.confidence = self.confidence.clamp(0.0, 1.0);
        self.reason = self.reason.trim().to_string();
        Ok(self)
    }
}

/// External liveness scoring service.
///
/// Implementations must be thread-safe (`Send + Sync`). A single call is made
/// per verification attempt; implementations must not retry internally.
#[async_trait]
pub trait LivenessClassifier: Send + Sync {
    /// Judge whether `frame` shows a live person.
    async fn assess(&self, frame: &Frame) -> Result<LivenessAssessment>;

    /// Identifies the classifier backend in logs and verdicts.
    fn source_id(&self) -> ClassifierSource;
}

/// Identifies which classifier backend produced a verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClassifierSource {
    /// Google Generative Language API
    Gemini { model: String },
    /// Generic JSON liveness endpoint
    Http,
    /// Mock classifier for testing only
    Mock,
}

impl std::fmt::Display for ClassifierSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Gemini { model } => write!(f, "Gemini ({model})"),
            Self::Http => write!(f, "HTTP classifier"),
            Self::Mock => write!(f, "Mock (NOT FOR PRODUCTION)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_clamps_confidence() {
        let high = LivenessAssessment::new(true, 1.7, " ok ").normalized().unwrap();
        assert_eq!(high.confidence, 1.0);
        assert_eq!(high.reason, "ok");

        let low = LivenessAssessment::new(false, -0.3, "x").normalized().unwrap();
        assert_eq!(low.confidence, 0.0);
    }

    #[test]
    fn test_normalize_rejects_nan() {
        assert!(LivenessAssessment::new(true, f32::NAN, "x")
            .normalized()
            .is_err());
    }

    #[test]
    fn test_assessment_wire_format_is_camel_case() {
        let parsed: LivenessAssessment =
            serde_json::from_str(r#"{"isReal": true, "confidence": 0.93, "reason": "Natural skin texture"}"#)
                .unwrap();
        assert!(parsed.is_real);
        assert!((parsed.confidence - 0.93).abs() < 1e-6);
        assert_eq!(parsed.reason, "Natural skin texture");
    }
}

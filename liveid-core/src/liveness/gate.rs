//! Accept/reject policy over a liveness classifier.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use super::{ClassifierSource, LivenessAssessment, LivenessClassifier};
use crate::error::{LiveIdError, Result};
use crate::frame::Frame;

/// Confidence a positive judgment must strictly exceed to count as live.
pub const DEFAULT_LIVENESS_THRESHOLD: f32 = 0.6;

/// Default upper bound on a single classifier call.
pub const DEFAULT_CLASSIFIER_TIMEOUT: Duration = Duration::from_secs(10);

/// Reason reported when the classifier could not be consulted.
pub const FALLBACK_REASON: &str = "System error during liveness check.";

/// Liveness gate configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct GateConfig {
    /// Strict lower bound on confidence for a live verdict.
    pub threshold: f32,
    /// Classifier call timeout; expiry is treated as a failure (spoof).
    pub timeout: Duration,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_LIVENESS_THRESHOLD,
            timeout: DEFAULT_CLASSIFIER_TIMEOUT,
        }
    }
}

/// Binary verdict of the gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LivenessVerdict {
    /// True only for a confident positive judgment.
    pub is_live: bool,
    /// Normalized confidence in `[0, 1]`.
    pub confidence: f32,
    pub reason: String,
    /// Set when the verdict is the fail-closed fallback rather than a
    /// classifier judgment. Informational only; the outcome is still spoof.
    #[serde(default)]
    pub fallback: bool,
}

impl LivenessVerdict {
    /// The verdict used whenever the classifier fails.
    pub fn fail_closed() -> Self {
        Self {
            is_live: false,
            confidence: 0.0,
            reason: FALLBACK_REASON.to_string(),
            fallback: true,
        }
    }
}

/// Wraps a [`LivenessClassifier`] with threshold policy and fail-closed
/// error handling.
pub struct LivenessGate {
    classifier: Arc<dyn LivenessClassifier>,
    config: GateConfig,
}

impl LivenessGate {
    pub fn new(classifier: Arc<dyn LivenessClassifier>, config: GateConfig) -> Self {
        Self { classifier, config }
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    pub fn source_id(&self) -> ClassifierSource {
        self.classifier.source_id()
    }

    /// Apply the policy to a classifier judgment.
    ///
    /// Live iff the judgment is positive and its confidence is strictly above
    /// the threshold. Every other combination is a spoof.
    pub fn decide(&self, assessment: &LivenessAssessment) -> bool {
        assessment.is_real && assessment.confidence > self.config.threshold
    }

    /// Consult the classifier once and return a binary verdict.
    ///
    /// Never fails: transport errors, malformed responses and timeouts all
    /// yield [`LivenessVerdict::fail_closed`]. The underlying error is logged.
    #[instrument(
        level = "info",
        skip_all,
        fields(source = %self.classifier.source_id(), bytes = frame.len())
    )]
    pub async fn check(&self, frame: &Frame) -> LivenessVerdict {
        let start = Instant::now();

        match self.assess(frame).await {
            Ok(assessment) => {
                let is_live = self.decide(&assessment);
                info!(
                    is_real = assessment.is_real,
                    confidence = assessment.confidence,
                    threshold = self.config.threshold,
                    is_live,
                    latency_ms = start.elapsed().as_millis() as u64,
                    "Liveness verdict"
                );
                LivenessVerdict {
                    is_live,
                    confidence: assessment.confidence,
                    reason: assessment.reason,
                    fallback: false,
                }
            }
            Err(e) => {
                warn!(
                    error = %e,
                    latency_ms = start.elapsed().as_millis() as u64,
                    "Liveness check failed, denying (fail-closed)"
                );
                LivenessVerdict::fail_closed()
            }
        }
    }

    async fn assess(&self, frame: &Frame) -> Result<LivenessAssessment> {
        debug!(timeout_ms = self.config.timeout.as_millis() as u64, "Calling liveness classifier");
        let assessment = tokio::time::timeout(self.config.timeout, self.classifier.assess(frame))
            .await
            .map_err(|_| {
                LiveIdError::ClassifierError(format!(
                    "Classifier timed out after {}ms",
                    self.config.timeout.as_millis()
                ))
            })??;
        assessment.normalized()
    }
}

impl std::fmt::Debug for LivenessGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LivenessGate")
            .field("classifier", &self.classifier.source_id())
            .field("config", &self.config)
            .finish()
    }
}

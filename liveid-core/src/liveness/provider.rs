//! Classifier selection.

use std::sync::Arc;

use super::{LivenessAssessment, LivenessClassifier, MockLivenessClassifier};
use crate::error::{LiveIdError, Result};

#[cfg(feature = "network")]
use super::{
    GeminiClassifierConfig, GeminiLivenessClassifier, HttpClassifierConfig,
    HttpLivenessClassifier,
};

/// Configuration for creating liveness classifiers.
#[derive(Debug, Clone, Default)]
pub enum ClassifierConfig {
    /// Google Gemini
    #[cfg(feature = "network")]
    Gemini(GeminiClassifierConfig),

    /// Generic JSON endpoint
    #[cfg(feature = "network")]
    Http(HttpClassifierConfig),

    /// Mock classifier (testing only)
    Mock(LivenessAssessment),

    /// Auto-select from the environment
    #[default]
    Auto,
}

/// Factory for creating liveness classifiers.
pub struct ClassifierFactory;

impl ClassifierFactory {
    /// Create a classifier from configuration.
    pub fn create(config: ClassifierConfig) -> Result<Arc<dyn LivenessClassifier>> {
        match config {
            #[cfg(feature = "network")]
            ClassifierConfig::Gemini(gemini_config) => {
                let classifier = GeminiLivenessClassifier::new(gemini_config)?;
                Ok(Arc::new(classifier))
            }
            #[cfg(feature = "network")]
            ClassifierConfig::Http(http_config) => {
                let classifier = HttpLivenessClassifier::new(http_config)?;
                Ok(Arc::new(classifier))
            }
            ClassifierConfig::Mock(assessment) => {
                tracing::warn!("Using mock liveness classifier - NOT FOR PRODUCTION");
                Ok(Arc::new(MockLivenessClassifier::with_assessment(assessment)))
            }
            ClassifierConfig::Auto => Self::create_auto(),
        }
    }

    /// Auto-select a classifier.
    ///
    /// Priority:
    /// 1. Gemini (if `GEMINI_API_KEY` or `API_KEY` is set)
    /// 2. Generic HTTP endpoint (if `LIVENESS_API_URL` is set)
    fn create_auto() -> Result<Arc<dyn LivenessClassifier>> {
        #[cfg(feature = "network")]
        {
            if let Ok(gemini_config) = GeminiClassifierConfig::from_env() {
                tracing::info!(model = %gemini_config.model, "Auto-selected Gemini liveness classifier");
                return Self::create(ClassifierConfig::Gemini(gemini_config));
            }
            if let Ok(http_config) = HttpClassifierConfig::from_env() {
                tracing::info!(api_url = %http_config.api_url, "Auto-selected HTTP liveness classifier");
                return Self::create(ClassifierConfig::Http(http_config));
            }
        }

        Err(LiveIdError::ClassifierError(
            "No liveness classifier configured (set GEMINI_API_KEY or LIVENESS_API_URL)".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::liveness::ClassifierSource;

    #[test]
    fn test_config_default() {
        assert!(matches!(ClassifierConfig::default(), ClassifierConfig::Auto));
    }

    #[test]
    fn test_create_mock() {
        let classifier = ClassifierFactory::create(ClassifierConfig::Mock(
            LivenessAssessment::new(true, 0.9, "ok"),
        ))
        .unwrap();
        assert_eq!(classifier.source_id(), ClassifierSource::Mock);
    }

    #[cfg(feature = "network")]
    #[test]
    fn test_create_http() {
        let classifier = ClassifierFactory::create(ClassifierConfig::Http(
            HttpClassifierConfig::new("https://liveness.example/api"),
        ))
        .unwrap();
        assert_eq!(classifier.source_id(), ClassifierSource::Http);
    }

    #[cfg(feature = "network")]
    #[test]
    fn test_create_gemini() {
        let classifier = ClassifierFactory::create(ClassifierConfig::Gemini(
            GeminiClassifierConfig::new("key"),
        ))
        .unwrap();
        assert_eq!(
            classifier.source_id(),
            ClassifierSource::Gemini {
                model: "gemini-2.5-flash".into()
            }
        );
    }
}

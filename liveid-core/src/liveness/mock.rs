//! Mock liveness classifier for testing.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Notify;

use super::{ClassifierSource, LivenessAssessment, LivenessClassifier};
use crate::error::{LiveIdError, Result};
use crate::frame::Frame;

#[derive(Debug, Clone)]
enum Behavior {
    Respond(LivenessAssessment),
    Fail(String),
    Hang,
}

/// Mock classifier returning a fixed judgment.
/// WARNING: Do not use in production - it never looks at the image!
///
/// An optional gate (`Notify`) holds every call until the test releases it,
/// which makes "call in flight" states observable deterministically.
#[derive(Debug)]
pub struct MockLivenessClassifier {
    behavior: Behavior,
    gate: Option<Arc<Notify>>,
    calls: AtomicUsize,
}

impl MockLivenessClassifier {
    pub fn with_assessment(assessment: LivenessAssessment) -> Self {
        Self::from_behavior(Behavior::Respond(assessment))
    }

    /// Positive judgment with the given confidence.
    pub fn live(confidence: f32) -> Self {
        Self::with_assessment(LivenessAssessment::new(
            true,
            confidence,
            "Natural skin texture",
        ))
    }

    /// Negative judgment with the given confidence.
    pub fn spoof(confidence: f32) -> Self {
        Self::with_assessment(LivenessAssessment::new(
            false,
            confidence,
            "Glare from screen",
        ))
    }

    /// Every call fails as a transport error would.
    pub fn failing(message: impl Into<String>) -> Self {
        Self::from_behavior(Behavior::Fail(message.into()))
    }

    /// Every call waits forever (exercises the gate timeout).
    pub fn hanging() -> Self {
        Self::from_behavior(Behavior::Hang)
    }

    /// Hold each call until `gate` is notified.
    pub fn with_gate(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Number of `assess` calls made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn from_behavior(behavior: Behavior) -> Self {
        Self {
            behavior,
            gate: None,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl LivenessClassifier for MockLivenessClassifier {
    async fn assess(&self, _frame: &Frame) -> Result<LivenessAssessment> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        match &self.behavior {
            Behavior::Respond(assessment) => Ok(assessment.clone()),
            Behavior::Fail(message) => Err(LiveIdError::ClassifierError(message.clone())),
            Behavior::Hang => std::future::pending().await,
        }
    }

    fn source_id(&self) -> ClassifierSource {
        ClassifierSource::Mock
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> Frame {
        Frame::new(vec![1u8; 4], "image/jpeg")
    }

    #[tokio::test]
    async fn test_mock_live_and_spoof() {
        let live = MockLivenessClassifier::live(0.9);
        assert!(live.assess(&frame()).await.unwrap().is_real);
        let spoof = MockLivenessClassifier::spoof(0.9);
        assert!(!spoof.assess(&frame()).await.unwrap().is_real);
        assert_eq!(live.calls(), 1);
        assert_eq!(live.source_id(), ClassifierSource::Mock);
    }

    #[tokio::test]
    async fn test_mock_failing() {
        let mock = MockLivenessClassifier::failing("boom");
        assert!(matches!(
            mock.assess(&frame()).await,
            Err(LiveIdError::ClassifierError(msg)) if msg == "boom"
        ));
    }

    #[tokio::test]
    async fn test_gate_holds_until_notified() {
        let gate = Arc::new(Notify::new());
        let mock = Arc::new(MockLivenessClassifier::live(0.9).with_gate(Arc::clone(&gate)));

        let task = {
            let mock = Arc::clone(&mock);
            tokio::spawn(async move { mock.assess(&frame()).await })
        };
        tokio::task::yield_now().await;
        assert!(!task.is_finished());

        gate.notify_one();
        assert!(task.await.unwrap().unwrap().is_real);
    }
}

//! LiveID Core - Liveness-gated face identification
//!
//! This crate provides the pipeline behind a face access-control kiosk:
//! periodic frame capture for enrollment, a fail-closed liveness gate backed
//! by an external classifier, and a KNN gallery that identifies live faces.
//!
//! # Features
//!
//! - Cancellable fixed-cadence enrollment capture
//! - Fail-closed liveness decisions (Gemini, generic HTTP, or mock classifiers)
//! - Deterministic KNN majority vote with a distance acceptance threshold
//! - Copy-on-write gallery snapshots safe for concurrent readers
//! - JSON gallery persistence with atomic writes
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use liveid_core::liveness::{GateConfig, LivenessGate, MockLivenessClassifier};
//! use liveid_core::{
//!     CaptureConfig, CaptureController, DirectoryFrameSource, Gallery, MatchConfig,
//!     NewIdentity, PixelEmbedder, StaticFrameSource, VerificationOrchestrator,
//! };
//!
//! # async fn example() -> liveid_core::Result<()> {
//! let gallery = Arc::new(Gallery::new());
//! let embedder = Arc::new(PixelEmbedder::default());
//!
//! // Enroll: collect 20 frames at 200ms, then embed and store them
//! let frames = Arc::new(DirectoryFrameSource::new(std::path::Path::new("frames/alice"))?);
//! let capture = CaptureController::new(frames, CaptureConfig::default())?;
//! capture.start(NewIdentity::new("Alice", "EMP-001"))?;
//! capture.wait_until_settled().await;
//! capture.save(embedder.as_ref(), &gallery).await?;
//!
//! // Verify: liveness first, identification only for live faces
//! let camera = Arc::new(StaticFrameSource::from_path(std::path::Path::new("probe.jpg"))?);
//! let gate = Arc::new(LivenessGate::new(
//!     Arc::new(MockLivenessClassifier::live(0.95)),
//!     GateConfig::default(),
//! ));
//! let orchestrator =
//!     VerificationOrchestrator::new(camera, gate, embedder, gallery, MatchConfig::default())?;
//! let outcome = orchestrator.verify_and_identify().await?;
//! if let Some(m) = outcome.matching.as_match() {
//!     println!("Welcome, {} (distance {:.3})", m.display_name, m.distance);
//! }
//! # Ok(())
//! # }
//! ```

pub mod camera;
pub mod capture;
pub mod config;
pub mod embedding;
pub mod error;
pub mod frame;
pub mod gallery;
pub mod liveness;
pub mod store;
pub mod verification;

// Re-export main types for convenience
pub use camera::{DirectoryFrameSource, FrameSource, ScriptedFrameSource, StaticFrameSource};
pub use capture::{
    CaptureConfig, CaptureController, CaptureProgress, CaptureSample, CaptureSession,
    CaptureState, EnrollmentPayload, TickOutcome,
};
pub use config::LiveIdConfig;
pub use embedding::{Embedding, EmbeddingExtractor, MockEmbedder};
pub use error::{LiveIdError, Result};
pub use frame::Frame;
pub use gallery::{
    Classification, Gallery, GalleryStats, Identity, IdentityId, IdentityMatch, Neighbor,
    NewIdentity,
};
pub use liveness::{LivenessAssessment, LivenessClassifier, LivenessGate, LivenessVerdict};
pub use store::{IdentityRecord, IdentityStore, JsonFileStore, MemoryStore};
pub use verification::{
    AttemptState, MatchConfig, MatchStatus, VerificationAttempt, VerificationOrchestrator,
    VerificationOutcome,
};

#[cfg(feature = "pixel-embedder")]
pub use embedding::PixelEmbedder;

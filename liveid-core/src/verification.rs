//! Liveness-gated identification.
//!
//! One attempt at a time moves through:
//!
//! ```text
//! Idle ─► CapturingFrame ─► AwaitingLiveness ─┬─► Live ──(match)──► Live / Error
//!              │                              └─► Spoof
//!              └─► Error (no frame)
//! ```
//!
//! Terminal states return to `Idle` only through [`VerificationOrchestrator::reset`].
//! Identification runs only after an accepting liveness verdict, in a
//! background task, so the verdict is observable before the match resolves.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::camera::FrameSource;
use crate::embedding::EmbeddingExtractor;
use crate::error::{LiveIdError, Result};
use crate::frame::Frame;
use crate::gallery::{Classification, Gallery, IdentityMatch};
use crate::liveness::{LivenessGate, LivenessVerdict};

/// Default number of neighbors consulted by the vote.
pub const DEFAULT_MATCH_K: usize = 5;

/// Default acceptance threshold on the winner's closest distance.
pub const DEFAULT_MAX_DISTANCE: f32 = 0.6;

/// KNN parameters used for identification.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchConfig {
    pub k: usize,
    pub max_distance: f32,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            k: DEFAULT_MATCH_K,
            max_distance: DEFAULT_MAX_DISTANCE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AttemptState {
    Idle,
    CapturingFrame,
    AwaitingLiveness,
    Live,
    Spoof,
    Error,
}

impl AttemptState {
    /// An attempt occupies the orchestrator in these states.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::CapturingFrame | Self::AwaitingLiveness)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Live | Self::Spoof | Self::Error)
    }
}

impl std::fmt::Display for AttemptState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "IDLE",
            Self::CapturingFrame => "CAPTURING_FRAME",
            Self::AwaitingLiveness => "ANALYZING",
            Self::Live => "LIVE",
            Self::Spoof => "SPOOF",
            Self::Error => "ERROR",
        };
        f.write_str(s)
    }
}

/// Progress of the identification step.
#[derive(Debug, Clone, Default)]
pub enum MatchStatus {
    /// Identification was not (or not yet) attempted.
    #[default]
    NotStarted,
    /// Liveness accepted; embedding and matching in progress.
    Pending,
    Matched(IdentityMatch),
    NoMatch,
    /// Embedding or gallery query failed; the attempt is in `Error`.
    Failed,
}

impl MatchStatus {
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    pub fn as_match(&self) -> Option<&IdentityMatch> {
        match self {
            Self::Matched(m) => Some(m),
            _ => None,
        }
    }
}

/// The current (or last) verification attempt.
#[derive(Debug, Clone)]
pub struct VerificationAttempt {
    pub id: Option<Uuid>,
    pub started_at: Option<DateTime<Utc>>,
    pub state: AttemptState,
    pub frame: Option<Frame>,
    pub liveness: Option<LivenessVerdict>,
    pub matching: MatchStatus,
    pub error: Option<String>,
}

impl VerificationAttempt {
    fn idle() -> Self {
        Self {
            id: None,
            started_at: None,
            state: AttemptState::Idle,
            frame: None,
            liveness: None,
            matching: MatchStatus::NotStarted,
            error: None,
        }
    }

    fn begin(id: Uuid) -> Self {
        Self {
            id: Some(id),
            started_at: Some(Utc::now()),
            state: AttemptState::CapturingFrame,
            ..Self::idle()
        }
    }
}

/// Final view of an attempt once its match step has settled.
#[derive(Debug, Clone)]
pub struct VerificationOutcome {
    pub verdict: LivenessVerdict,
    pub state: AttemptState,
    pub matching: MatchStatus,
    pub error: Option<String>,
}

impl VerificationOutcome {
    /// Access is granted only to a live, identified person.
    pub fn is_granted(&self) -> bool {
        self.state == AttemptState::Live && self.matching.as_match().is_some()
    }
}

/// Sequences frame capture, the liveness gate and identification.
pub struct VerificationOrchestrator {
    source: Arc<dyn FrameSource>,
    gate: Arc<LivenessGate>,
    embedder: Arc<dyn EmbeddingExtractor>,
    gallery: Arc<Gallery>,
    config: MatchConfig,
    attempt: Arc<watch::Sender<VerificationAttempt>>,
    match_task: Mutex<Option<JoinHandle<()>>>,
}

impl VerificationOrchestrator {
    pub fn new(
        source: Arc<dyn FrameSource>,
        gate: Arc<LivenessGate>,
        embedder: Arc<dyn EmbeddingExtractor>,
        gallery: Arc<Gallery>,
        config: MatchConfig,
    ) -> Result<Self> {
        if config.k == 0 {
            return Err(LiveIdError::InvalidInput("k must be positive".into()));
        }
        if !config.max_distance.is_finite() || config.max_distance < 0.0 {
            return Err(LiveIdError::InvalidInput(
                "max_distance must be a non-negative finite number".into(),
            ));
        }
        gallery.check_extractor(embedder.as_ref())?;
        let (attempt, _) = watch::channel(VerificationAttempt::idle());
        Ok(Self {
            source,
            gate,
            embedder,
            gallery,
            config,
            attempt: Arc::new(attempt),
            match_task: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    /// Current attempt state and results.
    pub fn snapshot(&self) -> VerificationAttempt {
        self.attempt.borrow().clone()
    }

    pub fn state(&self) -> AttemptState {
        self.attempt.borrow().state
    }

    /// Watch every attempt transition.
    pub fn subscribe(&self) -> watch::Receiver<VerificationAttempt> {
        self.attempt.subscribe()
    }

    /// Run one verification attempt up to the liveness verdict.
    ///
    /// Returns as soon as the verdict is known. On a live verdict the match
    /// step continues in the background; observe it with
    /// [`subscribe`](Self::subscribe) or [`wait_for_match`](Self::wait_for_match).
    ///
    /// Fails with `AlreadyInProgress` if an attempt is in flight or has not
    /// been reset, `NoFrame` if the camera has nothing (the attempt moves to
    /// `Error`), and `AttemptCancelled` if [`reset`](Self::reset) interrupted it.
    #[instrument(level = "info", skip(self))]
    pub async fn verify(&self) -> Result<LivenessVerdict> {
        let attempt_id = Uuid::new_v4();
        let claimed = self.attempt.send_if_modified(|attempt| {
            if attempt.state != AttemptState::Idle {
                return false;
            }
            *attempt = VerificationAttempt::begin(attempt_id);
            true
        });
        if !claimed {
            debug!(state = %self.state(), "Verification rejected, attempt already active");
            return Err(LiveIdError::AlreadyInProgress);
        }
        debug!(%attempt_id, "Verification attempt started");

        let Some(frame) = self.source.get_frame() else {
            update_attempt(&self.attempt, attempt_id, |attempt| {
                attempt.state = AttemptState::Error;
                attempt.error = Some(LiveIdError::NoFrame.to_string());
            });
            warn!(%attempt_id, "Camera yielded no frame");
            return Err(LiveIdError::NoFrame);
        };

        let awaiting = update_attempt(&self.attempt, attempt_id, |attempt| {
            attempt.frame = Some(frame.clone());
            attempt.state = AttemptState::AwaitingLiveness;
        });
        if !awaiting {
            return Err(LiveIdError::AttemptCancelled);
        }

        let mut cancelled = self.attempt.subscribe();
        let verdict = tokio::select! {
            verdict = self.gate.check(&frame) => verdict,
            _ = cancelled.wait_for(|attempt| attempt.id != Some(attempt_id)) => {
                debug!(%attempt_id, "Attempt reset while awaiting liveness");
                return Err(LiveIdError::AttemptCancelled);
            }
        };

        if verdict.is_live {
            let live = update_attempt(&self.attempt, attempt_id, |attempt| {
                attempt.liveness = Some(verdict.clone());
                attempt.state = AttemptState::Live;
                attempt.matching = MatchStatus::Pending;
            });
            if !live {
                return Err(LiveIdError::AttemptCancelled);
            }
            info!(%attempt_id, confidence = verdict.confidence, "Liveness confirmed, identifying");
            self.spawn_match(attempt_id, frame);
        } else {
            let spoof = update_attempt(&self.attempt, attempt_id, |attempt| {
                attempt.liveness = Some(verdict.clone());
                attempt.state = AttemptState::Spoof;
            });
            if !spoof {
                return Err(LiveIdError::AttemptCancelled);
            }
            info!(
                %attempt_id,
                confidence = verdict.confidence,
                fallback = verdict.fallback,
                "Liveness rejected, identification skipped"
            );
        }

        Ok(verdict)
    }

    /// Wait until the current attempt's match step is no longer pending.
    pub async fn wait_for_match(&self) -> MatchStatus {
        let mut rx = self.subscribe();
        let settled = rx
            .wait_for(|attempt| !attempt.matching.is_pending())
            .await
            .map(|attempt| attempt.matching.clone());
        settled.unwrap_or_else(|_| self.snapshot().matching)
    }

    /// Verify and wait for identification to settle.
    pub async fn verify_and_identify(&self) -> Result<VerificationOutcome> {
        let verdict = self.verify().await?;
        let matching = self.wait_for_match().await;
        let snapshot = self.snapshot();
        Ok(VerificationOutcome {
            verdict,
            state: snapshot.state,
            matching,
            error: snapshot.error,
        })
    }

    /// Discard the current attempt and return to `Idle`.
    ///
    /// Safe at any time: an in-flight liveness call or match step is
    /// cancelled and its late result dropped.
    pub fn reset(&self) {
        self.replace_match_task(None);
        let previous = self.attempt.send_replace(VerificationAttempt::idle());
        if let Some(id) = previous.id {
            debug!(attempt_id = %id, state = %previous.state, "Verification attempt reset");
        }
    }

    fn spawn_match(&self, attempt_id: Uuid, frame: Frame) {
        let embedder = Arc::clone(&self.embedder);
        let gallery = Arc::clone(&self.gallery);
        let attempt = Arc::clone(&self.attempt);
        let config = self.config.clone();

        let handle = tokio::spawn(async move {
            let result: Result<Classification> = async {
                let embedding = embedder.embed(&frame).await?;
                gallery.classify(&embedding, config.k, config.max_distance)
            }
            .await;

            update_attempt(&attempt, attempt_id, |attempt| match result {
                Ok(Classification::Match(matched)) => {
                    info!(
                        %attempt_id,
                        identity_id = %matched.identity_id,
                        distance = matched.distance,
                        votes = matched.votes,
                        "Identity matched"
                    );
                    attempt.matching = MatchStatus::Matched(matched);
                }
                Ok(Classification::NoMatch) => {
                    info!(%attempt_id, "No enrolled identity matched");
                    attempt.matching = MatchStatus::NoMatch;
                }
                Err(e) => {
                    warn!(%attempt_id, error = %e, "Identification failed");
                    attempt.state = AttemptState::Error;
                    attempt.matching = MatchStatus::Failed;
                    attempt.error = Some(e.to_string());
                }
            });
        });

        self.replace_match_task(Some(handle));
    }

    fn replace_match_task(&self, handle: Option<JoinHandle<()>>) {
        let mut task = self.match_task.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = task.take() {
            previous.abort();
        }
        *task = handle;
    }
}

/// Apply `f` to the published attempt if it is still `attempt_id`.
fn update_attempt(
    sender: &watch::Sender<VerificationAttempt>,
    attempt_id: Uuid,
    f: impl FnOnce(&mut VerificationAttempt),
) -> bool {
    sender.send_if_modified(|attempt| {
        if attempt.id != Some(attempt_id) {
            return false;
        }
        f(attempt);
        true
    })
}

impl Drop for VerificationOrchestrator {
    fn drop(&mut self) {
        self.replace_match_task(None);
    }
}

impl std::fmt::Debug for VerificationOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerificationOrchestrator")
            .field("state", &self.state())
            .field("gate", &self.gate)
            .field("config", &self.config)
            .finish()
    }
}

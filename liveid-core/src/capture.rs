//! Enrollment sample acquisition.
//!
//! State machine:
//!
//! ```text
//!          start              target reached
//!   Idle ─────────► Capturing ───────────────► Complete
//!    ▲                  │                          │
//!    └──── stop ────────┘                          │
//!    └───────────────────────── reset ─────────────┘
//! ```
//!
//! [`CaptureSession`] is the synchronous state machine. [`CaptureController`]
//! drives it with a cancellable periodic task at a fixed cadence.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

use crate::camera::FrameSource;
use crate::embedding::EmbeddingExtractor;
use crate::error::{LiveIdError, Result};
use crate::frame::Frame;
use crate::gallery::{Gallery, Identity, NewIdentity};

/// Default delay between two capture ticks.
pub const DEFAULT_CAPTURE_INTERVAL: Duration = Duration::from_millis(200);

/// Default number of samples per enrollment.
pub const DEFAULT_TARGET_SAMPLES: usize = 20;

/// Capture cadence and sample target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureConfig {
    pub interval: Duration,
    pub target: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_CAPTURE_INTERVAL,
            target: DEFAULT_TARGET_SAMPLES,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaptureState {
    Idle,
    Capturing,
    Complete,
}

impl std::fmt::Display for CaptureState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Capturing => write!(f, "capturing"),
            Self::Complete => write!(f, "complete"),
        }
    }
}

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// A frame was stored; capture continues.
    Collected { collected: usize },
    /// No frame was available; nothing was counted.
    Skipped,
    /// The final frame was stored and the session is now complete.
    Completed,
    /// The session was not capturing; the tick had no effect.
    Ignored,
}

/// One accepted capture sample.
#[derive(Debug, Clone)]
pub struct CaptureSample {
    /// Zero-based position in the session.
    pub index: usize,
    pub frame: Frame,
}

/// Everything needed to embed and enroll a completed capture.
#[derive(Debug, Clone)]
pub struct EnrollmentPayload {
    pub fields: NewIdentity,
    /// Samples in capture order; exactly `target` of them.
    pub samples: Vec<Frame>,
}

/// Snapshot of a session published to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CaptureProgress {
    pub state: CaptureState,
    pub collected: usize,
    pub target: usize,
}

/// Synchronous capture state machine.
#[derive(Debug)]
pub struct CaptureSession {
    state: CaptureState,
    target: usize,
    fields: Option<NewIdentity>,
    samples: Vec<CaptureSample>,
    /// Bumped on every start/stop/reset so stale timers can be recognised.
    epoch: u64,
}

impl CaptureSession {
    pub fn new(target: usize) -> Result<Self> {
        if target == 0 {
            return Err(LiveIdError::InvalidInput(
                "Capture target must be positive".into(),
            ));
        }
        Ok(Self {
            state: CaptureState::Idle,
            target,
            fields: None,
            samples: Vec::with_capacity(target),
            epoch: 0,
        })
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn target(&self) -> usize {
        self.target
    }

    pub fn collected(&self) -> usize {
        self.samples.len()
    }

    pub fn samples(&self) -> &[CaptureSample] {
        &self.samples
    }

    pub fn fields(&self) -> Option<&NewIdentity> {
        self.fields.as_ref()
    }

    /// Idle with samples left over from a stopped capture.
    pub fn is_partial(&self) -> bool {
        self.state == CaptureState::Idle && !self.samples.is_empty()
    }

    pub fn progress(&self) -> CaptureProgress {
        CaptureProgress {
            state: self.state,
            collected: self.samples.len(),
            target: self.target,
        }
    }

    /// Begin a new capture. Requires a name and an external reference.
    pub fn start(&mut self, fields: NewIdentity) -> Result<()> {
        fields.validate()?;
        if self.state != CaptureState::Idle {
            return Err(LiveIdError::CaptureNotIdle { state: self.state });
        }

        self.samples.clear();
        self.fields = Some(fields);
        self.state = CaptureState::Capturing;
        self.epoch += 1;
        Ok(())
    }

    /// Acquire one frame from `source` and record it.
    pub fn tick(&mut self, source: &dyn FrameSource) -> TickOutcome {
        if self.state != CaptureState::Capturing {
            return TickOutcome::Ignored;
        }
        self.record(source.get_frame())
    }

    /// Record the result of one acquisition (`None` = no frame available).
    pub fn record(&mut self, frame: Option<Frame>) -> TickOutcome {
        if self.state != CaptureState::Capturing {
            return TickOutcome::Ignored;
        }
        let Some(frame) = frame else {
            return TickOutcome::Skipped;
        };

        self.samples.push(CaptureSample {
            index: self.samples.len(),
            frame,
        });

        if self.samples.len() >= self.target {
            self.state = CaptureState::Complete;
            TickOutcome::Completed
        } else {
            TickOutcome::Collected {
                collected: self.samples.len(),
            }
        }
    }

    /// Halt an ongoing capture, keeping the partial samples.
    ///
    /// Returns `false` (and does nothing) unless the session was capturing.
    pub fn stop(&mut self) -> bool {
        if self.state != CaptureState::Capturing {
            return false;
        }
        self.state = CaptureState::Idle;
        self.epoch += 1;
        true
    }

    /// Discard everything and return to idle. Valid from any state.
    pub fn reset(&mut self) {
        self.state = CaptureState::Idle;
        self.samples.clear();
        self.fields = None;
        self.epoch += 1;
    }

    /// Hand out the completed samples for embedding and enrollment.
    pub fn finalize(&self) -> Result<EnrollmentPayload> {
        match (self.state, &self.fields) {
            (CaptureState::Complete, Some(fields)) => Ok(EnrollmentPayload {
                fields: fields.clone(),
                samples: self.samples.iter().map(|s| s.frame.clone()).collect(),
            }),
            _ => Err(LiveIdError::IncompleteCapture {
                collected: self.samples.len(),
                target: self.target,
            }),
        }
    }

    fn epoch(&self) -> u64 {
        self.epoch
    }
}

/// Drives a [`CaptureSession`] at a fixed cadence.
pub struct CaptureController {
    session: Arc<Mutex<CaptureSession>>,
    source: Arc<dyn FrameSource>,
    config: CaptureConfig,
    progress: Arc<watch::Sender<CaptureProgress>>,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

impl CaptureController {
    pub fn new(source: Arc<dyn FrameSource>, config: CaptureConfig) -> Result<Self> {
        if config.interval.is_zero() {
            return Err(LiveIdError::InvalidInput(
                "Capture interval must be positive".into(),
            ));
        }
        let session = CaptureSession::new(config.target)?;
        let (progress, _) = watch::channel(session.progress());
        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            source,
            config,
            progress: Arc::new(progress),
            ticker: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    pub fn progress(&self) -> CaptureProgress {
        self.lock_session().progress()
    }

    pub fn state(&self) -> CaptureState {
        self.lock_session().state()
    }

    /// Frames collected so far, in capture order.
    pub fn samples(&self) -> Vec<CaptureSample> {
        self.lock_session().samples().to_vec()
    }

    /// Watch progress updates (one per state change or stored sample).
    pub fn subscribe(&self) -> watch::Receiver<CaptureProgress> {
        self.progress.subscribe()
    }

    /// Start capturing for `identity` and spawn the cadence task.
    ///
    /// Must be called from within a Tokio runtime.
    #[instrument(level = "info", skip_all, fields(external_ref = %identity.external_ref))]
    pub fn start(&self, identity: NewIdentity) -> Result<()> {
        let epoch = {
            let mut session = self.lock_session();
            session.start(identity)?;
            self.progress.send_replace(session.progress());
            session.epoch()
        };

        let session = Arc::clone(&self.session);
        let source = Arc::clone(&self.source);
        let progress = Arc::clone(&self.progress);
        let cadence = self.config.interval;

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + cadence, cadence);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let (outcome, snapshot) = {
                    let mut session = session.lock().unwrap_or_else(PoisonError::into_inner);
                    if session.epoch() != epoch {
                        break;
                    }
                    let outcome = session.tick(source.as_ref());
                    (outcome, session.progress())
                };

                match outcome {
                    TickOutcome::Collected { collected } => {
                        debug!(collected, target = snapshot.target, "Capture sample stored");
                        progress.send_replace(snapshot);
                    }
                    TickOutcome::Skipped => debug!("No frame available, tick skipped"),
                    TickOutcome::Completed => {
                        info!(samples = snapshot.collected, "Capture complete");
                        progress.send_replace(snapshot);
                        break;
                    }
                    TickOutcome::Ignored => break,
                }
            }
        });

        self.replace_ticker(Some(handle));
        info!(
            target = self.config.target,
            interval_ms = self.config.interval.as_millis() as u64,
            "Capture started"
        );
        Ok(())
    }

    /// Halt an ongoing capture. No-op outside `Capturing`.
    pub fn stop(&self) -> bool {
        let stopped = {
            let mut session = self.lock_session();
            let stopped = session.stop();
            if stopped {
                self.progress.send_replace(session.progress());
            }
            stopped
        };
        self.replace_ticker(None);
        if stopped {
            info!(collected = self.progress.borrow().collected, "Capture stopped");
        }
        stopped
    }

    /// Discard all samples and return to idle. Valid from any state.
    pub fn reset(&self) {
        {
            let mut session = self.lock_session();
            session.reset();
            self.progress.send_replace(session.progress());
        }
        self.replace_ticker(None);
        debug!("Capture reset");
    }

    pub fn finalize(&self) -> Result<EnrollmentPayload> {
        self.lock_session().finalize()
    }

    /// Wait until the session leaves `Capturing` and return the final progress.
    pub async fn wait_until_settled(&self) -> CaptureProgress {
        let mut rx = self.subscribe();
        let settled = rx
            .wait_for(|p| p.state != CaptureState::Capturing)
            .await
            .map(|p| *p);
        // The sender lives as long as `self`, so the channel cannot close here.
        settled.unwrap_or_else(|_| self.progress())
    }

    /// Embed the completed samples and enroll them in `gallery`.
    ///
    /// The first sample becomes the identity's reference image. On success
    /// the session is reset; on failure it stays `Complete` so the caller can
    /// retry or reset explicitly. If the session is reset (or restarted)
    /// while the samples are being embedded, nothing is enrolled and the new
    /// session is left untouched.
    #[instrument(level = "info", skip_all)]
    pub async fn save(
        &self,
        embedder: &dyn EmbeddingExtractor,
        gallery: &Gallery,
    ) -> Result<Arc<Identity>> {
        let (payload, epoch) = {
            let session = self.lock_session();
            (session.finalize()?, session.epoch())
        };
        gallery.check_extractor(embedder)?;

        let mut embeddings = Vec::with_capacity(payload.samples.len());
        for (index, frame) in payload.samples.iter().enumerate() {
            let embedding = embedder.embed(frame).await.map_err(|e| {
                warn!(index, error = %e, "Failed to embed capture sample");
                e
            })?;
            embeddings.push(embedding);
        }

        let reference = payload.samples.first().cloned();
        let mut session = self.lock_session();
        if session.epoch() != epoch {
            warn!(
                external_ref = %payload.fields.external_ref,
                "Capture reset during save, enrollment discarded"
            );
            return Err(LiveIdError::CaptureSuperseded);
        }
        let identity = gallery.enroll_with_sample(payload.fields, embeddings, reference)?;
        session.reset();
        self.progress.send_replace(session.progress());
        drop(session);

        self.replace_ticker(None);
        debug!("Capture reset after save");
        Ok(identity)
    }

    fn lock_session(&self) -> MutexGuard<'_, CaptureSession> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn replace_ticker(&self, handle: Option<JoinHandle<()>>) {
        let mut ticker = self.ticker.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = ticker.take() {
            previous.abort();
        }
        *ticker = handle;
    }
}

impl Drop for CaptureController {
    fn drop(&mut self) {
        self.replace_ticker(None);
    }
}

impl std::fmt::Debug for CaptureController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureController")
            .field("progress", &self.progress())
            .field("config", &self.config)
            .finish()
    }
}

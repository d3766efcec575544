use thiserror::Error;

use crate::capture::CaptureState;

#[derive(Error, Debug)]
pub enum LiveIdError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Identity with external reference '{external_ref}' is already enrolled")]
    DuplicateIdentity { external_ref: String },

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Gallery has no enrolled identities")]
    EmptyGallery,

    #[error("Capture incomplete: {collected}/{target} samples collected")]
    IncompleteCapture { collected: usize, target: usize },

    #[error("Capture session is not idle (state: {state})")]
    CaptureNotIdle { state: CaptureState },

    #[error("Capture session was reset while its samples were being saved")]
    CaptureSuperseded,

    #[error("A verification attempt is already in progress")]
    AlreadyInProgress,

    #[error("Camera yielded no frame")]
    NoFrame,

    #[error("Verification attempt was reset before it completed")]
    AttemptCancelled,

    #[error("Embedding error: {0}")]
    EmbeddingError(String),

    #[error("Liveness classifier error: {0}")]
    ClassifierError(String),

    #[error("Identity store error: {0}")]
    StoreError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Image error: {0}")]
    ImageError(String),

    #[cfg(feature = "network")]
    #[error("HTTP request error: {0}")]
    HttpError(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, LiveIdError>;

impl From<serde_json::Error> for LiveIdError {
    fn from(err: serde_json::Error) -> Self {
        LiveIdError::SerializationError(err.to_string())
    }
}

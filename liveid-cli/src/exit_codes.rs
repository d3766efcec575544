//! Exit codes following sysexits.h conventions.
//!
//! Kiosk scripts branch on these to tell a denied person apart from a
//! broken camera feed or an unreachable liveness service.

use liveid_core::LiveIdError;

/// Successful execution.
pub const SUCCESS: i32 = 0;

/// General error (catch-all).
pub const GENERAL_ERROR: i32 = 1;

/// Command line usage error (invalid arguments).
/// Maps to EX_USAGE from sysexits.h.
pub const USAGE_ERROR: i32 = 64;

/// Access denied (spoof, unknown face) or inconsistent gallery data.
/// Maps to EX_DATAERR from sysexits.h.
pub const ACCESS_DENIED: i32 = 65;

/// Cannot open or decode input frames.
/// Maps to EX_NOINPUT from sysexits.h.
pub const INPUT_ERROR: i32 = 66;

/// Liveness classifier or embedding service unavailable.
/// Maps to EX_UNAVAILABLE from sysexits.h.
pub const UNAVAILABLE: i32 = 69;

/// Gallery snapshot could not be read or written.
/// Maps to EX_IOERR from sysexits.h.
pub const IO_ERROR: i32 = 74;

/// Represents an exit code with optional error context.
pub struct ExitCode {
    pub code: i32,
    pub message: Option<String>,
}

impl ExitCode {
    pub fn from_anyhow(err: &anyhow::Error) -> Self {
        let message = format!("{err:#}");

        // Typed pipeline errors first, then the CLI's own context messages
        let code = match err
            .chain()
            .find_map(|cause| cause.downcast_ref::<LiveIdError>())
        {
            Some(core) => classify(core),
            None if message.contains("Access denied") => ACCESS_DENIED,
            None if message.contains("Identification failed") => UNAVAILABLE,
            None if message.contains("Failed to read") => INPUT_ERROR,
            None if message.contains("Failed to write") => IO_ERROR,
            None => GENERAL_ERROR,
        };

        Self {
            code,
            message: Some(message),
        }
    }
}

fn classify(err: &LiveIdError) -> i32 {
    match err {
        LiveIdError::InvalidInput(_) | LiveIdError::ImageError(_) | LiveIdError::NoFrame => {
            INPUT_ERROR
        }
        LiveIdError::DuplicateIdentity { .. }
        | LiveIdError::DimensionMismatch { .. }
        | LiveIdError::IncompleteCapture { .. } => ACCESS_DENIED,
        LiveIdError::ClassifierError(_)
        | LiveIdError::EmbeddingError(_)
        | LiveIdError::HttpError(_) => UNAVAILABLE,
        LiveIdError::StoreError(_) | LiveIdError::SerializationError(_) => IO_ERROR,
        _ => GENERAL_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, Context};

    #[test]
    fn test_core_errors_classified_through_context() {
        let err = Err::<(), _>(LiveIdError::StoreError("disk full".into()))
            .context("Failed to save gallery")
            .unwrap_err();
        let exit = ExitCode::from_anyhow(&err);
        assert_eq!(exit.code, IO_ERROR);
        assert!(exit.message.unwrap().contains("disk full"));

        let err = anyhow::Error::new(LiveIdError::ImageError("bad".into()));
        assert_eq!(ExitCode::from_anyhow(&err).code, INPUT_ERROR);

        let err = anyhow::Error::new(LiveIdError::ClassifierError("down".into()));
        assert_eq!(ExitCode::from_anyhow(&err).code, UNAVAILABLE);

        let err = anyhow::Error::new(LiveIdError::DuplicateIdentity {
            external_ref: "E-1".into(),
        });
        assert_eq!(ExitCode::from_anyhow(&err).code, ACCESS_DENIED);
    }

    #[test]
    fn test_cli_messages_classified() {
        assert_eq!(
            ExitCode::from_anyhow(&anyhow!("Access denied: spoof detected")).code,
            ACCESS_DENIED
        );
        assert_eq!(
            ExitCode::from_anyhow(&anyhow!("Identification failed: model offline")).code,
            UNAVAILABLE
        );
        assert_eq!(
            ExitCode::from_anyhow(&anyhow!("something odd")).code,
            GENERAL_ERROR
        );
    }
}

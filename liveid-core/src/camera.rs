//! Frame sources (the camera capability).
//!
//! Frame acquisition is synchronous and non-suspending: a source either has a
//! frame ready or it does not. Missing frames are not errors at this layer;
//! callers decide whether to skip (capture) or fail (verification).

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use tracing::{debug, warn};

use crate::error::{LiveIdError, Result};
use crate::frame::{mime_type_for_path, Frame};

/// A camera-like capability yielding frames on demand.
///
/// Implementations must be thread-safe (`Send + Sync`) because the capture
/// cadence task and the verification orchestrator may share one source.
pub trait FrameSource: Send + Sync {
    /// Grab the current frame, or `None` if no frame is available right now.
    fn get_frame(&self) -> Option<Frame>;
}

/// Always yields the same image. Useful for verifying a single still.
#[derive(Debug, Clone)]
pub struct StaticFrameSource {
    frame: Frame,
}

impl StaticFrameSource {
    pub fn new(frame: Frame) -> Self {
        Self { frame }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        Ok(Self::new(Frame::from_path(path)?))
    }
}

impl FrameSource for StaticFrameSource {
    fn get_frame(&self) -> Option<Frame> {
        Some(self.frame.clone())
    }
}

/// Cycles through the image files of a directory in name order.
///
/// Each call reads the next file from disk; unreadable files yield `None`
/// for that call, which the capture loop treats as a skipped tick.
#[derive(Debug)]
pub struct DirectoryFrameSource {
    files: Vec<PathBuf>,
    cursor: AtomicUsize,
}

impl DirectoryFrameSource {
    pub fn new(dir: &Path) -> Result<Self> {
        let entries = std::fs::read_dir(dir).map_err(|e| {
            LiveIdError::InvalidInput(format!("Cannot read frame directory {}: {e}", dir.display()))
        })?;

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && mime_type_for_path(path).is_some())
            .collect();
        files.sort();

        if files.is_empty() {
            return Err(LiveIdError::InvalidInput(format!(
                "No image files found in {}",
                dir.display()
            )));
        }

        debug!(dir = %dir.display(), files = files.len(), "Opened frame directory");
        Ok(Self {
            files,
            cursor: AtomicUsize::new(0),
        })
    }

    /// Number of image files in rotation.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl FrameSource for DirectoryFrameSource {
    fn get_frame(&self) -> Option<Frame> {
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % self.files.len();
        let path = &self.files[index];
        match Frame::from_path(path) {
            Ok(frame) => Some(frame),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping unreadable frame");
                None
            }
        }
    }
}

/// Scripted frame source for tests.
/// WARNING: Do not use in production - replays a fixed sequence.
///
/// Yields the queued entries in order (`None` entries simulate a camera with
/// no frame ready), then falls back to `fallback` once the script runs out.
#[derive(Debug, Default)]
pub struct ScriptedFrameSource {
    script: Mutex<VecDeque<Option<Frame>>>,
    fallback: Option<Frame>,
    calls: AtomicUsize,
}

impl ScriptedFrameSource {
    pub fn new(script: impl IntoIterator<Item = Option<Frame>>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            fallback: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// A source that yields `frame` forever.
    pub fn repeating(frame: Frame) -> Self {
        Self::new([]).with_fallback(frame)
    }

    /// A source that never has a frame.
    pub fn empty() -> Self {
        Self::new([])
    }

    pub fn with_fallback(mut self, frame: Frame) -> Self {
        self.fallback = Some(frame);
        self
    }

    /// How many times `get_frame` has been called.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl FrameSource for ScriptedFrameSource {
    fn get_frame(&self) -> Option<Frame> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        match next {
            Some(entry) => entry,
            None => self.fallback.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(byte: u8) -> Frame {
        Frame::new(vec![byte; 4], "image/png")
    }

    #[test]
    fn test_static_source_always_yields() {
        let source = StaticFrameSource::new(frame(1));
        assert!(source.get_frame().is_some());
        assert!(source.get_frame().is_some());
    }

    #[test]
    fn test_scripted_source_replays_then_falls_back() {
        let source = ScriptedFrameSource::new([Some(frame(1)), None]).with_fallback(frame(9));
        assert_eq!(source.get_frame().unwrap().bytes(), &[1; 4]);
        assert!(source.get_frame().is_none());
        assert_eq!(source.get_frame().unwrap().bytes(), &[9; 4]);
        assert_eq!(source.calls(), 3);
    }

    #[test]
    fn test_empty_source_never_yields() {
        let source = ScriptedFrameSource::empty();
        assert!(source.get_frame().is_none());
    }

    #[test]
    fn test_directory_source_cycles_sorted_images() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.png"), [2u8; 3]).unwrap();
        std::fs::write(dir.path().join("a.png"), [1u8; 3]).unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();

        let source = DirectoryFrameSource::new(dir.path()).unwrap();
        assert_eq!(source.len(), 2);
        assert_eq!(source.get_frame().unwrap().bytes(), &[1; 3]);
        assert_eq!(source.get_frame().unwrap().bytes(), &[2; 3]);
        assert_eq!(source.get_frame().unwrap().bytes(), &[1; 3]);
    }

    #[test]
    fn test_directory_without_images_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"nothing").unwrap();
        assert!(matches!(
            DirectoryFrameSource::new(dir.path()),
            Err(LiveIdError::InvalidInput(_))
        ));
    }
}

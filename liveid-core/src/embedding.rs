//! Feature embeddings and the extractor capability.
//!
//! The gallery compares embeddings with the Euclidean (L2) distance. That
//! choice is fixed for the whole crate; extractors that want cosine behaviour
//! should L2-normalize their output (as [`PixelEmbedder`] does), in which case
//! L2 distance is a monotonic function of cosine distance.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;

use crate::error::{LiveIdError, Result};
use crate::frame::Frame;

/// Fixed-dimension feature vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Embedding(Vec<f32>);

impl Embedding {
    /// Build an embedding, rejecting empty or non-finite vectors.
    pub fn new(values: Vec<f32>) -> Result<Self> {
        if values.is_empty() {
            return Err(LiveIdError::InvalidInput("Embedding must not be empty".into()));
        }
        if let Some(pos) = values.iter().position(|v| !v.is_finite()) {
            return Err(LiveIdError::InvalidInput(format!(
                "Embedding component {pos} is not finite"
            )));
        }
        Ok(Self(values))
    }

    pub fn dim(&self) -> usize {
        self.0.len()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<f32> {
        self.0
    }

    /// Euclidean distance to `other`.
    ///
    /// Fails with `DimensionMismatch` instead of truncating or padding.
    pub fn distance(&self, other: &Embedding) -> Result<f32> {
        if self.dim() != other.dim() {
            return Err(LiveIdError::DimensionMismatch {
                expected: self.dim(),
                actual: other.dim(),
            });
        }
        Ok(squared_l2(&self.0, &other.0).sqrt())
    }
}

impl TryFrom<Vec<f32>> for Embedding {
    type Error = LiveIdError;

    fn try_from(values: Vec<f32>) -> Result<Self> {
        Self::new(values)
    }
}

pub(crate) fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

/// External feature extractor: `embed(image) -> vector`.
///
/// Embedding may be expensive (model inference, remote call), so it is a
/// suspension point of the pipeline.
#[async_trait]
pub trait EmbeddingExtractor: Send + Sync {
    /// Compute the embedding of the face in `frame`.
    async fn embed(&self, frame: &Frame) -> Result<Embedding>;

    /// Dimension of every embedding this extractor produces.
    ///
    /// Checked against a non-empty gallery before any frame is embedded.
    fn dimension(&self) -> usize;
}

#[cfg(feature = "pixel-embedder")]
pub use pixel::PixelEmbedder;

#[cfg(feature = "pixel-embedder")]
mod pixel {
    use async_trait::async_trait;
    use image::imageops::FilterType;
    use tracing::{debug, instrument};

    use super::{Embedding, EmbeddingExtractor};
    use crate::error::{LiveIdError, Result};
    use crate::frame::Frame;

    /// Default side length of the downsampled grayscale grid.
    pub const DEFAULT_GRID_SIZE: u32 = 16;

    /// Deterministic appearance embedder.
    ///
    /// Decodes the frame, converts it to grayscale, resizes it to a
    /// `grid_size × grid_size` thumbnail, mean-centres the intensities and
    /// L2-normalizes the result. It stands in for a neural face model where
    /// none is available; identical images always embed identically.
    #[derive(Debug, Clone)]
    pub struct PixelEmbedder {
        grid_size: u32,
    }

    impl PixelEmbedder {
        pub fn new(grid_size: u32) -> Self {
            Self {
                grid_size: grid_size.max(1),
            }
        }

        /// Synchronous embedding, used by the async trait impl.
        pub fn embed_sync(&self, frame: &Frame) -> Result<Embedding> {
            let img = image::load_from_memory(frame.bytes())
                .map_err(|e| LiveIdError::ImageError(format!("Failed to decode frame: {e}")))?;

            let thumb = img
                .grayscale()
                .resize_exact(self.grid_size, self.grid_size, FilterType::Triangle)
                .to_luma8();

            let mut values: Vec<f32> = thumb.pixels().map(|p| f32::from(p.0[0]) / 255.0).collect();
            let mean = values.iter().sum::<f32>() / values.len() as f32;
            values.iter_mut().for_each(|v| *v -= mean);

            let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
            if norm > f32::EPSILON {
                values.iter_mut().for_each(|v| *v /= norm);
            }

            Embedding::new(values)
        }
    }

    impl Default for PixelEmbedder {
        fn default() -> Self {
            Self::new(DEFAULT_GRID_SIZE)
        }
    }

    #[async_trait]
    impl EmbeddingExtractor for PixelEmbedder {
        #[instrument(level = "debug", skip_all, fields(bytes = frame.len()))]
        async fn embed(&self, frame: &Frame) -> Result<Embedding> {
            let embedding = self.embed_sync(frame)?;
            debug!(dim = embedding.dim(), "Computed pixel embedding");
            Ok(embedding)
        }

        fn dimension(&self) -> usize {
            (self.grid_size * self.grid_size) as usize
        }
    }
}

/// Mock extractor for testing.
/// WARNING: Do not use in production - ignores the image content!
#[derive(Debug)]
pub struct MockEmbedder {
    output: std::result::Result<Embedding, String>,
    gate: Option<Arc<Notify>>,
    calls: AtomicUsize,
}

impl MockEmbedder {
    /// Always returns `embedding`.
    pub fn constant(embedding: Embedding) -> Self {
        Self {
            output: Ok(embedding),
            gate: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Always fails with an `EmbeddingError` carrying `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            output: Err(message.into()),
            gate: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Hold each call until `gate` is notified.
    pub fn with_gate(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// How many frames have been embedded.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingExtractor for MockEmbedder {
    async fn embed(&self, _frame: &Frame) -> Result<Embedding> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.output
            .clone()
            .map_err(LiveIdError::EmbeddingError)
    }

    fn dimension(&self) -> usize {
        match &self.output {
            Ok(embedding) => embedding.dim(),
            Err(_) => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emb(values: &[f32]) -> Embedding {
        Embedding::new(values.to_vec()).unwrap()
    }

    #[test]
    fn test_distance_is_euclidean() {
        let a = emb(&[0.0, 0.0]);
        let b = emb(&[3.0, 4.0]);
        assert!((a.distance(&b).unwrap() - 5.0).abs() < 1e-6);
        assert_eq!(a.distance(&a).unwrap(), 0.0);
    }

    #[test]
    fn test_distance_dimension_mismatch() {
        let err = emb(&[1.0, 2.0]).distance(&emb(&[1.0])).unwrap_err();
        assert!(matches!(
            err,
            LiveIdError::DimensionMismatch {
                expected: 2,
                actual: 1
            }
        ));
    }

    #[test]
    fn test_rejects_empty_and_non_finite() {
        assert!(Embedding::new(vec![]).is_err());
        assert!(Embedding::new(vec![1.0, f32::NAN]).is_err());
        assert!(Embedding::new(vec![f32::INFINITY]).is_err());
    }

    #[tokio::test]
    async fn test_mock_embedder_counts_calls() {
        let embedder = MockEmbedder::constant(emb(&[1.0, 2.0, 3.0]));
        let frame = Frame::new(vec![0u8; 4], "image/png");
        assert_eq!(embedder.embed(&frame).await.unwrap().dim(), 3);
        assert_eq!(embedder.calls(), 1);
        assert_eq!(embedder.dimension(), 3);
    }

    #[tokio::test]
    async fn test_failing_embedder() {
        let embedder = MockEmbedder::failing("model offline");
        let frame = Frame::new(vec![0u8; 4], "image/png");
        let err = embedder.embed(&frame).await.unwrap_err();
        assert!(matches!(err, LiveIdError::EmbeddingError(msg) if msg == "model offline"));
    }

    #[cfg(feature = "pixel-embedder")]
    mod pixel_tests {
        use super::*;
        use image::{ImageBuffer, ImageFormat, Rgb, RgbImage};
        use std::io::Cursor;

        fn encode_png(img: RgbImage) -> Frame {
            let mut buffer = Cursor::new(Vec::new());
            img.write_to(&mut buffer, ImageFormat::Png).unwrap();
            Frame::new(buffer.into_inner(), "image/png")
        }

        fn gradient(width: u32, height: u32, flip: bool) -> Frame {
            let img = ImageBuffer::from_fn(width, height, |x, y| {
                let v = ((x + y) * 255 / (width + height)) as u8;
                Rgb(if flip { [255 - v; 3] } else { [v; 3] })
            });
            encode_png(img)
        }

        #[tokio::test]
        async fn test_pixel_embedder_is_deterministic_and_normalized() {
            let embedder = PixelEmbedder::default();
            let frame = gradient(64, 48, false);
            let a = embedder.embed(&frame).await.unwrap();
            let b = embedder.embed(&frame).await.unwrap();

            assert_eq!(a.dim(), embedder.dimension());
            assert_eq!(a.distance(&b).unwrap(), 0.0);
            let norm: f32 = a.as_slice().iter().map(|v| v * v).sum::<f32>().sqrt();
            assert!((norm - 1.0).abs() < 1e-4);
        }

        #[tokio::test]
        async fn test_pixel_embedder_separates_different_images() {
            let embedder = PixelEmbedder::new(8);
            let a = embedder.embed(&gradient(32, 32, false)).await.unwrap();
            let b = embedder.embed(&gradient(32, 32, true)).await.unwrap();
            assert!(a.distance(&b).unwrap() > 1.0);
        }

        #[tokio::test]
        async fn test_pixel_embedder_rejects_garbage() {
            let embedder = PixelEmbedder::default();
            let frame = Frame::new(b"not an image".to_vec(), "image/jpeg");
            assert!(matches!(
                embedder.embed(&frame).await,
                Err(LiveIdError::ImageError(_))
            ));
        }
    }
}

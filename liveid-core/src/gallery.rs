//! Embedding gallery: enrolled identities and nearest-neighbor matching.
//!
//! # Matching
//!
//! Every reference embedding is a point. [`Gallery::nearest_neighbors`]
//! returns the `k` closest points by Euclidean distance. [`Gallery::classify`]
//! runs a majority vote over the identities owning those points:
//!
//! 1. the identity with the most points among the `k` nearest wins;
//! 2. equal vote counts go to the identity whose closest point is nearer;
//! 3. if that is also equal, the earlier enrollment wins.
//!
//! The winner is reported only if its closest point lies within
//! `max_distance`; otherwise the query is a no-match.
//!
//! # Concurrency
//!
//! The gallery is copy-on-write. Readers take a snapshot (`Arc`) of the
//! current state and never observe a partially inserted identity; enrollment
//! validates and publishes a new snapshot under the write lock.

use std::sync::{Arc, PoisonError, RwLock, Weak};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::embedding::{squared_l2, Embedding, EmbeddingExtractor};
use crate::error::{LiveIdError, Result};
use crate::frame::Frame;
use crate::store::IdentityRecord;

/// Opaque unique handle of an enrolled identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityId(Uuid);

impl IdentityId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for IdentityId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for IdentityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Caller-supplied fields of an identity that is about to be enrolled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewIdentity {
    /// Human-readable name shown on a match.
    pub display_name: String,
    /// External reference (student/employee number). Unique in the gallery.
    pub external_ref: String,
}

impl NewIdentity {
    /// Create identity fields, trimming surrounding whitespace.
    pub fn new(display_name: impl Into<String>, external_ref: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into().trim().to_string(),
            external_ref: external_ref.into().trim().to_string(),
        }
    }

    /// Both fields are required.
    pub fn validate(&self) -> Result<()> {
        if self.display_name.trim().is_empty() {
            return Err(LiveIdError::InvalidInput("Display name is required".into()));
        }
        if self.external_ref.trim().is_empty() {
            return Err(LiveIdError::InvalidInput(
                "External reference is required".into(),
            ));
        }
        Ok(())
    }
}

/// An enrolled identity. Owned by the [`Gallery`]; immutable once enrolled.
#[derive(Debug, Clone)]
pub struct Identity {
    pub id: IdentityId,
    pub display_name: String,
    pub external_ref: String,
    pub enrolled_at: DateTime<Utc>,
    /// Reference embeddings, in capture order. Never empty.
    pub embeddings: Vec<Embedding>,
    /// First captured sample, kept as an avatar.
    pub reference_sample: Option<Frame>,
}

impl Identity {
    pub fn sample_count(&self) -> usize {
        self.embeddings.len()
    }
}

/// One of the `k` nearest reference embeddings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub identity_id: IdentityId,
    pub distance: f32,
}

/// Accepted classification result.
///
/// Holds a non-owning reference: the gallery remains the only owner of the
/// identity record.
#[derive(Debug, Clone)]
pub struct IdentityMatch {
    pub identity: Weak<Identity>,
    pub identity_id: IdentityId,
    pub display_name: String,
    pub external_ref: String,
    /// Closest distance among the winner's contributing embeddings.
    pub distance: f32,
    /// How many of the `k` nearest embeddings belong to the winner.
    pub votes: usize,
}

impl IdentityMatch {
    /// Upgrade to the identity record if the gallery still holds it.
    pub fn upgrade(&self) -> Option<Arc<Identity>> {
        self.identity.upgrade()
    }
}

/// Outcome of [`Gallery::classify`].
#[derive(Debug, Clone)]
pub enum Classification {
    Match(IdentityMatch),
    NoMatch,
}

impl Classification {
    pub fn is_match(&self) -> bool {
        matches!(self, Self::Match(_))
    }

    pub fn as_match(&self) -> Option<&IdentityMatch> {
        match self {
            Self::Match(m) => Some(m),
            Self::NoMatch => None,
        }
    }
}

/// Summary counters for dashboards and the `status` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GalleryStats {
    pub identities: usize,
    pub total_samples: usize,
    pub dimension: Option<usize>,
}

impl GalleryStats {
    /// The gallery can identify someone once at least one identity is enrolled.
    pub fn is_ready(&self) -> bool {
        self.identities > 0
    }
}

#[derive(Debug, Default)]
struct GalleryState {
    identities: Vec<Arc<Identity>>,
    dimension: Option<usize>,
}

impl GalleryState {
    fn check_dimension(&self, actual: usize) -> Result<()> {
        match self.dimension {
            Some(expected) if expected != actual => {
                Err(LiveIdError::DimensionMismatch { expected, actual })
            }
            _ => Ok(()),
        }
    }

    /// Indices into `identities` and distances of the `k` nearest points.
    fn nearest(&self, query: &Embedding, k: usize) -> Vec<(usize, f32)> {
        let mut points: Vec<(usize, f32)> = self
            .identities
            .iter()
            .enumerate()
            .flat_map(|(index, identity)| {
                identity
                    .embeddings
                    .iter()
                    .map(move |e| (index, squared_l2(e.as_slice(), query.as_slice())))
            })
            .collect();

        // Stable sort: equal distances keep enrollment order.
        points.sort_by(|a, b| a.1.total_cmp(&b.1));
        points.truncate(k);
        points
            .into_iter()
            .map(|(index, squared)| (index, squared.sqrt()))
            .collect()
    }
}

/// Thread-safe in-memory collection of enrolled identities.
#[derive(Debug, Default)]
pub struct Gallery {
    state: RwLock<Arc<GalleryState>>,
}

impl Gallery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a gallery from persisted records, re-validating every invariant.
    pub fn from_records(records: Vec<IdentityRecord>) -> Result<Self> {
        let gallery = Self::new();
        for record in records {
            let identity = record.into_identity()?;
            gallery.insert(identity)?;
        }
        info!(identities = gallery.len(), "Gallery restored from records");
        Ok(gallery)
    }

    /// Plain-data snapshot of every identity, in enrollment order.
    pub fn to_records(&self) -> Vec<IdentityRecord> {
        self.snapshot()
            .identities
            .iter()
            .map(|identity| IdentityRecord::from(identity.as_ref()))
            .collect()
    }

    /// Enroll a new identity with its reference embeddings.
    pub fn enroll(&self, fields: NewIdentity, embeddings: Vec<Embedding>) -> Result<Arc<Identity>> {
        self.enroll_with_sample(fields, embeddings, None)
    }

    /// Enroll a new identity, keeping `reference_sample` as its avatar.
    pub fn enroll_with_sample(
        &self,
        fields: NewIdentity,
        embeddings: Vec<Embedding>,
        reference_sample: Option<Frame>,
    ) -> Result<Arc<Identity>> {
        let identity = Identity {
            id: IdentityId::new(),
            display_name: fields.display_name,
            external_ref: fields.external_ref,
            enrolled_at: Utc::now(),
            embeddings,
            reference_sample,
        };
        self.insert(identity)
    }

    fn insert(&self, identity: Identity) -> Result<Arc<Identity>> {
        NewIdentity {
            display_name: identity.display_name.clone(),
            external_ref: identity.external_ref.clone(),
        }
        .validate()?;

        let dim = identity
            .embeddings
            .first()
            .map(Embedding::dim)
            .ok_or_else(|| LiveIdError::InvalidInput("At least one embedding is required".into()))?;

        let mut guard = self.state.write().unwrap_or_else(PoisonError::into_inner);

        if guard
            .identities
            .iter()
            .any(|existing| existing.external_ref == identity.external_ref)
        {
            return Err(LiveIdError::DuplicateIdentity {
                external_ref: identity.external_ref,
            });
        }
        if guard.identities.iter().any(|existing| existing.id == identity.id) {
            return Err(LiveIdError::InvalidInput(format!(
                "Identity id {} is already enrolled",
                identity.id
            )));
        }

        let expected = guard.dimension.unwrap_or(dim);
        for embedding in &identity.embeddings {
            if embedding.dim() != expected {
                return Err(LiveIdError::DimensionMismatch {
                    expected,
                    actual: embedding.dim(),
                });
            }
        }

        let identity = Arc::new(identity);
        let mut identities = guard.identities.clone();
        identities.push(Arc::clone(&identity));
        *guard = Arc::new(GalleryState {
            identities,
            dimension: Some(expected),
        });

        info!(
            identity_id = %identity.id,
            external_ref = %identity.external_ref,
            samples = identity.embeddings.len(),
            dimension = expected,
            "Identity enrolled"
        );
        Ok(identity)
    }

    /// The `k` nearest reference embeddings to `query`, ascending by distance.
    ///
    /// An identity appears once per contributing embedding.
    pub fn nearest_neighbors(&self, query: &Embedding, k: usize) -> Result<Vec<Neighbor>> {
        if k == 0 {
            return Err(LiveIdError::InvalidInput("k must be positive".into()));
        }
        let state = self.snapshot();
        if state.identities.is_empty() {
            return Err(LiveIdError::EmptyGallery);
        }
        state.check_dimension(query.dim())?;

        Ok(state
            .nearest(query, k)
            .into_iter()
            .map(|(index, distance)| Neighbor {
                identity_id: state.identities[index].id,
                distance,
            })
            .collect())
    }

    /// KNN majority-vote classification with a distance acceptance threshold.
    ///
    /// An empty gallery is a no-match, never an error.
    pub fn classify(&self, query: &Embedding, k: usize, max_distance: f32) -> Result<Classification> {
        if k == 0 {
            return Err(LiveIdError::InvalidInput("k must be positive".into()));
        }
        if !max_distance.is_finite() || max_distance < 0.0 {
            return Err(LiveIdError::InvalidInput(format!(
                "max_distance must be a non-negative finite number, got {max_distance}"
            )));
        }

        let state = self.snapshot();
        if state.identities.is_empty() {
            debug!("Classification against empty gallery");
            return Ok(Classification::NoMatch);
        }
        state.check_dimension(query.dim())?;

        let neighbors = state.nearest(query, k);

        // (identity index, votes, best distance), in order of first appearance.
        let mut tally: Vec<(usize, usize, f32)> = Vec::new();
        for (index, distance) in neighbors {
            match tally.iter_mut().find(|(i, _, _)| *i == index) {
                Some(entry) => {
                    entry.1 += 1;
                    entry.2 = entry.2.min(distance);
                }
                None => tally.push((index, 1, distance)),
            }
        }

        let winner = tally.into_iter().reduce(|best, candidate| {
            let better = candidate.1 > best.1
                || (candidate.1 == best.1 && candidate.2 < best.2)
                || (candidate.1 == best.1 && candidate.2 == best.2 && candidate.0 < best.0);
            if better {
                candidate
            } else {
                best
            }
        });

        let Some((index, votes, distance)) = winner else {
            return Ok(Classification::NoMatch);
        };
        let identity = &state.identities[index];

        if distance > max_distance {
            debug!(
                identity_id = %identity.id,
                distance,
                max_distance,
                votes,
                "Nearest identity outside acceptance threshold"
            );
            return Ok(Classification::NoMatch);
        }

        debug!(identity_id = %identity.id, distance, votes, "Identity matched");
        Ok(Classification::Match(IdentityMatch {
            identity: Arc::downgrade(identity),
            identity_id: identity.id,
            display_name: identity.display_name.clone(),
            external_ref: identity.external_ref.clone(),
            distance,
            votes,
        }))
    }

    pub fn get(&self, id: IdentityId) -> Option<Arc<Identity>> {
        self.snapshot()
            .identities
            .iter()
            .find(|identity| identity.id == id)
            .cloned()
    }

    pub fn find_by_external_ref(&self, external_ref: &str) -> Option<Arc<Identity>> {
        self.snapshot()
            .identities
            .iter()
            .find(|identity| identity.external_ref == external_ref)
            .cloned()
    }

    /// Every enrolled identity, in enrollment order.
    pub fn identities(&self) -> Vec<Arc<Identity>> {
        self.snapshot().identities.clone()
    }

    pub fn len(&self) -> usize {
        self.snapshot().identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().identities.is_empty()
    }

    /// Embedding dimension fixed by the first enrollment.
    pub fn dimension(&self) -> Option<usize> {
        self.snapshot().dimension
    }

    /// Reject an extractor whose vectors this gallery could never accept.
    ///
    /// An empty gallery has no fixed dimension yet and accepts any extractor.
    pub fn check_extractor(&self, embedder: &dyn EmbeddingExtractor) -> Result<()> {
        match self.dimension() {
            Some(expected) if embedder.dimension() != expected => {
                Err(LiveIdError::DimensionMismatch {
                    expected,
                    actual: embedder.dimension(),
                })
            }
            _ => Ok(()),
        }
    }

    pub fn stats(&self) -> GalleryStats {
        let state = self.snapshot();
        GalleryStats {
            identities: state.identities.len(),
            total_samples: state.identities.iter().map(|i| i.sample_count()).sum(),
            dimension: state.dimension,
        }
    }

    fn snapshot(&self) -> Arc<GalleryState> {
        Arc::clone(&self.state.read().unwrap_or_else(PoisonError::into_inner))
    }
}

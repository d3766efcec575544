//! Persistence of enrolled identities.
//!
//! The pipeline itself is in-memory. Surviving a restart is the job of an
//! [`IdentityStore`], which saves and loads plain-data [`IdentityRecord`]
//! snapshots. Two backends are provided:
//!
//! - [`JsonFileStore`]: a JSON snapshot on disk, replaced atomically.
//! - [`MemoryStore`]: keeps the snapshot in memory (tests, ephemeral sessions).

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::embedding::Embedding;
use crate::error::{LiveIdError, Result};
use crate::frame::Frame;
use crate::gallery::{Identity, IdentityId};

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Plain-data representation of an enrolled identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub id: IdentityId,
    pub display_name: String,
    pub external_ref: String,
    pub enrolled_at: DateTime<Utc>,
    pub embeddings: Vec<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_sample: Option<Frame>,
}

impl IdentityRecord {
    /// Convert back into a gallery identity, validating embeddings.
    pub fn into_identity(self) -> Result<Identity> {
        let embeddings = self
            .embeddings
            .into_iter()
            .map(Embedding::new)
            .collect::<Result<Vec<_>>>()?;

        Ok(Identity {
            id: self.id,
            display_name: self.display_name,
            external_ref: self.external_ref,
            enrolled_at: self.enrolled_at,
            embeddings,
            reference_sample: self.reference_sample,
        })
    }
}

impl From<&Identity> for IdentityRecord {
    fn from(identity: &Identity) -> Self {
        Self {
            id: identity.id,
            display_name: identity.display_name.clone(),
            external_ref: identity.external_ref.clone(),
            enrolled_at: identity.enrolled_at,
            embeddings: identity
                .embeddings
                .iter()
                .map(|e| e.as_slice().to_vec())
                .collect(),
            reference_sample: identity.reference_sample.clone(),
        }
    }
}

/// On-disk snapshot envelope.
#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    saved_at: DateTime<Utc>,
    identities: Vec<IdentityRecord>,
}

/// Save/load collaborator for the gallery's contents.
pub trait IdentityStore: Send + Sync {
    /// Load every persisted identity. An absent store loads as empty.
    fn load(&self) -> Result<Vec<IdentityRecord>>;

    /// Replace the persisted snapshot with `records`.
    fn save(&self, records: &[IdentityRecord]) -> Result<()>;
}

/// JSON snapshot file.
///
/// Saves write to a sibling temporary file first and then rename it over the
/// target, so a crash mid-save leaves the previous snapshot intact.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "gallery".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl IdentityStore for JsonFileStore {
    fn load(&self) -> Result<Vec<IdentityRecord>> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No gallery snapshot yet");
                return Ok(Vec::new());
            }
            Err(e) => {
                return Err(LiveIdError::StoreError(format!(
                    "Failed to read {}: {e}",
                    self.path.display()
                )))
            }
        };

        let snapshot: Snapshot = serde_json::from_slice(&bytes)?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(LiveIdError::StoreError(format!(
                "Unsupported snapshot version {} (expected {SNAPSHOT_VERSION})",
                snapshot.version
            )));
        }

        info!(
            path = %self.path.display(),
            identities = snapshot.identities.len(),
            "Loaded gallery snapshot"
        );
        Ok(snapshot.identities)
    }

    fn save(&self, records: &[IdentityRecord]) -> Result<()> {
        let snapshot = Snapshot {
            version: SNAPSHOT_VERSION,
            saved_at: Utc::now(),
            identities: records.to_vec(),
        };
        let json = serde_json::to_vec_pretty(&snapshot)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                LiveIdError::StoreError(format!("Failed to create {}: {e}", parent.display()))
            })?;
        }

        let tmp = self.temp_path();
        std::fs::write(&tmp, json).map_err(|e| {
            LiveIdError::StoreError(format!("Failed to write {}: {e}", tmp.display()))
        })?;
        std::fs::rename(&tmp, &self.path).map_err(|e| {
            warn!(path = %tmp.display(), error = %e, "Rename of gallery snapshot failed");
            let _ = std::fs::remove_file(&tmp);
            LiveIdError::StoreError(format!("Failed to replace {}: {e}", self.path.display()))
        })?;

        info!(path = %self.path.display(), identities = records.len(), "Saved gallery snapshot");
        Ok(())
    }
}

/// In-memory store for testing and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<Vec<IdentityRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdentityStore for MemoryStore {
    fn load(&self) -> Result<Vec<IdentityRecord>> {
        Ok(self
            .records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn save(&self, records: &[IdentityRecord]) -> Result<()> {
        *self.records.lock().unwrap_or_else(PoisonError::into_inner) = records.to_vec();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gallery::{Gallery, NewIdentity};

    fn emb(values: &[f32]) -> Embedding {
        Embedding::new(values.to_vec()).unwrap()
    }

    fn sample_gallery() -> Gallery {
        let gallery = Gallery::new();
        gallery
            .enroll_with_sample(
                NewIdentity::new("Alice", "2024001"),
                vec![emb(&[0.1, 0.2]), emb(&[0.2, 0.1])],
                Some(Frame::new(vec![7u8; 12], "image/png")),
            )
            .unwrap();
        gallery
            .enroll(NewIdentity::new("Bob", "2024002"), vec![emb(&[0.9, 0.8])])
            .unwrap();
        gallery
    }

    #[test]
    fn test_json_store_failed_replace_removes_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("gallery.json");
        // A non-empty directory cannot be replaced by a file.
        std::fs::create_dir_all(target.join("occupied")).unwrap();
        let store = JsonFileStore::new(&target);

        let err = store.save(&sample_gallery().to_records()).unwrap_err();
        assert!(matches!(err, LiveIdError::StoreError(msg) if msg.contains("Failed to replace")));
        assert!(!dir.path().join("gallery.json.tmp").exists());
        assert!(target.join("occupied").is_dir());
    }

    #[test]
    fn test_json_store_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("gallery.json"));
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_json_store_restores_gallery() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("nested").join("gallery.json"));
        let gallery = sample_gallery();
        store.save(&gallery.to_records()).unwrap();

        let restored = Gallery::from_records(store.load().unwrap()).unwrap();
        assert_eq!(restored.len(), 2);
        assert_eq!(restored.dimension(), Some(2));

        let alice = restored.find_by_external_ref("2024001").unwrap();
        let original = gallery.find_by_external_ref("2024001").unwrap();
        assert_eq!(alice.id, original.id);
        assert_eq!(alice.enrolled_at, original.enrolled_at);
        assert_eq!(alice.embeddings, original.embeddings);
        assert_eq!(
            alice.reference_sample.as_ref().unwrap().bytes(),
            &[7u8; 12]
        );
        assert!(!dir.path().join("nested").join("gallery.json.tmp").exists());
    }

    #[test]
    fn test_json_store_rejects_unknown_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gallery.json");
        std::fs::write(
            &path,
            r#"{"version": 99, "saved_at": "2024-01-01T00:00:00Z", "identities": []}"#,
        )
        .unwrap();
        assert!(matches!(
            JsonFileStore::new(path).load(),
            Err(LiveIdError::StoreError(_))
        ));
    }

    #[test]
    fn test_json_store_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gallery.json");
        std::fs::write(&path, b"{not json").unwrap();
        assert!(matches!(
            JsonFileStore::new(path).load(),
            Err(LiveIdError::SerializationError(_))
        ));
    }

    #[test]
    fn test_restore_revalidates_invariants() {
        let mut records = sample_gallery().to_records();
        records[1].external_ref = records[0].external_ref.clone();
        assert!(matches!(
            Gallery::from_records(records),
            Err(LiveIdError::DuplicateIdentity { .. })
        ));

        let mut records = sample_gallery().to_records();
        records[1].embeddings = vec![vec![1.0, 2.0, 3.0]];
        assert!(matches!(
            Gallery::from_records(records),
            Err(LiveIdError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();
        store.save(&sample_gallery().to_records()).unwrap();
        assert_eq!(store.load().unwrap().len(), 2);
    }
}

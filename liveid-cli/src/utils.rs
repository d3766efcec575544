//! Common utility functions shared across CLI commands.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use liveid_core::{Gallery, IdentityId, IdentityStore, JsonFileStore};
use tracing::debug;

/// Open the gallery snapshot at `path`. A missing file is an empty gallery.
pub fn load_gallery(path: &Path) -> Result<(JsonFileStore, Gallery)> {
    let store = JsonFileStore::new(path);
    let records = store
        .load()
        .with_context(|| format!("Failed to load gallery: {}", path.display()))?;
    let gallery = Gallery::from_records(records)
        .with_context(|| format!("Gallery snapshot is inconsistent: {}", path.display()))?;
    debug!(path = %path.display(), identities = gallery.len(), "Gallery loaded");
    Ok((store, gallery))
}

/// Persist the whole gallery.
pub fn save_gallery(store: &JsonFileStore, gallery: &Gallery) -> Result<()> {
    store
        .save(&gallery.to_records())
        .with_context(|| format!("Failed to save gallery: {}", store.path().display()))
}

/// Format a timestamp as a human-readable UTC string.
pub fn format_datetime(at: &DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

/// First block of the UUID, enough to tell identities apart on screen.
pub fn short_id(id: &IdentityId) -> String {
    id.to_string().chars().take(8).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use liveid_core::{Embedding, NewIdentity};
    use tempfile::TempDir;

    #[test]
    fn test_format_datetime() {
        let at = Utc.with_ymd_and_hms(2024, 1, 15, 12, 30, 45).unwrap();
        assert_eq!(format_datetime(&at), "2024-01-15 12:30:45 UTC");
    }

    #[test]
    fn test_short_id() {
        let id = IdentityId::new();
        let short = short_id(&id);
        assert_eq!(short.len(), 8);
        assert!(id.to_string().starts_with(&short));
    }

    #[test]
    fn test_missing_gallery_loads_empty_and_round_trips() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("gallery.json");

        let (store, gallery) = load_gallery(&path).unwrap();
        assert!(gallery.is_empty());

        gallery
            .enroll(
                NewIdentity::new("Ada", "EMP-1"),
                vec![Embedding::new(vec![1.0, 0.0]).unwrap()],
            )
            .unwrap();
        save_gallery(&store, &gallery).unwrap();

        let (_, reloaded) = load_gallery(&path).unwrap();
        assert_eq!(reloaded.len(), 1);
        assert!(reloaded.find_by_external_ref("EMP-1").is_some());
    }
}

//! Per-target snapshot persistence.
//!
//! A snapshot is the newest-first item list a previous run left behind; its
//! head timestamp is the next run's incremental cutoff. Snapshots live as
//! one JSON file per target under the state directory, named
//! `{content_type}_{resolved_id}.json`.

use std::fs;
use std::io::{BufWriter, ErrorKind};
use std::path::{Path, PathBuf};

use tracing::{debug, instrument};

use crate::collect::ContentItem;
use crate::target::Target;

use super::PlanError;

/// Loads and persists per-target snapshots under one state directory.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    state_dir: PathBuf,
}

impl SnapshotStore {
    #[must_use]
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
        }
    }

    /// Snapshot file path for `target`.
    #[must_use]
    pub fn snapshot_path(&self, target: &Target) -> PathBuf {
        self.state_dir.join(format!(
            "{}_{}.json",
            target.content_type,
            safe_file_stem(&target.resolved_id)
        ))
    }

    /// Task manifest path for `target`.
    #[must_use]
    pub fn manifest_path(&self, target: &Target) -> PathBuf {
        self.state_dir.join(format!(
            "{}_{}.tasks.json",
            target.content_type,
            safe_file_stem(&target.resolved_id)
        ))
    }

    /// Loads the prior snapshot for `target`. A missing file is an empty
    /// snapshot, not an error.
    ///
    /// # Errors
    ///
    /// Returns [`PlanError`] on unreadable or undecodable snapshot files.
    #[instrument(level = "debug", skip(self), fields(target = %target.resolved_id))]
    pub fn load(&self, target: &Target) -> Result<Vec<ContentItem>, PlanError> {
        let path = self.snapshot_path(target);
        let raw = match fs::read(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "no prior snapshot");
                return Ok(Vec::new());
            }
            Err(err) => return Err(err.into()),
        };
        let items: Vec<ContentItem> = serde_json::from_slice(&raw)?;
        debug!(path = %path.display(), items = items.len(), "snapshot loaded");
        Ok(items)
    }

    /// Writes `items` as the snapshot for `target`, replacing any prior one.
    ///
    /// Writes to a scratch file and renames so a crash never leaves a
    /// half-written snapshot behind.
    ///
    /// # Errors
    ///
    /// Returns [`PlanError`] on I/O or serialization failure.
    #[instrument(level = "debug", skip(self, items), fields(target = %target.resolved_id, items = items.len()))]
    pub fn persist(&self, target: &Target, items: &[ContentItem]) -> Result<(), PlanError> {
        let path = self.snapshot_path(target);
        write_json_atomic(&path, items)
    }
}

/// Serializes `value` to `path` via a sibling scratch file and rename.
pub(super) fn write_json_atomic<T: serde::Serialize + ?Sized>(
    path: &Path,
    value: &T,
) -> Result<(), PlanError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    let scratch = path.with_extension("json.tmp");
    let file = fs::File::create(&scratch)?;
    let write_result = serde_json::to_writer_pretty(BufWriter::new(file), value);
    if let Err(err) = write_result {
        let _ = fs::remove_file(&scratch);
        return Err(err.into());
    }
    fs::rename(&scratch, path)?;
    Ok(())
}

/// Merges a run's items with the prior snapshot, newest-first, keeping the
/// first occurrence of each id. New items win over prior ones.
#[must_use]
pub fn merge(new_items: &[ContentItem], prior: &[ContentItem]) -> Vec<ContentItem> {
    let mut seen = std::collections::HashSet::new();
    new_items
        .iter()
        .chain(prior)
        .filter(|item| seen.insert(item.id.clone()))
        .cloned()
        .collect()
}

/// Target ids can be search keywords; keep the file stem filesystem-safe.
fn safe_file_stem(id: &str) -> String {
    let mut out = String::with_capacity(id.len());
    for ch in id.chars() {
        if ch.is_alphanumeric() || matches!(ch, '-' | '_' | '.') {
            out.push(ch);
        } else {
            out.push('_');
        }
    }
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::collect::ItemKind;
    use crate::target::ContentType;
    use tempfile::TempDir;

    fn item(id: &str, time: i64) -> ContentItem {
        ContentItem {
            id: id.to_string(),
            kind: ItemKind::Video,
            description: format!("desc {id}"),
            created_at: time,
            author: None,
            cover_url: None,
            media_urls: Some(vec![format!("https://m.test/{id}")]),
            duration: None,
            raw_type_code: 0,
            pinned: false,
        }
    }

    fn target() -> Target {
        Target::resolve("MS4wLjABAAAAstore", Some(ContentType::Post)).unwrap()
    }

    #[test]
    fn test_load_missing_snapshot_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path());
        assert!(store.load(&target()).unwrap().is_empty());
    }

    #[test]
    fn test_persist_then_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path());
        let items = vec![item("b", 20), item("a", 10)];
        store.persist(&target(), &items).unwrap();
        assert_eq!(store.load(&target()).unwrap(), items);
    }

    #[test]
    fn test_persist_creates_state_dir() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path().join("nested/state"));
        store.persist(&target(), &[item("a", 1)]).unwrap();
        assert_eq!(store.load(&target()).unwrap().len(), 1);
    }

    #[test]
    fn test_merge_prefers_new_items_and_dedups() {
        let prior = vec![item("b", 20), item("a", 10)];
        let mut newer_b = item("b", 20);
        newer_b.description = "updated".to_string();
        let new_items = vec![item("c", 30), newer_b];

        let merged = merge(&new_items, &prior);
        assert_eq!(
            merged.iter().map(|i| i.id.as_str()).collect::<Vec<_>>(),
            ["c", "b", "a"]
        );
        assert_eq!(merged[1].description, "updated");
    }

    #[test]
    fn test_snapshot_path_is_safe_for_keyword_targets() {
        let store = SnapshotStore::new("state");
        let target = Target::resolve("some keyword/phrase", Some(ContentType::Search)).unwrap();
        let path = store.snapshot_path(&target);
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(!name.contains('/'));
        assert!(!name.contains(' '));
        assert!(name.starts_with("search_"));
    }
}

//! Download planning.
//!
//! Turns a finished collection run into concrete download tasks, skips work
//! that is already on disk, and persists the merged snapshot plus a task
//! manifest so an interrupted batch can be inspected afterwards.

pub mod snapshot;

use std::path::PathBuf;

use chrono::{Local, TimeZone};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::collect::{Collection, ContentItem, ItemKind};
use crate::target::Target;

pub use snapshot::SnapshotStore;

/// Errors from planning and snapshot persistence.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("I/O error in download planner: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Lifecycle of one planned task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Downloading,
    Done,
    Failed,
}

/// One file to fetch: a video, or a single frame of a gallery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadTask {
    /// Id of the item this task belongs to.
    pub item_id: String,
    pub url: String,
    pub dest: PathBuf,
    pub status: TaskStatus,
}

/// Output of one planning pass.
#[derive(Debug)]
pub struct Plan {
    pub target: Target,
    pub tasks: Vec<DownloadTask>,
    /// Items whose destination already existed and were not re-planned.
    pub skipped_existing: usize,
}

/// Plans downloads for finished collection runs.
#[derive(Debug, Clone)]
pub struct DownloadPlanner {
    store: SnapshotStore,
    download_root: PathBuf,
}

impl DownloadPlanner {
    #[must_use]
    pub fn new(store: SnapshotStore, download_root: impl Into<PathBuf>) -> Self {
        Self {
            store,
            download_root: download_root.into(),
        }
    }

    #[must_use]
    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    /// Builds tasks for `collection` and persists snapshot plus manifest.
    ///
    /// `prior` is the snapshot the run was collected against. Account-list
    /// targets produce no tasks; their value is the persisted records.
    /// Planning the same collection twice yields zero new tasks the second
    /// time once the files exist.
    ///
    /// # Errors
    ///
    /// Returns [`PlanError`] on snapshot or manifest persistence failure.
    #[instrument(level = "info", skip(self, collection, prior), fields(target = %collection.target.resolved_id, items = collection.items.len()))]
    pub fn plan(&self, collection: &Collection, prior: &[ContentItem]) -> Result<Plan, PlanError> {
        let target = &collection.target;

        let mut tasks = Vec::new();
        let mut skipped_existing = 0usize;
        if !target.content_type.is_account_list() {
            for item in &collection.items {
                match self.item_tasks(item) {
                    Some(item_tasks) if item_tasks.is_empty() => skipped_existing += 1,
                    Some(item_tasks) => tasks.extend(item_tasks),
                    None => {}
                }
            }
        }

        // Snapshot-keeping targets carry history forward; a truncated run
        // must not overwrite a complete prior snapshot's reach.
        let merged;
        let persisted: &[ContentItem] = if target.content_type.keeps_snapshot() {
            merged = snapshot::merge(&collection.items, prior);
            &merged
        } else {
            &collection.items
        };
        if !persisted.is_empty() {
            self.store.persist(target, persisted)?;
        }
        if !tasks.is_empty() {
            snapshot::write_json_atomic(&self.store.manifest_path(target), &tasks)?;
        }

        info!(
            tasks = tasks.len(),
            skipped_existing, "download plan ready"
        );
        Ok(Plan {
            target: target.clone(),
            tasks,
            skipped_existing,
        })
    }

    /// Tasks for one item. `None` when the item carries no media;
    /// `Some(empty)` when everything is already on disk.
    fn item_tasks(&self, item: &ContentItem) -> Option<Vec<DownloadTask>> {
        let urls = item.media_urls.as_ref().filter(|urls| !urls.is_empty())?;
        let stem = file_stem(item);

        let planned: Vec<DownloadTask> = match item.kind {
            ItemKind::Video => {
                let dest = self.download_root.join(format!("{stem}.mp4"));
                vec![DownloadTask {
                    item_id: item.id.clone(),
                    url: urls[0].clone(),
                    dest,
                    status: TaskStatus::Pending,
                }]
            }
            ItemKind::Gallery => {
                let dir = self.download_root.join(&stem);
                urls.iter()
                    .enumerate()
                    .map(|(index, url)| DownloadTask {
                        item_id: item.id.clone(),
                        url: url.clone(),
                        dest: dir.join(format!("{}_{}.jpeg", item.id, index + 1)),
                        status: TaskStatus::Pending,
                    })
                    .collect()
            }
            ItemKind::Live | ItemKind::Other => return None,
        };

        let remaining: Vec<DownloadTask> = planned
            .into_iter()
            .filter(|task| {
                let exists = task.dest.exists();
                if exists {
                    debug!(dest = %task.dest.display(), "destination exists, skipping");
                }
                !exists
            })
            .collect();
        Some(remaining)
    }
}

/// `{description}_{publish time}` file stem, sanitized for the filesystem.
fn file_stem(item: &ContentItem) -> String {
    let time = Local
        .timestamp_opt(item.created_at, 0)
        .single()
        .map_or_else(
            || "unknown_time".to_string(),
            |t| t.format("%Y-%m-%d_%H-%M-%S").to_string(),
        );
    let desc = sanitize_component(&item.description);
    if desc.is_empty() {
        format!("{}_{time}", item.id)
    } else {
        format!("{desc}_{time}")
    }
}

/// Collapses filesystem-hostile characters to single underscores.
fn sanitize_component(value: &str) -> String {
    let mut out = String::new();
    let mut prev_sep = false;
    for ch in value.chars().take(80) {
        let mapped = match ch {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '\'' => '_',
            c if c.is_whitespace() || c.is_control() => '_',
            c => c,
        };
        if mapped == '_' {
            if !prev_sep {
                out.push('_');
                prev_sep = true;
            }
        } else {
            out.push(mapped);
            prev_sep = false;
        }
    }
    out.trim_matches('_').to_string()
}

//! Paginated incremental collection.
//!
//! A collection run walks one target's feed page by page until the upstream
//! reports no more pages, the incremental cutoff fires, the caller's limit
//! is reached, or repeated failures hit the retry ceiling. The per-endpoint
//! variability (URI, cursor name, list field) lives in [`endpoints`]; payload
//! shape differences live in [`normalize`]. The loop itself is uniform.

pub mod endpoints;
pub mod normalize;

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::session::{ApiError, ApiSession};
use crate::target::Target;

pub use normalize::{ContentItem, ItemAuthor, ItemKind};

/// Engine failures that abort a run instead of truncating it.
#[derive(Debug, Error)]
pub enum CollectError {
    /// The session's credentials were rejected. The run is abandoned and
    /// the caller must re-authenticate before retrying any target.
    #[error("collection aborted, credentials rejected: {source}")]
    Auth {
        #[source]
        source: ApiError,
    },
}

/// Why a collection run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The upstream reported no further pages.
    Exhausted,
    /// An item at or before the prior snapshot's newest timestamp was seen.
    Cutoff,
    /// The caller's item limit was reached.
    LimitReached,
    /// Repeated page failures hit the retry ceiling; the result is partial.
    Aborted,
}

/// Result of one collection run.
#[derive(Debug)]
pub struct Collection {
    pub target: Target,
    /// Newest-first, deduplicated by id.
    pub items: Vec<ContentItem>,
    pub stop: StopReason,
    /// Set when the run stopped early on failures and the items are an
    /// incomplete prefix of the feed.
    pub truncated: bool,
}

/// Shared view of a run's accumulated items.
///
/// Cloning is cheap; a scheduler holds one clone per in-flight run to
/// report progress without touching the engine.
#[derive(Debug, Clone, Default)]
pub struct ProgressHandle {
    items: Arc<Mutex<Vec<ContentItem>>>,
}

impl ProgressHandle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of items accumulated so far.
    #[must_use]
    pub fn collected(&self) -> usize {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn take(&self) -> Vec<ContentItem> {
        std::mem::take(&mut *self.items.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

const DEFAULT_RETRY_CEILING: u32 = 3;
const DEFAULT_PAGE_BACKOFF: Duration = Duration::from_secs(2);

/// Drives collection runs against an [`ApiSession`].
#[derive(Debug, Clone)]
pub struct CollectionEngine {
    retry_ceiling: u32,
    page_backoff: Duration,
}

impl Default for CollectionEngine {
    fn default() -> Self {
        Self {
            retry_ceiling: DEFAULT_RETRY_CEILING,
            page_backoff: DEFAULT_PAGE_BACKOFF,
        }
    }
}

impl CollectionEngine {
    /// Engine with a custom per-run failure ceiling (minimum 1).
    #[must_use]
    pub fn new(retry_ceiling: u32) -> Self {
        Self {
            retry_ceiling: retry_ceiling.max(1),
            ..Self::default()
        }
    }

    /// Overrides the delay between failed-page retries.
    #[must_use]
    pub fn page_backoff(mut self, backoff: Duration) -> Self {
        self.page_backoff = backoff;
        self
    }

    /// Collects `target` up to `limit` items (0 = unlimited), stopping at
    /// the newest timestamp in `prior` when it is non-empty.
    ///
    /// # Errors
    ///
    /// [`CollectError::Auth`] when the upstream rejects the session's
    /// credentials. All other failures truncate rather than error.
    pub async fn collect(
        &self,
        session: &ApiSession,
        target: &Target,
        limit: usize,
        prior: &[ContentItem],
    ) -> Result<Collection, CollectError> {
        self.collect_with_progress(session, target, limit, prior, &ProgressHandle::new())
            .await
    }

    /// [`collect`](Self::collect) with an externally observable item list.
    #[instrument(level = "info", skip(self, session, prior, progress), fields(target = %target.resolved_id, content_type = %target.content_type))]
    pub async fn collect_with_progress(
        &self,
        session: &ApiSession,
        target: &Target,
        limit: usize,
        prior: &[ContentItem],
        progress: &ProgressHandle,
    ) -> Result<Collection, CollectError> {
        let ep = endpoints::spec(target.content_type);
        let mut run = RunState::new(target, limit, prior, progress.clone());

        while run.has_more {
            let parts = endpoints::request_parts(
                target.content_type,
                &target.resolved_id,
                run.cursor,
                &run.search_id,
            );
            let page = session
                .call(ep.uri, &parts.params, parts.body.as_deref())
                .await;

            let payload = match page {
                Ok(payload) => payload,
                Err(source @ ApiError::AuthInvalid { .. }) => {
                    return Err(CollectError::Auth { source });
                }
                Err(err) => {
                    if self.note_failure(&mut run, &err).await {
                        break;
                    }
                    continue;
                }
            };

            let prev_cursor = run.cursor;
            let before = run.progress.collected();
            run.absorb_cursor(&payload);
            if ep.needs_search_id && run.search_id.is_empty()
                && let Some(id) = payload
                    .pointer("/log_pb/impr_id")
                    .and_then(Value::as_str)
            {
                run.search_id = id.to_string();
            }

            let entries = if ep.single_fetch {
                run.has_more = false;
                payload
                    .get("aweme_detail")
                    .filter(|detail| !detail.is_null())
                    .map(std::slice::from_ref)
                    .map(<[Value]>::to_vec)
                    .unwrap_or_default()
            } else {
                page_entries(&payload).cloned().unwrap_or_default()
            };

            if entries.is_empty() {
                if run.has_more {
                    let err = ApiError::Build {
                        reason: "page reported more content but carried no entries".to_string(),
                    };
                    if self.note_failure(&mut run, &err).await {
                        break;
                    }
                }
                continue;
            }

            if let Some(stop) = run.absorb_page(&entries) {
                run.stop = stop;
                run.has_more = false;
            } else if run.has_more
                && run.cursor == prev_cursor
                && run.progress.collected() == before
            {
                // A page that advances neither the cursor nor the item list
                // would repeat forever; count it against the retry ceiling.
                let err = ApiError::Build {
                    reason: "page advanced neither cursor nor items".to_string(),
                };
                if self.note_failure(&mut run, &err).await {
                    break;
                }
                continue;
            } else {
                run.retry_count = 0;
            }
            debug!(collected = run.progress.collected(), cursor = run.cursor, "page absorbed");
        }

        let items = run.progress.take();
        let truncated = run.stop == StopReason::Aborted;
        info!(items = items.len(), stop = ?run.stop, truncated, "collection finished");
        Ok(Collection {
            target: target.clone(),
            items,
            stop: run.stop,
            truncated,
        })
    }

    /// Records one failed page. Returns `true` when the ceiling is hit and
    /// the run must stop with a partial result.
    async fn note_failure(&self, run: &mut RunState, err: &ApiError) -> bool {
        run.retry_count += 1;
        if run.retry_count >= self.retry_ceiling {
            warn!(
                retries = run.retry_count,
                error = %err,
                "retry ceiling reached, keeping partial result"
            );
            run.stop = StopReason::Aborted;
            return true;
        }
        warn!(retry = run.retry_count, error = %err, "page failed, retrying");
        tokio::time::sleep(self.page_backoff * run.retry_count).await;
        false
    }
}

/// First non-empty entry array among the known list fields.
fn page_entries(payload: &Value) -> Option<&Vec<Value>> {
    endpoints::LIST_FIELDS
        .iter()
        .filter_map(|field| payload.get(*field))
        .filter_map(Value::as_array)
        .find(|list| !list.is_empty())
}

/// Mutable state of one run. Appends go through the progress mutex so
/// concurrent readers always see a consistent list.
struct RunState {
    cursor: i64,
    has_more: bool,
    retry_count: u32,
    search_id: String,
    stop: StopReason,
    limit: usize,
    /// Newest prior timestamp; items at or before it end the run.
    watermark: Option<i64>,
    seen: HashSet<String>,
    account_list: bool,
    progress: ProgressHandle,
}

impl RunState {
    fn new(target: &Target, limit: usize, prior: &[ContentItem], progress: ProgressHandle) -> Self {
        Self {
            cursor: 0,
            has_more: true,
            retry_count: 0,
            search_id: String::new(),
            stop: StopReason::Exhausted,
            limit,
            watermark: prior.first().map(|item| item.created_at),
            seen: HashSet::new(),
            account_list: target.content_type.is_account_list(),
            progress,
        }
    }

    /// Advances the cursor and `has_more` from a page payload.
    fn absorb_cursor(&mut self, payload: &Value) {
        self.cursor = endpoints::CURSOR_FIELDS
            .iter()
            .filter_map(|field| payload.get(*field))
            .filter_map(Value::as_i64)
            .find(|cursor| *cursor != 0)
            .unwrap_or(0);
        self.has_more = match payload.get("has_more") {
            Some(Value::Bool(more)) => *more,
            Some(Value::Number(n)) => n.as_i64().unwrap_or(0) != 0,
            _ => false,
        };
    }

    /// Folds one page of raw entries into the accumulated list.
    ///
    /// Returns the stop reason when the limit or the incremental cutoff
    /// fires mid-page; later entries of the page are not processed.
    fn absorb_page(&mut self, entries: &[Value]) -> Option<StopReason> {
        let items = self.progress.items.clone();
        let mut items = items.lock().unwrap_or_else(PoisonError::into_inner);

        for raw in entries {
            if self.limit > 0 && items.len() >= self.limit {
                info!(limit = self.limit, "item limit reached");
                return Some(StopReason::LimitReached);
            }

            let normalized = if self.account_list {
                normalize::normalize_account(raw)
            } else {
                normalize::normalize_item(raw)
            };
            let Some(item) = normalized else {
                debug!("skipping unrecognized entry");
                continue;
            };

            if let Some(watermark) = self.watermark
                && item.created_at <= watermark
            {
                // Pinned entries sort above newer ones and may carry old
                // timestamps; they never end an incremental run.
                if item.pinned {
                    debug!(id = item.id, "skipping already-seen pinned item");
                    continue;
                }
                info!(watermark, "incremental cutoff reached");
                return Some(StopReason::Cutoff);
            }

            if item.kind == ItemKind::Live {
                debug!(id = item.id, "skipping live entry");
                continue;
            }
            if !self.seen.insert(item.id.clone()) {
                continue;
            }
            items.push(item);
        }
        None
    }
}

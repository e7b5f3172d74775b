//! Rolling log of items discovered across monitor cycles.
//!
//! The dashboard reads this log with an author filter and pagination; the
//! scheduler appends to it and flips the downloaded flag as batches finish.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::PoisonError;

use serde::Serialize;
use strsim::jaro_winkler;
use tracing::debug;

use crate::collect::ContentItem;

/// Newest entries kept in memory. Older ones roll off.
const CAPACITY: usize = 1000;

/// Fuzzy author-filter match threshold.
const FUZZY_THRESHOLD: f64 = 0.8;

/// One discovered item with its provenance.
#[derive(Debug, Clone, Serialize)]
pub struct DiscoveredItem {
    pub item: ContentItem,
    /// Display label of the target the item came from.
    pub target_label: String,
    pub target_id: String,
    /// Unix seconds of the cycle that found the item.
    pub discovered_at: i64,
    pub downloaded: bool,
}

/// Filter for [`DiscoveredLog::page`]. Empty filters match everything.
#[derive(Debug, Clone, Default)]
pub struct ItemFilter {
    /// Matches the target label or item author, substring first, then
    /// fuzzy.
    pub author: Option<String>,
    /// `Some(true)` keeps downloaded entries only, `Some(false)` pending
    /// ones.
    pub downloaded: Option<bool>,
}

/// One page of filtered entries.
#[derive(Debug, Serialize)]
pub struct DiscoveredPage {
    pub items: Vec<DiscoveredItem>,
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
    pub total_pages: usize,
}

/// Bounded, thread-safe discovery log.
#[derive(Debug, Default)]
pub struct DiscoveredLog {
    entries: Mutex<VecDeque<DiscoveredItem>>,
}

impl DiscoveredLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends items found for one target, newest-first at the front.
    pub fn record(&self, items: &[ContentItem], target_label: &str, target_id: &str, now: i64) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        for item in items.iter().rev() {
            entries.push_front(DiscoveredItem {
                item: item.clone(),
                target_label: target_label.to_string(),
                target_id: target_id.to_string(),
                discovered_at: now,
                downloaded: false,
            });
        }
        while entries.len() > CAPACITY {
            entries.pop_back();
        }
        debug!(added = items.len(), total = entries.len(), "discoveries recorded");
    }

    /// Marks every entry of `item_id` as downloaded.
    pub fn mark_downloaded(&self, item_id: &str) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        for entry in entries.iter_mut() {
            if entry.item.id == item_id {
                entry.downloaded = true;
            }
        }
    }

    /// Number of entries currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns one page of entries matching `filter`, newest-first.
    /// Pages are 1-based; out-of-range pages come back empty.
    #[must_use]
    pub fn page(&self, filter: &ItemFilter, page: usize, page_size: usize) -> DiscoveredPage {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let filtered: Vec<&DiscoveredItem> = entries
            .iter()
            .filter(|entry| matches_filter(entry, filter))
            .collect();

        let total = filtered.len();
        let page = page.max(1);
        let page_size = page_size.max(1);
        let total_pages = total.div_ceil(page_size);
        let items = filtered
            .into_iter()
            .skip((page - 1) * page_size)
            .take(page_size)
            .cloned()
            .collect();

        DiscoveredPage {
            items,
            total,
            page,
            page_size,
            total_pages,
        }
    }
}

fn matches_filter(entry: &DiscoveredItem, filter: &ItemFilter) -> bool {
    if let Some(wanted) = filter.downloaded
        && entry.downloaded != wanted
    {
        return false;
    }
    let Some(author) = filter.author.as_deref() else {
        return true;
    };
    let author = author.trim();
    if author.is_empty() {
        return true;
    }
    author_matches(&entry.target_label, author)
        || entry
            .item
            .author
            .as_ref()
            .is_some_and(|a| author_matches(&a.nickname, author))
}

/// Case-insensitive substring match, with a fuzzy fallback for typos.
fn author_matches(candidate: &str, query: &str) -> bool {
    let candidate_lower = candidate.to_lowercase();
    let query_lower = query.to_lowercase();
    if candidate_lower.contains(&query_lower) {
        return true;
    }
    jaro_winkler(&candidate_lower, &query_lower) >= FUZZY_THRESHOLD
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::collect::{ItemAuthor, ItemKind};

    fn item(id: &str, nickname: &str) -> ContentItem {
        ContentItem {
            id: id.to_string(),
            kind: ItemKind::Video,
            description: String::new(),
            created_at: 100,
            author: Some(ItemAuthor {
                nickname: nickname.to_string(),
                sec_uid: None,
                avatar_url: None,
            }),
            cover_url: None,
            media_urls: None,
            duration: None,
            raw_type_code: 0,
            pinned: false,
        }
    }

    #[test]
    fn test_record_keeps_newest_first() {
        let log = DiscoveredLog::new();
        log.record(&[item("new", "a"), item("old", "a")], "a", "t1", 1);
        let page = log.page(&ItemFilter::default(), 1, 10);
        assert_eq!(page.items[0].item.id, "new");
        assert_eq!(page.items[1].item.id, "old");
    }

    #[test]
    fn test_capacity_rolls_off_oldest() {
        let log = DiscoveredLog::new();
        for i in 0..(CAPACITY + 5) {
            log.record(&[item(&format!("i{i}"), "a")], "a", "t", 1);
        }
        assert_eq!(log.len(), CAPACITY);
        let page = log.page(&ItemFilter::default(), 1, 1);
        assert_eq!(page.items[0].item.id, format!("i{}", CAPACITY + 4));
    }

    #[test]
    fn test_author_filter_substring_and_fuzzy() {
        let log = DiscoveredLog::new();
        log.record(&[item("1", "Creative Cook")], "Creative Cook", "t1", 1);
        log.record(&[item("2", "Other Person")], "Other Person", "t2", 1);

        let substring = ItemFilter {
            author: Some("cook".to_string()),
            ..ItemFilter::default()
        };
        assert_eq!(log.page(&substring, 1, 10).total, 1);

        // Near-miss spelling still matches through the fuzzy fallback.
        let fuzzy = ItemFilter {
            author: Some("creative cok".to_string()),
            ..ItemFilter::default()
        };
        assert_eq!(log.page(&fuzzy, 1, 10).total, 1);
    }

    #[test]
    fn test_downloaded_filter_tracks_marks() {
        let log = DiscoveredLog::new();
        log.record(&[item("a", "x"), item("b", "x")], "x", "t", 1);
        log.mark_downloaded("a");

        let pending = ItemFilter {
            downloaded: Some(false),
            ..ItemFilter::default()
        };
        let done = ItemFilter {
            downloaded: Some(true),
            ..ItemFilter::default()
        };
        assert_eq!(log.page(&pending, 1, 10).total, 1);
        assert_eq!(log.page(&done, 1, 10).items[0].item.id, "a");
    }

    #[test]
    fn test_pagination_boundaries() {
        let log = DiscoveredLog::new();
        for i in 0..5 {
            log.record(&[item(&format!("i{i}"), "a")], "a", "t", 1);
        }
        let page = log.page(&ItemFilter::default(), 2, 2);
        assert_eq!(page.total, 5);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.items.len(), 2);
        assert!(log.page(&ItemFilter::default(), 9, 2).items.is_empty());
    }
}

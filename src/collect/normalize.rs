//! Raw payload entry to [`ContentItem`] normalization.
//!
//! The upstream returns entries in two shapes depending on which endpoint
//! served them: the web API uses snake_case (`aweme_id`, `create_time`),
//! the server-rendered data uses camelCase (`awemeId`, `createTime`). Every
//! field access here probes both names, snake_case first.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Broad media class of a normalized entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    /// Single video with one playable URL.
    Video,
    /// Image set with one URL per frame.
    Gallery,
    /// Live room entry. Carries no downloadable media.
    Live,
    /// Account record, or an item type code this client does not classify.
    Other,
}

/// Author summary attached to an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemAuthor {
    pub nickname: String,
    pub sec_uid: Option<String>,
    pub avatar_url: Option<String>,
}

/// One normalized entry, independent of the endpoint shape it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: String,
    pub kind: ItemKind,
    pub description: String,
    /// Unix seconds. Zero when the shape carries no timestamp.
    pub created_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<ItemAuthor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_url: Option<String>,
    /// Direct media URLs: one for a video, one per frame for a gallery,
    /// `None` for entries with nothing to download.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_urls: Option<Vec<String>>,
    /// Milliseconds, when the payload reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<i64>,
    /// Upstream type code the [`ItemKind`] was derived from.
    pub raw_type_code: i64,
    /// Pinned entries sort above newer ones and are exempt from the
    /// incremental cutoff.
    #[serde(default)]
    pub pinned: bool,
}

/// Returns the first of `keys` present in `value`.
fn probe<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| value.get(*k))
}

fn probe_str(value: &Value, keys: &[&str]) -> Option<String> {
    probe(value, keys)
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn probe_i64(value: &Value, keys: &[&str]) -> Option<i64> {
    probe(value, keys).and_then(|v| match v {
        Value::Number(n) => n.as_i64(),
        Value::Bool(b) => Some(i64::from(*b)),
        Value::String(s) => s.parse().ok(),
        _ => None,
    })
}

/// Last entry of a `url_list`/`urlList` array inside `value`.
fn last_url(value: &Value) -> Option<String> {
    probe(value, &["url_list", "urlList"])
        .and_then(Value::as_array)
        .and_then(|urls| urls.last())
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Classifies an upstream item type code.
fn classify(type_code: i64) -> ItemKind {
    match type_code {
        code if code <= 66 => ItemKind::Video,
        69 | 107 => ItemKind::Video,
        68 => ItemKind::Gallery,
        101 => ItemKind::Live,
        _ => ItemKind::Other,
    }
}

/// Normalizes one raw feed entry.
///
/// Search endpoints wrap the entry in an `aweme_info` envelope; that is
/// unwrapped first. Returns `None` for entries without an item type code or
/// an id (account records go through [`normalize_account`] instead).
#[must_use]
pub fn normalize_item(raw: &Value) -> Option<ContentItem> {
    let item = raw.get("aweme_info").unwrap_or(raw);

    let raw_type_code = probe_i64(item, &["aweme_type", "awemeType"])?;
    let id = probe_str(item, &["aweme_id", "awemeId"])?;
    let kind = classify(raw_type_code);

    let media_urls = match kind {
        ItemKind::Video => video_url(item).map(|url| vec![url]),
        ItemKind::Gallery => gallery_urls(item),
        ItemKind::Live | ItemKind::Other => None,
    };
    if media_urls.is_none() && matches!(kind, ItemKind::Video | ItemKind::Gallery) {
        debug!(id, raw_type_code, "entry carries no media urls");
    }

    let created_at = probe_i64(item, &["create_time", "createTime"]).unwrap_or(0);
    let pinned = probe_i64(item, &["is_top", "isTop"])
        .or_else(|| item.get("tag").and_then(|t| probe_i64(t, &["is_top", "isTop"])))
        .unwrap_or(0)
        != 0;
    let duration = probe_i64(item, &["duration"]).or_else(|| {
        item.get("video").and_then(|v| probe_i64(v, &["duration"]))
    });

    Some(ContentItem {
        id,
        kind,
        description: probe_str(item, &["desc"]).unwrap_or_default(),
        created_at,
        author: author(item),
        cover_url: cover(item),
        media_urls,
        duration,
        raw_type_code,
        pinned,
    })
}

/// Playable URL for a video entry. Prefers the signed `play_addr` list;
/// falls back to the render-data download URL with its watermark flag
/// cleared.
fn video_url(item: &Value) -> Option<String> {
    let video = item.get("video");
    if let Some(addr) = video.and_then(|v| v.get("play_addr"))
        && let Some(url) = last_url(addr)
    {
        return Some(url);
    }
    item.get("download")
        .and_then(last_url)
        .map(|url| url.replace("watermark=1", "watermark=0"))
}

/// One URL per frame of a gallery entry.
fn gallery_urls(item: &Value) -> Option<Vec<String>> {
    let frames = item.get("images")?.as_array()?;
    let urls: Vec<String> = frames.iter().filter_map(last_url).collect();
    (!urls.is_empty()).then_some(urls)
}

/// Static cover when present, otherwise the protocol-relative dynamic cover.
fn cover(item: &Value) -> Option<String> {
    let video = item.get("video")?;
    if let Some(cover) = video.get("cover")
        && cover.is_object()
        && let Some(url) = last_url(cover)
    {
        return Some(url);
    }
    video
        .get("dynamicCover")
        .and_then(Value::as_str)
        .map(|path| format!("https:{path}"))
}

fn author(item: &Value) -> Option<ItemAuthor> {
    let author = probe(item, &["author", "authorInfo"])?;
    Some(ItemAuthor {
        nickname: probe_str(author, &["nickname"]).unwrap_or_default(),
        sec_uid: probe_str(author, &["sec_uid", "secUid"]),
        avatar_url: probe(author, &["avatar_thumb", "avatarThumb"]).and_then(last_url),
    })
}

/// Normalizes one account record from a follow/fans/user-search list.
///
/// Search endpoints wrap the record in a `user_info` envelope. Accounts map
/// onto [`ContentItem`] with [`ItemKind::Other`], the account id as `id`,
/// and no media.
#[must_use]
pub fn normalize_account(raw: &Value) -> Option<ContentItem> {
    let item = raw.get("user_info").unwrap_or(raw);

    let id = probe_str(item, &["sec_uid", "secUid"])
        .or_else(|| probe_str(item, &["uid"]))?;
    let nickname = probe_str(item, &["nickname"]).unwrap_or_default();

    Some(ContentItem {
        id: id.clone(),
        kind: ItemKind::Other,
        description: probe_str(item, &["signature"]).unwrap_or_default(),
        created_at: probe_i64(item, &["create_time", "createTime"]).unwrap_or(0),
        author: Some(ItemAuthor {
            nickname,
            sec_uid: Some(id),
            avatar_url: probe(item, &["avatar_thumb", "avatarThumb"]).and_then(last_url),
        }),
        cover_url: None,
        media_urls: None,
        duration: None,
        raw_type_code: 0,
        pinned: false,
    })
}

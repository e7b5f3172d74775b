//! Target resolution: turning user input into a typed collection target.
//!
//! A target is an account, feed, search query, or single item the engine
//! collects from. Input may be a full platform URL or a bare identifier;
//! the content type is inferred from the URL path when possible and falls
//! back to a heuristic over the identifier shape otherwise.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};
use url::Url;

/// Base URL of the platform's web frontend.
pub(crate) const WEB_HOST: &str = "https://www.douyin.com";

/// Prefix of the platform's opaque per-user identifiers.
const SEC_UID_PREFIX: &str = "MS4wLjABAAAA";

/// The kind of feed a [`Target`] points at.
///
/// Each variant maps to its own API endpoint, cursor field, and page size
/// via the endpoint table in [`crate::collect::endpoints`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    /// A user's published items.
    Post,
    /// Items a user has liked.
    Like,
    /// Items a user has favorited.
    Favorite,
    /// Accounts a user follows.
    Follow,
    /// A user's followers.
    Fans,
    /// Item search results for a keyword.
    Search,
    /// Items using a piece of music.
    Music,
    /// Items under a hashtag challenge.
    Hashtag,
    /// An episodic collection (mix).
    Collection,
    /// One single item fetched by id.
    SingleItem,
    /// Account search results for a keyword.
    User,
}

impl ContentType {
    /// Returns the snake_case name used in config files and state paths.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Post => "post",
            Self::Like => "like",
            Self::Favorite => "favorite",
            Self::Follow => "follow",
            Self::Fans => "fans",
            Self::Search => "search",
            Self::Music => "music",
            Self::Hashtag => "hashtag",
            Self::Collection => "collection",
            Self::SingleItem => "single_item",
            Self::User => "user",
        }
    }

    /// Whether this type's feed is a list of accounts rather than items.
    #[must_use]
    pub fn is_account_list(&self) -> bool {
        matches!(self, Self::Follow | Self::Fans | Self::User)
    }

    /// Whether this type keeps a rolling incremental snapshot across runs.
    ///
    /// Only the published-items feed persists history; the other feeds are
    /// re-collected from scratch each run.
    #[must_use]
    pub fn keeps_snapshot(&self) -> bool {
        matches!(self, Self::Post)
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "post" => Ok(Self::Post),
            "like" => Ok(Self::Like),
            "favorite" => Ok(Self::Favorite),
            "follow" => Ok(Self::Follow),
            "fans" => Ok(Self::Fans),
            "search" => Ok(Self::Search),
            "music" => Ok(Self::Music),
            "hashtag" => Ok(Self::Hashtag),
            "collection" => Ok(Self::Collection),
            // The platform has two single-item URL forms; both map to one type.
            "video" | "note" | "single_item" => Ok(Self::SingleItem),
            "user" => Ok(Self::User),
            _ => Err(format!("unknown content type: {s}")),
        }
    }
}

/// Errors raised while resolving a target.
///
/// All variants are fatal to the single collection request that supplied
/// the input; they are never retried.
#[derive(Debug, Error)]
pub enum TargetError {
    /// The input could not be mapped to any known target shape.
    #[error("malformed target input: {input} ({reason})")]
    Malformed {
        /// The raw input (truncated for display).
        input: String,
        /// What was wrong with it.
        reason: String,
    },

    /// The input parsed as a URL but points outside the platform.
    #[error("URL host {host} is not a platform host")]
    ForeignHost {
        /// The offending host.
        host: String,
    },
}

impl TargetError {
    fn malformed(input: &str, reason: impl Into<String>) -> Self {
        let mut shown: String = input.chars().take(80).collect();
        if input.chars().count() > 80 {
            shown.push('…');
        }
        Self::Malformed {
            input: shown,
            reason: reason.into(),
        }
    }
}

/// A resolved collection target. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    /// The input exactly as the user supplied it.
    pub raw_input: String,
    /// Platform identifier extracted from the input (sec-uid, numeric id,
    /// or search keyword).
    pub resolved_id: String,
    /// The feed type this target collects.
    pub content_type: ContentType,
    /// Canonical web URL for the target.
    pub canonical_url: String,
}

impl Target {
    /// Resolves user input into a [`Target`].
    ///
    /// `hint` is the caller's configured content type; it is honored where
    /// the input is ambiguous and overridden where the URL path names a
    /// different type (single items, music, hashtags, collections, search).
    ///
    /// # Errors
    ///
    /// Returns [`TargetError::Malformed`] when the input fits no known
    /// shape, or [`TargetError::ForeignHost`] for URLs outside the platform.
    #[instrument(level = "debug", skip(input), fields(input_len = input.as_ref().len()))]
    pub fn resolve(input: impl AsRef<str>, hint: Option<ContentType>) -> Result<Self, TargetError> {
        let raw = input.as_ref().trim();
        if raw.is_empty() {
            return Err(TargetError::malformed(raw, "empty input"));
        }

        let target = if let Ok(url) = Url::parse(raw) {
            Self::from_url(raw, &url, hint)?
        } else {
            Self::from_bare_id(raw, hint)?
        };

        debug!(
            content_type = %target.content_type,
            id = %target.resolved_id,
            "target resolved"
        );
        Ok(target)
    }

    /// Resolves a full platform URL by inspecting its path segments.
    fn from_url(raw: &str, url: &Url, hint: Option<ContentType>) -> Result<Self, TargetError> {
        let host = url.host_str().unwrap_or_default();
        if !host.ends_with("douyin.com") {
            return Err(TargetError::ForeignHost {
                host: host.to_string(),
            });
        }

        let segments: Vec<&str> = url
            .path_segments()
            .map(|s| s.filter(|p| !p.is_empty()).collect())
            .unwrap_or_default();
        let [.., kind, id] = segments.as_slice() else {
            return Err(TargetError::malformed(raw, "URL path too short"));
        };
        let id = urlencoding::decode(id)
            .map_err(|_| TargetError::malformed(raw, "undecodable path segment"))?
            .into_owned();

        let content_type = match *kind {
            "video" | "note" => ContentType::SingleItem,
            "music" => ContentType::Music,
            "hashtag" => ContentType::Hashtag,
            "collection" => ContentType::Collection,
            "search" => {
                // A `type=` query parameter can redirect the search to
                // account results; plain/video searches stay item searches.
                let search_type = url
                    .query_pairs()
                    .find(|(k, _)| k == "type")
                    .map(|(_, v)| v.into_owned());
                match search_type.as_deref() {
                    None | Some("video" | "general") => ContentType::Search,
                    Some("user") => ContentType::User,
                    Some(other) => {
                        return Err(TargetError::malformed(
                            raw,
                            format!("unsupported search type: {other}"),
                        ));
                    }
                }
            }
            "user" => match hint {
                Some(
                    t @ (ContentType::Post
                    | ContentType::Like
                    | ContentType::Favorite
                    | ContentType::Follow
                    | ContentType::Fans),
                ) => t,
                _ => ContentType::Post,
            },
            other => {
                return Err(TargetError::malformed(
                    raw,
                    format!("unrecognized URL path segment: {other}"),
                ));
            }
        };

        Ok(Self {
            raw_input: raw.to_string(),
            canonical_url: canonical_url(content_type, &id),
            resolved_id: id,
            content_type,
        })
    }

    /// Resolves a bare identifier (sec-uid, numeric id, or keyword).
    fn from_bare_id(raw: &str, hint: Option<ContentType>) -> Result<Self, TargetError> {
        let is_numeric = !raw.is_empty() && raw.chars().all(|c| c.is_ascii_digit());
        let is_sec_uid = raw.starts_with(SEC_UID_PREFIX);

        let content_type = match hint {
            Some(t @ (ContentType::Search | ContentType::User)) => t,
            Some(
                t @ (ContentType::Music
                | ContentType::Hashtag
                | ContentType::Collection
                | ContentType::SingleItem),
            ) => {
                if !is_numeric {
                    return Err(TargetError::malformed(
                        raw,
                        format!("{t} targets require a numeric id"),
                    ));
                }
                t
            }
            Some(
                t @ (ContentType::Post
                | ContentType::Like
                | ContentType::Favorite
                | ContentType::Follow
                | ContentType::Fans),
            ) => {
                if !is_sec_uid {
                    return Err(TargetError::malformed(
                        raw,
                        format!("{t} targets require a {SEC_UID_PREFIX}… user id"),
                    ));
                }
                t
            }
            // No hint: infer from the identifier shape.
            None => {
                if is_sec_uid {
                    ContentType::Post
                } else if is_numeric {
                    ContentType::SingleItem
                } else {
                    ContentType::Search
                }
            }
        };

        Ok(Self {
            raw_input: raw.to_string(),
            canonical_url: canonical_url(content_type, raw),
            resolved_id: raw.to_string(),
            content_type,
        })
    }
}

/// Builds the canonical web URL for a resolved id.
fn canonical_url(content_type: ContentType, id: &str) -> String {
    match content_type {
        ContentType::Post
        | ContentType::Like
        | ContentType::Favorite
        | ContentType::Follow
        | ContentType::Fans => format!("{WEB_HOST}/user/{id}"),
        ContentType::Search | ContentType::User => {
            format!("{WEB_HOST}/search/{}", urlencoding::encode(id))
        }
        ContentType::Music => format!("{WEB_HOST}/music/{id}"),
        ContentType::Hashtag => format!("{WEB_HOST}/hashtag/{id}"),
        ContentType::Collection => format!("{WEB_HOST}/collection/{id}"),
        ContentType::SingleItem => format!("{WEB_HOST}/note/{id}"),
    }
}

//! Stable per-session web identifier derivation.
//!
//! The platform expects a `webid` parameter on every API call. The id is
//! recoverable from the structured `ttwid` session cookie (a composite
//! `version|base64|timestamp|hash` token whose base64 segment embeds a
//! 19-digit numeric id); failing that, the bootstrap page leaks it as
//! `user_unique_id` in inlined render data; failing both, a known-constant
//! fallback keeps read-only endpoints working.
//!
//! These helpers are pure; the session layer owns fetching and caching.

use std::sync::LazyLock;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD_NO_PAD;
use regex::Regex;

/// Last-resort web id when neither cookie nor page derivation works.
pub const FALLBACK_WEB_ID: &str = "7483171167227659830";

/// 19-digit numeric id embedded in the decoded ttwid segment.
#[allow(clippy::expect_used)]
static EMBEDDED_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{19})").expect("embedded-id regex is valid"));

/// `user_unique_id` in the bootstrap page's inlined (JSON-escaped) render data.
#[allow(clippy::expect_used)]
static PAGE_ID: LazyLock<Regex> = LazyLock::new(|| {
    // Tolerates both escaped (\"user_unique_id\":\"…\") and plain JSON.
    Regex::new(r#"user_unique_id\\?":\\?"(\d+)"#).expect("page-id regex is valid")
});

/// Extracts the web id from a `ttwid` cookie value.
///
/// Returns `None` for cookies that are absent, not composite, or whose
/// base64 segment does not decode to text embedding a 19-digit id.
#[must_use]
pub fn from_ttwid(ttwid: &str) -> Option<String> {
    let mut parts = ttwid.split('|');
    let _version = parts.next()?;
    let segment = parts.next()?;

    let decoded = STANDARD_NO_PAD
        .decode(segment.trim_end_matches('='))
        .ok()?;
    let text = String::from_utf8_lossy(&decoded);
    EMBEDDED_ID
        .captures(&text)
        .map(|caps| caps[1].to_string())
}

/// Extracts the web id from bootstrap page HTML.
#[must_use]
pub fn from_page(html: &str) -> Option<String> {
    PAGE_ID.captures(html).map(|caps| caps[1].to_string())
}

//! Session-cookie boundary: loading cookies from a header string or file.
//!
//! Cookie acquisition itself (browser automation, manual entry) lives
//! outside this crate; the engine only consumes a name→value map and treats
//! every source identically. Cookie values are sensitive and never logged.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, instrument};

/// Errors raised while loading or parsing cookies.
#[derive(Debug, Error)]
pub enum CookieError {
    /// I/O failure reading a cookie file.
    #[error("failed to read cookie file {path}: {source}")]
    Io {
        /// The file that failed to read.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A cookie file held JSON of an unexpected shape.
    #[error("cookie file {path} is neither a name→value map nor a browser export list")]
    UnexpectedShape {
        /// The offending file.
        path: PathBuf,
    },

    /// A `Cookie:` header segment was missing its `=` separator.
    #[error("malformed cookie segment: {segment}")]
    MalformedSegment {
        /// The segment name (value is redacted).
        segment: String,
    },
}

/// Supplies the session-cookie map.
///
/// Implemented by the built-in header-string and JSON-file sources; a GUI
/// or browser-automation helper can plug in its own.
pub trait CookieSource {
    /// Produces the cookie name→value map.
    ///
    /// # Errors
    ///
    /// Returns a [`CookieError`] when the backing source cannot be read
    /// or parsed.
    fn cookies(&self) -> Result<HashMap<String, String>, CookieError>;
}

/// Cookie source backed by a raw `Cookie:` header string.
#[derive(Clone)]
pub struct HeaderCookies {
    raw: String,
}

impl HeaderCookies {
    /// Wraps a `name=value; name2=value2` header string.
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self { raw: raw.into() }
    }
}

// Redact the raw header in Debug output; it carries credentials.
impl fmt::Debug for HeaderCookies {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeaderCookies")
            .field("raw", &"[REDACTED]")
            .finish()
    }
}

impl CookieSource for HeaderCookies {
    fn cookies(&self) -> Result<HashMap<String, String>, CookieError> {
        parse_cookie_header(&self.raw)
    }
}

/// Cookie source backed by a JSON file.
///
/// Accepts either a flat `{"name": "value"}` map or a browser-export list
/// of `{"name": …, "value": …}` objects.
#[derive(Debug, Clone)]
pub struct FileCookies {
    path: PathBuf,
}

impl FileCookies {
    /// Points the source at a JSON cookie file.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CookieSource for FileCookies {
    fn cookies(&self) -> Result<HashMap<String, String>, CookieError> {
        load_cookie_file(&self.path)
    }
}

/// Parses a `Cookie:` header string into a name→value map.
///
/// Blank segments and stray bare-domain tokens (an artifact of copy-pasted
/// browser headers) are skipped.
///
/// # Errors
///
/// Returns [`CookieError::MalformedSegment`] for a non-empty segment with
/// no `=` separator.
#[instrument(level = "debug", skip(raw))]
pub fn parse_cookie_header(raw: &str) -> Result<HashMap<String, String>, CookieError> {
    let mut map = HashMap::new();
    for segment in raw.trim().split(';') {
        let segment = segment.trim();
        if segment.is_empty() || !segment.contains('=') && segment.ends_with(".com") {
            continue;
        }
        let Some((name, value)) = segment.split_once('=') else {
            return Err(CookieError::MalformedSegment {
                segment: segment.chars().take(40).collect(),
            });
        };
        map.insert(name.trim().to_string(), value.to_string());
    }
    debug!(count = map.len(), "parsed cookie header");
    Ok(map)
}

/// Loads a JSON cookie file in either supported shape.
///
/// # Errors
///
/// Returns [`CookieError::Io`] on read failure or
/// [`CookieError::UnexpectedShape`] when the JSON fits neither shape.
#[instrument(level = "debug")]
pub fn load_cookie_file(path: &Path) -> Result<HashMap<String, String>, CookieError> {
    let text = std::fs::read_to_string(path).map_err(|source| CookieError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let value: Value = serde_json::from_str(&text).map_err(|_| CookieError::UnexpectedShape {
        path: path.to_path_buf(),
    })?;

    let map = match value {
        Value::Object(obj) => obj
            .into_iter()
            .filter_map(|(k, v)| v.as_str().map(|s| (k, s.to_string())))
            .collect(),
        Value::Array(entries) => {
            let mut map = HashMap::new();
            for entry in entries {
                let (Some(name), Some(value)) = (
                    entry.get("name").and_then(Value::as_str),
                    entry.get("value").and_then(Value::as_str),
                ) else {
                    continue;
                };
                map.insert(name.to_string(), value.to_string());
            }
            map
        }
        _ => {
            return Err(CookieError::UnexpectedShape {
                path: path.to_path_buf(),
            });
        }
    };

    debug!(count = map.len(), "loaded cookie file");
    Ok(map)
}

/// Joins a cookie map back into a `Cookie:` header value.
#[must_use]
pub fn cookie_header(cookies: &HashMap<String, String>) -> String {
    let mut pairs: Vec<String> = cookies.iter().map(|(k, v)| format!("{k}={v}")).collect();
    // Deterministic order so the header is stable across calls.
    pairs.sort();
    pairs.join("; ")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_cookie_header_basic() {
        let map = parse_cookie_header("msToken=abc; ttwid=1|xyz|2|h; s_v_web_id=verify_x").unwrap();
        assert_eq!(map.len(), 3);
        assert_eq!(map["msToken"], "abc");
        assert_eq!(map["ttwid"], "1|xyz|2|h");
    }

    #[test]
    fn test_parse_cookie_header_skips_blank_and_domain_tokens() {
        let map = parse_cookie_header("a=1; ; douyin.com; b=2").unwrap();
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_parse_cookie_header_keeps_equals_in_value() {
        let map = parse_cookie_header("token=a=b=c").unwrap();
        assert_eq!(map["token"], "a=b=c");
    }

    #[test]
    fn test_parse_cookie_header_malformed_segment() {
        let err = parse_cookie_header("a=1; garbage").unwrap_err();
        assert!(matches!(err, CookieError::MalformedSegment { .. }));
    }

    #[test]
    fn test_load_cookie_file_flat_map() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"msToken": "tok", "ttwid": "1|a|b|c"}}"#).unwrap();
        let map = load_cookie_file(file.path()).unwrap();
        assert_eq!(map["msToken"], "tok");
    }

    #[test]
    fn test_load_cookie_file_browser_export_list() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"name": "msToken", "value": "tok", "domain": ".douyin.com"}},
                {{"name": "ttwid", "value": "1|a|b|c"}}]"#
        )
        .unwrap();
        let map = load_cookie_file(file.path()).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map["ttwid"], "1|a|b|c");
    }

    #[test]
    fn test_load_cookie_file_rejects_scalar_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "42").unwrap();
        let err = load_cookie_file(file.path()).unwrap_err();
        assert!(matches!(err, CookieError::UnexpectedShape { .. }));
    }

    #[test]
    fn test_cookie_header_round_trip_is_sorted() {
        let mut map = HashMap::new();
        map.insert("b".to_string(), "2".to_string());
        map.insert("a".to_string(), "1".to_string());
        assert_eq!(cookie_header(&map), "a=1; b=2");
    }

    #[test]
    fn test_sources_behind_the_trait_agree_with_direct_parsing() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"msToken": "tok"}}"#).unwrap();

        let sources: Vec<Box<dyn CookieSource>> = vec![
            Box::new(HeaderCookies::new("msToken=tok")),
            Box::new(FileCookies::new(file.path())),
        ];
        for source in sources {
            let map = source.cookies().unwrap();
            assert_eq!(map["msToken"], "tok");
        }
    }

    #[test]
    fn test_debug_redacts_header_cookies() {
        let source = HeaderCookies::new("secret=value");
        let debug = format!("{source:?}");
        assert!(!debug.contains("value"));
        assert!(debug.contains("REDACTED"));
    }
}

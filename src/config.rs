//! Monitor configuration, persisted as JSON.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::target::ContentType;

/// Errors loading or saving a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error reading config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("config {path} is not valid JSON: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// One watched target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// URL, share text, or bare id accepted by target resolution.
    pub input: String,
    /// Overrides the config-wide content type for this target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<ContentType>,
    /// Display label; filled from the feed's author when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// Full monitor configuration.
///
/// Every field except `targets` has a default, so a minimal config is just
/// `{"targets": [{"input": "..."}]}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    pub targets: Vec<TargetConfig>,
    /// Content type assumed for targets without their own.
    #[serde(default = "default_content_type")]
    pub content_type: ContentType,
    /// Seconds between check cycles.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_download_root")]
    pub download_root: PathBuf,
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
    /// Cookie header string; takes precedence over `cookie_file`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cookie: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cookie_file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    /// Overrides the API host (mirrors, test doubles).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_host: Option<String>,
    /// Newest items fetched per target per cycle (0 = unlimited).
    #[serde(default = "default_limit_per_check")]
    pub limit_per_check: usize,
    /// Concurrent target checks.
    #[serde(default = "default_monitor_workers")]
    pub monitor_workers: usize,
    /// Concurrent download batches.
    #[serde(default = "default_download_workers")]
    pub download_workers: usize,
    /// Base seconds between downloads within one batch.
    #[serde(default = "default_pacing_base_secs")]
    pub pacing_base_secs: u64,
    /// Extra random seconds added to each pacing delay.
    #[serde(default = "default_pacing_jitter_secs")]
    pub pacing_jitter_secs: u64,
    /// Failed pages tolerated per collection run.
    #[serde(default = "default_retry_ceiling")]
    pub retry_ceiling: u32,
}

fn default_content_type() -> ContentType {
    ContentType::Post
}
fn default_interval_secs() -> u64 {
    300
}
fn default_download_root() -> PathBuf {
    PathBuf::from("downloads")
}
fn default_state_dir() -> PathBuf {
    PathBuf::from("state")
}
fn default_limit_per_check() -> usize {
    10
}
fn default_monitor_workers() -> usize {
    3
}
fn default_download_workers() -> usize {
    2
}
fn default_pacing_base_secs() -> u64 {
    1
}
fn default_pacing_jitter_secs() -> u64 {
    2
}
fn default_retry_ceiling() -> u32 {
    3
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            targets: Vec::new(),
            content_type: default_content_type(),
            interval_secs: default_interval_secs(),
            download_root: default_download_root(),
            state_dir: default_state_dir(),
            cookie: None,
            cookie_file: None,
            proxy: None,
            user_agent: None,
            api_host: None,
            limit_per_check: default_limit_per_check(),
            monitor_workers: default_monitor_workers(),
            download_workers: default_download_workers(),
            pacing_base_secs: default_pacing_base_secs(),
            pacing_jitter_secs: default_pacing_jitter_secs(),
            retry_ceiling: default_retry_ceiling(),
        }
    }
}

impl MonitorConfig {
    /// Loads a config file; a missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for unreadable files or invalid JSON.
    #[instrument(level = "debug")]
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = match fs::read(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        serde_json::from_slice(&raw).map_err(|source| ConfigError::Malformed {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Writes the config back as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] on write failure.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let json = serde_json::to_vec_pretty(self).map_err(|source| ConfigError::Malformed {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, json).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Worker counts clamped to sane pool sizes.
    #[must_use]
    pub fn monitor_pool_size(&self) -> usize {
        self.monitor_workers.clamp(1, 10)
    }

    #[must_use]
    pub fn download_pool_size(&self) -> usize {
        self.download_workers.clamp(1, 5)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let config = MonitorConfig::load(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config.interval_secs, 300);
        assert_eq!(config.limit_per_check, 10);
        assert!(config.targets.is_empty());
    }

    #[test]
    fn test_minimal_config_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"targets": [{"input": "MS4wLjABAAAAabc"}]}"#).unwrap();

        let config = MonitorConfig::load(&path).unwrap();
        assert_eq!(config.targets.len(), 1);
        assert_eq!(config.content_type, ContentType::Post);
        assert_eq!(config.monitor_workers, 3);
        assert_eq!(config.download_workers, 2);
    }

    #[test]
    fn test_save_then_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        let mut config = MonitorConfig::default();
        config.targets.push(TargetConfig {
            input: "https://www.douyin.com/user/MS4wLjABAAAAabc".to_string(),
            content_type: Some(ContentType::Like),
            label: Some("someone".to_string()),
        });
        config.interval_secs = 60;
        config.save(&path).unwrap();

        let loaded = MonitorConfig::load(&path).unwrap();
        assert_eq!(loaded.interval_secs, 60);
        assert_eq!(loaded.targets[0].content_type, Some(ContentType::Like));
    }

    #[test]
    fn test_malformed_config_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, b"{not json").unwrap();
        assert!(matches!(
            MonitorConfig::load(&path),
            Err(ConfigError::Malformed { .. })
        ));
    }

    #[test]
    fn test_pool_sizes_are_clamped() {
        let mut config = MonitorConfig::default();
        config.monitor_workers = 99;
        config.download_workers = 0;
        assert_eq!(config.monitor_pool_size(), 10);
        assert_eq!(config.download_pool_size(), 1);
    }
}

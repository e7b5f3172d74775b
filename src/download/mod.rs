//! Media download layer.
//!
//! [`MediaClient`] streams one URL to one destination path; the
//! [`DownloadExecutor`] walks a plan's task list with pacing between
//! fetches and a cooperative stop flag checked between tasks.

mod client;
mod executor;

pub use client::MediaClient;
pub use executor::{BatchReport, DownloadExecutor, Pacing};

use std::path::PathBuf;

use thiserror::Error;

/// Errors produced while fetching media files.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// The media URL could not be parsed.
    #[error("invalid media url: {url}")]
    InvalidUrl { url: String },

    /// Network-level failure reaching the media host.
    #[error("network error fetching {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The media host answered with a non-success status.
    #[error("media host returned HTTP {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    /// Disk failure writing the destination file.
    #[error("I/O error writing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl DownloadError {
    pub(crate) fn io(path: PathBuf, source: std::io::Error) -> Self {
        Self::Io { path, source }
    }
}

//! Streaming HTTP client for media files.
//!
//! The planner decides destination paths up front, so this client takes an
//! exact output path instead of deriving filenames from the response. Bodies
//! stream through a scratch file that is renamed on completion; a failed
//! fetch never leaves a partial destination behind.

use std::path::Path;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::{REFERER, USER_AGENT};
use reqwest::{Client, ClientBuilder, Proxy};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, instrument};
use url::Url;

use super::DownloadError;
use crate::target::WEB_HOST;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const READ_TIMEOUT: Duration = Duration::from_secs(300);

/// Streaming downloader for planned media tasks.
///
/// Create once and reuse; the underlying connection pool is shared across
/// downloads.
#[derive(Debug, Clone)]
pub struct MediaClient {
    client: Client,
    user_agent: String,
}

impl MediaClient {
    /// Builds a client with the session's user agent and optional proxy.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::InvalidUrl`] for an unusable proxy URL.
    pub fn new(user_agent: impl Into<String>, proxy: Option<&str>) -> Result<Self, DownloadError> {
        let mut builder = ClientBuilder::new()
            .connect_timeout(CONNECT_TIMEOUT)
            .read_timeout(READ_TIMEOUT)
            .gzip(true);
        if let Some(proxy_url) = proxy {
            let proxy = Proxy::all(proxy_url).map_err(|_| DownloadError::InvalidUrl {
                url: proxy_url.to_string(),
            })?;
            builder = builder.proxy(proxy);
        }
        let client = builder.build().map_err(|source| DownloadError::Network {
            url: String::new(),
            source,
        })?;
        Ok(Self {
            client,
            user_agent: user_agent.into(),
        })
    }

    /// Streams `url` to exactly `dest`, creating parent directories.
    ///
    /// Returns the number of bytes written.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError`] for unparsable URLs, network failures,
    /// non-success statuses, and disk errors.
    #[instrument(level = "debug", skip(self), fields(url = %url, dest = %dest.display()))]
    pub async fn fetch_to_path(&self, url: &str, dest: &Path) -> Result<u64, DownloadError> {
        Url::parse(url).map_err(|_| DownloadError::InvalidUrl {
            url: url.to_string(),
        })?;

        // The CDN rejects fetches without a same-platform referer.
        let response = self
            .client
            .get(url)
            .header(USER_AGENT, &self.user_agent)
            .header(REFERER, format!("{WEB_HOST}/"))
            .send()
            .await
            .map_err(|source| DownloadError::Network {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        if let Some(parent) = dest.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| DownloadError::io(parent.to_path_buf(), e))?;
        }

        let scratch = dest.with_extension("part");
        let written = match self.stream_body(response, url, &scratch).await {
            Ok(written) => written,
            Err(err) => {
                let _ = tokio::fs::remove_file(&scratch).await;
                return Err(err);
            }
        };
        tokio::fs::rename(&scratch, dest)
            .await
            .map_err(|e| DownloadError::io(dest.to_path_buf(), e))?;

        info!(bytes = written, "media saved");
        Ok(written)
    }

    async fn stream_body(
        &self,
        response: reqwest::Response,
        url: &str,
        scratch: &Path,
    ) -> Result<u64, DownloadError> {
        let file = File::create(scratch)
            .await
            .map_err(|e| DownloadError::io(scratch.to_path_buf(), e))?;
        let mut writer = BufWriter::new(file);
        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|source| DownloadError::Network {
                url: url.to_string(),
                source,
            })?;
            writer
                .write_all(&chunk)
                .await
                .map_err(|e| DownloadError::io(scratch.to_path_buf(), e))?;
            written += chunk.len() as u64;
        }
        writer
            .flush()
            .await
            .map_err(|e| DownloadError::io(scratch.to_path_buf(), e))?;
        debug!(bytes = written, "body streamed");
        Ok(written)
    }
}

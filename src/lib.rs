//! Feedwatch Core Library
//!
//! This library implements a resilient client for a content platform that
//! gates its API behind per-request signing: it signs its own requests,
//! collects creator feeds incrementally page by page, and orchestrates
//! concurrent monitoring and media downloads.
//!
//! # Architecture
//!
//! - [`sign`] - Request-token generation (digest, obfuscation, encoding)
//! - [`session`] - Signed API sessions with fingerprinting and retry
//! - [`target`] - Target resolution from URLs, share text, or bare ids
//! - [`collect`] - Paginated incremental collection engine
//! - [`plan`] - Snapshot persistence and download planning
//! - [`download`] - Streaming media client and paced batch executor
//! - [`monitor`] - Timed concurrent checks over configured targets

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod collect;
pub mod config;
pub mod cookies;
pub mod download;
pub mod monitor;
pub mod plan;
pub mod session;
pub mod sign;
pub mod target;

// Re-export commonly used types
pub use collect::{
    CollectError, Collection, CollectionEngine, ContentItem, ItemAuthor, ItemKind, ProgressHandle,
    StopReason,
};
pub use config::{ConfigError, MonitorConfig, TargetConfig};
pub use cookies::{CookieError, CookieSource, FileCookies, HeaderCookies};
pub use download::{BatchReport, DownloadError, DownloadExecutor, MediaClient, Pacing};
pub use monitor::{DiscoveredLog, ItemFilter, Monitor, MonitorError};
pub use plan::{DownloadPlanner, DownloadTask, Plan, PlanError, SnapshotStore, TaskStatus};
pub use session::{ApiError, ApiSession, ApiSessionBuilder};
pub use sign::{BogusSigner, EndpointKind, NullSigner, SignError, Signer, SigningParams};
pub use target::{ContentType, Target, TargetError};

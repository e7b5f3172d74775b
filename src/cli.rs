//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use feedwatch_core::ContentType;

/// Collect and monitor creator feeds.
///
/// Feedwatch signs its own API requests, collects feeds incrementally
/// against per-target snapshots, and downloads new media with pacing.
#[derive(Parser, Debug)]
#[command(name = "feedwatch")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Collect one target once and download anything new
    Collect(CollectArgs),
    /// Watch configured targets on a timer until interrupted
    Monitor(MonitorArgs),
}

#[derive(clap::Args, Debug)]
pub struct CollectArgs {
    /// Target URL, share text, or bare id
    pub target: String,

    /// Content type of the target feed
    #[arg(short = 't', long = "type", value_enum, default_value_t = ContentTypeArg::Post)]
    pub content_type: ContentTypeArg,

    /// Maximum items to collect (0 = unlimited)
    #[arg(short = 'n', long, default_value_t = 0)]
    pub limit: usize,

    /// Cookie header string (overrides --cookie-file)
    #[arg(long)]
    pub cookie: Option<String>,

    /// Path to a cookie file (flat JSON map or browser export)
    #[arg(long)]
    pub cookie_file: Option<PathBuf>,

    /// Proxy URL (bare host:port is treated as socks5)
    #[arg(long)]
    pub proxy: Option<String>,

    /// Directory media files are written to
    #[arg(long, default_value = "downloads")]
    pub download_root: PathBuf,

    /// Directory snapshots and task manifests are kept in
    #[arg(long, default_value = "state")]
    pub state_dir: PathBuf,

    /// Plan only; skip the download phase
    #[arg(long)]
    pub no_download: bool,
}

#[derive(clap::Args, Debug)]
pub struct MonitorArgs {
    /// Path to the monitor configuration file
    #[arg(short = 'c', long, default_value = "feedwatch.json")]
    pub config: PathBuf,
}

/// Clap-facing mirror of [`ContentType`].
#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContentTypeArg {
    Post,
    Like,
    Favorite,
    Follow,
    Fans,
    Search,
    Music,
    Hashtag,
    Collection,
    SingleItem,
    User,
}

impl From<ContentTypeArg> for ContentType {
    fn from(arg: ContentTypeArg) -> Self {
        match arg {
            ContentTypeArg::Post => Self::Post,
            ContentTypeArg::Like => Self::Like,
            ContentTypeArg::Favorite => Self::Favorite,
            ContentTypeArg::Follow => Self::Follow,
            ContentTypeArg::Fans => Self::Fans,
            ContentTypeArg::Search => Self::Search,
            ContentTypeArg::Music => Self::Music,
            ContentTypeArg::Hashtag => Self::Hashtag,
            ContentTypeArg::Collection => Self::Collection,
            ContentTypeArg::SingleItem => Self::SingleItem,
            ContentTypeArg::User => Self::User,
        }
    }
}

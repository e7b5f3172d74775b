//! CLI entry point for the feedwatch tool.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use feedwatch_core::{
    ApiSession, BogusSigner, CollectionEngine, CookieSource, DownloadExecutor, DownloadPlanner,
    FileCookies, HeaderCookies, MediaClient, Monitor, MonitorConfig, Pacing, ProgressHandle,
    SnapshotStore, Target,
};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info, warn};

mod cli;

use cli::{Args, CollectArgs, Command, MonitorArgs};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    debug!(?args, "CLI arguments parsed");

    let quiet = args.quiet;
    match args.command {
        Command::Collect(collect) => run_collect(collect, quiet).await,
        Command::Monitor(monitor) => run_monitor(monitor).await,
    }
}

async fn run_collect(args: CollectArgs, quiet: bool) -> Result<()> {
    let cookie_map: HashMap<String, String> = if let Some(raw) = &args.cookie {
        HeaderCookies::new(raw).cookies()?
    } else if let Some(path) = &args.cookie_file {
        FileCookies::new(path).cookies()?
    } else {
        warn!("no cookies provided; authenticated endpoints will likely reject requests");
        HashMap::new()
    };

    let mut builder = ApiSession::builder()
        .cookies(cookie_map)
        .signer(Box::new(BogusSigner::with_random_seed()));
    if let Some(proxy) = &args.proxy {
        builder = builder.proxy(proxy);
    }
    let session = builder.build()?;

    let target = Target::resolve(&args.target, Some(args.content_type.into()))
        .context("could not resolve target")?;
    info!(id = %target.resolved_id, content_type = %target.content_type, "target resolved");

    let planner = DownloadPlanner::new(SnapshotStore::new(&args.state_dir), &args.download_root);
    let prior = planner.store().load(&target)?;
    if let Some(newest) = prior.first() {
        info!(
            prior_items = prior.len(),
            newest = newest.created_at,
            "incremental run against existing snapshot"
        );
    }

    let engine = CollectionEngine::default();
    let progress = ProgressHandle::new();
    let spinner = (!quiet).then(|| spawn_collect_spinner(progress.clone()));
    let result = engine
        .collect_with_progress(&session, &target, args.limit, &prior, &progress)
        .await;
    if let Some((handle, stop)) = spinner {
        stop.store(true, std::sync::atomic::Ordering::SeqCst);
        let _ = handle.await;
    }
    let collection = result?;
    info!(
        items = collection.items.len(),
        stop = ?collection.stop,
        truncated = collection.truncated,
        "collection finished"
    );

    let plan = planner.plan(&collection, &prior)?;
    if plan.tasks.is_empty() {
        info!(skipped = plan.skipped_existing, "nothing new to download");
        return Ok(());
    }
    if args.no_download {
        info!(tasks = plan.tasks.len(), "download skipped (--no-download)");
        return Ok(());
    }

    let media = MediaClient::new(session.user_agent(), args.proxy.as_deref())?;
    let executor = DownloadExecutor::new(
        media,
        Pacing::default(),
        Arc::new(AtomicBool::new(false)),
    );
    let report = executor.run(plan.tasks).await;
    info!(
        done = report.done,
        failed = report.failed,
        "download complete"
    );
    Ok(())
}

/// Spawns a spinner that polls the collection progress until stopped.
/// Returns (handle, stop) so the caller can signal stop and await the handle.
fn spawn_collect_spinner(
    progress: ProgressHandle,
) -> (tokio::task::JoinHandle<()>, Arc<AtomicBool>) {
    use std::sync::atomic::Ordering;

    let stop = Arc::new(AtomicBool::new(false));
    let stop_view = Arc::clone(&stop);
    let handle = tokio::spawn(async move {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        spinner.enable_steady_tick(Duration::from_millis(100));

        while !stop_view.load(Ordering::SeqCst) {
            spinner.set_message(format!("Collecting... {} items", progress.collected()));
            tokio::time::sleep(Duration::from_millis(120)).await;
        }
        spinner.finish_and_clear();
    });
    (handle, stop)
}

async fn run_monitor(args: MonitorArgs) -> Result<()> {
    let config = MonitorConfig::load(&args.config)?;
    if config.targets.is_empty() {
        anyhow::bail!(
            "no targets configured in {}; add at least one before starting the monitor",
            args.config.display()
        );
    }

    let monitor = Monitor::from_config(&config)?;
    info!(
        targets = config.targets.len(),
        interval_secs = config.interval_secs,
        "monitor configured"
    );

    let runner = monitor.clone();
    let handle = tokio::spawn(async move { runner.run().await });

    tokio::signal::ctrl_c().await?;
    info!("interrupt received, stopping after in-flight downloads");
    monitor.request_stop();

    // Give in-flight work a bounded window to wind down.
    match tokio::time::timeout(Duration::from_secs(120), handle).await {
        Ok(joined) => joined?,
        Err(_) => warn!("monitor did not stop within 120s, exiting anyway"),
    }
    Ok(())
}

//! Concurrent monitor scheduler.
//!
//! Each cycle checks every configured target under a bounded monitor pool,
//! hands new items to the download pool, and sleeps until the next cycle.
//! Both pools are semaphores over spawned tasks; a shared stop flag is
//! observed between downloads and in one-second slices during the
//! inter-cycle sleep, so a stop request takes effect within about a second
//! without cutting any file mid-transfer.

pub mod discovered;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, instrument, warn};

use crate::collect::{CollectError, CollectionEngine};
use crate::config::MonitorConfig;
use crate::cookies::{CookieError, CookieSource, FileCookies, HeaderCookies};
use crate::download::{DownloadExecutor, MediaClient, Pacing};
use crate::plan::{DownloadPlanner, DownloadTask, SnapshotStore, TaskStatus};
use crate::session::{ApiError, ApiSession};
use crate::sign::BogusSigner;
use crate::target::{Target, TargetError};

pub use discovered::{DiscoveredItem, DiscoveredLog, DiscoveredPage, ItemFilter};

/// Errors from monitor construction.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error(transparent)]
    Cookie(#[from] CookieError),
    #[error(transparent)]
    Session(#[from] ApiError),
    #[error(transparent)]
    Target(#[from] TargetError),
    #[error(transparent)]
    Download(#[from] crate::download::DownloadError),
}

/// Per-target bookkeeping, readable while the monitor runs.
#[derive(Debug, Clone)]
pub struct MonitorEntry {
    pub target: Target,
    pub label: String,
    /// Unix seconds of the last completed check.
    pub last_check: Option<i64>,
    /// New items found by the last check.
    pub last_new: usize,
    pub checks: u64,
    pub failures: u64,
    /// Human-readable outcome of the last check.
    pub status_text: String,
    /// Newest item timestamp seen for this target, Unix seconds.
    pub latest_item_time: Option<i64>,
}

/// Counters for one cycle. Check failures and download failures are
/// tracked separately.
#[derive(Debug, Default)]
pub struct CycleStats {
    checked: AtomicUsize,
    new_items: AtomicUsize,
    downloaded: AtomicUsize,
    failures: AtomicUsize,
    download_failures: AtomicUsize,
}

impl CycleStats {
    #[must_use]
    pub fn checked(&self) -> usize {
        self.checked.load(Ordering::SeqCst)
    }
    #[must_use]
    pub fn new_items(&self) -> usize {
        self.new_items.load(Ordering::SeqCst)
    }
    #[must_use]
    pub fn downloaded(&self) -> usize {
        self.downloaded.load(Ordering::SeqCst)
    }
    /// Checks that ended in an error or a truncated run.
    #[must_use]
    pub fn failures(&self) -> usize {
        self.failures.load(Ordering::SeqCst)
    }
    /// Download tasks that failed.
    #[must_use]
    pub fn download_failures(&self) -> usize {
        self.download_failures.load(Ordering::SeqCst)
    }
}

/// Everything a spawned check needs, shared across the monitor's lifetime.
struct Shared {
    session: Arc<ApiSession>,
    engine: CollectionEngine,
    planner: DownloadPlanner,
    media: MediaClient,
    entries: DashMap<String, MonitorEntry>,
    in_flight: DashMap<String, ()>,
    monitor_slots: Arc<Semaphore>,
    download_slots: Arc<Semaphore>,
    stop: Arc<AtomicBool>,
    discovered: DiscoveredLog,
    pacing: Pacing,
    limit_per_check: usize,
}

/// The monitor itself. Cheap to clone; all clones share one state.
#[derive(Clone)]
pub struct Monitor {
    shared: Arc<Shared>,
    interval: Duration,
}

impl Monitor {
    /// Builds the full stack from a configuration: cookies, signed session,
    /// media client, planner, and one entry per resolvable target.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError`] when cookies cannot be read, the session
    /// cannot be built, or a configured target does not resolve.
    pub fn from_config(config: &MonitorConfig) -> Result<Self, MonitorError> {
        let cookie_map: HashMap<String, String> = if let Some(raw) = &config.cookie {
            HeaderCookies::new(raw).cookies()?
        } else if let Some(path) = &config.cookie_file {
            FileCookies::new(path).cookies()?
        } else {
            HashMap::new()
        };

        let mut builder = ApiSession::builder()
            .cookies(cookie_map)
            .signer(Box::new(BogusSigner::with_random_seed()))
            .max_attempts(config.retry_ceiling.max(1));
        if let Some(proxy) = &config.proxy {
            builder = builder.proxy(proxy);
        }
        if let Some(ua) = &config.user_agent {
            builder = builder.user_agent(ua);
        }
        if let Some(host) = &config.api_host {
            builder = builder.host(host);
        }
        let session = builder.build()?;
        let media = MediaClient::new(session.user_agent(), config.proxy.as_deref())?;

        let entries = DashMap::new();
        for target_config in &config.targets {
            let hint = target_config.content_type.or(Some(config.content_type));
            let target = Target::resolve(&target_config.input, hint)?;
            let label = target_config
                .label
                .clone()
                .unwrap_or_else(|| target.resolved_id.clone());
            entries.insert(
                entry_key(&target),
                MonitorEntry {
                    target,
                    label,
                    last_check: None,
                    last_new: 0,
                    checks: 0,
                    failures: 0,
                    status_text: "pending".to_string(),
                    latest_item_time: None,
                },
            );
        }

        let planner = DownloadPlanner::new(
            SnapshotStore::new(&config.state_dir),
            &config.download_root,
        );
        let shared = Shared {
            session: Arc::new(session),
            engine: CollectionEngine::new(config.retry_ceiling),
            planner,
            media,
            entries,
            in_flight: DashMap::new(),
            monitor_slots: Arc::new(Semaphore::new(config.monitor_pool_size())),
            download_slots: Arc::new(Semaphore::new(config.download_pool_size())),
            stop: Arc::new(AtomicBool::new(false)),
            discovered: DiscoveredLog::new(),
            pacing: Pacing {
                base: Duration::from_secs(config.pacing_base_secs),
                jitter: Duration::from_secs(config.pacing_jitter_secs),
            },
            limit_per_check: config.limit_per_check,
        };
        Ok(Self {
            shared: Arc::new(shared),
            interval: Duration::from_secs(config.interval_secs.max(1)),
        })
    }

    /// Rolling log of discovered items for dashboards.
    #[must_use]
    pub fn discovered(&self) -> &DiscoveredLog {
        &self.shared.discovered
    }

    /// Snapshot of the per-target entries.
    #[must_use]
    pub fn entries(&self) -> Vec<MonitorEntry> {
        self.shared
            .entries
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Requests a stop. Takes effect between downloads and within about a
    /// second of sleep.
    pub fn request_stop(&self) {
        self.shared.stop.store(true, Ordering::SeqCst);
        info!("monitor stop requested");
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.shared.stop.load(Ordering::SeqCst)
    }

    /// Runs check cycles until a stop is requested.
    #[instrument(level = "info", skip(self), fields(targets = self.shared.entries.len()))]
    pub async fn run(&self) {
        info!(interval_secs = self.interval.as_secs(), "monitor started");
        while !self.is_stopped() {
            let stats = self.run_cycle().await;
            info!(
                checked = stats.checked(),
                new_items = stats.new_items(),
                downloaded = stats.downloaded(),
                failures = stats.failures(),
                download_failures = stats.download_failures(),
                "cycle complete"
            );
            if self.shared.session.needs_reauth() {
                warn!("credentials invalid; cycles continue but checks will fail until re-auth");
            }
            self.interruptible_sleep(self.interval).await;
        }
        info!("monitor stopped");
    }

    /// Checks every target once through the bounded pools.
    pub async fn run_cycle(&self) -> Arc<CycleStats> {
        let stats = Arc::new(CycleStats::default());
        let mut checks = JoinSet::new();

        let keys: Vec<String> = self
            .shared
            .entries
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        for key in keys {
            if self.is_stopped() {
                break;
            }
            // A target still busy from the previous cycle is skipped, not
            // queued twice.
            if self.shared.in_flight.insert(key.clone(), ()).is_some() {
                warn!(target = key, "previous check still running, skipping");
                continue;
            }
            let shared = Arc::clone(&self.shared);
            let stats = Arc::clone(&stats);
            checks.spawn(async move {
                // The monitor permit covers the check only; downloads run
                // under their own pool so a slow transfer never starves
                // other targets' checks.
                let permit = shared.monitor_slots.clone().acquire_owned().await;
                let tasks = check_target(&shared, &key, &stats).await;
                drop(permit);
                if let Some(tasks) = tasks {
                    run_downloads(&shared, tasks, &stats).await;
                }
                shared.in_flight.remove(&key);
            });
        }

        while checks.join_next().await.is_some() {}
        stats
    }

    async fn interruptible_sleep(&self, duration: Duration) {
        let mut remaining = duration;
        while !remaining.is_zero() && !self.is_stopped() {
            let slice = remaining.min(Duration::from_secs(1));
            tokio::time::sleep(slice).await;
            remaining = remaining.saturating_sub(slice);
        }
    }
}

/// Registry key for a configured target. One account can be watched as
/// several feed types at once; each pairing is its own entry.
fn entry_key(target: &Target) -> String {
    format!("{}:{}", target.content_type, target.resolved_id)
}

/// Outcome of one check, folded into the registry by [`note_result`].
struct CheckOutcome {
    new_items: usize,
    ok: bool,
    status: String,
    latest: Option<i64>,
}

impl CheckOutcome {
    fn failed(status: String) -> Self {
        Self {
            new_items: 0,
            ok: false,
            status,
            latest: None,
        }
    }
}

/// One target check: collect, plan, record. Returns the download tasks the
/// check produced, if any; the caller runs them under the download pool.
#[instrument(level = "info", skip(shared, stats), fields(target = key))]
async fn check_target(shared: &Shared, key: &str, stats: &CycleStats) -> Option<Vec<DownloadTask>> {
    let entry = shared.entries.get(key).map(|e| e.value().clone())?;
    let target = entry.target.clone();

    let prior = match shared.planner.store().load(&target) {
        Ok(prior) => prior,
        Err(err) => {
            error!(error = %err, "unreadable snapshot, skipping check");
            note_result(
                shared,
                key,
                stats,
                CheckOutcome::failed(format!("snapshot unreadable: {err}")),
            );
            return None;
        }
    };

    let collection = match shared
        .engine
        .collect(&shared.session, &target, shared.limit_per_check, &prior)
        .await
    {
        Ok(collection) => collection,
        Err(CollectError::Auth { source }) => {
            error!(error = %source, "check aborted, credentials rejected");
            note_result(
                shared,
                key,
                stats,
                CheckOutcome::failed(format!("credentials rejected: {source}")),
            );
            return None;
        }
    };

    let new_items = collection.items.len();
    if new_items > 0 {
        let now = chrono::Utc::now().timestamp();
        shared
            .discovered
            .record(&collection.items, &entry.label, &target.resolved_id, now);
        stats.new_items.fetch_add(new_items, Ordering::SeqCst);
        info!(new_items, "new items found");
    }

    let plan = match shared.planner.plan(&collection, &prior) {
        Ok(plan) => plan,
        Err(err) => {
            error!(error = %err, "planning failed");
            note_result(
                shared,
                key,
                stats,
                CheckOutcome {
                    new_items,
                    ok: false,
                    status: format!("planning failed: {err}"),
                    latest: collection.items.first().map(|i| i.created_at),
                },
            );
            return None;
        }
    };

    let ok = !collection.truncated;
    note_result(
        shared,
        key,
        stats,
        CheckOutcome {
            new_items,
            ok,
            status: if ok {
                "ok".to_string()
            } else {
                "partial result after retries".to_string()
            },
            latest: collection
                .items
                .first()
                .map(|i| i.created_at)
                .or_else(|| prior.first().map(|i| i.created_at)),
        },
    );

    (!plan.tasks.is_empty()).then_some(plan.tasks)
}

/// Runs one check's download tasks under the download pool.
async fn run_downloads(shared: &Shared, tasks: Vec<DownloadTask>, stats: &CycleStats) {
    let _permit = shared.download_slots.clone().acquire_owned().await;
    let executor = DownloadExecutor::new(
        shared.media.clone(),
        shared.pacing,
        Arc::clone(&shared.stop),
    );
    let report = executor.run(tasks).await;
    for task in &report.tasks {
        if task.status == TaskStatus::Done {
            shared.discovered.mark_downloaded(&task.item_id);
        }
    }
    stats.downloaded.fetch_add(report.done, Ordering::SeqCst);
    if report.failed > 0 {
        stats
            .download_failures
            .fetch_add(report.failed, Ordering::SeqCst);
    }
}

fn note_result(shared: &Shared, key: &str, stats: &CycleStats, outcome: CheckOutcome) {
    stats.checked.fetch_add(1, Ordering::SeqCst);
    if !outcome.ok {
        stats.failures.fetch_add(1, Ordering::SeqCst);
    }
    if let Some(mut entry) = shared.entries.get_mut(key) {
        entry.last_check = Some(chrono::Utc::now().timestamp());
        entry.last_new = outcome.new_items;
        entry.checks += 1;
        entry.status_text = outcome.status;
        if outcome.latest.is_some() {
            entry.latest_item_time = outcome.latest;
        }
        if !outcome.ok {
            entry.failures += 1;
        }
    }
}

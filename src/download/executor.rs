//! Sequential execution of a download plan.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use rand::Rng;
use tracing::{info, instrument, warn};

use super::MediaClient;
use crate::plan::{DownloadTask, TaskStatus};

/// Delay applied between consecutive fetches: `base` plus a uniform random
/// slice of `jitter`. Spacing fetches out keeps the media host from rate
/// limiting the batch.
#[derive(Debug, Clone, Copy)]
pub struct Pacing {
    pub base: Duration,
    pub jitter: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            jitter: Duration::from_secs(2),
        }
    }
}

impl Pacing {
    fn next_delay(self) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        if jitter_ms == 0 {
            return self.base;
        }
        let extra = rand::thread_rng().gen_range(0..=jitter_ms);
        self.base + Duration::from_millis(extra)
    }
}

/// Outcome of one executed batch.
#[derive(Debug)]
pub struct BatchReport {
    /// Tasks with their final statuses.
    pub tasks: Vec<DownloadTask>,
    pub done: usize,
    pub failed: usize,
    /// Set when the stop flag ended the batch before all tasks ran.
    pub interrupted: bool,
}

/// Runs a plan's tasks one at a time against a [`MediaClient`].
///
/// One executor per worker slot; concurrency across targets is the
/// scheduler's job, not this type's.
#[derive(Debug, Clone)]
pub struct DownloadExecutor {
    client: MediaClient,
    pacing: Pacing,
    stop: Arc<AtomicBool>,
}

impl DownloadExecutor {
    #[must_use]
    pub fn new(client: MediaClient, pacing: Pacing, stop: Arc<AtomicBool>) -> Self {
        Self {
            client,
            pacing,
            stop,
        }
    }

    /// Executes `tasks` in order. A failed task is marked and the batch
    /// continues; the stop flag is honored between tasks, never mid-file.
    #[instrument(level = "info", skip(self, tasks), fields(tasks = tasks.len()))]
    pub async fn run(&self, mut tasks: Vec<DownloadTask>) -> BatchReport {
        let mut done = 0usize;
        let mut failed = 0usize;
        let mut interrupted = false;
        let mut first = true;

        for task in &mut tasks {
            if self.stop.load(Ordering::SeqCst) {
                info!("stop requested, leaving remaining tasks pending");
                interrupted = true;
                break;
            }
            if !first {
                tokio::time::sleep(self.pacing.next_delay()).await;
            }
            first = false;

            task.status = TaskStatus::Downloading;
            match self.client.fetch_to_path(&task.url, &task.dest).await {
                Ok(_) => {
                    task.status = TaskStatus::Done;
                    done += 1;
                }
                Err(err) => {
                    warn!(item = task.item_id, error = %err, "download failed");
                    task.status = TaskStatus::Failed;
                    failed += 1;
                }
            }
        }

        info!(done, failed, interrupted, "batch finished");
        BatchReport {
            tasks,
            done,
            failed,
            interrupted,
        }
    }
}

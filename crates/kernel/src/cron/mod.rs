//! Scheduled operations and background tasks.
//!
//! Runs the temp file purge on a fixed interval. A process-local lock makes
//! sure at most one pass is active at a time; an overlapping run is skipped
//! rather than queued.

mod tasks;

pub use tasks::CronTasks;

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::file::PurgeTempFilesService;

/// Default interval between runs (every minute).
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

/// Result of a cron run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CronResult {
    /// Cron ran successfully.
    Completed {
        /// Tasks executed.
        tasks_run: Vec<String>,
        /// Duration of the run.
        duration_ms: u64,
    },
    /// Another run is still in progress.
    Skipped,
    /// Cron failed with an error.
    Failed(String),
}

/// Cron service for scheduled operations.
pub struct CronService {
    tasks: CronTasks,
    running: Mutex<()>,
    last_run: RwLock<Option<LastCronRun>>,
}

impl CronService {
    /// Create a new cron service.
    pub fn new(purge: Arc<PurgeTempFilesService>) -> Self {
        Self {
            tasks: CronTasks::new(purge),
            running: Mutex::new(()),
            last_run: RwLock::new(None),
        }
    }

    /// Run all cron tasks.
    ///
    /// Returns [`CronResult::Skipped`] without waiting if a run is already
    /// in progress.
    pub async fn run(&self) -> CronResult {
        let Ok(_guard) = self.running.try_lock() else {
            debug!("cron already running, skipping");
            return CronResult::Skipped;
        };

        let start = Instant::now();
        let mut tasks_run = Vec::new();

        // Purge abandoned uploads
        let tasks = self.tasks.clone();
        let result = match tokio::spawn(async move { tasks.purge_temp_files().await }).await {
            Ok(report) => {
                tasks_run.push(format!(
                    "purge_temp_files: {} files, {} directories",
                    report.files_deleted, report.directories_deleted
                ));
                let duration_ms = start.elapsed().as_millis() as u64;
                info!(duration_ms = duration_ms, tasks = ?tasks_run, "cron completed");
                CronResult::Completed {
                    tasks_run,
                    duration_ms,
                }
            }
            Err(e) => {
                warn!(error = %e, "temp file purge task aborted");
                CronResult::Failed(e.to_string())
            }
        };

        self.record_run(&result);
        result
    }

    /// Get the last cron run status.
    pub fn last_run(&self) -> Option<LastCronRun> {
        self.last_run.read().clone()
    }

    /// Record the last cron run.
    fn record_run(&self, result: &CronResult) {
        let run = LastCronRun {
            timestamp: chrono::Utc::now().timestamp(),
            hostname: hostname(),
            result: format!("{result:?}"),
        };
        *self.last_run.write() = Some(run);
    }

    /// Run on a fixed interval until `shutdown` flips to `true`.
    ///
    /// The first run happens immediately. Ticks missed while a run is in
    /// progress are dropped.
    pub fn spawn(
        self: Arc<Self>,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let result = self.run().await;
                        debug!(?result, "scheduled cron run finished");
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            info!("cron scheduler stopping");
                            break;
                        }
                    }
                }
            }
        })
    }
}

/// Last cron run information.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct LastCronRun {
    pub timestamp: i64,
    pub hostname: String,
    pub result: String,
}

/// Get hostname for run identification.
fn hostname() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string())
}

impl std::fmt::Debug for CronService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CronService").finish()
    }
}

#[cfg(test)]
// Tests are allowed to use unwrap/expect freely.
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_hostname() {
        let h = hostname();
        assert!(!h.is_empty());
    }

    #[test]
    fn test_last_cron_run_serde() {
        let run = LastCronRun {
            timestamp: 1234567890,
            hostname: "test-host".to_string(),
            result: "Completed".to_string(),
        };

        let json = serde_json::to_string(&run).unwrap();
        let parsed: LastCronRun = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, run);
    }
}

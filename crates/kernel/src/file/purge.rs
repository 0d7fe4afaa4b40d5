//! Purge of abandoned uploads in the media fields temp folder.
//!
//! Uploads land in the temp folder before the content item is saved. If the
//! edit is abandoned they stay there; this sweep deletes files (and empty
//! directories) older than the age configured in
//! [`MediaSiteSettings`]. An age of `0` disables it.
//!
//! Directories are removed with a non-recursive delete, so one that is not
//! empty at deletion time survives even if the listing said otherwise. The
//! scheduler in [`crate::cron`] keeps a single sweep active at a time.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::layout::FolderLayout;
use super::storage::{FileStore, FileStoreEntry};
use crate::settings::{MediaSiteSettings, SiteSettingsStore};

/// Outcome of one purge pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PurgeReport {
    pub files_deleted: usize,
    pub directories_deleted: usize,
    /// Deletions that failed; retried on the next pass.
    pub failures: usize,
}

/// Deletes old temporary files from the media fields temp folder.
pub struct PurgeTempFilesService {
    store: Arc<dyn FileStore>,
    layout: FolderLayout,
    settings: Arc<dyn SiteSettingsStore>,
}

impl PurgeTempFilesService {
    /// Create a new purge service.
    pub fn new(
        store: Arc<dyn FileStore>,
        layout: FolderLayout,
        settings: Arc<dyn SiteSettingsStore>,
    ) -> Self {
        Self {
            store,
            layout,
            settings,
        }
    }

    /// Run one purge pass. Never fails; errors are logged.
    pub async fn purge(&self) -> PurgeReport {
        self.purge_at(Utc::now()).await
    }

    /// Run one purge pass judging age against `now`.
    pub async fn purge_at(&self, now: DateTime<Utc>) -> PurgeReport {
        match self.try_purge(now).await {
            Ok(report) => report,
            Err(e) => {
                error!(
                    error = ?e,
                    temp = %self.layout.temp(),
                    "an error occurred while cleaning old temporary media field files"
                );
                PurgeReport::default()
            }
        }
    }

    async fn try_purge(&self, now: DateTime<Utc>) -> Result<PurgeReport> {
        let settings = MediaSiteSettings::load(self.settings.as_ref())
            .await
            .context("failed to load media settings")?;
        if !settings.purge_enabled() {
            debug!("temp file purge disabled");
            return Ok(PurgeReport::default());
        }
        let max_age = Duration::minutes(i64::from(
            settings.limited_editor_delete_temp_files_older_than,
        ));

        let entries = self
            .store
            .list_directory(self.layout.temp(), true)
            .await
            .context("failed to list temp folder")?;

        let (old_dirs, old_files): (Vec<FileStoreEntry>, Vec<FileStoreEntry>) = entries
            .into_iter()
            .filter(|entry| is_old(entry, max_age, now))
            .partition(|entry| entry.is_directory);

        let mut report = PurgeReport::default();

        let mut tasks: JoinSet<Result<bool>> = JoinSet::new();
        for file in old_files {
            let store = Arc::clone(&self.store);
            tasks.spawn(async move {
                store
                    .try_delete_file(&file.path)
                    .await
                    .with_context(|| format!("failed to delete temp file {}", file.path))
            });
        }
        let (deleted, failures) = drain(tasks).await;
        report.files_deleted = deleted;
        report.failures += failures;

        // Deepest first, so emptied parents can go in the same pass
        let mut old_dirs = old_dirs;
        old_dirs.sort_by_key(|dir| std::cmp::Reverse(path_depth(&dir.path)));
        for dir in old_dirs {
            // Non-recursive, so a directory that gained an upload since the
            // listing is left alone.
            match self.store.try_delete_empty_directory(&dir.path).await {
                Ok(true) => report.directories_deleted += 1,
                Ok(false) => debug!(path = %dir.path, "temp directory not empty, kept"),
                Err(e) => {
                    warn!(error = %e, path = %dir.path, "failed to delete temp directory");
                    report.failures += 1;
                }
            }
        }

        if report.files_deleted > 0 || report.directories_deleted > 0 {
            info!(
                files = report.files_deleted,
                directories = report.directories_deleted,
                failures = report.failures,
                "purged old temporary media field files"
            );
        }

        Ok(report)
    }
}

impl std::fmt::Debug for PurgeTempFilesService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PurgeTempFilesService")
            .field("layout", &self.layout)
            .finish()
    }
}

/// Older than `max_age` at `now`.
fn is_old(entry: &FileStoreEntry, max_age: Duration, now: DateTime<Utc>) -> bool {
    now - entry.last_modified_utc > max_age
}

/// Number of separators in a store path.
fn path_depth(path: &str) -> usize {
    path.chars().filter(|c| matches!(c, '/' | '\\')).count()
}

/// Wait for every deletion, counting deletions and failures.
async fn drain(mut tasks: JoinSet<Result<bool>>) -> (usize, usize) {
    let mut deleted = 0;
    let mut failures = 0;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(true)) => deleted += 1,
            Ok(Ok(false)) => {}
            Ok(Err(e)) => {
                warn!(error = ?e, "temp file purge step failed");
                failures += 1;
            }
            Err(e) => {
                warn!(error = %e, "temp file purge task aborted");
                failures += 1;
            }
        }
    }
    (deleted, failures)
}

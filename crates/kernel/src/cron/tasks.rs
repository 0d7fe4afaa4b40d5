//! Individual cron tasks.

use std::sync::Arc;

use tracing::debug;

use crate::file::{PurgeReport, PurgeTempFilesService};

/// Collection of cron tasks.
#[derive(Clone)]
pub struct CronTasks {
    purge: Arc<PurgeTempFilesService>,
}

impl CronTasks {
    /// Create a new cron tasks instance.
    pub fn new(purge: Arc<PurgeTempFilesService>) -> Self {
        Self { purge }
    }

    /// Delete abandoned limited editor uploads.
    ///
    /// Uploads that were never attached to a content item are removed once
    /// they are older than the configured age. Never fails; the next run is
    /// the retry.
    pub async fn purge_temp_files(&self) -> PurgeReport {
        let report = self.purge.purge().await;
        debug!(?report, "temp file purge finished");
        report
    }
}

impl std::fmt::Debug for CronTasks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CronTasks").finish()
    }
}

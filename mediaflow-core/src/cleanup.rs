//! Periodic retention sweep for finished jobs.
//!
//! The sweep never removes records itself: every candidate goes through the
//! worker's `DeleteJob`, so the job mutex and the terminal-status check apply
//! exactly as they do for a manual delete.

use std::{fmt, sync::Arc};

use chrono::{DateTime, Duration, Utc};
use mediaflow_model::{JobId, TERMINAL_JOB_STATUSES, timestamp};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    config::CleanupConfig,
    data_controller::{DataController, JobQuery},
    error::Result,
    table::SortOrder,
    worker::{JobOperation, WorkerInvoker, WorkerRequest},
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub candidates: usize,
    pub deleted: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct CleanupScheduler {
    data: DataController,
    invoker: Arc<dyn WorkerInvoker>,
    config: CleanupConfig,
}

impl fmt::Debug for CleanupScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CleanupScheduler")
            .field("invoker", &self.invoker)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl CleanupScheduler {
    pub fn new(
        data: DataController,
        invoker: Arc<dyn WorkerInvoker>,
        config: CleanupConfig,
    ) -> Self {
        Self {
            data,
            invoker,
            config,
        }
    }

    pub async fn sweep(&self) -> Result<SweepReport> {
        self.sweep_at(timestamp::now()).await
    }

    /// Deletes every terminal job created at or before
    /// `now - retention_days`. Individual failures are counted, not raised.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        if !self.config.is_enabled() {
            debug!(retention_days = self.config.retention_days, "job cleanup disabled");
            return Ok(SweepReport::default());
        }

        let cutoff = now - Duration::days(self.config.retention_days);
        let mut candidates: Vec<JobId> = Vec::new();
        for status in TERMINAL_JOB_STATUSES {
            let mut query = JobQuery {
                status: Some(status),
                to: Some(cutoff),
                order: SortOrder::Ascending,
                page_size: Some(self.config.page_size.max(1)),
                ..JobQuery::default()
            };
            loop {
                let page = self.data.query_jobs(&query).await?;
                candidates.extend(page.results.into_iter().map(|job| job.id));
                match page.next_page_start_token {
                    Some(token) => query.page_start_token = Some(token),
                    None => break,
                }
            }
        }

        let mut report = SweepReport {
            candidates: candidates.len(),
            ..SweepReport::default()
        };
        for job_id in candidates {
            let request = WorkerRequest::new(JobOperation::DeleteJob {
                job_id: job_id.clone(),
            });
            match self.invoker.invoke(request).await {
                Ok(()) => report.deleted += 1,
                Err(err) => {
                    report.failed += 1;
                    warn!(job_id = %job_id, error = %err, "failed to delete expired job");
                }
            }
        }

        info!(
            cutoff = %timestamp::format(&cutoff),
            candidates = report.candidates,
            deleted = report.deleted,
            failed = report.failed,
            "job cleanup finished"
        );
        Ok(report)
    }

    /// Sweeps on a fixed cadence until `shutdown` fires.
    pub async fn run(self, shutdown: CancellationToken) {
        let period = self.config.interval().max(std::time::Duration::from_secs(1));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(
            interval_secs = self.config.interval_secs,
            retention_days = self.config.retention_days,
            "job cleanup scheduler started"
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("job cleanup scheduler shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(err) = self.sweep().await {
                        warn!(error = %err, "job cleanup sweep failed");
                    }
                }
            }
        }
    }
}

use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use tokio_cron_scheduler::{Job as CronJob, JobScheduler};

use crate::error::{Error, Result};
use crate::models::job::{DECLINED_ARCHIVE_DAYS, RETENTION_DAYS};

/// Daily at 02:00 UTC.
pub const EXPIRY_SCHEDULE: &str = "0 0 2 * * *";
/// Sundays at 03:00 UTC.
pub const DECLINED_ARCHIVE_SCHEDULE: &str = "0 0 3 * * Sun";

pub fn retention_cutoff(now: DateTime<Utc>) -> DateTime<Utc> {
    now - Duration::days(RETENTION_DAYS)
}

pub fn declined_cutoff(now: DateTime<Utc>) -> DateTime<Utc> {
    now - Duration::days(DECLINED_ARCHIVE_DAYS)
}

#[derive(Clone)]
pub struct MaintenanceService {
    pool: PgPool,
}

impl MaintenanceService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Deactivates postings past the retention window. Re-running is a no-op
    /// because only still-active rows match.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET is_active = FALSE, expires_at = COALESCE(expires_at, $2), updated_at = $2
            WHERE is_active = TRUE AND created_at < $1
            "#,
        )
        .bind(retention_cutoff(now))
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn archive_declined(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET is_active = FALSE, updated_at = $2
            WHERE status = 'declined' AND is_active = TRUE AND created_at < $1
            "#,
        )
        .bind(declined_cutoff(now))
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn run_expiry(&self) {
        match self.sweep_expired(Utc::now()).await {
            Ok(count) => tracing::info!(deactivated = count, "Job expiry sweep finished"),
            Err(e) => tracing::error!(error = ?e, "Job expiry sweep failed"),
        }
    }

    async fn run_declined_archive(&self) {
        match self.archive_declined(Utc::now()).await {
            Ok(count) => tracing::info!(archived = count, "Declined job archive finished"),
            Err(e) => tracing::error!(error = ?e, "Declined job archive failed"),
        }
    }

    /// Registers both sweeps as independent cron jobs and starts the scheduler.
    pub async fn start_scheduler(&self) -> Result<JobScheduler> {
        let scheduler = JobScheduler::new().await.map_err(scheduler_error)?;

        let expiry = self.clone();
        scheduler
            .add(
                CronJob::new_async(EXPIRY_SCHEDULE, move |_id, _lock| {
                    let service = expiry.clone();
                    Box::pin(async move { service.run_expiry().await })
                })
                .map_err(scheduler_error)?,
            )
            .await
            .map_err(scheduler_error)?;

        let archive = self.clone();
        scheduler
            .add(
                CronJob::new_async(DECLINED_ARCHIVE_SCHEDULE, move |_id, _lock| {
                    let service = archive.clone();
                    Box::pin(async move { service.run_declined_archive().await })
                })
                .map_err(scheduler_error)?,
            )
            .await
            .map_err(scheduler_error)?;

        scheduler.start().await.map_err(scheduler_error)?;
        tracing::info!(
            expiry = EXPIRY_SCHEDULE,
            declined_archive = DECLINED_ARCHIVE_SCHEDULE,
            "Maintenance sweeps scheduled"
        );
        Ok(scheduler)
    }
}

fn scheduler_error(err: tokio_cron_scheduler::JobSchedulerError) -> Error {
    Error::Internal(format!("Scheduler error: {}", err))
}

//! In-process cron schedule.
//!
//! Three recurring jobs: the hourly orchestrated sync, the daily discrepancy
//! detector, and the weekly aggregate rollup. Each run builds a fresh
//! [`JobContext`] and records its own execution row; failures are logged and
//! never tear down the scheduler.

use std::sync::Arc;
use std::time::Instant;

use chrono::{Days, Utc};
use sqlx::PgPool;
use tokio_cron_scheduler::{Job, JobScheduler};

use mktops_connectors::types::DateRange;
use mktops_core::AppConfig;
use mktops_pipeline::{jobs, orchestrator, JobContext, Phase, RunStatus};

const HOURLY_SYNC_SCHEDULE: &str = "0 0 * * * *";
const DAILY_DETECTOR_SCHEDULE: &str = "0 30 3 * * *";
const WEEKLY_ROLLUP_SCHEDULE: &str = "0 0 4 * * MON";

const SYNC_WINDOW_DAYS: u64 = 2;
const ROLLUP_WINDOW_DAYS: u64 = 28;

fn trailing_window(days: u64) -> DateRange {
    let to = Utc::now().date_naive();
    let from = to.checked_sub_days(Days::new(days)).unwrap_or(to);
    DateRange { from, to }
}

/// Builds and starts the scheduler. The returned handle must stay alive for
/// the jobs to keep firing.
pub async fn build_scheduler(
    pool: PgPool,
    config: Arc<AppConfig>,
) -> anyhow::Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;

    let sync_pool = pool.clone();
    let sync_config = Arc::clone(&config);
    let sync_job = Job::new_async(HOURLY_SYNC_SCHEDULE, move |_uuid, _lock| {
        let pool = sync_pool.clone();
        let config = Arc::clone(&sync_config);
        Box::pin(async move {
            tracing::info!("starting scheduled orchestrated sync");
            let ctx = JobContext::new(pool, (*config).clone());
            let range = trailing_window(SYNC_WINDOW_DAYS);
            match orchestrator::run_orchestrated_sync(&ctx, &Phase::ALL, range, None).await {
                Ok(manifest) => tracing::info!(
                    status = manifest.status.as_str(),
                    duration_ms = manifest.duration_ms,
                    "orchestrated sync finished"
                ),
                Err(err) => tracing::error!(error = %err, "orchestrated sync failed"),
            }
        })
    })?;
    scheduler.add(sync_job).await?;

    let detector_pool = pool.clone();
    let detector_config = Arc::clone(&config);
    let detector_job = Job::new_async(DAILY_DETECTOR_SCHEDULE, move |_uuid, _lock| {
        let pool = detector_pool.clone();
        let config = Arc::clone(&detector_config);
        Box::pin(async move {
            tracing::info!("starting scheduled detector run");
            let ctx = JobContext::new(pool, (*config).clone());
            let started = Instant::now();
            match jobs::run_detector_job(&ctx, None, None).await {
                Ok(report) => {
                    jobs::record_execution(
                        &ctx,
                        "detector",
                        report.status,
                        started,
                        None,
                        report.resultados,
                    )
                    .await;
                    tracing::info!(status = report.status.as_str(), "detector run finished");
                }
                Err(err) => {
                    tracing::error!(error = %err, "detector run failed");
                    jobs::record_execution(
                        &ctx,
                        "detector",
                        RunStatus::Error,
                        started,
                        Some(err.to_string()),
                        serde_json::Value::Null,
                    )
                    .await;
                }
            }
        })
    })?;
    scheduler.add(detector_job).await?;

    let rollup_pool = pool;
    let rollup_config = config;
    let rollup_job = Job::new_async(WEEKLY_ROLLUP_SCHEDULE, move |_uuid, _lock| {
        let pool = rollup_pool.clone();
        let config = Arc::clone(&rollup_config);
        Box::pin(async move {
            tracing::info!("starting scheduled weekly rollup");
            let ctx = JobContext::new(pool, (*config).clone());
            let started = Instant::now();
            let range = trailing_window(ROLLUP_WINDOW_DAYS);
            match jobs::run_rollup_job(&ctx, range, None, None).await {
                Ok(report) => {
                    jobs::record_execution(
                        &ctx,
                        "weekly_rollup",
                        report.status,
                        started,
                        None,
                        report.resultados,
                    )
                    .await;
                    tracing::info!(status = report.status.as_str(), "weekly rollup finished");
                }
                Err(err) => {
                    tracing::error!(error = %err, "weekly rollup failed");
                    jobs::record_execution(
                        &ctx,
                        "weekly_rollup",
                        RunStatus::Error,
                        started,
                        Some(err.to_string()),
                        serde_json::Value::Null,
                    )
                    .await;
                }
            }
        })
    })?;
    scheduler.add(rollup_job).await?;

    scheduler.start().await?;
    tracing::info!("scheduler started with hourly sync, daily detector, weekly rollup");

    Ok(scheduler)
}

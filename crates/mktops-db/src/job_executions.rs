//! Database operations for `job_executions`.
//!
//! Append-only: every scheduled-job run writes exactly one row, consumed by
//! the monitoring endpoints. Telemetry writes are best-effort and never
//! retried.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::DbError;

/// A row from the `job_executions` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct JobExecutionRow {
    pub id: i64,
    pub job_name: String,
    pub status: String,
    pub duration_ms: i64,
    pub error_message: Option<String>,
    pub detail: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Fields for recording one job run.
#[derive(Debug, Clone)]
pub struct NewJobExecution {
    pub job_name: String,
    /// `success`, `error`, or `partial`.
    pub status: String,
    pub duration_ms: i64,
    pub error_message: Option<String>,
    pub detail: serde_json::Value,
}

/// Appends one job-execution record.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn insert_job_execution(pool: &PgPool, new: &NewJobExecution) -> Result<i64, DbError> {
    let id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO job_executions (job_name, status, duration_ms, error_message, detail) \
         VALUES ($1, $2, $3, $4, $5) \
         RETURNING id",
    )
    .bind(&new.job_name)
    .bind(&new.status)
    .bind(new.duration_ms)
    .bind(&new.error_message)
    .bind(&new.detail)
    .fetch_one(pool)
    .await?;

    Ok(id)
}

/// Returns the most recent `limit` executions, optionally for one job.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_job_executions(
    pool: &PgPool,
    job_name: Option<&str>,
    limit: i64,
) -> Result<Vec<JobExecutionRow>, DbError> {
    let rows = sqlx::query_as::<_, JobExecutionRow>(
        "SELECT id, job_name, status, duration_ms, error_message, detail, created_at \
         FROM job_executions \
         WHERE ($1::TEXT IS NULL OR job_name = $1) \
         ORDER BY created_at DESC, id DESC \
         LIMIT $2",
    )
    .bind(job_name)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Returns the latest execution per job name, for the monitoring dashboard.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn latest_job_executions(pool: &PgPool) -> Result<Vec<JobExecutionRow>, DbError> {
    let rows = sqlx::query_as::<_, JobExecutionRow>(
        "SELECT DISTINCT ON (job_name) \
                id, job_name, status, duration_ms, error_message, detail, created_at \
         FROM job_executions \
         ORDER BY job_name, created_at DESC, id DESC",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

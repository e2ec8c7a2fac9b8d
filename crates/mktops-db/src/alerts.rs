//! Database operations for `alerts`.
//!
//! The partial unique index `(creative_id, alert_type) WHERE NOT resolved`
//! enforces one open alert per violation kind. Resolved rows are history and
//! never mutated back; a reappearing violation inserts a fresh open row.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::DbError;

/// A row from the `alerts` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AlertRow {
    pub id: i64,
    pub creative_id: i64,
    pub alert_type: String,
    pub message: String,
    pub resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Opens an alert for `(creative_id, alert_type)` unless one is already open.
///
/// Returns `true` when a new row was inserted, `false` when the violation was
/// already open (the existing row and its message are left untouched).
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn open_alert(
    pool: &PgPool,
    creative_id: i64,
    alert_type: &str,
    message: &str,
) -> Result<bool, DbError> {
    let result = sqlx::query(
        "INSERT INTO alerts (creative_id, alert_type, message) \
         VALUES ($1, $2, $3) \
         ON CONFLICT (creative_id, alert_type) WHERE NOT resolved DO NOTHING",
    )
    .bind(creative_id)
    .bind(alert_type)
    .bind(message)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Resolves the open alert for `(creative_id, alert_type)`, if any.
///
/// Returns `true` when an open alert was transitioned to resolved.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn resolve_alert(
    pool: &PgPool,
    creative_id: i64,
    alert_type: &str,
) -> Result<bool, DbError> {
    let result = sqlx::query(
        "UPDATE alerts SET resolved = TRUE, resolved_at = NOW() \
         WHERE creative_id = $1 AND alert_type = $2 AND NOT resolved",
    )
    .bind(creative_id)
    .bind(alert_type)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Returns all open alerts for a company's creatives.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_open_alerts(pool: &PgPool, company_id: i64) -> Result<Vec<AlertRow>, DbError> {
    let rows = sqlx::query_as::<_, AlertRow>(
        "SELECT al.id, al.creative_id, al.alert_type, al.message, al.resolved, \
                al.resolved_at, al.created_at \
         FROM alerts al \
         JOIN creatives cr ON cr.id = al.creative_id \
         JOIN campaigns ca ON ca.id = cr.campaign_id \
         JOIN ad_accounts aa ON aa.id = ca.ad_account_id \
         WHERE aa.company_id = $1 AND NOT al.resolved \
         ORDER BY al.created_at DESC",
    )
    .bind(company_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Returns a company's alerts, open and resolved, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_alerts_for_company(
    pool: &PgPool,
    company_id: i64,
    limit: i64,
) -> Result<Vec<AlertRow>, DbError> {
    let rows = sqlx::query_as::<_, AlertRow>(
        "SELECT al.id, al.creative_id, al.alert_type, al.message, al.resolved, \
                al.resolved_at, al.created_at \
         FROM alerts al \
         JOIN creatives cr ON cr.id = al.creative_id \
         JOIN campaigns ca ON ca.id = cr.campaign_id \
         JOIN ad_accounts aa ON aa.id = ca.ad_account_id \
         WHERE aa.company_id = $1 \
         ORDER BY al.created_at DESC, al.id DESC \
         LIMIT $2",
    )
    .bind(company_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

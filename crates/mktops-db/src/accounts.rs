//! Database operations for `ad_accounts`.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::DbError;

/// A row from the `ad_accounts` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AdAccountRow {
    pub id: i64,
    pub company_id: i64,
    pub platform: String,
    pub external_id: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Upserts an ad account on `(platform, external_id)`.
///
/// Returns the internal id of the upserted row. A conflicting insert
/// re-parents the account if the company changed and reactivates it.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn upsert_ad_account(
    pool: &PgPool,
    company_id: i64,
    platform: &str,
    external_id: &str,
) -> Result<i64, DbError> {
    let id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO ad_accounts (company_id, platform, external_id) \
         VALUES ($1, $2, $3) \
         ON CONFLICT (platform, external_id) DO UPDATE SET \
             company_id = EXCLUDED.company_id, \
             is_active  = TRUE \
         RETURNING id",
    )
    .bind(company_id)
    .bind(platform)
    .bind(external_id)
    .fetch_one(pool)
    .await?;

    Ok(id)
}

/// Returns active ad accounts for a company, optionally filtered by platform.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_accounts_for_company(
    pool: &PgPool,
    company_id: i64,
    platform: Option<&str>,
) -> Result<Vec<AdAccountRow>, DbError> {
    let rows = sqlx::query_as::<_, AdAccountRow>(
        "SELECT id, company_id, platform, external_id, is_active, created_at \
         FROM ad_accounts \
         WHERE company_id = $1 AND is_active \
           AND ($2::TEXT IS NULL OR platform = $2) \
         ORDER BY id",
    )
    .bind(company_id)
    .bind(platform)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Returns every active ad account for a platform across all active companies.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_active_accounts(
    pool: &PgPool,
    platform: &str,
) -> Result<Vec<AdAccountRow>, DbError> {
    let rows = sqlx::query_as::<_, AdAccountRow>(
        "SELECT a.id, a.company_id, a.platform, a.external_id, a.is_active, a.created_at \
         FROM ad_accounts a \
         JOIN companies c ON c.id = a.company_id \
         WHERE a.is_active AND c.is_active AND a.platform = $1 \
         ORDER BY a.id",
    )
    .bind(platform)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

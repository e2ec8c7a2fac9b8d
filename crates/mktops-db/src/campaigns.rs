//! Database operations for `campaigns`.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::DbError;

/// A row from the `campaigns` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CampaignRow {
    pub id: i64,
    pub ad_account_id: i64,
    pub external_id: String,
    pub name: String,
    pub objective: Option<String>,
    pub is_active: bool,
    pub expected_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Upserts a campaign on `(ad_account_id, external_id)`.
///
/// Metadata sync only: name/objective/active status follow the latest vendor
/// snapshot; `expected_url` is operator-configured and never touched here.
/// Returns the internal id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn upsert_campaign(
    pool: &PgPool,
    ad_account_id: i64,
    external_id: &str,
    name: &str,
    objective: Option<&str>,
    is_active: bool,
) -> Result<i64, DbError> {
    let id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO campaigns (ad_account_id, external_id, name, objective, is_active) \
         VALUES ($1, $2, $3, $4, $5) \
         ON CONFLICT (ad_account_id, external_id) DO UPDATE SET \
             name       = EXCLUDED.name, \
             objective  = EXCLUDED.objective, \
             is_active  = EXCLUDED.is_active, \
             updated_at = NOW() \
         RETURNING id",
    )
    .bind(ad_account_id)
    .bind(external_id)
    .bind(name)
    .bind(objective)
    .bind(is_active)
    .fetch_one(pool)
    .await?;

    Ok(id)
}

/// Sets the operator-configured expected landing URL for a campaign.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the campaign does not exist, or
/// [`DbError::Sqlx`] if the update fails.
pub async fn set_campaign_expected_url(
    pool: &PgPool,
    campaign_id: i64,
    expected_url: Option<&str>,
) -> Result<(), DbError> {
    let result = sqlx::query("UPDATE campaigns SET expected_url = $1, updated_at = NOW() WHERE id = $2")
        .bind(expected_url)
        .bind(campaign_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}

/// Returns active campaigns for one ad account.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_active_campaigns_for_account(
    pool: &PgPool,
    ad_account_id: i64,
) -> Result<Vec<CampaignRow>, DbError> {
    let rows = sqlx::query_as::<_, CampaignRow>(
        "SELECT id, ad_account_id, external_id, name, objective, is_active, \
                expected_url, created_at, updated_at \
         FROM campaigns \
         WHERE ad_account_id = $1 AND is_active \
         ORDER BY id",
    )
    .bind(ad_account_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Returns active campaigns across all of a company's ad accounts.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_active_campaigns_for_company(
    pool: &PgPool,
    company_id: i64,
) -> Result<Vec<CampaignRow>, DbError> {
    let rows = sqlx::query_as::<_, CampaignRow>(
        "SELECT c.id, c.ad_account_id, c.external_id, c.name, c.objective, c.is_active, \
                c.expected_url, c.created_at, c.updated_at \
         FROM campaigns c \
         JOIN ad_accounts a ON a.id = c.ad_account_id \
         WHERE a.company_id = $1 AND c.is_active AND a.is_active \
         ORDER BY c.id",
    )
    .bind(company_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Maps vendor campaign external ids to internal ids for one ad account.
///
/// Used by ingestion to resolve insight rows in one round-trip instead of a
/// per-row lookup.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn campaign_ids_by_external_id(
    pool: &PgPool,
    ad_account_id: i64,
    external_ids: &[String],
) -> Result<HashMap<String, i64>, DbError> {
    let rows = sqlx::query_as::<_, (String, i64)>(
        "SELECT external_id, id FROM campaigns \
         WHERE ad_account_id = $1 AND external_id = ANY($2)",
    )
    .bind(ad_account_id)
    .bind(external_ids)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().collect())
}

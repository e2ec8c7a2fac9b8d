//! Database operations for `creatives`.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::DbError;

/// A row from the `creatives` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CreativeRow {
    pub id: i64,
    pub campaign_id: i64,
    pub external_id: String,
    pub name: Option<String>,
    pub kind: String,
    pub is_active: bool,
    pub expected_url: Option<String>,
    pub captured_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Vendor snapshot of a creative for the metadata upsert.
#[derive(Debug, Clone)]
pub struct NewCreative {
    pub external_id: String,
    pub name: Option<String>,
    pub kind: String,
    pub is_active: bool,
    pub captured_url: Option<String>,
    pub thumbnail_url: Option<String>,
}

/// Upserts a creative on `(campaign_id, external_id)`.
///
/// The captured final URL and thumbnail follow the vendor snapshot;
/// `expected_url` is operator-configured and preserved across syncs.
/// Returns the internal id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn upsert_creative(
    pool: &PgPool,
    campaign_id: i64,
    new: &NewCreative,
) -> Result<i64, DbError> {
    let id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO creatives \
             (campaign_id, external_id, name, kind, is_active, captured_url, thumbnail_url) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) \
         ON CONFLICT (campaign_id, external_id) DO UPDATE SET \
             name          = EXCLUDED.name, \
             kind          = EXCLUDED.kind, \
             is_active     = EXCLUDED.is_active, \
             captured_url  = COALESCE(EXCLUDED.captured_url, creatives.captured_url), \
             thumbnail_url = COALESCE(EXCLUDED.thumbnail_url, creatives.thumbnail_url), \
             updated_at    = NOW() \
         RETURNING id",
    )
    .bind(campaign_id)
    .bind(&new.external_id)
    .bind(&new.name)
    .bind(&new.kind)
    .bind(new.is_active)
    .bind(&new.captured_url)
    .bind(&new.thumbnail_url)
    .fetch_one(pool)
    .await?;

    Ok(id)
}

/// Updates just the captured URL / thumbnail of an existing creative.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the creative does not exist, or
/// [`DbError::Sqlx`] if the update fails.
pub async fn set_creative_capture(
    pool: &PgPool,
    creative_id: i64,
    captured_url: Option<&str>,
    thumbnail_url: Option<&str>,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE creatives SET \
             captured_url  = COALESCE($1, captured_url), \
             thumbnail_url = COALESCE($2, thumbnail_url), \
             updated_at    = NOW() \
         WHERE id = $3",
    )
    .bind(captured_url)
    .bind(thumbnail_url)
    .bind(creative_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}

/// Refreshes the stored thumbnail of one creative identified by its natural
/// key. Vendor thumbnail URLs expire, so this runs on every sync even when
/// the rest of the creative metadata is unchanged.
///
/// Returns `true` when a row was updated, `false` when the creative is
/// unknown or already carries this URL.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn refresh_creative_thumbnail(
    pool: &PgPool,
    campaign_id: i64,
    external_id: &str,
    thumbnail_url: &str,
) -> Result<bool, DbError> {
    let result = sqlx::query(
        "UPDATE creatives SET thumbnail_url = $1, updated_at = NOW() \
         WHERE campaign_id = $2 AND external_id = $3 \
           AND thumbnail_url IS DISTINCT FROM $1",
    )
    .bind(thumbnail_url)
    .bind(campaign_id)
    .bind(external_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Returns every active creative under a company's active campaigns, with the
/// campaign's expected URL for fallback, as `(row, campaign_expected_url)`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_active_creatives_for_company(
    pool: &PgPool,
    company_id: i64,
) -> Result<Vec<(CreativeRow, Option<String>)>, DbError> {
    #[derive(sqlx::FromRow)]
    struct Joined {
        #[sqlx(flatten)]
        creative: CreativeRow,
        campaign_expected_url: Option<String>,
    }

    let rows = sqlx::query_as::<_, Joined>(
        "SELECT cr.id, cr.campaign_id, cr.external_id, cr.name, cr.kind, cr.is_active, \
                cr.expected_url, cr.captured_url, cr.thumbnail_url, cr.created_at, cr.updated_at, \
                ca.expected_url AS campaign_expected_url \
         FROM creatives cr \
         JOIN campaigns ca ON ca.id = cr.campaign_id \
         JOIN ad_accounts aa ON aa.id = ca.ad_account_id \
         WHERE aa.company_id = $1 AND cr.is_active AND ca.is_active \
         ORDER BY cr.id",
    )
    .bind(company_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|j| (j.creative, j.campaign_expected_url))
        .collect())
}

/// Maps creative external ids to internal ids for one ad account.
///
/// External ids that appear under more than one campaign of the account are
/// dropped from the map. Inactive creatives are kept: paused ads still report
/// delivery for days they ran.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn creative_ids_for_account(
    pool: &PgPool,
    account_id: i64,
) -> Result<HashMap<String, i64>, DbError> {
    let rows = sqlx::query_as::<_, (String, i64)>(
        "SELECT cr.external_id, MAX(cr.id) \
         FROM creatives cr \
         JOIN campaigns ca ON ca.id = cr.campaign_id \
         WHERE ca.ad_account_id = $1 \
         GROUP BY cr.external_id \
         HAVING COUNT(*) = 1",
    )
    .bind(account_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().collect())
}

/// Maps active creative external ids to internal ids for one company.
///
/// External ids that appear under more than one campaign of the company are
/// dropped from the map: an ambiguous id must never be used for attribution
/// linking.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn creative_ids_by_external_id(
    pool: &PgPool,
    company_id: i64,
) -> Result<HashMap<String, i64>, DbError> {
    let rows = sqlx::query_as::<_, (String, i64)>(
        "SELECT cr.external_id, MAX(cr.id) \
         FROM creatives cr \
         JOIN campaigns ca ON ca.id = cr.campaign_id \
         JOIN ad_accounts aa ON aa.id = ca.ad_account_id \
         WHERE aa.company_id = $1 AND cr.is_active \
         GROUP BY cr.external_id \
         HAVING COUNT(*) = 1",
    )
    .bind(company_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().collect())
}

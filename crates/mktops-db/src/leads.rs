//! Database operations for `leads`.
//!
//! A lead is created once per CRM natural key `(company_id, external_id)` and
//! then enriched by several independent jobs. Each enrichment source writes
//! only its own column namespace (`automation_*`, `investor_*`,
//! `tracking_*`), so concurrent enrichers cannot clobber each other.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

/// A row from the `leads` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LeadRow {
    pub id: i64,
    pub public_id: Uuid,
    pub company_id: i64,
    pub external_id: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub entered_at: NaiveDate,
    pub utm_source: Option<String>,
    pub utm_medium: Option<String>,
    pub utm_campaign: Option<String>,
    pub utm_content: Option<String>,
    pub utm_term: Option<String>,
    pub creative_id: Option<i64>,
    pub is_mql: bool,
    pub raised_hand: bool,
    pub meeting_scheduled: bool,
    pub meeting_done: bool,
    pub sale_done: bool,
    pub sale_value: Option<Decimal>,
    pub crm_stage: Option<String>,
    pub crm_value: Option<Decimal>,
    pub automation_score: Option<i32>,
    pub automation_tags: Option<serde_json::Value>,
    pub investor_flag: Option<bool>,
    pub investor_amount: Option<Decimal>,
    pub tracking_client_id: Option<String>,
    pub tracking_fbp: Option<String>,
    pub tracking_visits: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields the CRM sync supplies when creating or refreshing a lead.
#[derive(Debug, Clone)]
pub struct NewLead {
    pub external_id: String,
    pub name: Option<String>,
    pub email: Option<String>,
    /// Already normalized; unresolvable phones arrive as `None`.
    pub phone: Option<String>,
    pub entered_at: NaiveDate,
    pub utm_source: Option<String>,
    pub utm_medium: Option<String>,
    pub utm_campaign: Option<String>,
    pub utm_content: Option<String>,
    pub utm_term: Option<String>,
    pub is_mql: bool,
    pub raised_hand: bool,
    pub meeting_scheduled: bool,
    pub meeting_done: bool,
    pub sale_done: bool,
    pub sale_value: Option<Decimal>,
    pub crm_stage: Option<String>,
    pub crm_value: Option<Decimal>,
}

const LEAD_COLUMNS: &str = "id, public_id, company_id, external_id, name, email, phone, \
     entered_at, utm_source, utm_medium, utm_campaign, utm_content, utm_term, creative_id, \
     is_mql, raised_hand, meeting_scheduled, meeting_done, sale_done, sale_value, \
     crm_stage, crm_value, automation_score, automation_tags, investor_flag, investor_amount, \
     tracking_client_id, tracking_fbp, tracking_visits, created_at, updated_at";

/// Upserts a lead on `(company_id, external_id)` from a CRM snapshot.
///
/// Lifecycle flags are monotonic (`OR`-merged, never cleared by a stale
/// snapshot), first-captured attribution is preserved, and enrichment
/// namespaces owned by other sources are untouched. Returns the internal id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn upsert_lead(pool: &PgPool, company_id: i64, new: &NewLead) -> Result<i64, DbError> {
    let id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO leads \
             (public_id, company_id, external_id, name, email, phone, entered_at, \
              utm_source, utm_medium, utm_campaign, utm_content, utm_term, \
              is_mql, raised_hand, meeting_scheduled, meeting_done, sale_done, sale_value, \
              crm_stage, crm_value) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, \
                 $13, $14, $15, $16, $17, $18, $19, $20) \
         ON CONFLICT (company_id, external_id) DO UPDATE SET \
             name              = COALESCE(EXCLUDED.name, leads.name), \
             email             = COALESCE(EXCLUDED.email, leads.email), \
             phone             = COALESCE(EXCLUDED.phone, leads.phone), \
             utm_source        = COALESCE(leads.utm_source, EXCLUDED.utm_source), \
             utm_medium        = COALESCE(leads.utm_medium, EXCLUDED.utm_medium), \
             utm_campaign      = COALESCE(leads.utm_campaign, EXCLUDED.utm_campaign), \
             utm_content       = COALESCE(leads.utm_content, EXCLUDED.utm_content), \
             utm_term          = COALESCE(leads.utm_term, EXCLUDED.utm_term), \
             is_mql            = leads.is_mql OR EXCLUDED.is_mql, \
             raised_hand       = leads.raised_hand OR EXCLUDED.raised_hand, \
             meeting_scheduled = leads.meeting_scheduled OR EXCLUDED.meeting_scheduled, \
             meeting_done      = leads.meeting_done OR EXCLUDED.meeting_done, \
             sale_done         = leads.sale_done OR EXCLUDED.sale_done, \
             sale_value        = COALESCE(EXCLUDED.sale_value, leads.sale_value), \
             crm_stage         = COALESCE(EXCLUDED.crm_stage, leads.crm_stage), \
             crm_value         = COALESCE(EXCLUDED.crm_value, leads.crm_value), \
             updated_at        = NOW() \
         RETURNING id",
    )
    .bind(Uuid::new_v4())
    .bind(company_id)
    .bind(&new.external_id)
    .bind(&new.name)
    .bind(&new.email)
    .bind(&new.phone)
    .bind(new.entered_at)
    .bind(&new.utm_source)
    .bind(&new.utm_medium)
    .bind(&new.utm_campaign)
    .bind(&new.utm_content)
    .bind(&new.utm_term)
    .bind(new.is_mql)
    .bind(new.raised_hand)
    .bind(new.meeting_scheduled)
    .bind(new.meeting_done)
    .bind(new.sale_done)
    .bind(new.sale_value)
    .bind(&new.crm_stage)
    .bind(new.crm_value)
    .fetch_one(pool)
    .await?;

    Ok(id)
}

/// Fetches a company's leads matching any of the given emails in one
/// round-trip (case-insensitive).
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn leads_by_emails(
    pool: &PgPool,
    company_id: i64,
    emails: &[String],
) -> Result<Vec<LeadRow>, DbError> {
    let lowered: Vec<String> = emails.iter().map(|e| e.to_lowercase()).collect();
    let sql = format!(
        "SELECT {LEAD_COLUMNS} FROM leads \
         WHERE company_id = $1 AND LOWER(email) = ANY($2)"
    );
    let rows = sqlx::query_as::<_, LeadRow>(&sql)
        .bind(company_id)
        .bind(&lowered)
        .fetch_all(pool)
        .await?;

    Ok(rows)
}

/// Finds a lead by server-side-tracking client id. `None` when absent.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn find_lead_by_client_id(
    pool: &PgPool,
    company_id: i64,
    client_id: &str,
) -> Result<Option<LeadRow>, DbError> {
    let sql = format!(
        "SELECT {LEAD_COLUMNS} FROM leads \
         WHERE company_id = $1 AND tracking_client_id = $2 \
         ORDER BY id LIMIT 1"
    );
    let row = sqlx::query_as::<_, LeadRow>(&sql)
        .bind(company_id)
        .bind(client_id)
        .fetch_optional(pool)
        .await?;

    Ok(row)
}

/// Finds a lead by Facebook browser pixel id. `None` when absent.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn find_lead_by_fbp(
    pool: &PgPool,
    company_id: i64,
    fbp: &str,
) -> Result<Option<LeadRow>, DbError> {
    let sql = format!(
        "SELECT {LEAD_COLUMNS} FROM leads \
         WHERE company_id = $1 AND tracking_fbp = $2 \
         ORDER BY id LIMIT 1"
    );
    let row = sqlx::query_as::<_, LeadRow>(&sql)
        .bind(company_id)
        .bind(fbp)
        .fetch_optional(pool)
        .await?;

    Ok(row)
}

/// Writes the marketing-automation namespace of a lead.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the lead does not exist, or
/// [`DbError::Sqlx`] if the update fails.
pub async fn set_lead_automation(
    pool: &PgPool,
    lead_id: i64,
    score: Option<i32>,
    tags: Option<&serde_json::Value>,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE leads SET \
             automation_score = COALESCE($1, automation_score), \
             automation_tags  = COALESCE($2, automation_tags), \
             updated_at       = NOW() \
         WHERE id = $3",
    )
    .bind(score)
    .bind(tags)
    .bind(lead_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}

/// Writes the investment-platform namespace of a lead.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the lead does not exist, or
/// [`DbError::Sqlx`] if the update fails.
pub async fn set_lead_investor(
    pool: &PgPool,
    lead_id: i64,
    investor_flag: bool,
    invested_amount: Option<Decimal>,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE leads SET \
             investor_flag   = $1, \
             investor_amount = COALESCE($2, investor_amount), \
             updated_at      = NOW() \
         WHERE id = $3",
    )
    .bind(investor_flag)
    .bind(invested_amount)
    .bind(lead_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}

/// Writes the server-side-tracking namespace of a lead.
///
/// Identifiers merge with COALESCE; the visit history is replaced wholesale
/// since the tracker always sends the full list.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the lead does not exist, or
/// [`DbError::Sqlx`] if the update fails.
pub async fn set_lead_tracking(
    pool: &PgPool,
    lead_id: i64,
    client_id: Option<&str>,
    fbp: Option<&str>,
    visits: Option<&serde_json::Value>,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE leads SET \
             tracking_client_id = COALESCE($1, tracking_client_id), \
             tracking_fbp       = COALESCE($2, tracking_fbp), \
             tracking_visits    = COALESCE($3, tracking_visits), \
             updated_at         = NOW() \
         WHERE id = $4",
    )
    .bind(client_id)
    .bind(fbp)
    .bind(visits)
    .bind(lead_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}

/// Links a lead to the creative its `utm_content` resolved to.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the lead does not exist, or
/// [`DbError::Sqlx`] if the update fails.
pub async fn link_lead_creative(
    pool: &PgPool,
    lead_id: i64,
    creative_id: i64,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE leads SET creative_id = $1, updated_at = NOW() WHERE id = $2",
    )
    .bind(creative_id)
    .bind(lead_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}

/// Returns `(lead id, utm_content)` for a company's leads that carry a
/// `utm_content` value but have no creative link yet.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn unlinked_leads_with_utm_content(
    pool: &PgPool,
    company_id: i64,
) -> Result<Vec<(i64, String)>, DbError> {
    let rows = sqlx::query_as::<_, (i64, String)>(
        "SELECT id, utm_content FROM leads \
         WHERE company_id = $1 AND creative_id IS NULL AND utm_content IS NOT NULL \
         ORDER BY id",
    )
    .bind(company_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Returns a company's leads that entered within the inclusive date range.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn leads_entered_between(
    pool: &PgPool,
    company_id: i64,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Vec<LeadRow>, DbError> {
    let sql = format!(
        "SELECT {LEAD_COLUMNS} FROM leads \
         WHERE company_id = $1 AND entered_at BETWEEN $2 AND $3 \
         ORDER BY id"
    );
    let rows = sqlx::query_as::<_, LeadRow>(&sql)
        .bind(company_id)
        .bind(from)
        .bind(to)
        .fetch_all(pool)
        .await?;

    Ok(rows)
}

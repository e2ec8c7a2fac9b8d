//! Database operations for the daily fact tables.
//!
//! Every write here conflicts on `(entity id, date)` and overwrites, which is
//! what makes ingestion re-runs and backfills safe.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;

use crate::DbError;

/// A normalized per-day fact for a campaign or creative.
#[derive(Debug, Clone, Default)]
pub struct DailyFact {
    pub date: NaiveDate,
    pub impressions: i64,
    pub clicks: i64,
    pub spend: Decimal,
    pub conversions: i64,
}

/// A row from `campaign_daily_metrics`.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CampaignDailyMetricRow {
    pub id: i64,
    pub campaign_id: i64,
    pub metric_date: NaiveDate,
    pub impressions: i64,
    pub clicks: i64,
    pub spend: Decimal,
    pub conversions: i64,
    pub updated_at: DateTime<Utc>,
}

/// Computed per-company per-day rollup ready to persist.
#[derive(Debug, Clone)]
pub struct CompanyDailyRollup {
    pub date: NaiveDate,
    pub leads: i64,
    pub mqls: i64,
    pub raised_hands: i64,
    pub meetings_scheduled: i64,
    pub meetings_done: i64,
    pub sales: i64,
    pub sale_value: Decimal,
    pub spend: Decimal,
    pub cpl: Option<Decimal>,
    pub cac: Option<Decimal>,
    pub avg_ticket: Option<Decimal>,
    pub roas: Option<Decimal>,
    pub conversion_rate: Option<Decimal>,
}

/// Upserts one campaign day on `(campaign_id, metric_date)`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn upsert_campaign_daily_metric(
    pool: &PgPool,
    campaign_id: i64,
    fact: &DailyFact,
) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO campaign_daily_metrics \
             (campaign_id, metric_date, impressions, clicks, spend, conversions) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         ON CONFLICT (campaign_id, metric_date) DO UPDATE SET \
             impressions = EXCLUDED.impressions, \
             clicks      = EXCLUDED.clicks, \
             spend       = EXCLUDED.spend, \
             conversions = EXCLUDED.conversions, \
             updated_at  = NOW()",
    )
    .bind(campaign_id)
    .bind(fact.date)
    .bind(fact.impressions)
    .bind(fact.clicks)
    .bind(fact.spend)
    .bind(fact.conversions)
    .execute(pool)
    .await?;

    Ok(())
}

/// Upserts one creative day on `(creative_id, metric_date)`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn upsert_creative_daily_metric(
    pool: &PgPool,
    creative_id: i64,
    fact: &DailyFact,
) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO creative_daily_metrics \
             (creative_id, metric_date, impressions, clicks, spend, conversions) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         ON CONFLICT (creative_id, metric_date) DO UPDATE SET \
             impressions = EXCLUDED.impressions, \
             clicks      = EXCLUDED.clicks, \
             spend       = EXCLUDED.spend, \
             conversions = EXCLUDED.conversions, \
             updated_at  = NOW()",
    )
    .bind(creative_id)
    .bind(fact.date)
    .bind(fact.impressions)
    .bind(fact.clicks)
    .bind(fact.spend)
    .bind(fact.conversions)
    .execute(pool)
    .await?;

    Ok(())
}

/// Upserts one company rollup day on `(company_id, metric_date)`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn upsert_company_daily_metric(
    pool: &PgPool,
    company_id: i64,
    rollup: &CompanyDailyRollup,
) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO company_daily_metrics \
             (company_id, metric_date, leads, mqls, raised_hands, meetings_scheduled, \
              meetings_done, sales, sale_value, spend, cpl, cac, avg_ticket, roas, \
              conversion_rate) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15) \
         ON CONFLICT (company_id, metric_date) DO UPDATE SET \
             leads              = EXCLUDED.leads, \
             mqls               = EXCLUDED.mqls, \
             raised_hands       = EXCLUDED.raised_hands, \
             meetings_scheduled = EXCLUDED.meetings_scheduled, \
             meetings_done      = EXCLUDED.meetings_done, \
             sales              = EXCLUDED.sales, \
             sale_value         = EXCLUDED.sale_value, \
             spend              = EXCLUDED.spend, \
             cpl                = EXCLUDED.cpl, \
             cac                = EXCLUDED.cac, \
             avg_ticket         = EXCLUDED.avg_ticket, \
             roas               = EXCLUDED.roas, \
             conversion_rate    = EXCLUDED.conversion_rate, \
             updated_at         = NOW()",
    )
    .bind(company_id)
    .bind(rollup.date)
    .bind(rollup.leads)
    .bind(rollup.mqls)
    .bind(rollup.raised_hands)
    .bind(rollup.meetings_scheduled)
    .bind(rollup.meetings_done)
    .bind(rollup.sales)
    .bind(rollup.sale_value)
    .bind(rollup.spend)
    .bind(rollup.cpl)
    .bind(rollup.cac)
    .bind(rollup.avg_ticket)
    .bind(rollup.roas)
    .bind(rollup.conversion_rate)
    .execute(pool)
    .await?;

    Ok(())
}

/// A row from `company_daily_metrics`.
#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct CompanyDailyMetricRow {
    pub metric_date: NaiveDate,
    pub leads: i64,
    pub mqls: i64,
    pub raised_hands: i64,
    pub meetings_scheduled: i64,
    pub meetings_done: i64,
    pub sales: i64,
    pub sale_value: Decimal,
    pub spend: Decimal,
    pub cpl: Option<Decimal>,
    pub cac: Option<Decimal>,
    pub avg_ticket: Option<Decimal>,
    pub roas: Option<Decimal>,
    pub conversion_rate: Option<Decimal>,
}

/// Returns a company's daily rollup rows over `[from, to]`, oldest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_company_daily_metrics(
    pool: &PgPool,
    company_id: i64,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Vec<CompanyDailyMetricRow>, DbError> {
    let rows = sqlx::query_as::<_, CompanyDailyMetricRow>(
        "SELECT metric_date, leads, mqls, raised_hands, meetings_scheduled, meetings_done, \
                sales, sale_value, spend, cpl, cac, avg_ticket, roas, conversion_rate \
         FROM company_daily_metrics \
         WHERE company_id = $1 AND metric_date BETWEEN $2 AND $3 \
         ORDER BY metric_date",
    )
    .bind(company_id)
    .bind(from)
    .bind(to)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Sums a company's campaign spend over `[from, to]`, for pacing.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn sum_company_spend_between(
    pool: &PgPool,
    company_id: i64,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Decimal, DbError> {
    let spend: Option<Decimal> = sqlx::query_scalar(
        "SELECT SUM(m.spend) \
         FROM campaign_daily_metrics m \
         JOIN campaigns c ON c.id = m.campaign_id \
         JOIN ad_accounts a ON a.id = c.ad_account_id \
         WHERE a.company_id = $1 AND m.metric_date BETWEEN $2 AND $3",
    )
    .bind(company_id)
    .bind(from)
    .bind(to)
    .fetch_one(pool)
    .await?;

    Ok(spend.unwrap_or(Decimal::ZERO))
}

/// Per-campaign totals over an inclusive date range, used by the weekly
/// rollup.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CampaignPeriodTotals {
    pub campaign_id: i64,
    pub impressions: i64,
    pub clicks: i64,
    pub spend: Decimal,
    pub conversions: i64,
}

/// Sums each campaign's daily facts over `[from, to]` for one company.
///
/// Campaigns with no fact rows in the range are omitted.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn campaign_totals_between(
    pool: &PgPool,
    company_id: i64,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Vec<CampaignPeriodTotals>, DbError> {
    let rows = sqlx::query_as::<_, CampaignPeriodTotals>(
        "SELECT m.campaign_id, \
                COALESCE(SUM(m.impressions), 0)::BIGINT AS impressions, \
                COALESCE(SUM(m.clicks), 0)::BIGINT AS clicks, \
                COALESCE(SUM(m.spend), 0) AS spend, \
                COALESCE(SUM(m.conversions), 0)::BIGINT AS conversions \
         FROM campaign_daily_metrics m \
         JOIN campaigns c ON c.id = m.campaign_id \
         JOIN ad_accounts a ON a.id = c.ad_account_id \
         WHERE a.company_id = $1 AND m.metric_date BETWEEN $2 AND $3 \
         GROUP BY m.campaign_id \
         ORDER BY m.campaign_id",
    )
    .bind(company_id)
    .bind(from)
    .bind(to)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Sums campaign spend across a company's campaigns for one date.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn sum_company_spend_for_date(
    pool: &PgPool,
    company_id: i64,
    date: NaiveDate,
) -> Result<Decimal, DbError> {
    let spend: Option<Decimal> = sqlx::query_scalar(
        "SELECT SUM(m.spend) \
         FROM campaign_daily_metrics m \
         JOIN campaigns c ON c.id = m.campaign_id \
         JOIN ad_accounts a ON a.id = c.ad_account_id \
         WHERE a.company_id = $1 AND m.metric_date = $2",
    )
    .bind(company_id)
    .bind(date)
    .fetch_one(pool)
    .await?;

    Ok(spend.unwrap_or(Decimal::ZERO))
}

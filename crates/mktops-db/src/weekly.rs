//! Database operations for `weeks` and the weekly rollup tables.
//!
//! Weekly rows are recomputed wholesale: a rollup run replaces the entire row
//! for `(entity, week)` instead of patching it incrementally, so recomputing
//! a week after new facts arrive yields correct totals without double
//! counting.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::PgPool;

use crate::metrics::CompanyDailyRollup;
use crate::DbError;

/// A row from the `weeks` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct WeekRow {
    pub id: i64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

/// A company weekly rollup row joined with its week boundaries.
#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct CompanyWeeklyMetricRow {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
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

/// Returns a company's most recent weekly rollups, newest week first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_company_weekly_metrics(
    pool: &PgPool,
    company_id: i64,
    limit: i64,
) -> Result<Vec<CompanyWeeklyMetricRow>, DbError> {
    let rows = sqlx::query_as::<_, CompanyWeeklyMetricRow>(
        "SELECT w.start_date, w.end_date, m.leads, m.mqls, m.raised_hands, \
                m.meetings_scheduled, m.meetings_done, m.sales, m.sale_value, m.spend, \
                m.cpl, m.cac, m.avg_ticket, m.roas, m.conversion_rate \
         FROM company_weekly_metrics m \
         JOIN weeks w ON w.id = m.week_id \
         WHERE m.company_id = $1 \
         ORDER BY w.start_date DESC \
         LIMIT $2",
    )
    .bind(company_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Fetches or creates the week row for an explicit `[start, end]` range.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn get_or_create_week(
    pool: &PgPool,
    start_date: NaiveDate,
    end_date: NaiveDate,
) -> Result<WeekRow, DbError> {
    // DO UPDATE instead of DO NOTHING so RETURNING always yields the row.
    let row = sqlx::query_as::<_, WeekRow>(
        "INSERT INTO weeks (start_date, end_date) \
         VALUES ($1, $2) \
         ON CONFLICT (start_date, end_date) DO UPDATE SET start_date = EXCLUDED.start_date \
         RETURNING id, start_date, end_date",
    )
    .bind(start_date)
    .bind(end_date)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Replaces the company weekly rollup row for `(company_id, week_id)`.
///
/// The rollup struct's `date` field is unused here; totals cover the week's
/// full inclusive range.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn replace_company_weekly_metric(
    pool: &PgPool,
    company_id: i64,
    week_id: i64,
    rollup: &CompanyDailyRollup,
) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO company_weekly_metrics \
             (company_id, week_id, leads, mqls, raised_hands, meetings_scheduled, \
              meetings_done, sales, sale_value, spend, cpl, cac, avg_ticket, roas, \
              conversion_rate) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15) \
         ON CONFLICT (company_id, week_id) DO UPDATE SET \
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
    .bind(week_id)
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

/// Replaces the campaign weekly rollup row for `(campaign_id, week_id)`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
#[allow(clippy::too_many_arguments)]
pub async fn replace_campaign_weekly_metric(
    pool: &PgPool,
    campaign_id: i64,
    week_id: i64,
    impressions: i64,
    clicks: i64,
    spend: Decimal,
    conversions: i64,
    cpl: Option<Decimal>,
) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO campaign_weekly_metrics \
             (campaign_id, week_id, impressions, clicks, spend, conversions, cpl) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) \
         ON CONFLICT (campaign_id, week_id) DO UPDATE SET \
             impressions = EXCLUDED.impressions, \
             clicks      = EXCLUDED.clicks, \
             spend       = EXCLUDED.spend, \
             conversions = EXCLUDED.conversions, \
             cpl         = EXCLUDED.cpl, \
             updated_at  = NOW()",
    )
    .bind(campaign_id)
    .bind(week_id)
    .bind(impressions)
    .bind(clicks)
    .bind(spend)
    .bind(conversions)
    .bind(cpl)
    .execute(pool)
    .await?;

    Ok(())
}

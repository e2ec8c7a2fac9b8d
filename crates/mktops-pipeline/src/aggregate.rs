//! Aggregation: roll daily facts and lead counts up into per-company daily
//! rows and per-company/per-campaign weekly rows.
//!
//! Weekly rows are recomputed by full replace so a re-run after late data
//! yields correct totals instead of double counting.

use chrono::{Duration, NaiveDate};
use rust_decimal::Decimal;
use sqlx::PgPool;

use mktops_core::{ratio, weeks};
use mktops_db::metrics::CompanyDailyRollup;
use mktops_db::LeadRow;

use crate::PipelineError;

/// Builds a company rollup from its leads for one date plus the day's spend.
/// Pure so the ratio policy is testable without a database.
#[must_use]
pub fn rollup_from_leads(date: NaiveDate, leads: &[LeadRow], spend: Decimal) -> CompanyDailyRollup {
    let count = |pred: fn(&LeadRow) -> bool| -> i64 {
        i64::try_from(leads.iter().filter(|l| pred(l)).count()).unwrap_or(i64::MAX)
    };
    let leads_total = i64::try_from(leads.len()).unwrap_or(i64::MAX);
    let sales = count(|l| l.sale_done);
    let sale_value: Decimal = leads
        .iter()
        .filter(|l| l.sale_done)
        .filter_map(|l| l.sale_value)
        .sum();

    CompanyDailyRollup {
        date,
        leads: leads_total,
        mqls: count(|l| l.is_mql),
        raised_hands: count(|l| l.raised_hand),
        meetings_scheduled: count(|l| l.meeting_scheduled),
        meetings_done: count(|l| l.meeting_done),
        sales,
        sale_value,
        spend,
        cpl: ratio::per_count(spend, leads_total),
        cac: ratio::per_count(spend, sales),
        avg_ticket: ratio::per_count(sale_value, sales),
        roas: ratio::fraction(sale_value, spend),
        conversion_rate: ratio::rate(sales, leads_total),
    }
}

/// Computes and persists the company rollup for one date.
///
/// # Errors
///
/// Returns [`PipelineError::Db`] if a read or write fails.
pub async fn compute_company_daily(
    pool: &PgPool,
    company_id: i64,
    date: NaiveDate,
) -> Result<CompanyDailyRollup, PipelineError> {
    let leads = mktops_db::leads_entered_between(pool, company_id, date, date).await?;
    let spend = mktops_db::sum_company_spend_for_date(pool, company_id, date).await?;
    let rollup = rollup_from_leads(date, &leads, spend);
    mktops_db::upsert_company_daily_metric(pool, company_id, &rollup).await?;
    Ok(rollup)
}

/// Computes company rollups for every date in the inclusive range.
///
/// # Errors
///
/// Returns [`PipelineError::Db`] if a read or write fails.
pub async fn compute_company_dailies(
    pool: &PgPool,
    company_id: i64,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<usize, PipelineError> {
    let mut written = 0usize;
    let mut date = from;
    while date <= to {
        compute_company_daily(pool, company_id, date).await?;
        written += 1;
        date += Duration::days(1);
    }
    Ok(written)
}

/// Recomputes the weekly rollups (company and campaign) for every week
/// overlapping `[from, to]`, by full replace.
///
/// # Errors
///
/// Returns [`PipelineError::Db`] if a read or write fails.
pub async fn recompute_weekly(
    pool: &PgPool,
    company_id: i64,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<serde_json::Value, PipelineError> {
    let mut company_weeks = 0usize;
    let mut campaign_weeks = 0usize;

    for range in weeks::weeks_covering(from, to) {
        let week = mktops_db::get_or_create_week(pool, range.start, range.end).await?;

        let leads =
            mktops_db::leads_entered_between(pool, company_id, range.start, range.end).await?;
        let totals =
            mktops_db::campaign_totals_between(pool, company_id, range.start, range.end).await?;
        let spend: Decimal = totals.iter().map(|t| t.spend).sum();

        let rollup = rollup_from_leads(range.start, &leads, spend);
        mktops_db::replace_company_weekly_metric(pool, company_id, week.id, &rollup).await?;
        company_weeks += 1;

        for total in &totals {
            let cpl = ratio::per_count(total.spend, total.conversions);
            mktops_db::replace_campaign_weekly_metric(
                pool,
                total.campaign_id,
                week.id,
                total.impressions,
                total.clicks,
                total.spend,
                total.conversions,
                cpl,
            )
            .await?;
            campaign_weeks += 1;
        }
    }

    Ok(serde_json::json!({
        "semanas_empresa": company_weeks,
        "semanas_campanha": campaign_weeks,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn lead(sale_done: bool, sale_value: Option<i64>, is_mql: bool) -> LeadRow {
        LeadRow {
            id: 1,
            public_id: Uuid::nil(),
            company_id: 1,
            external_id: "x".to_owned(),
            name: None,
            email: None,
            phone: None,
            entered_at: NaiveDate::from_ymd_opt(2026, 8, 12).expect("date"),
            utm_source: None,
            utm_medium: None,
            utm_campaign: None,
            utm_content: None,
            utm_term: None,
            creative_id: None,
            is_mql,
            raised_hand: false,
            meeting_scheduled: false,
            meeting_done: false,
            sale_done,
            sale_value: sale_value.map(Decimal::from),
            crm_stage: None,
            crm_value: None,
            automation_score: None,
            automation_tags: None,
            investor_flag: None,
            investor_amount: None,
            tracking_client_id: None,
            tracking_fbp: None,
            tracking_visits: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn ratios_are_null_with_zero_denominators() {
        let date = NaiveDate::from_ymd_opt(2026, 8, 12).expect("date");
        let rollup = rollup_from_leads(date, &[], Decimal::from(500));
        assert_eq!(rollup.leads, 0);
        assert_eq!(rollup.cpl, None, "no leads, no CPL");
        assert_eq!(rollup.cac, None);
        assert_eq!(rollup.avg_ticket, None);
        assert_eq!(rollup.conversion_rate, None);
    }

    #[test]
    fn roas_is_null_with_zero_spend() {
        let date = NaiveDate::from_ymd_opt(2026, 8, 12).expect("date");
        let leads = vec![lead(true, Some(5_000), true)];
        let rollup = rollup_from_leads(date, &leads, Decimal::ZERO);
        assert_eq!(rollup.roas, None);
        // Zero spend over one lead is a real zero, not "no data".
        assert_eq!(rollup.cpl, Some(Decimal::ZERO));
    }

    #[test]
    fn derives_cpl_cac_ticket_from_counts() {
        let date = NaiveDate::from_ymd_opt(2026, 8, 12).expect("date");
        let leads = vec![
            lead(true, Some(6_000), true),
            lead(false, None, true),
            lead(false, None, false),
            lead(false, None, false),
        ];
        let rollup = rollup_from_leads(date, &leads, Decimal::from(800));
        assert_eq!(rollup.leads, 4);
        assert_eq!(rollup.mqls, 2);
        assert_eq!(rollup.sales, 1);
        assert_eq!(rollup.cpl, Some(Decimal::from(200)));
        assert_eq!(rollup.cac, Some(Decimal::from(800)));
        assert_eq!(rollup.avg_ticket, Some(Decimal::from(6_000)));
        assert_eq!(rollup.roas, Some(Decimal::new(75, 1)));
        assert_eq!(rollup.conversion_rate, Some(Decimal::new(25, 2)));
    }

    #[test]
    fn sale_value_only_counts_closed_sales() {
        let date = NaiveDate::from_ymd_opt(2026, 8, 12).expect("date");
        let leads = vec![lead(true, Some(1_000), true), lead(false, Some(9_999), false)];
        let rollup = rollup_from_leads(date, &leads, Decimal::from(100));
        assert_eq!(rollup.sale_value, Decimal::from(1_000));
    }
}

//! Named job entry points shared by the HTTP trigger endpoints, the cron
//! scheduler, and the CLI.
//!
//! Each job resolves its own clients from the [`JobContext`], runs, and
//! records one `job_executions` row. Batch jobs return per-unit outcomes;
//! their run status is derived from the set.

use std::time::Instant;

use mktops_connectors::retry_with_backoff;
use mktops_connectors::types::DateRange;
use mktops_db::metrics::DailyFact;
use mktops_db::NewJobExecution;

use crate::context::JobContext;
use crate::orchestrator::resolve_company;
use crate::outcome::{run_status, RunStatus, UnitOutcome};
use crate::{aggregate, detector, reconcile, PipelineError};

/// Result of one named job: the derived status plus the `resultados` payload
/// returned to the caller and stored in the execution row.
#[derive(Debug, Clone)]
pub struct JobReport {
    pub status: RunStatus,
    pub resultados: serde_json::Value,
}

impl JobReport {
    fn single(detail: serde_json::Value) -> Self {
        Self {
            status: RunStatus::Success,
            resultados: serde_json::Value::Array(vec![detail]),
        }
    }

    fn from_units(units: Vec<UnitOutcome>) -> Self {
        Self {
            status: run_status(&units),
            resultados: serde_json::to_value(units).unwrap_or(serde_json::Value::Null),
        }
    }
}

/// Records one execution row for a named job. Best-effort: a failed write is
/// logged and swallowed so telemetry never fails the job itself.
pub async fn record_execution(
    ctx: &JobContext,
    job_name: &str,
    status: RunStatus,
    started: Instant,
    error_message: Option<String>,
    detail: serde_json::Value,
) {
    let record = NewJobExecution {
        job_name: job_name.to_owned(),
        status: status.as_str().to_owned(),
        duration_ms: i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX),
        error_message,
        detail,
    };
    if let Err(err) = mktops_db::insert_job_execution(&ctx.pool, &record).await {
        tracing::warn!(job = job_name, error = %err, "failed to record job execution");
    }
}

/// CRM sync: pulls deals updated since the window start and upserts them as
/// leads for the target company, then refreshes creative attribution links.
///
/// # Errors
///
/// Returns [`PipelineError::MissingCredentials`] without a Pipedrive token,
/// [`PipelineError::AmbiguousCompany`] when no company scope can be inferred,
/// or connector/db errors from the fetch and writes.
pub async fn run_crm_sync(
    ctx: &JobContext,
    range: DateRange,
    company_id: Option<i64>,
) -> Result<JobReport, PipelineError> {
    let company_id = resolve_company(ctx, company_id).await?;
    let client = ctx.pipedrive_client()?;
    let retry = ctx.retry_policy();

    let deals = retry_with_backoff(retry.max_retries, retry.backoff_base_ms, || {
        client.list_deals(range.from)
    })
    .await?;

    let synced = reconcile::sync_crm_leads(&ctx.pool, company_id, &deals).await?;
    let linked = reconcile::link_leads_to_creatives(&ctx.pool, company_id).await?;

    Ok(JobReport::single(serde_json::json!({
        "empresa_id": company_id,
        "crm": synced,
        "vinculacao": linked,
    })))
}

/// Discrepancy detector over every active company (or one), one unit each.
///
/// # Errors
///
/// Returns [`PipelineError::Db`] if the company listing fails; per-company
/// failures become error units instead.
pub async fn run_detector_job(
    ctx: &JobContext,
    company_id: Option<i64>,
    limit: Option<i64>,
) -> Result<JobReport, PipelineError> {
    let companies = target_companies(ctx, company_id, limit).await?;

    let mut units = Vec::with_capacity(companies.len());
    for (id, slug) in companies {
        match detector::run_detector(&ctx.pool, id).await {
            Ok(detail) => units.push(UnitOutcome::success(slug, detail)),
            Err(err) => {
                tracing::error!(company = %slug, error = %err, "detector run failed");
                units.push(UnitOutcome::error(slug, err.to_string()));
            }
        }
    }

    Ok(JobReport::from_units(units))
}

/// Daily + weekly aggregate recomputation over the window, per company.
///
/// # Errors
///
/// Returns [`PipelineError::Db`] if the company listing fails.
pub async fn run_rollup_job(
    ctx: &JobContext,
    range: DateRange,
    company_id: Option<i64>,
    limit: Option<i64>,
) -> Result<JobReport, PipelineError> {
    let companies = target_companies(ctx, company_id, limit).await?;

    let mut units = Vec::with_capacity(companies.len());
    for (id, slug) in companies {
        let result = async {
            let days = aggregate::compute_company_dailies(&ctx.pool, id, range.from, range.to).await?;
            let weeks = aggregate::recompute_weekly(&ctx.pool, id, range.from, range.to).await?;
            Ok::<_, PipelineError>(serde_json::json!({ "dias": days, "semanas": weeks }))
        }
        .await;
        match result {
            Ok(detail) => units.push(UnitOutcome::success(slug, detail)),
            Err(err) => {
                tracing::error!(company = %slug, error = %err, "rollup run failed");
                units.push(UnitOutcome::error(slug, err.to_string()));
            }
        }
    }

    Ok(JobReport::from_units(units))
}

/// Metricool sync: per connected brand (an ad account with platform
/// `METRICOOL`), pulls per-day campaign stats and upserts them as daily
/// facts. Campaigns unknown to the account are created with the external id
/// as a placeholder name.
///
/// # Errors
///
/// Returns [`PipelineError::MissingCredentials`] without a Metricool token,
/// or [`PipelineError::Db`] if the account listing fails.
pub async fn run_metricool_sync(
    ctx: &JobContext,
    range: DateRange,
) -> Result<JobReport, PipelineError> {
    let accounts = mktops_db::list_active_accounts(&ctx.pool, "METRICOOL").await?;
    let retry = ctx.retry_policy();

    let mut units = Vec::with_capacity(accounts.len());
    for account in accounts {
        match sync_metricool_account(ctx, &account, range, retry).await {
            Ok(detail) => units.push(UnitOutcome::success(account.external_id.clone(), detail)),
            Err(err) => {
                tracing::error!(
                    account = %account.external_id,
                    error = %err,
                    "metricool sync failed"
                );
                units.push(UnitOutcome::error(account.external_id.clone(), err.to_string()));
            }
        }
    }

    Ok(JobReport::from_units(units))
}

async fn sync_metricool_account(
    ctx: &JobContext,
    account: &mktops_db::AdAccountRow,
    range: DateRange,
    retry: crate::context::RetryPolicy,
) -> Result<serde_json::Value, PipelineError> {
    let client = ctx.metricool_client(&account.external_id)?;
    let stats = retry_with_backoff(retry.max_retries, retry.backoff_base_ms, || {
        client.daily_stats(range)
    })
    .await?;

    let external_ids: Vec<String> = stats
        .iter()
        .map(|s| s.campaign_external_id.clone())
        .collect();
    let mut id_map =
        mktops_db::campaign_ids_by_external_id(&ctx.pool, account.id, &external_ids).await?;

    let mut written = 0usize;
    for stat in &stats {
        let campaign_id = match id_map.get(&stat.campaign_external_id) {
            Some(id) => *id,
            None => {
                let id = mktops_db::upsert_campaign(
                    &ctx.pool,
                    account.id,
                    &stat.campaign_external_id,
                    &stat.campaign_external_id,
                    None,
                    true,
                )
                .await?;
                id_map.insert(stat.campaign_external_id.clone(), id);
                id
            }
        };
        let fact = DailyFact {
            date: stat.date,
            impressions: stat.impressions,
            clicks: stat.clicks,
            spend: stat.spend,
            conversions: 0,
        };
        mktops_db::upsert_campaign_daily_metric(&ctx.pool, campaign_id, &fact).await?;
        written += 1;
    }

    Ok(serde_json::json!({ "metricas_diarias": written }))
}

/// GA4 campaign report over the window. Nothing is persisted: GA4 sessions
/// are read-through analytics for the dashboard, keyed by campaign name
/// rather than any id the schema could join on.
///
/// # Errors
///
/// Returns [`PipelineError::MissingCredentials`] when the GA4 property or
/// Google OAuth credentials are not configured, or a connector error from
/// the report fetch.
pub async fn run_ga4_report(
    ctx: &JobContext,
    range: DateRange,
) -> Result<JobReport, PipelineError> {
    let Some((client, property_id)) = ctx.ga4_client().await? else {
        return Err(PipelineError::MissingCredentials { vendor: "ga4" });
    };
    let retry = ctx.retry_policy();

    let rows = retry_with_backoff(retry.max_retries, retry.backoff_base_ms, || {
        client.campaign_report(&property_id, range)
    })
    .await?;

    let campanhas: Vec<serde_json::Value> = rows
        .iter()
        .map(|r| {
            serde_json::json!({
                "campanha": r.campaign_name,
                "data": r.date,
                "sessoes": r.sessions,
                "conversoes": r.conversions,
            })
        })
        .collect();

    Ok(JobReport::single(serde_json::json!({
        "linhas": rows.len(),
        "campanhas": campanhas,
    })))
}

/// Resolves the `(id, slug)` list a company-scoped batch job targets.
/// `limit` caps how many companies a manual partial run processes.
async fn target_companies(
    ctx: &JobContext,
    company_id: Option<i64>,
    limit: Option<i64>,
) -> Result<Vec<(i64, String)>, PipelineError> {
    let cap = limit
        .and_then(|l| usize::try_from(l).ok())
        .unwrap_or(usize::MAX);
    let companies = mktops_db::list_active_companies(&ctx.pool).await?;
    Ok(companies
        .into_iter()
        .filter(|c| company_id.is_none_or(|id| c.id == id))
        .take(cap)
        .map(|c| (c.id, c.slug))
        .collect())
}

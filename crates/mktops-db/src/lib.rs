use sqlx::{postgres::PgPoolOptions, PgPool};
use std::{env, time::Duration};
use thiserror::Error;

const DEFAULT_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_MIN_CONNECTIONS: u32 = 1;
const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 10;

// Path relative to crates/mktops-db/Cargo.toml; resolves to <workspace-root>/migrations/
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations");

#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            min_connections: DEFAULT_MIN_CONNECTIONS,
            acquire_timeout_secs: DEFAULT_ACQUIRE_TIMEOUT_SECS,
        }
    }
}

impl PoolConfig {
    #[must_use]
    pub fn from_app_config(config: &mktops_core::AppConfig) -> Self {
        Self {
            max_connections: config.db_max_connections,
            min_connections: config.db_min_connections,
            acquire_timeout_secs: config.db_acquire_timeout_secs,
        }
    }
}

#[derive(Debug, Error)]
pub enum DbError {
    #[error("DATABASE_URL is not set")]
    MissingDatabaseUrl,
    #[error("record not found")]
    NotFound,
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Connect to a Postgres pool using explicit URL and config.
///
/// # Errors
///
/// Returns [`sqlx::Error`] if the connection cannot be established.
pub async fn connect_pool(database_url: &str, config: PoolConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .connect(database_url)
        .await
}

/// Connect to a Postgres pool, reading `DATABASE_URL` from env.
///
/// # Errors
///
/// Returns [`DbError::MissingDatabaseUrl`] if `DATABASE_URL` is unset, or
/// [`DbError::Sqlx`] if the connection cannot be established.
pub async fn connect_pool_from_env() -> Result<PgPool, DbError> {
    let database_url = env::var("DATABASE_URL").map_err(|_| DbError::MissingDatabaseUrl)?;
    connect_pool(&database_url, PoolConfig::default())
        .await
        .map_err(DbError::from)
}

/// Run all pending migrations against the pool.
///
/// Returns the number of migrations that were applied.
///
/// # Errors
///
/// Returns [`sqlx::migrate::MigrateError`] if any migration fails.
pub async fn run_migrations(pool: &PgPool) -> Result<usize, sqlx::migrate::MigrateError> {
    // The _sqlx_migrations table may not exist yet on a fresh database;
    // treat absence as zero applied.
    let applied_before: i64 =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM _sqlx_migrations WHERE success = true")
            .fetch_one(pool)
            .await
            .unwrap_or(0);

    MIGRATOR.run(pool).await?;

    let applied_after: i64 =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM _sqlx_migrations WHERE success = true")
            .fetch_one(pool)
            .await
            .unwrap_or(0);

    let delta = (applied_after - applied_before).max(0);
    Ok(usize::try_from(delta).unwrap_or(0))
}

/// Send a `SELECT 1` to verify the pool has a live connection.
///
/// # Errors
///
/// Returns [`sqlx::Error`] if the query fails.
pub async fn ping(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(pool)
        .await?;
    Ok(())
}

/// Run a full health check: ping the pool and return a typed error on failure.
///
/// # Errors
///
/// Returns [`DbError`] if the ping fails.
pub async fn health_check(pool: &PgPool) -> Result<(), DbError> {
    ping(pool).await?;
    Ok(())
}


pub mod accounts;
pub mod alerts;
pub mod campaigns;
pub mod companies;
pub mod creatives;
pub mod job_executions;
pub mod leads;
pub mod metrics;
pub mod weekly;

pub use accounts::{list_accounts_for_company, list_active_accounts, upsert_ad_account, AdAccountRow};
pub use alerts::{list_alerts_for_company, list_open_alerts, open_alert, resolve_alert, AlertRow};
pub use campaigns::{
    campaign_ids_by_external_id, list_active_campaigns_for_account,
    list_active_campaigns_for_company, set_campaign_expected_url, upsert_campaign, CampaignRow,
};
pub use companies::{
    create_company, get_company_by_slug, list_active_companies, CompanyRow, NewCompany,
};
pub use creatives::{
    creative_ids_by_external_id, creative_ids_for_account, list_active_creatives_for_company,
    refresh_creative_thumbnail, set_creative_capture, upsert_creative, CreativeRow, NewCreative,
};
pub use job_executions::{
    insert_job_execution, latest_job_executions, list_job_executions, JobExecutionRow,
    NewJobExecution,
};
pub use leads::{
    find_lead_by_client_id, find_lead_by_fbp, leads_by_emails, leads_entered_between,
    link_lead_creative, set_lead_automation, set_lead_investor, set_lead_tracking,
    unlinked_leads_with_utm_content, upsert_lead, LeadRow, NewLead,
};
pub use metrics::{
    campaign_totals_between, list_company_daily_metrics, sum_company_spend_between,
    sum_company_spend_for_date, upsert_campaign_daily_metric, upsert_company_daily_metric,
    upsert_creative_daily_metric, CampaignDailyMetricRow, CampaignPeriodTotals,
    CompanyDailyMetricRow, CompanyDailyRollup, DailyFact,
};
pub use weekly::{
    get_or_create_week, list_company_weekly_metrics, replace_campaign_weekly_metric,
    replace_company_weekly_metric, CompanyWeeklyMetricRow, WeekRow,
};

//! Local runner for the same jobs the server schedules and exposes over
//! HTTP. Useful for backfills and for inspecting a job's `resultados`
//! without going through the API.

use chrono::{Days, NaiveDate, Utc};
use clap::{Parser, Subcommand};

use mktops_connectors::types::DateRange;
use mktops_pipeline::{jobs, orchestrator, JobContext, Phase};

#[derive(Debug, Parser)]
#[command(name = "mktops-cli")]
#[command(about = "Marketing operations pipeline runner")]
struct Cli {
    /// Window start (YYYY-MM-DD); defaults to 7 days before the end.
    #[arg(long, global = true)]
    data_inicio: Option<NaiveDate>,

    /// Window end (YYYY-MM-DD); defaults to today.
    #[arg(long, global = true)]
    data_fim: Option<NaiveDate>,

    /// Company id to scope the job to.
    #[arg(long, global = true)]
    empresa_id: Option<i64>,

    /// Cap the number of companies a batch job processes.
    #[arg(long, global = true)]
    limite: Option<i64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the orchestrated sync, optionally restricted to some phases.
    Sync {
        /// Phase names to run, in their fixed order (default: all).
        #[arg(long, value_delimiter = ',')]
        fases: Vec<String>,
    },
    /// Pull CRM deals and refresh lead-creative links.
    Crm,
    /// Evaluate creatives and open/resolve discrepancy alerts.
    Detector,
    /// Recompute daily and weekly aggregates over the window.
    Rollup,
    /// Pull Metricool daily stats for connected brands.
    Metricool,
    /// Fetch the GA4 campaign report for the window (read-through).
    Ga4,
    /// Show the most recent job executions.
    Executions {
        #[arg(long)]
        job: Option<String>,
        #[arg(long, default_value_t = 20)]
        limite: i64,
    },
}

fn resolve_window(cli: &Cli) -> anyhow::Result<DateRange> {
    let to = cli.data_fim.unwrap_or_else(|| Utc::now().date_naive());
    let from = cli
        .data_inicio
        .unwrap_or_else(|| to.checked_sub_days(Days::new(7)).unwrap_or(to));
    anyhow::ensure!(from <= to, "data_inicio must not be after data_fim");
    Ok(DateRange { from, to })
}

fn print_json(value: &serde_json::Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let range = resolve_window(&cli)?;

    let config = mktops_core::load_app_config()?;
    let pool_config = mktops_db::PoolConfig::from_app_config(&config);
    let pool = mktops_db::connect_pool(&config.database_url, pool_config).await?;
    mktops_db::run_migrations(&pool).await?;
    let ctx = JobContext::new(pool, config);

    match cli.command {
        Commands::Sync { fases } => {
            let phases: Vec<Phase> = if fases.is_empty() {
                Phase::ALL.to_vec()
            } else {
                fases
                    .iter()
                    .map(|name| name.parse::<Phase>())
                    .collect::<Result<_, _>>()
                    .map_err(|e| anyhow::anyhow!(e))?
            };
            let manifest =
                orchestrator::run_orchestrated_sync(&ctx, &phases, range, cli.empresa_id).await?;
            print_json(&serde_json::to_value(&manifest)?)?;
        }
        Commands::Crm => {
            let report = jobs::run_crm_sync(&ctx, range, cli.empresa_id).await?;
            print_json(&report.resultados)?;
        }
        Commands::Detector => {
            let report = jobs::run_detector_job(&ctx, cli.empresa_id, cli.limite).await?;
            print_json(&report.resultados)?;
        }
        Commands::Rollup => {
            let report = jobs::run_rollup_job(&ctx, range, cli.empresa_id, cli.limite).await?;
            print_json(&report.resultados)?;
        }
        Commands::Metricool => {
            let report = jobs::run_metricool_sync(&ctx, range).await?;
            print_json(&report.resultados)?;
        }
        Commands::Ga4 => {
            let report = jobs::run_ga4_report(&ctx, range).await?;
            print_json(&report.resultados)?;
        }
        Commands::Executions { job, limite } => {
            let rows =
                mktops_db::list_job_executions(&ctx.pool, job.as_deref(), limite.clamp(1, 200))
                    .await?;
            for row in rows {
                println!(
                    "{}  {:<20} {:<8} {:>7}ms  {}",
                    row.created_at.format("%Y-%m-%d %H:%M:%S"),
                    row.job_name,
                    row.status,
                    row.duration_ms,
                    row.error_message.unwrap_or_default()
                );
            }
        }
    }

    Ok(())
}

//! Phase orchestration under a wall-clock budget.
//!
//! The orchestrated sync runs a fixed ordered list of phases. Before each
//! phase the remaining budget is checked against a minimum threshold: a phase
//! that cannot realistically finish is recorded as skipped with zero duration
//! instead of being started. Phase failures never abort the run; every
//! outcome lands in one manifest persisted as a single `job_executions` row.

use std::future::Future;
use std::str::FromStr;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use mktops_connectors::retry_with_backoff;
use mktops_connectors::types::DateRange;
use mktops_db::NewJobExecution;

use crate::context::JobContext;
use crate::ingest::{self, PlatformClient};
use crate::outcome::{run_status, RunStatus, UnitOutcome};
use crate::{aggregate, reconcile, PipelineError};

pub const ORCHESTRATED_JOB_NAME: &str = "orchestrated_sync";

/// Wall-clock budget for one orchestrated run.
#[derive(Debug, Clone)]
pub struct RunBudget {
    started: Instant,
    total: Duration,
    min_phase: Duration,
}

impl RunBudget {
    #[must_use]
    pub fn new(budget_secs: u64, min_phase_secs: u64) -> Self {
        Self {
            started: Instant::now(),
            total: Duration::from_secs(budget_secs),
            min_phase: Duration::from_secs(min_phase_secs),
        }
    }

    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.total.saturating_sub(self.started.elapsed())
    }

    /// True once the whole budget is spent. Batched loops inside a phase
    /// check this between batches and stop issuing new work.
    #[must_use]
    pub fn exhausted(&self) -> bool {
        self.remaining().is_zero()
    }

    /// True while enough budget remains to be worth starting a phase.
    #[must_use]
    pub fn can_start_phase(&self) -> bool {
        self.remaining() >= self.min_phase
    }
}

/// The orchestrated phases, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    MetaMetrics,
    GoogleMetrics,
    MetaCreatives,
    Thumbnails,
    Aggregates,
    Enrichment,
}

impl Phase {
    pub const ALL: [Phase; 6] = [
        Phase::MetaMetrics,
        Phase::GoogleMetrics,
        Phase::MetaCreatives,
        Phase::Thumbnails,
        Phase::Aggregates,
        Phase::Enrichment,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::MetaMetrics => "meta_metrics",
            Phase::GoogleMetrics => "google_metrics",
            Phase::MetaCreatives => "meta_creatives",
            Phase::Thumbnails => "thumbnails",
            Phase::Aggregates => "aggregates",
            Phase::Enrichment => "enrichment",
        }
    }
}

impl FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Phase::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| format!("unknown phase '{s}'"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseStatus {
    Success,
    Error,
    Skipped,
}

/// Outcome of one phase within an orchestrated run.
#[derive(Debug, Clone, Serialize)]
pub struct PhaseOutcome {
    pub phase: Phase,
    pub status: PhaseStatus,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PhaseOutcome {
    #[must_use]
    pub fn success(phase: Phase, elapsed: Duration, detail: serde_json::Value) -> Self {
        Self {
            phase,
            status: PhaseStatus::Success,
            duration_ms: duration_ms(elapsed),
            detail: Some(detail),
            error: None,
        }
    }

    #[must_use]
    pub fn error(phase: Phase, elapsed: Duration, message: impl Into<String>) -> Self {
        Self {
            phase,
            status: PhaseStatus::Error,
            duration_ms: duration_ms(elapsed),
            detail: None,
            error: Some(message.into()),
        }
    }

    /// A phase never started: zero duration, no error.
    #[must_use]
    pub fn skipped(phase: Phase) -> Self {
        Self {
            phase,
            status: PhaseStatus::Skipped,
            duration_ms: 0,
            detail: None,
            error: None,
        }
    }

    #[must_use]
    pub fn skipped_because(phase: Phase, reason: &str) -> Self {
        Self {
            detail: Some(serde_json::json!({ "motivo": reason })),
            ..Self::skipped(phase)
        }
    }
}

fn duration_ms(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

/// Derives the run status from phase outcomes: skipped phases are neutral,
/// `partial` when errors and successes coexist, `error` only when every
/// attempted phase failed.
#[must_use]
pub fn overall_status(phases: &[PhaseOutcome]) -> RunStatus {
    let errors = phases
        .iter()
        .filter(|p| p.status == PhaseStatus::Error)
        .count();
    let successes = phases
        .iter()
        .filter(|p| p.status == PhaseStatus::Success)
        .count();
    if errors == 0 {
        RunStatus::Success
    } else if successes == 0 {
        RunStatus::Error
    } else {
        RunStatus::Partial
    }
}

/// Manifest of one orchestrated run: overall status plus per-phase outcomes.
#[derive(Debug, Clone, Serialize)]
pub struct RunManifest {
    pub status: RunStatus,
    pub duration_ms: u64,
    pub phases: Vec<PhaseOutcome>,
}

async fn run_phase<Fut>(phase: Phase, fut: Fut) -> PhaseOutcome
where
    Fut: Future<Output = Result<serde_json::Value, PipelineError>>,
{
    let started = Instant::now();
    match fut.await {
        Ok(detail) => PhaseOutcome::success(phase, started.elapsed(), detail),
        Err(err) => {
            tracing::error!(phase = phase.as_str(), error = %err, "phase failed");
            PhaseOutcome::error(phase, started.elapsed(), err.to_string())
        }
    }
}

fn batch_detail(units: &[UnitOutcome]) -> serde_json::Value {
    serde_json::json!({
        "status": run_status(units).as_str(),
        "unidades": units,
    })
}

/// Resolves the company an enrichment run targets. Enrichment attaches
/// external records to one company's leads, so the scope must be explicit:
/// the request's company, or the single active company, never a guess among
/// several.
pub(crate) async fn resolve_company(
    ctx: &JobContext,
    company_id: Option<i64>,
) -> Result<i64, PipelineError> {
    if let Some(id) = company_id {
        return Ok(id);
    }
    let companies = mktops_db::list_active_companies(&ctx.pool).await?;
    match companies.as_slice() {
        [only] => Ok(only.id),
        [] => Err(PipelineError::AmbiguousCompany(
            "no active companies".to_owned(),
        )),
        _ => Err(PipelineError::AmbiguousCompany(
            "multiple active companies; pass empresa_id".to_owned(),
        )),
    }
}

async fn aggregates_phase(
    ctx: &JobContext,
    range: DateRange,
    company_id: Option<i64>,
) -> Result<serde_json::Value, PipelineError> {
    let company_ids: Vec<i64> = match company_id {
        Some(id) => vec![id],
        None => mktops_db::list_active_companies(&ctx.pool)
            .await?
            .into_iter()
            .map(|c| c.id)
            .collect(),
    };

    let mut days = 0usize;
    let mut weekly = Vec::with_capacity(company_ids.len());
    for id in &company_ids {
        days += aggregate::compute_company_dailies(&ctx.pool, *id, range.from, range.to).await?;
        weekly.push(aggregate::recompute_weekly(&ctx.pool, *id, range.from, range.to).await?);
    }

    Ok(serde_json::json!({
        "empresas": company_ids.len(),
        "dias": days,
        "semanas": weekly,
    }))
}

async fn enrichment_phase(
    ctx: &JobContext,
    range: DateRange,
    company_id: Option<i64>,
) -> Result<serde_json::Value, PipelineError> {
    let company_id = resolve_company(ctx, company_id).await?;
    let retry = ctx.retry_policy();

    let link = reconcile::link_leads_to_creatives(&ctx.pool, company_id).await?;

    let mut sources = Vec::with_capacity(3);

    match ctx.mautic_client() {
        Ok(client) => {
            let outcome = match retry_with_backoff(retry.max_retries, retry.backoff_base_ms, || {
                client.list_contacts()
            })
            .await
            {
                Ok(contacts) => {
                    let detail =
                        reconcile::enrich_from_automation(&ctx.pool, company_id, &contacts).await?;
                    UnitOutcome::success("mautic", detail)
                }
                Err(err) => UnitOutcome::error("mautic", err.to_string()),
            };
            sources.push(outcome);
        }
        Err(PipelineError::MissingCredentials { .. }) => sources.push(UnitOutcome::success(
            "mautic",
            serde_json::json!({ "ignorado": "credenciais não configuradas" }),
        )),
        Err(err) => sources.push(UnitOutcome::error("mautic", err.to_string())),
    }

    match ctx.tokeniza_client() {
        Ok(client) => {
            let outcome = match retry_with_backoff(retry.max_retries, retry.backoff_base_ms, || {
                client.list_investors()
            })
            .await
            {
                Ok(investors) => {
                    let detail =
                        reconcile::enrich_from_investors(&ctx.pool, company_id, &investors).await?;
                    UnitOutcome::success("tokeniza", detail)
                }
                Err(err) => UnitOutcome::error("tokeniza", err.to_string()),
            };
            sources.push(outcome);
        }
        Err(PipelineError::MissingCredentials { .. }) => sources.push(UnitOutcome::success(
            "tokeniza",
            serde_json::json!({ "ignorado": "credenciais não configuradas" }),
        )),
        Err(err) => sources.push(UnitOutcome::error("tokeniza", err.to_string())),
    }

    match ctx.stape_client() {
        Ok(client) => {
            let outcome = match retry_with_backoff(retry.max_retries, retry.backoff_base_ms, || {
                client.list_visitors(range)
            })
            .await
            {
                Ok(visitors) => {
                    let detail =
                        reconcile::enrich_from_tracking(&ctx.pool, company_id, &visitors).await?;
                    UnitOutcome::success("stape", detail)
                }
                Err(err) => UnitOutcome::error("stape", err.to_string()),
            };
            sources.push(outcome);
        }
        Err(PipelineError::MissingCredentials { .. }) => sources.push(UnitOutcome::success(
            "stape",
            serde_json::json!({ "ignorado": "credenciais não configuradas" }),
        )),
        Err(err) => sources.push(UnitOutcome::error("stape", err.to_string())),
    }

    Ok(serde_json::json!({
        "status": run_status(&sources).as_str(),
        "vinculacao": link,
        "fontes": sources,
    }))
}

/// Runs the requested phases in their fixed order under the configured
/// budget and persists the manifest as one `job_executions` row.
///
/// Missing vendor credentials skip the affected phase; phase errors are
/// recorded and the run continues.
///
/// # Errors
///
/// Returns [`PipelineError::Db`] only if reading the account/company listings
/// needed to drive the run fails before any phase can report its own outcome.
pub async fn run_orchestrated_sync(
    ctx: &JobContext,
    phases: &[Phase],
    range: DateRange,
    company_id: Option<i64>,
) -> Result<RunManifest, PipelineError> {
    let started = Instant::now();
    let budget = RunBudget::new(
        ctx.config.orchestrator_budget_secs,
        ctx.config.orchestrator_min_phase_secs,
    );
    let retry = ctx.retry_policy();

    let mut outcomes = Vec::with_capacity(phases.len());
    for &phase in phases {
        if !budget.can_start_phase() {
            tracing::warn!(phase = phase.as_str(), "budget too low; skipping phase");
            outcomes.push(PhaseOutcome::skipped(phase));
            continue;
        }

        let outcome = match phase {
            Phase::MetaMetrics => match ctx.meta_client() {
                Ok(Some(client)) => {
                    run_phase(phase, async {
                        let units = ingest::collect_platform_metrics(
                            &ctx.pool,
                            PlatformClient::Meta(&client),
                            "META",
                            range,
                            retry,
                            ctx.config.max_concurrent_accounts,
                        )
                        .await?;
                        Ok(batch_detail(&units))
                    })
                    .await
                }
                Ok(None) => {
                    PhaseOutcome::skipped_because(phase, "credenciais não configuradas")
                }
                Err(err) => PhaseOutcome::error(phase, Duration::ZERO, err.to_string()),
            },
            Phase::GoogleMetrics => match ctx.google_ads_client().await {
                Ok(Some(client)) => {
                    run_phase(phase, async {
                        let units = ingest::collect_platform_metrics(
                            &ctx.pool,
                            PlatformClient::Google(&client),
                            "GOOGLE",
                            range,
                            retry,
                            ctx.config.max_concurrent_accounts,
                        )
                        .await?;
                        Ok(batch_detail(&units))
                    })
                    .await
                }
                Ok(None) => {
                    PhaseOutcome::skipped_because(phase, "credenciais não configuradas")
                }
                Err(err) => PhaseOutcome::error(phase, Duration::ZERO, err.to_string()),
            },
            Phase::MetaCreatives => match ctx.meta_client() {
                Ok(Some(client)) => {
                    run_phase(phase, async {
                        let units = ingest::collect_platform_creatives(
                            &ctx.pool,
                            PlatformClient::Meta(&client),
                            "META",
                            retry,
                            &budget,
                            ctx.config.creative_batch_size,
                        )
                        .await?;
                        Ok(batch_detail(&units))
                    })
                    .await
                }
                Ok(None) => {
                    PhaseOutcome::skipped_because(phase, "credenciais não configuradas")
                }
                Err(err) => PhaseOutcome::error(phase, Duration::ZERO, err.to_string()),
            },
            Phase::Thumbnails => match ctx.meta_client() {
                Ok(Some(client)) => {
                    run_phase(phase, async {
                        let units = ingest::refresh_platform_thumbnails(
                            &ctx.pool,
                            PlatformClient::Meta(&client),
                            "META",
                            retry,
                            &budget,
                        )
                        .await?;
                        Ok(batch_detail(&units))
                    })
                    .await
                }
                Ok(None) => {
                    PhaseOutcome::skipped_because(phase, "credenciais não configuradas")
                }
                Err(err) => PhaseOutcome::error(phase, Duration::ZERO, err.to_string()),
            },
            Phase::Aggregates => {
                run_phase(phase, aggregates_phase(ctx, range, company_id)).await
            }
            Phase::Enrichment => {
                run_phase(phase, enrichment_phase(ctx, range, company_id)).await
            }
        };

        tracing::info!(
            phase = phase.as_str(),
            status = ?outcome.status,
            duration_ms = outcome.duration_ms,
            "phase finished"
        );
        outcomes.push(outcome);
    }

    let manifest = RunManifest {
        status: overall_status(&outcomes),
        duration_ms: duration_ms(started.elapsed()),
        phases: outcomes,
    };

    let record = NewJobExecution {
        job_name: ORCHESTRATED_JOB_NAME.to_owned(),
        status: manifest.status.as_str().to_owned(),
        duration_ms: i64::try_from(manifest.duration_ms).unwrap_or(i64::MAX),
        error_message: manifest.phases.iter().find_map(|p| p.error.clone()),
        detail: serde_json::json!({ "fases": manifest.phases }),
    };
    if let Err(err) = mktops_db::insert_job_execution(&ctx.pool, &record).await {
        // Telemetry is best-effort; the run itself succeeded or failed on
        // its own terms.
        tracing::warn!(error = %err, "failed to record orchestrated run");
    }

    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhausted_budget_refuses_new_phases() {
        let budget = RunBudget::new(0, 5);
        assert!(budget.exhausted());
        assert!(!budget.can_start_phase());
    }

    #[test]
    fn generous_budget_allows_phases() {
        let budget = RunBudget::new(300, 5);
        assert!(!budget.exhausted());
        assert!(budget.can_start_phase());
    }

    #[test]
    fn zero_threshold_always_starts_while_budget_lasts() {
        let budget = RunBudget::new(300, 0);
        assert!(budget.can_start_phase());
    }

    #[test]
    fn phase_names_round_trip() {
        for phase in Phase::ALL {
            assert_eq!(phase.as_str().parse::<Phase>(), Ok(phase));
        }
        assert!("meta".parse::<Phase>().is_err());
    }

    #[test]
    fn skipped_outcome_has_zero_duration() {
        let outcome = PhaseOutcome::skipped(Phase::Aggregates);
        assert_eq!(outcome.status, PhaseStatus::Skipped);
        assert_eq!(outcome.duration_ms, 0);
        assert!(outcome.error.is_none());
    }

    #[test]
    fn all_skipped_run_is_success() {
        let phases = vec![
            PhaseOutcome::skipped(Phase::MetaMetrics),
            PhaseOutcome::skipped(Phase::Aggregates),
        ];
        assert_eq!(overall_status(&phases), RunStatus::Success);
    }

    #[test]
    fn one_error_among_successes_is_partial() {
        let phases = vec![
            PhaseOutcome::success(
                Phase::MetaMetrics,
                Duration::from_millis(10),
                serde_json::Value::Null,
            ),
            PhaseOutcome::error(Phase::GoogleMetrics, Duration::from_millis(3), "boom"),
            PhaseOutcome::skipped(Phase::Enrichment),
        ];
        assert_eq!(overall_status(&phases), RunStatus::Partial);
    }

    #[test]
    fn errors_with_only_skips_are_error() {
        let phases = vec![
            PhaseOutcome::error(Phase::MetaMetrics, Duration::from_millis(3), "boom"),
            PhaseOutcome::skipped(Phase::Aggregates),
        ];
        assert_eq!(overall_status(&phases), RunStatus::Error);
    }

    #[test]
    fn phase_serializes_snake_case() {
        let json = serde_json::to_value(PhaseOutcome::skipped_because(
            Phase::MetaCreatives,
            "credenciais não configuradas",
        ))
        .expect("serialize");
        assert_eq!(json["phase"], "meta_creatives");
        assert_eq!(json["status"], "skipped");
        assert_eq!(json["detail"]["motivo"], "credenciais não configuradas");
    }
}

//! Manual job triggers: `POST /api/v1/jobs/{job}`.
//!
//! These endpoints run the same pipeline entry points the scheduler does, so
//! an operator can re-run any job over an explicit window. Responses use the
//! `{success, resultados}` shape the dashboard consumes rather than the
//! read-API envelope.

use std::time::Instant;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use mktops_connectors::types::DateRange;
use mktops_pipeline::{
    jobs::{self, JobReport},
    orchestrator, JobContext, Phase, PipelineError, RunStatus,
};

use super::AppState;

const DEFAULT_WINDOW_DAYS: u64 = 7;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct JobParams {
    data_inicio: Option<NaiveDate>,
    data_fim: Option<NaiveDate>,
    empresa_id: Option<i64>,
    limite: Option<i64>,
    fases: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
struct JobResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    resultados: serde_json::Value,
}

fn ok_response(resultados: serde_json::Value) -> Response {
    (
        StatusCode::OK,
        Json(JobResponse {
            success: true,
            error: None,
            resultados,
        }),
    )
        .into_response()
}

fn error_response(status: StatusCode, message: String, resultados: serde_json::Value) -> Response {
    (
        status,
        Json(JobResponse {
            success: false,
            error: Some(message),
            resultados,
        }),
    )
        .into_response()
}

fn bad_request(message: impl Into<String>) -> Response {
    error_response(
        StatusCode::BAD_REQUEST,
        message.into(),
        serde_json::Value::Array(Vec::new()),
    )
}

fn pipeline_error_status(err: &PipelineError) -> StatusCode {
    match err {
        PipelineError::AmbiguousCompany(_) | PipelineError::MissingCredentials { .. } => {
            StatusCode::BAD_REQUEST
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn resolve_window(params: &JobParams) -> Result<DateRange, Response> {
    let to = params.data_fim.unwrap_or_else(|| Utc::now().date_naive());
    let from = params
        .data_inicio
        .unwrap_or_else(|| to.checked_sub_days(Days::new(DEFAULT_WINDOW_DAYS)).unwrap_or(to));
    if from > to {
        return Err(bad_request("data_inicio must not be after data_fim"));
    }
    Ok(DateRange { from, to })
}

fn resolve_phases(params: &JobParams) -> Result<Vec<Phase>, Response> {
    match &params.fases {
        None => Ok(Phase::ALL.to_vec()),
        Some(names) => {
            if names.is_empty() {
                return Err(bad_request("fases must not be empty"));
            }
            names
                .iter()
                .map(|name| name.parse::<Phase>())
                .collect::<Result<Vec<_>, _>>()
                .map_err(bad_request)
        }
    }
}

/// Converts a finished [`JobReport`] into the HTTP response, after its
/// execution row has been recorded: a run where every unit failed is a 500.
fn report_response(report: JobReport) -> Response {
    match report.status {
        RunStatus::Success | RunStatus::Partial => ok_response(report.resultados),
        RunStatus::Error => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "todas as unidades falharam".to_owned(),
            report.resultados,
        ),
    }
}

async fn run_reported_job<F, Fut>(ctx: &JobContext, job_name: &str, run: F) -> Response
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<JobReport, PipelineError>>,
{
    let started = Instant::now();
    match run().await {
        Ok(report) => {
            jobs::record_execution(
                ctx,
                job_name,
                report.status,
                started,
                None,
                report.resultados.clone(),
            )
            .await;
            report_response(report)
        }
        Err(err) => {
            tracing::error!(job = job_name, error = %err, "job failed");
            jobs::record_execution(
                ctx,
                job_name,
                RunStatus::Error,
                started,
                Some(err.to_string()),
                serde_json::Value::Null,
            )
            .await;
            error_response(
                pipeline_error_status(&err),
                err.to_string(),
                serde_json::Value::Array(Vec::new()),
            )
        }
    }
}

pub(super) async fn trigger_job(
    State(state): State<AppState>,
    Path(job): Path<String>,
    body: Option<Json<JobParams>>,
) -> Response {
    let params = body.map(|Json(p)| p).unwrap_or_default();
    if params.limite.is_some_and(|l| l < 1) {
        return bad_request("limite must be at least 1");
    }
    let range = match resolve_window(&params) {
        Ok(range) => range,
        Err(response) => return response,
    };
    let ctx = JobContext::new(state.pool.clone(), (*state.config).clone());

    match job.as_str() {
        "sync" => {
            let phases = match resolve_phases(&params) {
                Ok(phases) => phases,
                Err(response) => return response,
            };
            match orchestrator::run_orchestrated_sync(&ctx, &phases, range, params.empresa_id)
                .await
            {
                Ok(manifest) => {
                    let resultados =
                        serde_json::to_value(&manifest.phases).unwrap_or(serde_json::Value::Null);
                    match manifest.status {
                        RunStatus::Success | RunStatus::Partial => ok_response(resultados),
                        RunStatus::Error => error_response(
                            StatusCode::INTERNAL_SERVER_ERROR,
                            "todas as fases falharam".to_owned(),
                            resultados,
                        ),
                    }
                }
                Err(err) => {
                    tracing::error!(error = %err, "orchestrated sync failed");
                    error_response(
                        pipeline_error_status(&err),
                        err.to_string(),
                        serde_json::Value::Array(Vec::new()),
                    )
                }
            }
        }
        "crm" => {
            run_reported_job(&ctx, "crm_sync", || {
                jobs::run_crm_sync(&ctx, range, params.empresa_id)
            })
            .await
        }
        "detector" => {
            run_reported_job(&ctx, "detector", || {
                jobs::run_detector_job(&ctx, params.empresa_id, params.limite)
            })
            .await
        }
        "rollup" => {
            run_reported_job(&ctx, "weekly_rollup", || {
                jobs::run_rollup_job(&ctx, range, params.empresa_id, params.limite)
            })
            .await
        }
        "metricool" => {
            run_reported_job(&ctx, "metricool_sync", || {
                jobs::run_metricool_sync(&ctx, range)
            })
            .await
        }
        "ga4" => {
            run_reported_job(&ctx, "ga4_report", || jobs::run_ga4_report(&ctx, range)).await
        }
        other => bad_request(format!("unknown job '{other}'")),
    }
}

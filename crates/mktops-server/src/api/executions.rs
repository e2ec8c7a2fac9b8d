//! Job-execution monitoring endpoints.

use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::middleware::RequestId;

use super::{map_db_error, normalize_limit, ApiResponse, AppState, ResponseMeta};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct ExecutionsQuery {
    job: Option<String>,
    limite: Option<i64>,
}

#[derive(Debug, Serialize)]
pub(super) struct ExecutionItem {
    pub id: i64,
    pub job_name: String,
    pub status: String,
    pub duration_ms: i64,
    pub error_message: Option<String>,
    pub detail: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl From<mktops_db::JobExecutionRow> for ExecutionItem {
    fn from(row: mktops_db::JobExecutionRow) -> Self {
        Self {
            id: row.id,
            job_name: row.job_name,
            status: row.status,
            duration_ms: row.duration_ms,
            error_message: row.error_message,
            detail: row.detail,
            created_at: row.created_at,
        }
    }
}

/// `GET /api/v1/executions` — most recent runs, optionally for one job.
pub(super) async fn list_executions(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<ExecutionsQuery>,
) -> impl IntoResponse {
    let limit = normalize_limit(query.limite);
    match mktops_db::list_job_executions(&state.pool, query.job.as_deref(), limit).await {
        Ok(rows) => {
            let data: Vec<ExecutionItem> = rows.into_iter().map(ExecutionItem::from).collect();
            Ok(Json(ApiResponse {
                data,
                meta: ResponseMeta::new(req_id.0),
            }))
        }
        Err(e) => Err(map_db_error(req_id.0, &e)),
    }
}

/// `GET /api/v1/executions/latest` — the latest run per job name.
pub(super) async fn latest_executions(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> impl IntoResponse {
    match mktops_db::latest_job_executions(&state.pool).await {
        Ok(rows) => {
            let data: Vec<ExecutionItem> = rows.into_iter().map(ExecutionItem::from).collect();
            Ok(Json(ApiResponse {
                data,
                meta: ResponseMeta::new(req_id.0),
            }))
        }
        Err(e) => Err(map_db_error(req_id.0, &e)),
    }
}

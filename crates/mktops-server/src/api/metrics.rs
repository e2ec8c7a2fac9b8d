//! Company-level daily and weekly metric endpoints.

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Extension, Json,
};
use chrono::{Days, NaiveDate, Utc};
use serde::Deserialize;

use crate::middleware::RequestId;

use super::{map_db_error, normalize_limit, ApiError, ApiResponse, AppState, ResponseMeta};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct DailyWindowQuery {
    data_inicio: Option<NaiveDate>,
    data_fim: Option<NaiveDate>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct WeeklyQuery {
    limite: Option<i64>,
}

/// `GET /api/v1/companies/{slug}/metrics/daily` — per-day consolidated
/// metrics over the requested window (default: the last 30 days).
pub(super) async fn list_daily_metrics(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(slug): Path<String>,
    Query(query): Query<DailyWindowQuery>,
) -> impl IntoResponse {
    let to = query.data_fim.unwrap_or_else(|| Utc::now().date_naive());
    let from = query
        .data_inicio
        .unwrap_or_else(|| to.checked_sub_days(Days::new(29)).unwrap_or(to));
    if from > to {
        return Err(ApiError::new(
            req_id.0,
            "validation_error",
            "data_inicio must not be after data_fim",
        ));
    }

    let company = mktops_db::get_company_by_slug(&state.pool, &slug)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    let rows = mktops_db::list_company_daily_metrics(&state.pool, company.id, from, to)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data: rows,
        meta: ResponseMeta::new(req_id.0),
    }))
}

/// `GET /api/v1/companies/{slug}/metrics/weekly` — most recent weekly
/// rollups, newest first.
pub(super) async fn list_weekly_metrics(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(slug): Path<String>,
    Query(query): Query<WeeklyQuery>,
) -> impl IntoResponse {
    let limit = normalize_limit(query.limite);

    let company = mktops_db::get_company_by_slug(&state.pool, &slug)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    let rows = mktops_db::list_company_weekly_metrics(&state.pool, company.id, limit)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok::<_, ApiError>(Json(ApiResponse {
        data: rows,
        meta: ResponseMeta::new(req_id.0),
    }))
}

//! Discrepancy-alert endpoints.

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::middleware::RequestId;

use super::{map_db_error, normalize_limit, ApiResponse, AppState, ResponseMeta};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct AlertsQuery {
    limite: Option<i64>,
    /// When true, only currently open alerts are returned.
    abertos: bool,
}

#[derive(Debug, Serialize)]
pub(super) struct AlertItem {
    pub id: i64,
    pub creative_id: i64,
    pub alert_type: String,
    pub message: String,
    pub resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<mktops_db::AlertRow> for AlertItem {
    fn from(row: mktops_db::AlertRow) -> Self {
        Self {
            id: row.id,
            creative_id: row.creative_id,
            alert_type: row.alert_type,
            message: row.message,
            resolved: row.resolved,
            resolved_at: row.resolved_at,
            created_at: row.created_at,
        }
    }
}

/// `GET /api/v1/companies/{slug}/alerts` — alert history for a company,
/// newest first; `?abertos=true` narrows to open alerts only.
pub(super) async fn list_company_alerts(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(slug): Path<String>,
    Query(query): Query<AlertsQuery>,
) -> impl IntoResponse {
    let company = mktops_db::get_company_by_slug(&state.pool, &slug)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let rows = if query.abertos {
        mktops_db::list_open_alerts(&state.pool, company.id).await
    } else {
        mktops_db::list_alerts_for_company(&state.pool, company.id, normalize_limit(query.limite))
            .await
    }
    .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let data: Vec<AlertItem> = rows.into_iter().map(AlertItem::from).collect();
    Ok::<_, super::ApiError>(Json(ApiResponse {
        data,
        meta: ResponseMeta::new(req_id.0),
    }))
}

//! Company listing endpoint.

use axum::{extract::State, response::IntoResponse, Extension, Json};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::middleware::RequestId;

use super::{map_db_error, ApiResponse, AppState, ResponseMeta};

#[derive(Debug, Serialize)]
pub(super) struct CompanyItem {
    pub id: i64,
    pub public_id: Uuid,
    pub name: String,
    pub slug: String,
    pub monthly_budget: Option<Decimal>,
    pub max_cpl: Option<Decimal>,
    pub max_cac: Option<Decimal>,
    pub target_ticket: Option<Decimal>,
    pub is_active: bool,
}

impl From<mktops_db::CompanyRow> for CompanyItem {
    fn from(row: mktops_db::CompanyRow) -> Self {
        Self {
            id: row.id,
            public_id: row.public_id,
            name: row.name,
            slug: row.slug,
            monthly_budget: row.monthly_budget,
            max_cpl: row.max_cpl,
            max_cac: row.max_cac,
            target_ticket: row.target_ticket,
            is_active: row.is_active,
        }
    }
}

/// `GET /api/v1/companies` — all active companies.
pub(super) async fn list_companies(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> impl IntoResponse {
    match mktops_db::list_active_companies(&state.pool).await {
        Ok(rows) => {
            let data: Vec<CompanyItem> = rows.into_iter().map(CompanyItem::from).collect();
            Ok(Json(ApiResponse {
                data,
                meta: ResponseMeta::new(req_id.0),
            }))
        }
        Err(e) => Err(map_db_error(req_id.0, &e)),
    }
}

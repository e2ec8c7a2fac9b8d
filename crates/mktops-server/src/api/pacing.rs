//! Month-to-date budget pacing for one company.

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Extension, Json,
};
use chrono::{Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::middleware::RequestId;

use super::{map_db_error, ApiResponse, AppState, ResponseMeta};

#[derive(Debug, Serialize)]
pub(super) struct PacingData {
    pub empresa: String,
    pub orcamento_mensal: Option<Decimal>,
    pub gasto_mes: Decimal,
    pub dia: u32,
    pub dias_no_mes: i64,
    /// Linear-trajectory spend expected by today; null without a budget.
    pub gasto_esperado: Option<Decimal>,
    /// Actual over expected spend; null without a budget or on day zero.
    pub ritmo: Option<Decimal>,
    /// Month-end projection at the current daily run rate.
    pub projecao: Decimal,
}

fn month_window(today: NaiveDate) -> (NaiveDate, i64) {
    let first = today.with_day(1).unwrap_or(today);
    let first_next = if today.month() == 12 {
        NaiveDate::from_ymd_opt(today.year() + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(today.year(), today.month() + 1, 1)
    };
    let days = first_next.map_or(30, |next| (next - first).num_days());
    (first, days)
}

fn compute_pacing(
    slug: String,
    budget: Option<Decimal>,
    spend: Decimal,
    today: NaiveDate,
) -> PacingData {
    let (_, days_in_month) = month_window(today);
    let day = today.day();

    let expected = budget.and_then(|b| {
        (b * Decimal::from(day)).checked_div(Decimal::from(days_in_month))
    });
    let pace = expected.and_then(|e| spend.checked_div(e));
    let projection = spend
        .checked_div(Decimal::from(day))
        .map_or(Decimal::ZERO, |daily| daily * Decimal::from(days_in_month));

    PacingData {
        empresa: slug,
        orcamento_mensal: budget,
        gasto_mes: spend,
        dia: day,
        dias_no_mes: days_in_month,
        gasto_esperado: expected,
        ritmo: pace,
        projecao: projection,
    }
}

/// `GET /api/v1/companies/{slug}/pacing` — month-to-date ad spend against
/// the company's monthly budget on a linear trajectory.
pub(super) async fn get_company_pacing(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(slug): Path<String>,
) -> impl IntoResponse {
    let company = mktops_db::get_company_by_slug(&state.pool, &slug)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let today = Utc::now().date_naive();
    let (month_start, _) = month_window(today);
    let spend = mktops_db::sum_company_spend_between(&state.pool, company.id, month_start, today)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let data = compute_pacing(company.slug, company.monthly_budget, spend, today);
    Ok::<_, super::ApiError>(Json(ApiResponse {
        data,
        meta: ResponseMeta::new(req_id.0),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn month_window_handles_december() {
        let (first, days) = month_window(date(2026, 12, 15));
        assert_eq!(first, date(2026, 12, 1));
        assert_eq!(days, 31);
    }

    #[test]
    fn month_window_handles_february() {
        let (_, days) = month_window(date(2026, 2, 10));
        assert_eq!(days, 28);
    }

    #[test]
    fn pacing_is_one_when_spend_tracks_budget() {
        // Day 15 of a 30-day month with half the budget spent.
        let data = compute_pacing(
            "acme".to_owned(),
            Some(Decimal::new(3_000, 0)),
            Decimal::new(1_500, 0),
            date(2026, 6, 15),
        );
        assert_eq!(data.gasto_esperado, Some(Decimal::new(1_500, 0)));
        assert_eq!(data.ritmo, Some(Decimal::ONE));
        assert_eq!(data.projecao, Decimal::new(3_000, 0));
    }

    #[test]
    fn pacing_ratio_is_null_without_budget() {
        let data = compute_pacing(
            "acme".to_owned(),
            None,
            Decimal::new(500, 0),
            date(2026, 6, 15),
        );
        assert!(data.gasto_esperado.is_none());
        assert!(data.ritmo.is_none());
    }

    #[test]
    fn pacing_ratio_is_null_on_zero_budget() {
        let data = compute_pacing(
            "acme".to_owned(),
            Some(Decimal::ZERO),
            Decimal::new(500, 0),
            date(2026, 6, 15),
        );
        assert_eq!(data.gasto_esperado, Some(Decimal::ZERO));
        assert!(data.ritmo.is_none());
    }
}

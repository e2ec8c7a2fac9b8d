mod alerts;
mod companies;
mod executions;
mod jobs;
mod metrics;
mod pacing;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::{header, HeaderName, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;

use mktops_core::AppConfig;

use crate::middleware::{
    enforce_rate_limit, request_id, require_bearer_auth, AuthState, RateLimitState, RequestId,
};

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<AppConfig>,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ResponseMeta {
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: ErrorBody,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct HealthData {
    status: &'static str,
    database: &'static str,
}

impl ResponseMeta {
    pub(super) fn new(request_id: String) -> Self {
        Self {
            request_id,
            timestamp: Utc::now(),
        }
    }
}

impl ApiError {
    pub fn new(
        request_id: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            error: ErrorBody {
                code: code.into(),
                message: message.into(),
            },
            meta: ResponseMeta::new(request_id.into()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match self.error.code.as_str() {
            "not_found" => StatusCode::NOT_FOUND,
            "unauthorized" => StatusCode::UNAUTHORIZED,
            "bad_request" | "validation_error" => StatusCode::BAD_REQUEST,
            "conflict" => StatusCode::CONFLICT,
            "rate_limited" => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

pub(super) fn normalize_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(50).clamp(1, 200)
}

pub(super) fn map_db_error(request_id: String, error: &mktops_db::DbError) -> ApiError {
    if matches!(error, mktops_db::DbError::NotFound) {
        return ApiError::new(request_id, "not_found", "record not found");
    }
    tracing::error!(error = %error, "database query failed");
    ApiError::new(request_id, "internal_error", "database query failed")
}

fn build_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-request-id"),
        ])
}

fn protected_router(auth: AuthState, rate_limit: RateLimitState) -> Router<AppState> {
    Router::new()
        .route("/api/v1/companies", get(companies::list_companies))
        .route(
            "/api/v1/companies/{slug}/metrics/daily",
            get(metrics::list_daily_metrics),
        )
        .route(
            "/api/v1/companies/{slug}/metrics/weekly",
            get(metrics::list_weekly_metrics),
        )
        .route(
            "/api/v1/companies/{slug}/alerts",
            get(alerts::list_company_alerts),
        )
        .route(
            "/api/v1/companies/{slug}/pacing",
            get(pacing::get_company_pacing),
        )
        .route("/api/v1/executions", get(executions::list_executions))
        .route(
            "/api/v1/executions/latest",
            get(executions::latest_executions),
        )
        .route("/api/v1/jobs/{job}", post(jobs::trigger_job))
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn_with_state(
                    rate_limit,
                    enforce_rate_limit,
                ))
                .layer(axum::middleware::from_fn_with_state(
                    auth,
                    require_bearer_auth,
                )),
        )
}

pub fn build_app(state: AppState, auth: AuthState, rate_limit: RateLimitState) -> Router {
    let public_routes = Router::new().route("/api/v1/health", get(health));

    Router::new()
        .merge(public_routes)
        .merge(protected_router(auth, rate_limit))
        .layer(
            ServiceBuilder::new()
                .layer(build_cors())
                .layer(axum::middleware::from_fn(request_id)),
        )
        .with_state(state)
}

async fn health(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> impl IntoResponse {
    let meta = ResponseMeta::new(req_id.0);

    match mktops_db::health_check(&state.pool).await {
        Ok(()) => (
            StatusCode::OK,
            Json(ApiResponse {
                data: HealthData {
                    status: "ok",
                    database: "ok",
                },
                meta,
            }),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "health check: database unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiResponse {
                    data: HealthData {
                        status: "degraded",
                        database: "unavailable",
                    },
                    meta,
                }),
            )
        }
    }
}

pub fn default_rate_limit_state() -> RateLimitState {
    RateLimitState::new(120, Duration::from_secs(60))
}

#[cfg(test)]
mod tests {
    use super::companies::CompanyItem;
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use rust_decimal::Decimal;
    use tower::ServiceExt;

    fn test_config() -> Arc<AppConfig> {
        Arc::new(AppConfig {
            database_url: String::new(),
            env: mktops_core::Environment::Test,
            bind_addr: "127.0.0.1:0".parse().expect("addr"),
            log_level: "warn".to_owned(),
            db_max_connections: 5,
            db_min_connections: 1,
            db_acquire_timeout_secs: 5,
            vendor: mktops_core::VendorCredentials::default(),
            connector_timeout_secs: 5,
            connector_max_retries: 0,
            connector_backoff_base_ms: 1,
            max_concurrent_accounts: 2,
            orchestrator_budget_secs: 60,
            orchestrator_min_phase_secs: 1,
            creative_batch_size: 10,
        })
    }

    fn test_app(pool: sqlx::PgPool) -> Router {
        let auth = AuthState::from_env(true).expect("auth");
        build_app(
            AppState {
                pool,
                config: test_config(),
            },
            auth,
            default_rate_limit_state(),
        )
    }

    #[test]
    fn company_item_is_serializable() {
        let item = CompanyItem {
            id: 7,
            public_id: uuid::Uuid::new_v4(),
            name: "Tokeniza".to_owned(),
            slug: "tokeniza".to_owned(),
            monthly_budget: Some(Decimal::new(50_000, 0)),
            max_cpl: None,
            max_cac: None,
            target_ticket: None,
            is_active: true,
        };
        let json = serde_json::to_value(&item).expect("serialize");
        assert_eq!(json["slug"], "tokeniza");
        assert_eq!(json["monthly_budget"], "50000");
    }

    #[test]
    fn normalize_limit_applies_defaults_and_bounds() {
        assert_eq!(normalize_limit(None), 50);
        assert_eq!(normalize_limit(Some(0)), 1);
        assert_eq!(normalize_limit(Some(1_000)), 200);
        assert_eq!(normalize_limit(Some(25)), 25);
    }

    #[test]
    fn api_error_validation_error_maps_to_bad_request() {
        let response = ApiError::new("req-1", "validation_error", "invalid input").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn map_db_error_not_found_maps_to_404() {
        let err = map_db_error("req-1".to_owned(), &mktops_db::DbError::NotFound);
        assert_eq!(err.error.code, "not_found");
    }

    async fn seed_company(pool: &sqlx::PgPool, slug: &str, budget: Option<Decimal>) -> i64 {
        mktops_db::create_company(
            pool,
            &mktops_db::NewCompany {
                name: format!("Company {slug}"),
                slug: slug.to_owned(),
                monthly_budget: budget,
                max_cpl: None,
                max_cac: None,
                target_ticket: None,
            },
        )
        .await
        .expect("seed company")
        .id
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn health_returns_ok(pool: sqlx::PgPool) {
        let response = test_app(pool)
            .oneshot(
                Request::builder()
                    .uri("/api/v1/health")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        let json: serde_json::Value = serde_json::from_slice(&body).expect("json parse");
        assert_eq!(json["data"]["status"], "ok");
        assert_eq!(json["data"]["database"], "ok");
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn protected_route_requires_bearer_token(pool: sqlx::PgPool) {
        let auth = AuthState::with_keys(vec!["secret-key".to_owned()]);
        let app = build_app(
            AppState {
                pool,
                config: test_config(),
            },
            auth,
            default_rate_limit_state(),
        );

        let denied = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/v1/companies")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);

        let allowed = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/companies")
                    .header("authorization", "Bearer secret-key")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(allowed.status(), StatusCode::OK);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn job_trigger_rejected_without_token(pool: sqlx::PgPool) {
        let auth = AuthState::with_keys(vec!["secret-key".to_owned()]);
        let app = build_app(
            AppState {
                pool,
                config: test_config(),
            },
            auth,
            default_rate_limit_state(),
        );

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/jobs/detector")
                    .header("content-type", "application/json")
                    .body(Body::from("{}"))
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn list_companies_returns_seeded_company(pool: sqlx::PgPool) {
        seed_company(&pool, "acme", None).await;

        let response = test_app(pool)
            .oneshot(
                Request::builder()
                    .uri("/api/v1/companies")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        let json: serde_json::Value = serde_json::from_slice(&body).expect("json parse");
        let data = json["data"].as_array().expect("data array");
        assert_eq!(data.len(), 1);
        assert_eq!(data[0]["slug"], "acme");
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn daily_metrics_404_for_unknown_company(pool: sqlx::PgPool) {
        let response = test_app(pool)
            .oneshot(
                Request::builder()
                    .uri("/api/v1/companies/nao-existe/metrics/daily")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn unknown_job_returns_400(pool: sqlx::PgPool) {
        let response = test_app(pool)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/jobs/nope")
                    .header("content-type", "application/json")
                    .body(Body::from("{}"))
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        let json: serde_json::Value = serde_json::from_slice(&body).expect("json parse");
        assert_eq!(json["success"], false);
        assert!(json["error"].as_str().expect("error").contains("nope"));
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn inverted_date_window_returns_400(pool: sqlx::PgPool) {
        let response = test_app(pool)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/jobs/rollup")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        r#"{"data_inicio":"2026-02-10","data_fim":"2026-02-01"}"#,
                    ))
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        let json: serde_json::Value = serde_json::from_slice(&body).expect("json parse");
        assert_eq!(json["success"], false);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn detector_job_runs_against_empty_database(pool: sqlx::PgPool) {
        let app = test_app(pool.clone());
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/jobs/detector")
                    .header("content-type", "application/json")
                    .body(Body::from("{}"))
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        let json: serde_json::Value = serde_json::from_slice(&body).expect("json parse");
        assert_eq!(json["success"], true);
        assert!(json["resultados"].is_array());

        let executions = mktops_db::latest_job_executions(&pool)
            .await
            .expect("executions");
        assert!(executions.iter().any(|e| e.job_name == "detector"));
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn rollup_job_records_execution_per_company(pool: sqlx::PgPool) {
        seed_company(&pool, "rollup-co", None).await;

        let response = test_app(pool.clone())
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/jobs/rollup")
                    .header("content-type", "application/json")
                    .body(Body::from("{}"))
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        let json: serde_json::Value = serde_json::from_slice(&body).expect("json parse");
        assert_eq!(json["success"], true);
        let units = json["resultados"].as_array().expect("units");
        assert_eq!(units.len(), 1);
        assert_eq!(units[0]["unit"], "rollup-co");
        assert_eq!(units[0]["status"], "success");
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn sync_job_rejects_unknown_phase(pool: sqlx::PgPool) {
        let response = test_app(pool)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/jobs/sync")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"fases":["meta_metrics","telepathy"]}"#))
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        let json: serde_json::Value = serde_json::from_slice(&body).expect("json parse");
        assert!(json["error"]
            .as_str()
            .expect("error")
            .contains("telepathy"));
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn executions_endpoint_lists_recorded_runs(pool: sqlx::PgPool) {
        mktops_db::insert_job_execution(
            &pool,
            &mktops_db::NewJobExecution {
                job_name: "detector".to_owned(),
                status: "success".to_owned(),
                duration_ms: 12,
                error_message: None,
                detail: serde_json::json!({"alertas_abertos": 0}),
            },
        )
        .await
        .expect("insert execution");

        let response = test_app(pool)
            .oneshot(
                Request::builder()
                    .uri("/api/v1/executions?job=detector")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        let json: serde_json::Value = serde_json::from_slice(&body).expect("json parse");
        let data = json["data"].as_array().expect("data array");
        assert_eq!(data.len(), 1);
        assert_eq!(data[0]["job_name"], "detector");
        assert_eq!(data[0]["status"], "success");
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn pacing_reports_null_ratio_without_budget(pool: sqlx::PgPool) {
        seed_company(&pool, "sem-orcamento", None).await;

        let response = test_app(pool)
            .oneshot(
                Request::builder()
                    .uri("/api/v1/companies/sem-orcamento/pacing")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        let json: serde_json::Value = serde_json::from_slice(&body).expect("json parse");
        assert!(json["data"]["orcamento_mensal"].is_null());
        assert!(json["data"]["ritmo"].is_null());
        assert_eq!(json["data"]["gasto_mes"], "0");
    }
}

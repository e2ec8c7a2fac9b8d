//! Database-backed ingestion tests over a mocked vendor API.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::PgPool;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use mktops_connectors::types::DateRange;
use mktops_connectors::MetaClient;
use mktops_db::NewCreative;
use mktops_pipeline::ingest::{self, PlatformClient};
use mktops_pipeline::RetryPolicy;

/// Company -> ad account -> campaign -> one creative, returning the ids the
/// assertions need.
async fn seed_account(pool: &PgPool) -> (i64, i64) {
    let company_id = mktops_db::create_company(
        pool,
        &mktops_db::NewCompany {
            name: "Company ingest".to_owned(),
            slug: "ingest".to_owned(),
            monthly_budget: None,
            max_cpl: None,
            max_cac: None,
            target_ticket: None,
        },
    )
    .await
    .expect("seed company")
    .id;
    let account_id = mktops_db::upsert_ad_account(pool, company_id, "META", "act_1")
        .await
        .expect("seed account");
    let campaign_id = mktops_db::upsert_campaign(pool, account_id, "c_1", "Lançamento", None, true)
        .await
        .expect("seed campaign");
    let creative_id = mktops_db::upsert_creative(
        pool,
        campaign_id,
        &NewCreative {
            external_id: "CR123".to_owned(),
            name: Some("Criativo 1".to_owned()),
            kind: "image".to_owned(),
            is_active: true,
            captured_url: None,
            thumbnail_url: None,
        },
    )
    .await
    .expect("seed creative");
    (campaign_id, creative_id)
}

async fn mock_meta_account(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/act_1/campaigns"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": [{"id": "c_1", "name": "Lançamento", "effective_status": "ACTIVE"}]
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/act_1/insights"))
        .and(query_param("level", "campaign"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": [{
                "campaign_id": "c_1",
                "date_start": "2026-08-12",
                "date_stop": "2026-08-12",
                "impressions": "1500",
                "clicks": "73",
                "spend": "412.87",
                "actions": [{"action_type": "lead", "value": "5"}]
            }]
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/act_1/insights"))
        .and(query_param("level", "ad"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": [
                {
                    "ad_id": "CR123",
                    "date_start": "2026-08-12",
                    "date_stop": "2026-08-12",
                    "impressions": "800",
                    "clicks": "41",
                    "spend": "97.50",
                    "actions": [{"action_type": "lead", "value": "3"}]
                },
                {
                    "ad_id": "CR999",
                    "date_start": "2026-08-12",
                    "date_stop": "2026-08-12",
                    "impressions": "10",
                    "clicks": "0",
                    "spend": "1.00"
                }
            ]
        })))
        .mount(server)
        .await;
}

#[sqlx::test(migrations = "../../migrations")]
async fn account_sync_writes_campaign_and_creative_facts(pool: PgPool) {
    let server = MockServer::start().await;
    mock_meta_account(&server).await;
    let (campaign_id, creative_id) = seed_account(&pool).await;

    let client = MetaClient::with_base_url("tok", 5, &server.uri()).expect("client");
    let accounts = mktops_db::list_active_accounts(&pool, "META")
        .await
        .expect("accounts");
    let date = NaiveDate::from_ymd_opt(2026, 8, 12).expect("date");
    let range = DateRange { from: date, to: date };
    let retry = RetryPolicy {
        max_retries: 0,
        backoff_base_ms: 1,
    };

    let detail = ingest::sync_account_metrics(
        &pool,
        PlatformClient::Meta(&client),
        &accounts[0],
        range,
        retry,
    )
    .await
    .expect("sync");

    assert_eq!(detail["metricas_diarias"], 1);
    assert_eq!(detail["metricas_criativos"], 1);
    assert_eq!(
        detail["criativos_nao_resolvidos"], 1,
        "ad unknown to the account is skipped, not written"
    );

    let (impressions, spend, conversions): (i64, Decimal, i64) = sqlx::query_as(
        "SELECT impressions, spend, conversions FROM creative_daily_metrics \
         WHERE creative_id = $1 AND metric_date = $2",
    )
    .bind(creative_id)
    .bind(date)
    .fetch_one(&pool)
    .await
    .expect("creative fact");
    assert_eq!(impressions, 800);
    assert_eq!(spend, Decimal::new(9750, 2));
    assert_eq!(conversions, 3);

    let campaign_spend: Decimal = sqlx::query_scalar(
        "SELECT spend FROM campaign_daily_metrics WHERE campaign_id = $1 AND metric_date = $2",
    )
    .bind(campaign_id)
    .bind(date)
    .fetch_one(&pool)
    .await
    .expect("campaign fact");
    assert_eq!(campaign_spend, Decimal::new(41287, 2));

    // Re-running the same window overwrites in place.
    ingest::sync_account_metrics(
        &pool,
        PlatformClient::Meta(&client),
        &accounts[0],
        range,
        retry,
    )
    .await
    .expect("second sync");
    let rows: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM creative_daily_metrics WHERE creative_id = $1")
            .bind(creative_id)
            .fetch_one(&pool)
            .await
            .expect("count");
    assert_eq!(rows, 1);
}

//! Integration tests against a real Postgres (provisioned by `#[sqlx::test]`).

use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::PgPool;

use mktops_db::{
    companies::NewCompany, leads::NewLead, metrics::DailyFact,
};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

async fn seed_company(pool: &PgPool, slug: &str) -> i64 {
    mktops_db::create_company(
        pool,
        &NewCompany {
            name: format!("Company {slug}"),
            slug: slug.to_string(),
            monthly_budget: Some(Decimal::from(10_000)),
            max_cpl: None,
            max_cac: None,
            target_ticket: None,
        },
    )
    .await
    .expect("seed company")
    .id
}

async fn seed_campaign(pool: &PgPool, company_id: i64, ext: &str) -> i64 {
    let account_id = mktops_db::upsert_ad_account(pool, company_id, "META", &format!("act_{ext}"))
        .await
        .expect("seed account");
    mktops_db::upsert_campaign(pool, account_id, ext, "Campanha Teste", None, true)
        .await
        .expect("seed campaign")
}

fn base_lead(ext: &str) -> NewLead {
    NewLead {
        external_id: ext.to_string(),
        name: Some("Fulano".to_string()),
        email: Some(format!("{ext}@example.com")),
        phone: None,
        entered_at: date(2026, 8, 10),
        utm_source: Some("facebook".to_string()),
        utm_medium: Some("cpc".to_string()),
        utm_campaign: None,
        utm_content: Some("cr-123".to_string()),
        utm_term: None,
        is_mql: false,
        raised_hand: false,
        meeting_scheduled: false,
        meeting_done: false,
        sale_done: false,
        sale_value: None,
        crm_stage: Some("novo".to_string()),
        crm_value: None,
    }
}

#[sqlx::test(migrations = "../../migrations")]
async fn daily_metric_upsert_is_idempotent(pool: PgPool) {
    let company_id = seed_company(&pool, "idem").await;
    let campaign_id = seed_campaign(&pool, company_id, "c-1").await;

    let fact = DailyFact {
        date: date(2026, 8, 12),
        impressions: 1_000,
        clicks: 50,
        spend: Decimal::new(12345, 2),
        conversions: 7,
    };

    mktops_db::upsert_campaign_daily_metric(&pool, campaign_id, &fact)
        .await
        .expect("first write");
    mktops_db::upsert_campaign_daily_metric(&pool, campaign_id, &fact)
        .await
        .expect("second write");

    let (count, clicks): (i64, i64) = sqlx::query_as(
        "SELECT COUNT(*), COALESCE(SUM(clicks), 0)::BIGINT FROM campaign_daily_metrics \
         WHERE campaign_id = $1",
    )
    .bind(campaign_id)
    .fetch_one(&pool)
    .await
    .expect("count rows");

    assert_eq!(count, 1, "re-run must not duplicate the fact row");
    assert_eq!(clicks, 50, "re-run must not accumulate values");
}

#[sqlx::test(migrations = "../../migrations")]
async fn daily_metric_upsert_overwrites_on_rerun(pool: PgPool) {
    let company_id = seed_company(&pool, "overwrite").await;
    let campaign_id = seed_campaign(&pool, company_id, "c-2").await;

    let mut fact = DailyFact {
        date: date(2026, 8, 12),
        impressions: 100,
        clicks: 5,
        spend: Decimal::from(10),
        conversions: 1,
    };
    mktops_db::upsert_campaign_daily_metric(&pool, campaign_id, &fact)
        .await
        .expect("first write");

    fact.clicks = 9;
    fact.spend = Decimal::from(20);
    mktops_db::upsert_campaign_daily_metric(&pool, campaign_id, &fact)
        .await
        .expect("corrected write");

    let spend = mktops_db::sum_company_spend_for_date(&pool, company_id, fact.date)
        .await
        .expect("spend sum");
    assert_eq!(spend, Decimal::from(20), "later write wins");
}

#[sqlx::test(migrations = "../../migrations")]
async fn alert_open_resolve_reopen_lifecycle(pool: PgPool) {
    let company_id = seed_company(&pool, "alerts").await;
    let campaign_id = seed_campaign(&pool, company_id, "c-3").await;
    let creative_id = mktops_db::upsert_creative(
        &pool,
        campaign_id,
        &mktops_db::creatives::NewCreative {
            external_id: "cr-9".to_string(),
            name: None,
            kind: "image".to_string(),
            is_active: true,
            captured_url: None,
            thumbnail_url: None,
        },
    )
    .await
    .expect("seed creative");

    // First detection opens; a second detection of the same violation is a no-op.
    assert!(mktops_db::open_alert(&pool, creative_id, "SEM_UTMS_NA_URL", "sem UTMs")
        .await
        .expect("open"));
    assert!(!mktops_db::open_alert(&pool, creative_id, "SEM_UTMS_NA_URL", "sem UTMs")
        .await
        .expect("re-open while open"));

    // Resolution closes the open row.
    assert!(mktops_db::resolve_alert(&pool, creative_id, "SEM_UTMS_NA_URL")
        .await
        .expect("resolve"));
    assert!(!mktops_db::resolve_alert(&pool, creative_id, "SEM_UTMS_NA_URL")
        .await
        .expect("resolve again"));

    // Reappearance creates a fresh open row; the resolved one stays.
    assert!(mktops_db::open_alert(&pool, creative_id, "SEM_UTMS_NA_URL", "sem UTMs")
        .await
        .expect("reopen"));

    let open = mktops_db::list_open_alerts(&pool, company_id)
        .await
        .expect("open alerts");
    assert_eq!(open.len(), 1);

    let all = mktops_db::list_alerts_for_company(&pool, company_id, 50)
        .await
        .expect("all alerts");
    assert_eq!(all.len(), 2, "resolved history row plus fresh open row");
    let resolved: Vec<_> = all.iter().filter(|a| a.resolved).collect();
    assert_eq!(resolved.len(), 1);
    assert!(resolved[0].resolved_at.is_some());
}

#[sqlx::test(migrations = "../../migrations")]
async fn lead_flags_are_monotonic_and_namespaces_isolated(pool: PgPool) {
    let company_id = seed_company(&pool, "leads").await;

    let mut lead = base_lead("deal-1");
    lead.is_mql = true;
    let lead_id = mktops_db::upsert_lead(&pool, company_id, &lead)
        .await
        .expect("first upsert");

    // Enrichment from another source writes only its own namespace.
    mktops_db::set_lead_automation(&pool, lead_id, Some(42), None)
        .await
        .expect("automation enrichment");

    // A stale CRM snapshot without the MQL flag must not clear it, and must
    // not clobber the automation namespace.
    let stale = base_lead("deal-1");
    let second_id = mktops_db::upsert_lead(&pool, company_id, &stale)
        .await
        .expect("stale upsert");
    assert_eq!(lead_id, second_id, "same natural key, same row");

    let rows = mktops_db::leads_entered_between(&pool, company_id, date(2026, 8, 1), date(2026, 8, 31))
        .await
        .expect("fetch leads");
    assert_eq!(rows.len(), 1);
    assert!(rows[0].is_mql, "lifecycle flags are monotonic");
    assert_eq!(rows[0].automation_score, Some(42), "namespace preserved");
}

#[sqlx::test(migrations = "../../migrations")]
async fn lead_external_id_is_unique_per_company_not_globally(pool: PgPool) {
    let company_a = seed_company(&pool, "tenant-a").await;
    let company_b = seed_company(&pool, "tenant-b").await;

    let id_a = mktops_db::upsert_lead(&pool, company_a, &base_lead("deal-7"))
        .await
        .expect("company a lead");
    let id_b = mktops_db::upsert_lead(&pool, company_b, &base_lead("deal-7"))
        .await
        .expect("company b lead");

    assert_ne!(id_a, id_b, "same external id in two tenants is two leads");
}

#[sqlx::test(migrations = "../../migrations")]
async fn weekly_replace_does_not_double_count(pool: PgPool) {
    let company_id = seed_company(&pool, "weekly").await;
    let week = mktops_db::get_or_create_week(&pool, date(2026, 8, 10), date(2026, 8, 16))
        .await
        .expect("week row");

    let mut rollup = mktops_db::metrics::CompanyDailyRollup {
        date: date(2026, 8, 10),
        leads: 10,
        mqls: 4,
        raised_hands: 2,
        meetings_scheduled: 1,
        meetings_done: 1,
        sales: 1,
        sale_value: Decimal::from(5_000),
        spend: Decimal::from(800),
        cpl: Some(Decimal::from(80)),
        cac: Some(Decimal::from(800)),
        avg_ticket: Some(Decimal::from(5_000)),
        roas: None,
        conversion_rate: None,
    };
    mktops_db::replace_company_weekly_metric(&pool, company_id, week.id, &rollup)
        .await
        .expect("first weekly write");

    rollup.leads = 14;
    mktops_db::replace_company_weekly_metric(&pool, company_id, week.id, &rollup)
        .await
        .expect("recompute");

    let (count, leads): (i64, i64) = sqlx::query_as(
        "SELECT COUNT(*), COALESCE(SUM(leads), 0)::BIGINT FROM company_weekly_metrics \
         WHERE company_id = $1 AND week_id = $2",
    )
    .bind(company_id)
    .bind(week.id)
    .fetch_one(&pool)
    .await
    .expect("weekly row");

    assert_eq!(count, 1);
    assert_eq!(leads, 14, "full replace, not accumulation");
}

//! HTTP client for the Meta (Facebook) Graph Ads API.
//!
//! Wraps `reqwest` with Graph-specific error handling and typed response
//! deserialization. Graph reports errors inside a JSON `"error"` envelope even
//! on some 2xx responses; OAuth failures (code 190) are mapped to
//! [`ConnectorError::Auth`] so the sync stops instead of retrying a dead
//! token. List endpoints follow the `paging.next` cursor.

use std::time::Duration;

use reqwest::{Client, Url};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::error::ConnectorError;
use crate::types::{
    CampaignSnapshot, CreativeDailyInsight, CreativeKind, CreativeSnapshot, DailyInsight,
    DateRange,
};

const DEFAULT_BASE_URL: &str = "https://graph.facebook.com/v21.0/";

/// Hard cap on cursor-follow iterations, in case a vendor ever loops.
const MAX_PAGES: usize = 50;

/// Graph OAuth error code for an invalid or expired access token.
const OAUTH_ERROR_CODE: i64 = 190;

#[derive(Debug, Deserialize)]
struct GraphPage<T> {
    #[serde(default = "Vec::new")]
    data: Vec<T>,
    #[serde(default)]
    paging: Option<GraphPaging>,
}

#[derive(Debug, Deserialize)]
struct GraphPaging {
    #[serde(default)]
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GraphErrorEnvelope {
    error: GraphError,
}

#[derive(Debug, Deserialize)]
struct GraphError {
    message: String,
    #[serde(default)]
    code: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct GraphCampaign {
    id: String,
    name: String,
    #[serde(default)]
    objective: Option<String>,
    #[serde(default)]
    effective_status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GraphAd {
    id: String,
    #[serde(default)]
    name: Option<String>,
    campaign_id: String,
    #[serde(default)]
    effective_status: Option<String>,
    #[serde(default)]
    creative: Option<GraphCreative>,
}

#[derive(Debug, Deserialize)]
struct GraphCreative {
    #[serde(default)]
    thumbnail_url: Option<String>,
    #[serde(default)]
    object_story_spec: Option<ObjectStorySpec>,
    #[serde(default)]
    video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ObjectStorySpec {
    #[serde(default)]
    link_data: Option<LinkData>,
    #[serde(default)]
    video_data: Option<VideoData>,
}

#[derive(Debug, Deserialize)]
struct LinkData {
    #[serde(default)]
    link: Option<String>,
    #[serde(default)]
    child_attachments: Vec<ChildAttachment>,
}

#[derive(Debug, Deserialize)]
struct ChildAttachment {
    #[serde(default)]
    link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VideoData {
    #[serde(default)]
    call_to_action: Option<CallToAction>,
}

#[derive(Debug, Deserialize)]
struct CallToAction {
    #[serde(default)]
    value: Option<CallToActionValue>,
}

#[derive(Debug, Deserialize)]
struct CallToActionValue {
    #[serde(default)]
    link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GraphInsight {
    campaign_id: String,
    date_start: chrono::NaiveDate,
    // Graph serializes all metric values as strings.
    #[serde(default)]
    impressions: Option<String>,
    #[serde(default)]
    clicks: Option<String>,
    #[serde(default)]
    spend: Option<String>,
    #[serde(default = "Vec::new")]
    actions: Vec<GraphAction>,
}

#[derive(Debug, Deserialize)]
struct GraphAdInsight {
    ad_id: String,
    date_start: chrono::NaiveDate,
    #[serde(default)]
    impressions: Option<String>,
    #[serde(default)]
    clicks: Option<String>,
    #[serde(default)]
    spend: Option<String>,
    #[serde(default = "Vec::new")]
    actions: Vec<GraphAction>,
}

#[derive(Debug, Deserialize)]
struct GraphAction {
    action_type: String,
    value: String,
}

/// Action types counted as a conversion for lead-generation accounts.
const CONVERSION_ACTIONS: &[&str] = &["lead", "offsite_conversion.fb_pixel_lead"];

/// Client for the Meta Graph Ads API.
pub struct MetaClient {
    client: Client,
    access_token: String,
    base_url: Url,
}

impl MetaClient {
    /// Creates a new client pointed at the production Graph API.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed.
    pub fn new(access_token: &str, timeout_secs: u64) -> Result<Self, ConnectorError> {
        Self::with_base_url(access_token, timeout_secs, DEFAULT_BASE_URL)
    }

    /// Creates a new client with a custom base URL (for testing with wiremock).
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed, or [`ConnectorError::Auth`] if `base_url` is
    /// not a valid URL.
    pub fn with_base_url(
        access_token: &str,
        timeout_secs: u64,
        base_url: &str,
    ) -> Result<Self, ConnectorError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent("mktops/0.1 (marketing-ops)")
            .build()?;
        let normalised = format!("{}/", base_url.trim_end_matches('/'));
        let base_url = Url::parse(&normalised).map_err(|e| ConnectorError::Auth {
            vendor: "meta",
            hint: format!("invalid base URL '{base_url}': {e}"),
        })?;
        Ok(Self {
            client,
            access_token: access_token.to_owned(),
            base_url,
        })
    }

    /// Lists all campaigns in an ad account.
    ///
    /// # Errors
    ///
    /// - [`ConnectorError::Auth`] if the access token is invalid or expired.
    /// - [`ConnectorError::Upstream`] on other Graph error envelopes.
    /// - [`ConnectorError::Http`] on network failure.
    /// - [`ConnectorError::Deserialize`] if the response shape is unexpected.
    pub async fn list_campaigns(
        &self,
        account_external_id: &str,
    ) -> Result<Vec<CampaignSnapshot>, ConnectorError> {
        let url = self.build_url(
            &format!("{account_external_id}/campaigns"),
            &[
                ("fields", "id,name,objective,effective_status"),
                ("limit", "100"),
            ],
        )?;
        let rows: Vec<GraphCampaign> = self.fetch_all_pages(url, "campaigns").await?;
        Ok(rows
            .into_iter()
            .map(|c| CampaignSnapshot {
                external_id: c.id,
                name: c.name,
                objective: c.objective,
                is_active: c.effective_status.as_deref() == Some("ACTIVE"),
            })
            .collect())
    }

    /// Lists all ads in an account with their creative's final URL and
    /// thumbnail. Each ad is treated as one creative.
    ///
    /// # Errors
    ///
    /// Same as [`MetaClient::list_campaigns`].
    pub async fn list_creatives(
        &self,
        account_external_id: &str,
    ) -> Result<Vec<CreativeSnapshot>, ConnectorError> {
        let url = self.build_url(
            &format!("{account_external_id}/ads"),
            &[
                (
                    "fields",
                    "id,name,campaign_id,effective_status,\
                     creative{thumbnail_url,video_id,object_story_spec}",
                ),
                ("limit", "100"),
            ],
        )?;
        let rows: Vec<GraphAd> = self.fetch_all_pages(url, "ads").await?;
        Ok(rows.into_iter().map(ad_to_snapshot).collect())
    }

    /// Fetches per-campaign daily delivery metrics for the given window.
    ///
    /// # Errors
    ///
    /// Same as [`MetaClient::list_campaigns`].
    pub async fn daily_insights(
        &self,
        account_external_id: &str,
        range: DateRange,
    ) -> Result<Vec<DailyInsight>, ConnectorError> {
        let (since, until) = range.as_strings();
        let time_range = format!(r#"{{"since":"{since}","until":"{until}"}}"#);
        let url = self.build_url(
            &format!("{account_external_id}/insights"),
            &[
                ("level", "campaign"),
                ("time_increment", "1"),
                ("time_range", &time_range),
                ("fields", "campaign_id,impressions,clicks,spend,actions"),
                ("limit", "100"),
            ],
        )?;
        let rows: Vec<GraphInsight> = self.fetch_all_pages(url, "insights").await?;
        rows.into_iter().map(insight_to_fact).collect()
    }

    /// Fetches per-ad daily delivery metrics for the given window. Ads map
    /// one-to-one onto creatives, so each row keys a creative day.
    ///
    /// # Errors
    ///
    /// Same as [`MetaClient::list_campaigns`].
    pub async fn creative_daily_insights(
        &self,
        account_external_id: &str,
        range: DateRange,
    ) -> Result<Vec<CreativeDailyInsight>, ConnectorError> {
        let (since, until) = range.as_strings();
        let time_range = format!(r#"{{"since":"{since}","until":"{until}"}}"#);
        let url = self.build_url(
            &format!("{account_external_id}/insights"),
            &[
                ("level", "ad"),
                ("time_increment", "1"),
                ("time_range", &time_range),
                ("fields", "ad_id,impressions,clicks,spend,actions"),
                ("limit", "100"),
            ],
        )?;
        let rows: Vec<GraphAdInsight> = self.fetch_all_pages(url, "ad insights").await?;
        Ok(rows.into_iter().map(ad_insight_to_fact).collect())
    }

    fn build_url(&self, path: &str, extra: &[(&str, &str)]) -> Result<Url, ConnectorError> {
        let mut url = self
            .base_url
            .join(path)
            .map_err(|e| ConnectorError::Auth {
                vendor: "meta",
                hint: format!("invalid request path '{path}': {e}"),
            })?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("access_token", &self.access_token);
            for (k, v) in extra {
                pairs.append_pair(k, v);
            }
        }
        Ok(url)
    }

    /// Fetches `url` and every `paging.next` continuation, concatenating the
    /// `data` arrays.
    async fn fetch_all_pages<T: serde::de::DeserializeOwned>(
        &self,
        first: Url,
        context: &str,
    ) -> Result<Vec<T>, ConnectorError> {
        let mut out = Vec::new();
        let mut next = Some(first);
        let mut pages = 0usize;
        while let Some(url) = next.take() {
            pages += 1;
            if pages > MAX_PAGES {
                tracing::warn!(context, pages, "page cap reached; truncating result");
                break;
            }
            let body = self.request_json(&url, context).await?;
            let page: GraphPage<T> =
                serde_json::from_value(body).map_err(|e| ConnectorError::Deserialize {
                    context: context.to_owned(),
                    source: e,
                })?;
            out.extend(page.data);
            next = page
                .paging
                .and_then(|p| p.next)
                .and_then(|n| Url::parse(&n).ok());
        }
        Ok(out)
    }

    async fn request_json(
        &self,
        url: &Url,
        context: &str,
    ) -> Result<serde_json::Value, ConnectorError> {
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if let Ok(envelope) = serde_json::from_str::<GraphErrorEnvelope>(&body) {
            if envelope.error.code == Some(OAUTH_ERROR_CODE) {
                return Err(ConnectorError::Auth {
                    vendor: "meta",
                    hint: format!(
                        "access token rejected: {}; regenerate the system-user token",
                        envelope.error.message
                    ),
                });
            }
            return Err(ConnectorError::Upstream {
                vendor: "meta",
                status: status.as_u16(),
                message: envelope.error.message,
            });
        }
        if !status.is_success() {
            return Err(ConnectorError::Upstream {
                vendor: "meta",
                status: status.as_u16(),
                message: body,
            });
        }
        serde_json::from_str(&body).map_err(|e| ConnectorError::Deserialize {
            context: context.to_owned(),
            source: e,
        })
    }
}

fn ad_to_snapshot(ad: GraphAd) -> CreativeSnapshot {
    let mut kind = CreativeKind::Image;
    let mut final_url = None;
    let mut thumbnail_url = None;
    if let Some(creative) = ad.creative {
        thumbnail_url = creative.thumbnail_url;
        if creative.video_id.is_some() {
            kind = CreativeKind::Video;
        }
        if let Some(spec) = creative.object_story_spec {
            if let Some(link_data) = spec.link_data {
                if !link_data.child_attachments.is_empty() {
                    kind = CreativeKind::Carousel;
                    final_url = link_data
                        .child_attachments
                        .into_iter()
                        .find_map(|c| c.link);
                } else {
                    final_url = link_data.link;
                }
            } else if let Some(video_data) = spec.video_data {
                kind = CreativeKind::Video;
                final_url = video_data
                    .call_to_action
                    .and_then(|c| c.value)
                    .and_then(|v| v.link);
            }
        }
    }
    CreativeSnapshot {
        campaign_external_id: ad.campaign_id,
        external_id: ad.id,
        name: ad.name,
        kind,
        is_active: ad.effective_status.as_deref() == Some("ACTIVE"),
        final_url,
        thumbnail_url,
    }
}

fn insight_to_fact(row: GraphInsight) -> Result<DailyInsight, ConnectorError> {
    Ok(DailyInsight {
        campaign_external_id: row.campaign_id,
        date: row.date_start,
        impressions: parse_metric(row.impressions.as_deref()),
        clicks: parse_metric(row.clicks.as_deref()),
        spend: parse_spend(row.spend.as_deref()),
        conversions: sum_conversions(&row.actions),
    })
}

fn ad_insight_to_fact(row: GraphAdInsight) -> CreativeDailyInsight {
    CreativeDailyInsight {
        creative_external_id: row.ad_id,
        date: row.date_start,
        impressions: parse_metric(row.impressions.as_deref()),
        clicks: parse_metric(row.clicks.as_deref()),
        spend: parse_spend(row.spend.as_deref()),
        conversions: sum_conversions(&row.actions),
    }
}

fn sum_conversions(actions: &[GraphAction]) -> i64 {
    actions
        .iter()
        .filter(|a| CONVERSION_ACTIONS.contains(&a.action_type.as_str()))
        .filter_map(|a| a.value.parse::<i64>().ok())
        .sum()
}

fn parse_spend(value: Option<&str>) -> Decimal {
    value
        .and_then(|s| s.parse::<Decimal>().ok())
        .unwrap_or(Decimal::ZERO)
}

fn parse_metric(value: Option<&str>) -> i64 {
    value.and_then(|v| v.parse().ok()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(server: &MockServer) -> MetaClient {
        MetaClient::with_base_url("tok", 5, &server.uri())
            .expect("client construction should not fail")
    }

    #[tokio::test]
    async fn follows_paging_next_cursor() {
        let server = MockServer::start().await;
        let page2 = format!("{}/act_1/campaigns?after=cursor2&access_token=tok", server.uri());
        Mock::given(method("GET"))
            .and(path("/act_1/campaigns"))
            .and(query_param("limit", "100"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{"id": "c1", "name": "Captação A", "effective_status": "ACTIVE"}],
                "paging": {"next": page2}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/act_1/campaigns"))
            .and(query_param("after", "cursor2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{"id": "c2", "name": "Captação B", "effective_status": "PAUSED"}]
            })))
            .mount(&server)
            .await;

        let campaigns = test_client(&server).list_campaigns("act_1").await.unwrap();
        assert_eq!(campaigns.len(), 2);
        assert!(campaigns[0].is_active);
        assert!(!campaigns[1].is_active);
    }

    #[tokio::test]
    async fn oauth_error_code_maps_to_auth() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/act_1/campaigns"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": {"message": "Error validating access token", "code": 190}
            })))
            .mount(&server)
            .await;

        let err = test_client(&server).list_campaigns("act_1").await.unwrap_err();
        assert!(err.is_auth());
    }

    #[tokio::test]
    async fn insights_parse_string_metrics_and_lead_actions() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/act_1/insights"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{
                    "campaign_id": "c1",
                    "date_start": "2026-08-12",
                    "date_stop": "2026-08-12",
                    "impressions": "1500",
                    "clicks": "73",
                    "spend": "412.87",
                    "actions": [
                        {"action_type": "lead", "value": "5"},
                        {"action_type": "link_click", "value": "73"}
                    ]
                }]
            })))
            .mount(&server)
            .await;

        let range = DateRange {
            from: chrono::NaiveDate::from_ymd_opt(2026, 8, 12).unwrap(),
            to: chrono::NaiveDate::from_ymd_opt(2026, 8, 12).unwrap(),
        };
        let rows = test_client(&server).daily_insights("act_1", range).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].impressions, 1500);
        assert_eq!(rows[0].clicks, 73);
        assert_eq!(rows[0].spend, Decimal::new(41287, 2));
        assert_eq!(rows[0].conversions, 5, "only lead actions count");
    }

    #[tokio::test]
    async fn ad_level_insights_key_on_ad_id() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/act_1/insights"))
            .and(query_param("level", "ad"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{
                    "ad_id": "ad9",
                    "date_start": "2026-08-12",
                    "date_stop": "2026-08-12",
                    "impressions": "800",
                    "clicks": "41",
                    "spend": "97.50",
                    "actions": [
                        {"action_type": "lead", "value": "3"},
                        {"action_type": "link_click", "value": "41"}
                    ]
                }]
            })))
            .mount(&server)
            .await;

        let range = DateRange {
            from: chrono::NaiveDate::from_ymd_opt(2026, 8, 12).unwrap(),
            to: chrono::NaiveDate::from_ymd_opt(2026, 8, 12).unwrap(),
        };
        let rows = test_client(&server)
            .creative_daily_insights("act_1", range)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].creative_external_id, "ad9");
        assert_eq!(rows[0].impressions, 800);
        assert_eq!(rows[0].spend, Decimal::new(9750, 2));
        assert_eq!(rows[0].conversions, 3);
    }

    #[tokio::test]
    async fn carousel_uses_first_child_link() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/act_1/ads"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{
                    "id": "ad1",
                    "name": "Carrossel Lançamento",
                    "campaign_id": "c1",
                    "effective_status": "ACTIVE",
                    "creative": {
                        "thumbnail_url": "https://cdn.example.com/t.jpg",
                        "object_story_spec": {
                            "link_data": {
                                "child_attachments": [
                                    {"link": "https://lp.example.com/a"},
                                    {"link": "https://lp.example.com/b"}
                                ]
                            }
                        }
                    }
                }]
            })))
            .mount(&server)
            .await;

        let creatives = test_client(&server).list_creatives("act_1").await.unwrap();
        assert_eq!(creatives[0].kind, CreativeKind::Carousel);
        assert_eq!(
            creatives[0].final_url.as_deref(),
            Some("https://lp.example.com/a")
        );
    }
}

//! HTTP client for the Google Ads REST API.
//!
//! Issues GAQL queries through the `googleAds:search` endpoint with
//! `nextPageToken` pagination. Requires a developer token plus a per-run
//! OAuth access token obtained via [`crate::oauth::GoogleOAuth`]. Costs come
//! back in micros and are converted to currency units here so nothing
//! downstream ever sees micros.

use std::time::Duration;

use reqwest::{Client, Url};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::error::ConnectorError;
use crate::types::{CampaignSnapshot, CreativeKind, CreativeSnapshot, DailyInsight, DateRange};

const DEFAULT_BASE_URL: &str = "https://googleads.googleapis.com/v17/";

const MAX_PAGES: usize = 50;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    #[serde(default = "Vec::new")]
    results: Vec<SearchRow>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchRow {
    #[serde(default)]
    campaign: Option<CampaignResource>,
    #[serde(default)]
    ad_group_ad: Option<AdGroupAd>,
    #[serde(default)]
    metrics: Option<Metrics>,
    #[serde(default)]
    segments: Option<Segments>,
}

#[derive(Debug, Deserialize)]
struct CampaignResource {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AdGroupAd {
    ad: AdResource,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AdResource {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(rename = "type", default)]
    ad_type: Option<String>,
    #[serde(default = "Vec::new")]
    final_urls: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Metrics {
    // The REST API serializes int64 metrics as strings.
    #[serde(default)]
    impressions: Option<String>,
    #[serde(default)]
    clicks: Option<String>,
    #[serde(default)]
    cost_micros: Option<String>,
    #[serde(default)]
    conversions: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct Segments {
    #[serde(default)]
    date: Option<chrono::NaiveDate>,
}

#[derive(Debug, Deserialize)]
struct AdsErrorEnvelope {
    error: AdsError,
}

#[derive(Debug, Deserialize)]
struct AdsError {
    message: String,
    #[serde(default)]
    status: Option<String>,
}

/// Client for the Google Ads REST API.
pub struct GoogleAdsClient {
    client: Client,
    developer_token: String,
    access_token: String,
    login_customer_id: Option<String>,
    base_url: Url,
}

impl GoogleAdsClient {
    /// Creates a new client pointed at the production API.
    ///
    /// `access_token` is the short-lived OAuth token for this run;
    /// `login_customer_id` is the MCC id when accounts are managed.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed.
    pub fn new(
        developer_token: &str,
        access_token: &str,
        login_customer_id: Option<&str>,
        timeout_secs: u64,
    ) -> Result<Self, ConnectorError> {
        Self::with_base_url(
            developer_token,
            access_token,
            login_customer_id,
            timeout_secs,
            DEFAULT_BASE_URL,
        )
    }

    /// Creates a new client with a custom base URL (for testing with wiremock).
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed, or [`ConnectorError::Auth`] if `base_url` is
    /// not a valid URL.
    pub fn with_base_url(
        developer_token: &str,
        access_token: &str,
        login_customer_id: Option<&str>,
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
            vendor: "google",
            hint: format!("invalid base URL '{base_url}': {e}"),
        })?;
        Ok(Self {
            client,
            developer_token: developer_token.to_owned(),
            access_token: access_token.to_owned(),
            login_customer_id: login_customer_id.map(str::to_owned),
            base_url,
        })
    }

    /// Lists all campaigns in a customer account.
    ///
    /// # Errors
    ///
    /// - [`ConnectorError::Auth`] on `UNAUTHENTICATED`/`PERMISSION_DENIED`.
    /// - [`ConnectorError::Upstream`] on other API errors.
    /// - [`ConnectorError::Http`] on network failure.
    /// - [`ConnectorError::Deserialize`] if the response shape is unexpected.
    pub async fn list_campaigns(
        &self,
        customer_id: &str,
    ) -> Result<Vec<CampaignSnapshot>, ConnectorError> {
        let query = "SELECT campaign.id, campaign.name, campaign.status FROM campaign";
        let rows = self.search_all(customer_id, query).await?;
        Ok(rows
            .into_iter()
            .filter_map(|r| r.campaign)
            .map(|c| CampaignSnapshot {
                external_id: c.id,
                name: c.name.unwrap_or_default(),
                objective: None,
                is_active: c.status.as_deref() == Some("ENABLED"),
            })
            .collect())
    }

    /// Lists all ads in a customer account with their final URLs.
    ///
    /// # Errors
    ///
    /// Same as [`GoogleAdsClient::list_campaigns`].
    pub async fn list_creatives(
        &self,
        customer_id: &str,
    ) -> Result<Vec<CreativeSnapshot>, ConnectorError> {
        let query = "SELECT ad_group_ad.ad.id, ad_group_ad.ad.name, ad_group_ad.ad.type, \
                     ad_group_ad.ad.final_urls, ad_group_ad.status, campaign.id \
                     FROM ad_group_ad";
        let rows = self.search_all(customer_id, query).await?;
        Ok(rows
            .into_iter()
            .filter_map(|r| {
                let campaign = r.campaign?;
                let aga = r.ad_group_ad?;
                Some(CreativeSnapshot {
                    campaign_external_id: campaign.id,
                    external_id: aga.ad.id,
                    name: aga.ad.name,
                    kind: ad_kind(aga.ad.ad_type.as_deref()),
                    is_active: aga.status.as_deref() == Some("ENABLED"),
                    final_url: aga.ad.final_urls.into_iter().next(),
                    thumbnail_url: None,
                })
            })
            .collect())
    }

    /// Fetches per-campaign daily delivery metrics for the given window.
    ///
    /// # Errors
    ///
    /// Same as [`GoogleAdsClient::list_campaigns`].
    pub async fn daily_insights(
        &self,
        customer_id: &str,
        range: DateRange,
    ) -> Result<Vec<DailyInsight>, ConnectorError> {
        let (from, to) = range.as_strings();
        let query = format!(
            "SELECT campaign.id, segments.date, metrics.impressions, metrics.clicks, \
             metrics.cost_micros, metrics.conversions FROM campaign \
             WHERE segments.date BETWEEN '{from}' AND '{to}'"
        );
        let rows = self.search_all(customer_id, &query).await?;
        Ok(rows
            .into_iter()
            .filter_map(|r| {
                let campaign = r.campaign?;
                let date = r.segments.and_then(|s| s.date)?;
                let metrics = r.metrics.unwrap_or(Metrics {
                    impressions: None,
                    clicks: None,
                    cost_micros: None,
                    conversions: None,
                });
                Some(DailyInsight {
                    campaign_external_id: campaign.id,
                    date,
                    impressions: parse_i64(metrics.impressions.as_deref()),
                    clicks: parse_i64(metrics.clicks.as_deref()),
                    spend: micros_to_decimal(parse_i64(metrics.cost_micros.as_deref())),
                    conversions: round_conversions(metrics.conversions),
                })
            })
            .collect())
    }

    async fn search_all(
        &self,
        customer_id: &str,
        query: &str,
    ) -> Result<Vec<SearchRow>, ConnectorError> {
        let url = self
            .base_url
            .join(&format!("customers/{customer_id}/googleAds:search"))
            .map_err(|e| ConnectorError::Auth {
                vendor: "google",
                hint: format!("invalid customer id '{customer_id}': {e}"),
            })?;

        let mut out = Vec::new();
        let mut page_token: Option<String> = None;
        for _ in 0..MAX_PAGES {
            let mut body = serde_json::json!({ "query": query });
            if let Some(token) = &page_token {
                body["pageToken"] = serde_json::Value::String(token.clone());
            }
            let mut request = self
                .client
                .post(url.clone())
                .bearer_auth(&self.access_token)
                .header("developer-token", &self.developer_token)
                .json(&body);
            if let Some(mcc) = &self.login_customer_id {
                request = request.header("login-customer-id", mcc);
            }
            let response = request.send().await?;
            let status = response.status();
            let text = response.text().await?;

            if !status.is_success() {
                if let Ok(envelope) = serde_json::from_str::<AdsErrorEnvelope>(&text) {
                    let grpc_status = envelope.error.status.as_deref().unwrap_or("");
                    if grpc_status == "UNAUTHENTICATED" || grpc_status == "PERMISSION_DENIED" {
                        return Err(ConnectorError::Auth {
                            vendor: "google",
                            hint: format!(
                                "{}: check the developer token and OAuth scopes",
                                envelope.error.message
                            ),
                        });
                    }
                    return Err(ConnectorError::Upstream {
                        vendor: "google",
                        status: status.as_u16(),
                        message: envelope.error.message,
                    });
                }
                return Err(ConnectorError::Upstream {
                    vendor: "google",
                    status: status.as_u16(),
                    message: text,
                });
            }

            let page: SearchResponse =
                serde_json::from_str(&text).map_err(|e| ConnectorError::Deserialize {
                    context: format!("googleAds:search({customer_id})"),
                    source: e,
                })?;
            out.extend(page.results);
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => return Ok(out),
            }
        }
        tracing::warn!(customer_id, "page cap reached; truncating result");
        Ok(out)
    }
}

fn ad_kind(ad_type: Option<&str>) -> CreativeKind {
    match ad_type {
        Some("VIDEO_RESPONSIVE_AD" | "VIDEO_AD") => CreativeKind::Video,
        Some("IMAGE_AD") => CreativeKind::Image,
        Some(_) => CreativeKind::Other,
        None => CreativeKind::Other,
    }
}

fn parse_i64(value: Option<&str>) -> i64 {
    value.and_then(|v| v.parse().ok()).unwrap_or(0)
}

fn micros_to_decimal(micros: i64) -> Decimal {
    Decimal::new(micros, 6).normalize()
}

#[allow(clippy::cast_possible_truncation)]
fn round_conversions(value: Option<f64>) -> i64 {
    value.unwrap_or(0.0).round() as i64
}

//! HTTP client for the Metricool reporting API.
//!
//! Metricool authenticates with a static `userToken` query parameter and a
//! numeric `blogId` identifying the connected brand. Used as a secondary
//! source of daily ad stats for platforms not ingested directly.

use std::time::Duration;

use chrono::NaiveDate;
use reqwest::{Client, Url};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::error::ConnectorError;
use crate::types::{DateRange, MetricoolDailyStat};

const DEFAULT_BASE_URL: &str = "https://app.metricool.com/api/";

#[derive(Debug, Deserialize)]
struct StatsResponse {
    #[serde(default = "Vec::new")]
    data: Vec<StatRow>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatRow {
    campaign_id: String,
    date: NaiveDate,
    #[serde(default)]
    impressions: Option<i64>,
    #[serde(default)]
    clicks: Option<i64>,
    #[serde(default)]
    cost: Option<Decimal>,
}

/// Client for the Metricool reporting API.
pub struct MetricoolClient {
    client: Client,
    user_token: String,
    blog_id: String,
    base_url: Url,
}

impl MetricoolClient {
    /// Creates a new client pointed at the production Metricool API.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed.
    pub fn new(
        user_token: &str,
        blog_id: &str,
        timeout_secs: u64,
    ) -> Result<Self, ConnectorError> {
        Self::with_base_url(user_token, blog_id, timeout_secs, DEFAULT_BASE_URL)
    }

    /// Creates a new client with a custom base URL (for testing with wiremock).
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed, or [`ConnectorError::Auth`] if `base_url` is
    /// not a valid URL.
    pub fn with_base_url(
        user_token: &str,
        blog_id: &str,
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
            vendor: "metricool",
            hint: format!("invalid base URL '{base_url}': {e}"),
        })?;
        Ok(Self {
            client,
            user_token: user_token.to_owned(),
            blog_id: blog_id.to_owned(),
            base_url,
        })
    }

    /// Fetches daily ad stats for the given window.
    ///
    /// # Errors
    ///
    /// - [`ConnectorError::Auth`] on a 401/403 (bad token).
    /// - [`ConnectorError::Upstream`] on other non-2xx responses.
    /// - [`ConnectorError::Http`] on network failure.
    /// - [`ConnectorError::Deserialize`] if the response shape is unexpected.
    pub async fn daily_stats(
        &self,
        range: DateRange,
    ) -> Result<Vec<MetricoolDailyStat>, ConnectorError> {
        let mut url = self
            .base_url
            .join("stats/ads")
            .map_err(|e| ConnectorError::Auth {
                vendor: "metricool",
                hint: format!("invalid base URL: {e}"),
            })?;
        let (from, to) = range.as_strings();
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("userToken", &self.user_token);
            pairs.append_pair("blogId", &self.blog_id);
            pairs.append_pair("start", &from);
            pairs.append_pair("end", &to);
        }

        let response = self.client.get(url).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(ConnectorError::Auth {
                vendor: "metricool",
                hint: "userToken rejected; copy a fresh token from Metricool settings".to_owned(),
            });
        }
        if !status.is_success() {
            return Err(ConnectorError::Upstream {
                vendor: "metricool",
                status: status.as_u16(),
                message: body,
            });
        }

        let stats: StatsResponse =
            serde_json::from_str(&body).map_err(|e| ConnectorError::Deserialize {
                context: "stats/ads".to_owned(),
                source: e,
            })?;
        Ok(stats
            .data
            .into_iter()
            .map(|row| MetricoolDailyStat {
                campaign_external_id: row.campaign_id,
                date: row.date,
                impressions: row.impressions.unwrap_or(0),
                clicks: row.clicks.unwrap_or(0),
                spend: row.cost.unwrap_or(Decimal::ZERO),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn fetches_daily_stats_for_window() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/stats/ads"))
            .and(query_param("userToken", "tok"))
            .and(query_param("blogId", "42"))
            .and(query_param("start", "2026-08-10"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{
                    "campaignId": "mc-1",
                    "date": "2026-08-10",
                    "impressions": 900,
                    "clicks": 31,
                    "cost": 75.5
                }]
            })))
            .mount(&server)
            .await;

        let client = MetricoolClient::with_base_url("tok", "42", 5, &server.uri()).unwrap();
        let range = DateRange {
            from: NaiveDate::from_ymd_opt(2026, 8, 10).unwrap(),
            to: NaiveDate::from_ymd_opt(2026, 8, 12).unwrap(),
        };
        let stats = client.daily_stats(range).await.unwrap();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].campaign_external_id, "mc-1");
        assert_eq!(stats[0].clicks, 31);
    }
}

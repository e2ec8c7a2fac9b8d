//! HTTP client for the GA4 Data API (`runReport`).
//!
//! Pulls per-campaign sessions and key events so paid traffic can be
//! compared against what the ad platforms report. Uses the same OAuth access
//! token as the Google Ads client.

use std::time::Duration;

use chrono::NaiveDate;
use reqwest::{Client, Url};
use serde::Deserialize;

use crate::error::ConnectorError;
use crate::types::{DateRange, Ga4CampaignRow};

const DEFAULT_BASE_URL: &str = "https://analyticsdata.googleapis.com/v1beta/";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RunReportResponse {
    #[serde(default = "Vec::new")]
    rows: Vec<ReportRow>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReportRow {
    #[serde(default = "Vec::new")]
    dimension_values: Vec<CellValue>,
    #[serde(default = "Vec::new")]
    metric_values: Vec<CellValue>,
}

#[derive(Debug, Deserialize)]
struct CellValue {
    #[serde(default)]
    value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Ga4ErrorEnvelope {
    error: Ga4Error,
}

#[derive(Debug, Deserialize)]
struct Ga4Error {
    message: String,
    #[serde(default)]
    status: Option<String>,
}

/// Client for the GA4 Data API.
pub struct Ga4Client {
    client: Client,
    access_token: String,
    base_url: Url,
}

impl Ga4Client {
    /// Creates a new client pointed at the production API.
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
            vendor: "ga4",
            hint: format!("invalid base URL '{base_url}': {e}"),
        })?;
        Ok(Self {
            client,
            access_token: access_token.to_owned(),
            base_url,
        })
    }

    /// Runs a per-campaign, per-day report of sessions and key events.
    ///
    /// Rows whose campaign dimension is `(not set)` or `(direct)` are
    /// dropped; they cannot be attributed to a paid campaign.
    ///
    /// # Errors
    ///
    /// - [`ConnectorError::Auth`] on `UNAUTHENTICATED`/`PERMISSION_DENIED`.
    /// - [`ConnectorError::Upstream`] on other API errors.
    /// - [`ConnectorError::Http`] on network failure.
    /// - [`ConnectorError::Deserialize`] if the response shape is unexpected.
    pub async fn campaign_report(
        &self,
        property_id: &str,
        range: DateRange,
    ) -> Result<Vec<Ga4CampaignRow>, ConnectorError> {
        let url = self
            .base_url
            .join(&format!("properties/{property_id}:runReport"))
            .map_err(|e| ConnectorError::Auth {
                vendor: "ga4",
                hint: format!("invalid property id '{property_id}': {e}"),
            })?;
        let (start, end) = range.as_strings();
        let body = serde_json::json!({
            "dateRanges": [{"startDate": start, "endDate": end}],
            "dimensions": [
                {"name": "sessionCampaignName"},
                {"name": "date"}
            ],
            "metrics": [
                {"name": "sessions"},
                {"name": "keyEvents"}
            ],
            "limit": "10000"
        });

        let response = self
            .client
            .post(url)
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            if let Ok(envelope) = serde_json::from_str::<Ga4ErrorEnvelope>(&text) {
                let grpc_status = envelope.error.status.as_deref().unwrap_or("");
                if grpc_status == "UNAUTHENTICATED" || grpc_status == "PERMISSION_DENIED" {
                    return Err(ConnectorError::Auth {
                        vendor: "ga4",
                        hint: format!(
                            "{}: grant the service account access to the property",
                            envelope.error.message
                        ),
                    });
                }
                return Err(ConnectorError::Upstream {
                    vendor: "ga4",
                    status: status.as_u16(),
                    message: envelope.error.message,
                });
            }
            return Err(ConnectorError::Upstream {
                vendor: "ga4",
                status: status.as_u16(),
                message: text,
            });
        }

        let report: RunReportResponse =
            serde_json::from_str(&text).map_err(|e| ConnectorError::Deserialize {
                context: format!("runReport({property_id})"),
                source: e,
            })?;

        Ok(report.rows.into_iter().filter_map(parse_row).collect())
    }
}

fn parse_row(row: ReportRow) -> Option<Ga4CampaignRow> {
    let campaign_name = row.dimension_values.first()?.value.clone()?;
    if campaign_name == "(not set)" || campaign_name == "(direct)" {
        return None;
    }
    // GA4 serializes the date dimension as YYYYMMDD.
    let raw_date = row.dimension_values.get(1)?.value.as_deref()?;
    let date = NaiveDate::parse_from_str(raw_date, "%Y%m%d").ok()?;
    let sessions = parse_i64(row.metric_values.first());
    let conversions = parse_i64(row.metric_values.get(1));
    Some(Ga4CampaignRow {
        campaign_name,
        date,
        sessions,
        conversions,
    })
}

fn parse_i64(cell: Option<&CellValue>) -> i64 {
    cell.and_then(|c| c.value.as_deref())
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn parses_rows_and_drops_unattributed_traffic() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/properties/555:runReport"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "rows": [
                    {
                        "dimensionValues": [{"value": "captacao-agosto"}, {"value": "20260812"}],
                        "metricValues": [{"value": "320"}, {"value": "12"}]
                    },
                    {
                        "dimensionValues": [{"value": "(not set)"}, {"value": "20260812"}],
                        "metricValues": [{"value": "1000"}, {"value": "3"}]
                    }
                ]
            })))
            .mount(&server)
            .await;

        let client = Ga4Client::with_base_url("tok", 5, &server.uri()).unwrap();
        let range = DateRange {
            from: NaiveDate::from_ymd_opt(2026, 8, 12).unwrap(),
            to: NaiveDate::from_ymd_opt(2026, 8, 12).unwrap(),
        };
        let rows = client.campaign_report("555", range).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].campaign_name, "captacao-agosto");
        assert_eq!(rows[0].date, NaiveDate::from_ymd_opt(2026, 8, 12).unwrap());
        assert_eq!(rows[0].sessions, 320);
        assert_eq!(rows[0].conversions, 12);
    }
}

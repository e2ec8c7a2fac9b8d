//! HTTP client for the Stape server-side-tracking API.
//!
//! Pulls visitor sessions captured by the server GTM container. Each visitor
//! carries at most one of email / GA client id / Facebook browser id (`_fbp`),
//! which the reconciliation step uses to link sessions to leads.

use std::time::Duration;

use reqwest::{Client, Url};
use serde::Deserialize;

use crate::error::ConnectorError;
use crate::types::{DateRange, TrackedVisitor};

const PAGE_SIZE: u32 = 500;
const MAX_PAGES: usize = 40;

#[derive(Debug, Deserialize)]
struct VisitorsResponse {
    #[serde(default = "Vec::new")]
    data: Vec<Visitor>,
    #[serde(default)]
    next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Visitor {
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    client_id: Option<String>,
    #[serde(default)]
    fbp: Option<String>,
    #[serde(default = "Vec::new")]
    pages: Vec<String>,
}

/// Client for the Stape API. The container endpoint is per-deployment
/// configuration, so there is no production default here.
pub struct StapeClient {
    client: Client,
    api_key: String,
    base_url: Url,
}

impl StapeClient {
    /// Creates a new client for the Stape container at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed, or [`ConnectorError::Auth`] if `base_url` is
    /// not a valid URL.
    pub fn new(base_url: &str, api_key: &str, timeout_secs: u64) -> Result<Self, ConnectorError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent("mktops/0.1 (marketing-ops)")
            .build()?;
        let normalised = format!("{}/", base_url.trim_end_matches('/'));
        let base_url = Url::parse(&normalised).map_err(|e| ConnectorError::Auth {
            vendor: "stape",
            hint: format!("invalid base URL '{base_url}': {e}"),
        })?;
        Ok(Self {
            client,
            api_key: api_key.to_owned(),
            base_url,
        })
    }

    /// Lists visitor sessions recorded in the given window.
    ///
    /// Visitors with no usable identifier (no email, client id, or `_fbp`)
    /// are dropped: nothing downstream could ever match them.
    ///
    /// # Errors
    ///
    /// - [`ConnectorError::Auth`] on a 401/403 (bad API key).
    /// - [`ConnectorError::Upstream`] on other non-2xx responses.
    /// - [`ConnectorError::Http`] on network failure.
    /// - [`ConnectorError::Deserialize`] if the response shape is unexpected.
    pub async fn list_visitors(
        &self,
        range: DateRange,
    ) -> Result<Vec<TrackedVisitor>, ConnectorError> {
        let mut out = Vec::new();
        let mut cursor: Option<String> = None;
        for _ in 0..MAX_PAGES {
            let page = self.fetch_page(range, cursor.as_deref()).await?;
            out.extend(page.data.into_iter().filter_map(|v| {
                let visitor = TrackedVisitor {
                    email: non_blank(v.email),
                    client_id: non_blank(v.client_id),
                    fbp: non_blank(v.fbp),
                    pages: v.pages,
                };
                (visitor.email.is_some() || visitor.client_id.is_some() || visitor.fbp.is_some())
                    .then_some(visitor)
            }));
            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => return Ok(out),
            }
        }
        tracing::warn!("page cap reached; truncating result");
        Ok(out)
    }

    async fn fetch_page(
        &self,
        range: DateRange,
        cursor: Option<&str>,
    ) -> Result<VisitorsResponse, ConnectorError> {
        let mut url = self
            .base_url
            .join("api/v1/visitors")
            .map_err(|e| ConnectorError::Auth {
                vendor: "stape",
                hint: format!("invalid base URL: {e}"),
            })?;
        let (from, to) = range.as_strings();
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("from", &from);
            pairs.append_pair("to", &to);
            pairs.append_pair("limit", &PAGE_SIZE.to_string());
            if let Some(c) = cursor {
                pairs.append_pair("cursor", c);
            }
        }

        let response = self
            .client
            .get(url)
            .header("X-Api-Key", &self.api_key)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;

        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(ConnectorError::Auth {
                vendor: "stape",
                hint: "API key rejected; regenerate it in the Stape container settings".to_owned(),
            });
        }
        if !status.is_success() {
            return Err(ConnectorError::Upstream {
                vendor: "stape",
                status: status.as_u16(),
                message: body,
            });
        }
        serde_json::from_str(&body).map_err(|e| ConnectorError::Deserialize {
            context: "visitors".to_owned(),
            source: e,
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn drops_visitors_without_any_identifier() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/visitors"))
            .and(header("X-Api-Key", "key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [
                    {
                        "client_id": "GA1.1.123.456",
                        "pages": ["https://lp.exemplo.com.br/captacao"]
                    },
                    {"pages": ["https://lp.exemplo.com.br/"]},
                    {"email": "  ", "fbp": "fb.1.1700000000.123"}
                ]
            })))
            .mount(&server)
            .await;

        let client = StapeClient::new(&server.uri(), "key", 5).unwrap();
        let range = DateRange {
            from: NaiveDate::from_ymd_opt(2026, 8, 10).unwrap(),
            to: NaiveDate::from_ymd_opt(2026, 8, 12).unwrap(),
        };
        let visitors = client.list_visitors(range).await.unwrap();
        assert_eq!(visitors.len(), 2);
        assert_eq!(visitors[0].client_id.as_deref(), Some("GA1.1.123.456"));
        assert_eq!(visitors[1].email, None, "blank email is treated as absent");
        assert!(visitors[1].fbp.is_some());
    }
}

//! HTTP client for the Tokeniza investment-platform API.
//!
//! Pulls the investor list so leads can be enriched with investment status.
//! Bearer-token auth, single paginated listing endpoint.

use std::time::Duration;

use reqwest::{Client, Url};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::error::ConnectorError;
use crate::types::InvestorRecord;

const PAGE_SIZE: u32 = 200;
const MAX_PAGES: usize = 50;

#[derive(Debug, Deserialize)]
struct InvestorsResponse {
    #[serde(default = "Vec::new")]
    data: Vec<Investor>,
    #[serde(default)]
    has_more: bool,
}

#[derive(Debug, Deserialize)]
struct Investor {
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    total_invested: Option<Decimal>,
}

/// Client for the Tokeniza API. The base URL is per-deployment
/// configuration, so there is no production default here.
pub struct TokenizaClient {
    client: Client,
    api_token: String,
    base_url: Url,
}

impl TokenizaClient {
    /// Creates a new client for the Tokeniza deployment at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed, or [`ConnectorError::Auth`] if `base_url` is
    /// not a valid URL.
    pub fn new(base_url: &str, api_token: &str, timeout_secs: u64) -> Result<Self, ConnectorError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent("mktops/0.1 (marketing-ops)")
            .build()?;
        let normalised = format!("{}/", base_url.trim_end_matches('/'));
        let base_url = Url::parse(&normalised).map_err(|e| ConnectorError::Auth {
            vendor: "tokeniza",
            hint: format!("invalid base URL '{base_url}': {e}"),
        })?;
        Ok(Self {
            client,
            api_token: api_token.to_owned(),
            base_url,
        })
    }

    /// Lists all investors that have an email address.
    ///
    /// # Errors
    ///
    /// - [`ConnectorError::Auth`] on a 401/403 (bad token).
    /// - [`ConnectorError::Upstream`] on other non-2xx responses.
    /// - [`ConnectorError::Http`] on network failure.
    /// - [`ConnectorError::Deserialize`] if the response shape is unexpected.
    pub async fn list_investors(&self) -> Result<Vec<InvestorRecord>, ConnectorError> {
        let mut out = Vec::new();
        let mut page = 1u32;
        for _ in 0..MAX_PAGES {
            let response = self.fetch_page(page).await?;
            out.extend(response.data.into_iter().filter_map(|inv| {
                let email = inv.email.filter(|e| !e.trim().is_empty())?;
                Some(InvestorRecord {
                    email,
                    invested_amount: inv.total_invested,
                })
            }));
            if !response.has_more {
                return Ok(out);
            }
            page += 1;
        }
        tracing::warn!("page cap reached; truncating result");
        Ok(out)
    }

    async fn fetch_page(&self, page: u32) -> Result<InvestorsResponse, ConnectorError> {
        let mut url = self
            .base_url
            .join("api/investors")
            .map_err(|e| ConnectorError::Auth {
                vendor: "tokeniza",
                hint: format!("invalid base URL: {e}"),
            })?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("page", &page.to_string());
            pairs.append_pair("per_page", &PAGE_SIZE.to_string());
        }

        let response = self
            .client
            .get(url)
            .bearer_auth(&self.api_token)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;

        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(ConnectorError::Auth {
                vendor: "tokeniza",
                hint: "API token rejected; request a new token from the platform admin".to_owned(),
            });
        }
        if !status.is_success() {
            return Err(ConnectorError::Upstream {
                vendor: "tokeniza",
                status: status.as_u16(),
                message: body,
            });
        }
        serde_json::from_str(&body).map_err(|e| ConnectorError::Deserialize {
            context: format!("investors(page={page})"),
            source: e,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn paginates_while_has_more() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/investors"))
            .and(query_param("page", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{"email": "a@exemplo.com.br", "total_invested": 25000.0}],
                "has_more": true
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/investors"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{"email": "", "total_invested": 100.0}],
                "has_more": false
            })))
            .mount(&server)
            .await;

        let client = TokenizaClient::new(&server.uri(), "tok", 5).unwrap();
        let investors = client.list_investors().await.unwrap();
        assert_eq!(investors.len(), 1, "blank emails are dropped");
        assert_eq!(investors[0].email, "a@exemplo.com.br");
    }
}

//! HTTP client for the Pipedrive CRM API.
//!
//! Pulls deals (with the embedded person's contact data) using Pipedrive's
//! `start`/`limit` offset pagination, following
//! `additional_data.pagination.more_items_in_collection` until exhausted.
//! The UTM custom fields are exposed under their API key aliases, configured
//! once per Pipedrive account.

use std::time::Duration;

use chrono::NaiveDate;
use reqwest::{Client, Url};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::error::ConnectorError;
use crate::types::CrmLead;

const DEFAULT_BASE_URL: &str = "https://api.pipedrive.com/v1/";

const PAGE_SIZE: u32 = 100;
const MAX_PAGES: usize = 100;

#[derive(Debug, Deserialize)]
struct DealsResponse {
    success: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default = "Vec::new")]
    data: Vec<Deal>,
    #[serde(default)]
    additional_data: Option<AdditionalData>,
}

#[derive(Debug, Deserialize)]
struct AdditionalData {
    #[serde(default)]
    pagination: Option<Pagination>,
}

#[derive(Debug, Deserialize)]
struct Pagination {
    #[serde(default)]
    more_items_in_collection: bool,
    #[serde(default)]
    next_start: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct Deal {
    id: i64,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    person_id: Option<Person>,
    #[serde(default)]
    stage_name: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    value: Option<f64>,
    // "YYYY-MM-DD HH:MM:SS" in the account's timezone.
    add_time: String,
    #[serde(default)]
    utm_source: Option<String>,
    #[serde(default)]
    utm_medium: Option<String>,
    #[serde(default)]
    utm_campaign: Option<String>,
    #[serde(default)]
    utm_content: Option<String>,
    #[serde(default)]
    utm_term: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Person {
    #[serde(default)]
    name: Option<String>,
    #[serde(default = "Vec::new")]
    email: Vec<ContactValue>,
    #[serde(default = "Vec::new")]
    phone: Vec<ContactValue>,
}

#[derive(Debug, Deserialize)]
struct ContactValue {
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    primary: bool,
}

/// Client for the Pipedrive CRM API.
pub struct PipedriveClient {
    client: Client,
    api_token: String,
    base_url: Url,
}

impl PipedriveClient {
    /// Creates a new client pointed at the production Pipedrive API.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed.
    pub fn new(api_token: &str, timeout_secs: u64) -> Result<Self, ConnectorError> {
        Self::with_base_url(api_token, timeout_secs, DEFAULT_BASE_URL)
    }

    /// Creates a new client with a custom base URL (for testing with wiremock).
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed, or [`ConnectorError::Auth`] if `base_url` is
    /// not a valid URL.
    pub fn with_base_url(
        api_token: &str,
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
            vendor: "pipedrive",
            hint: format!("invalid base URL '{base_url}': {e}"),
        })?;
        Ok(Self {
            client,
            api_token: api_token.to_owned(),
            base_url,
        })
    }

    /// Lists all deals updated since `since`, normalized to [`CrmLead`].
    ///
    /// # Errors
    ///
    /// - [`ConnectorError::Auth`] on a 401 (revoked API token).
    /// - [`ConnectorError::Upstream`] when `success` is `false`.
    /// - [`ConnectorError::Http`] on network failure.
    /// - [`ConnectorError::Deserialize`] if the response shape is unexpected.
    pub async fn list_deals(&self, since: NaiveDate) -> Result<Vec<CrmLead>, ConnectorError> {
        let mut out = Vec::new();
        let mut start = 0u32;
        for _ in 0..MAX_PAGES {
            let page = self.fetch_page(since, start).await?;
            out.extend(page.data.into_iter().filter_map(deal_to_lead));
            let pagination = page.additional_data.and_then(|a| a.pagination);
            match pagination {
                Some(p) if p.more_items_in_collection => {
                    start = p.next_start.unwrap_or(start + PAGE_SIZE);
                }
                _ => return Ok(out),
            }
        }
        tracing::warn!(%since, "page cap reached; truncating result");
        Ok(out)
    }

    async fn fetch_page(
        &self,
        since: NaiveDate,
        start: u32,
    ) -> Result<DealsResponse, ConnectorError> {
        let mut url = self.base_url.join("deals").map_err(|e| ConnectorError::Auth {
            vendor: "pipedrive",
            hint: format!("invalid base URL: {e}"),
        })?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("api_token", &self.api_token);
            pairs.append_pair("start", &start.to_string());
            pairs.append_pair("limit", &PAGE_SIZE.to_string());
            pairs.append_pair("sort", "add_time ASC");
            pairs.append_pair("since", &since.format("%Y-%m-%d").to_string());
        }

        let response = self.client.get(url).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if status.as_u16() == 401 {
            return Err(ConnectorError::Auth {
                vendor: "pipedrive",
                hint: "API token rejected; regenerate it in Pipedrive settings".to_owned(),
            });
        }
        if !status.is_success() {
            return Err(ConnectorError::Upstream {
                vendor: "pipedrive",
                status: status.as_u16(),
                message: body,
            });
        }

        let page: DealsResponse =
            serde_json::from_str(&body).map_err(|e| ConnectorError::Deserialize {
                context: format!("deals(start={start})"),
                source: e,
            })?;
        if !page.success {
            return Err(ConnectorError::Upstream {
                vendor: "pipedrive",
                status: status.as_u16(),
                message: page.error.unwrap_or_else(|| "success=false".to_owned()),
            });
        }
        Ok(page)
    }
}

fn deal_to_lead(deal: Deal) -> Option<CrmLead> {
    let entered_at = deal
        .add_time
        .split_whitespace()
        .next()
        .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())?;
    let (name, email, phone_raw) = match deal.person_id {
        Some(person) => (
            person.name,
            primary_value(&person.email),
            primary_value(&person.phone),
        ),
        None => (deal.title.clone(), None, None),
    };
    Some(CrmLead {
        external_id: deal.id.to_string(),
        name,
        email,
        phone_raw,
        entered_at,
        stage: deal.stage_name,
        value: deal.value.and_then(Decimal::from_f64_retain),
        won: deal.status.as_deref() == Some("won"),
        utm_source: deal.utm_source,
        utm_medium: deal.utm_medium,
        utm_campaign: deal.utm_campaign,
        utm_content: deal.utm_content,
        utm_term: deal.utm_term,
    })
}

fn primary_value(values: &[ContactValue]) -> Option<String> {
    values
        .iter()
        .find(|v| v.primary)
        .or_else(|| values.first())
        .and_then(|v| v.value.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(server: &MockServer) -> PipedriveClient {
        PipedriveClient::with_base_url("tok", 5, &server.uri())
            .expect("client construction should not fail")
    }

    fn deal_json(id: i64) -> serde_json::Value {
        serde_json::json!({
            "id": id,
            "title": "Negócio",
            "add_time": "2026-08-10 14:03:22",
            "stage_name": "Reunião Agendada",
            "status": "open",
            "value": 5000.0,
            "person_id": {
                "name": "Maria Silva",
                "email": [
                    {"value": "maria@exemplo.com.br", "primary": true},
                    {"value": "alt@exemplo.com.br", "primary": false}
                ],
                "phone": [{"value": "(61) 99862-6334", "primary": true}]
            },
            "utm_source": "facebook",
            "utm_content": "cr-123"
        })
    }

    #[tokio::test]
    async fn paginates_until_collection_exhausted() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/deals"))
            .and(query_param("start", "0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
                "data": [deal_json(1)],
                "additional_data": {
                    "pagination": {"more_items_in_collection": true, "next_start": 100}
                }
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/deals"))
            .and(query_param("start", "100"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
                "data": [deal_json(2)],
                "additional_data": {
                    "pagination": {"more_items_in_collection": false}
                }
            })))
            .mount(&server)
            .await;

        let since = NaiveDate::from_ymd_opt(2026, 8, 1).unwrap();
        let leads = test_client(&server).list_deals(since).await.unwrap();
        assert_eq!(leads.len(), 2);
        assert_eq!(leads[0].external_id, "1");
        assert_eq!(leads[0].email.as_deref(), Some("maria@exemplo.com.br"));
        assert_eq!(
            leads[0].entered_at,
            NaiveDate::from_ymd_opt(2026, 8, 10).unwrap()
        );
    }

    #[tokio::test]
    async fn revoked_token_maps_to_auth() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/deals"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "success": false,
                "error": "unauthorized access"
            })))
            .mount(&server)
            .await;

        let since = NaiveDate::from_ymd_opt(2026, 8, 1).unwrap();
        let err = test_client(&server).list_deals(since).await.unwrap_err();
        assert!(err.is_auth());
    }
}

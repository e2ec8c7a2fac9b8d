//! HTTP client for the Mautic marketing-automation REST API.
//!
//! Uses HTTP basic auth and `start`/`limit` offset pagination. Mautic returns
//! contacts as a JSON object keyed by contact id rather than an array, and
//! `total` as a string; both quirks are absorbed here.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::{Client, Url};
use serde::Deserialize;

use crate::error::ConnectorError;
use crate::types::AutomationContact;

const PAGE_SIZE: u32 = 100;
const MAX_PAGES: usize = 100;

#[derive(Debug, Deserialize)]
struct ContactsResponse {
    #[serde(default)]
    total: Option<serde_json::Value>,
    #[serde(default)]
    contacts: HashMap<String, Contact>,
}

#[derive(Debug, Deserialize)]
struct Contact {
    #[serde(default)]
    points: Option<i32>,
    #[serde(default)]
    fields: Option<ContactFields>,
    #[serde(default = "Vec::new")]
    tags: Vec<Tag>,
}

#[derive(Debug, Deserialize)]
struct ContactFields {
    #[serde(default)]
    all: Option<AllFields>,
}

#[derive(Debug, Deserialize)]
struct AllFields {
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Tag {
    tag: String,
}

/// Client for the Mautic REST API. The instance URL is per-company
/// configuration, so there is no production default here.
pub struct MauticClient {
    client: Client,
    username: String,
    password: String,
    base_url: Url,
}

impl MauticClient {
    /// Creates a new client for the Mautic instance at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed, or [`ConnectorError::Auth`] if `base_url` is
    /// not a valid URL.
    pub fn new(
        base_url: &str,
        username: &str,
        password: &str,
        timeout_secs: u64,
    ) -> Result<Self, ConnectorError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent("mktops/0.1 (marketing-ops)")
            .build()?;
        let normalised = format!("{}/", base_url.trim_end_matches('/'));
        let base_url = Url::parse(&normalised).map_err(|e| ConnectorError::Auth {
            vendor: "mautic",
            hint: format!("invalid base URL '{base_url}': {e}"),
        })?;
        Ok(Self {
            client,
            username: username.to_owned(),
            password: password.to_owned(),
            base_url,
        })
    }

    /// Lists all contacts that have an email address, with their score and
    /// tags.
    ///
    /// # Errors
    ///
    /// - [`ConnectorError::Auth`] on a 401/403 (bad credentials).
    /// - [`ConnectorError::Upstream`] on other non-2xx responses.
    /// - [`ConnectorError::Http`] on network failure.
    /// - [`ConnectorError::Deserialize`] if the response shape is unexpected.
    pub async fn list_contacts(&self) -> Result<Vec<AutomationContact>, ConnectorError> {
        let mut out = Vec::new();
        let mut start = 0u32;
        for _ in 0..MAX_PAGES {
            let page = self.fetch_page(start).await?;
            let fetched = page.contacts.len();
            out.extend(page.contacts.into_values().filter_map(contact_to_record));
            start += PAGE_SIZE;
            let total = parse_total(page.total.as_ref());
            if fetched < PAGE_SIZE as usize || u64::from(start) >= total {
                return Ok(out);
            }
        }
        tracing::warn!("page cap reached; truncating result");
        Ok(out)
    }

    async fn fetch_page(&self, start: u32) -> Result<ContactsResponse, ConnectorError> {
        let mut url = self
            .base_url
            .join("api/contacts")
            .map_err(|e| ConnectorError::Auth {
                vendor: "mautic",
                hint: format!("invalid base URL: {e}"),
            })?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("start", &start.to_string());
            pairs.append_pair("limit", &PAGE_SIZE.to_string());
            pairs.append_pair("minimal", "true");
        }

        let response = self
            .client
            .get(url)
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;

        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(ConnectorError::Auth {
                vendor: "mautic",
                hint: "basic auth rejected; check the Mautic API user credentials".to_owned(),
            });
        }
        if !status.is_success() {
            return Err(ConnectorError::Upstream {
                vendor: "mautic",
                status: status.as_u16(),
                message: body,
            });
        }
        serde_json::from_str(&body).map_err(|e| ConnectorError::Deserialize {
            context: format!("contacts(start={start})"),
            source: e,
        })
    }
}

fn contact_to_record(contact: Contact) -> Option<AutomationContact> {
    let email = contact.fields.and_then(|f| f.all).and_then(|a| a.email)?;
    if email.trim().is_empty() {
        return None;
    }
    Some(AutomationContact {
        email,
        score: contact.points,
        tags: contact.tags.into_iter().map(|t| t.tag).collect(),
    })
}

fn parse_total(total: Option<&serde_json::Value>) -> u64 {
    match total {
        Some(serde_json::Value::Number(n)) => n.as_u64().unwrap_or(0),
        Some(serde_json::Value::String(s)) => s.parse().unwrap_or(0),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header_exists, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn parses_keyed_contacts_and_string_total() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/contacts"))
            .and(query_param("start", "0"))
            .and(header_exists("authorization"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "total": "2",
                "contacts": {
                    "7": {
                        "points": 55,
                        "fields": {"all": {"email": "maria@exemplo.com.br"}},
                        "tags": [{"tag": "webinar"}, {"tag": "ebook"}]
                    },
                    "8": {
                        "points": 0,
                        "fields": {"all": {"email": ""}},
                        "tags": []
                    }
                }
            })))
            .mount(&server)
            .await;

        let client = MauticClient::new(&server.uri(), "api", "secret", 5).unwrap();
        let contacts = client.list_contacts().await.unwrap();
        assert_eq!(contacts.len(), 1, "contacts without an email are dropped");
        assert_eq!(contacts[0].email, "maria@exemplo.com.br");
        assert_eq!(contacts[0].score, Some(55));
        assert_eq!(contacts[0].tags, vec!["webinar", "ebook"]);
    }

    #[tokio::test]
    async fn bad_credentials_map_to_auth() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/contacts"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = MauticClient::new(&server.uri(), "api", "wrong", 5).unwrap();
        let err = client.list_contacts().await.unwrap_err();
        assert!(err.is_auth());
    }
}

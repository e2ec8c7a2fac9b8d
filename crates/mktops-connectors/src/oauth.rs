//! Google OAuth2 refresh-token exchange.
//!
//! Both the Google Ads and GA4 clients authenticate with a long-lived refresh
//! token that is exchanged for a short-lived access token before each sync
//! run. A rejected refresh token (`invalid_grant`) is surfaced as
//! [`ConnectorError::Auth`] with a hint telling the operator to re-consent,
//! since retrying the exchange can never succeed.

use std::time::Duration;

use reqwest::{Client, Url};
use serde::Deserialize;

use crate::error::ConnectorError;

const DEFAULT_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Exchanges refresh tokens for access tokens against Google's token endpoint.
pub struct GoogleOAuth {
    client: Client,
    client_id: String,
    client_secret: String,
    token_url: Url,
}

impl GoogleOAuth {
    /// Creates an exchanger pointed at the production token endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed.
    pub fn new(
        client_id: &str,
        client_secret: &str,
        timeout_secs: u64,
    ) -> Result<Self, ConnectorError> {
        Self::with_token_url(client_id, client_secret, timeout_secs, DEFAULT_TOKEN_URL)
    }

    /// Creates an exchanger with a custom token URL (for testing with wiremock).
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed, or [`ConnectorError::Auth`] if `token_url` is
    /// not a valid URL.
    pub fn with_token_url(
        client_id: &str,
        client_secret: &str,
        timeout_secs: u64,
        token_url: &str,
    ) -> Result<Self, ConnectorError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent("mktops/0.1 (marketing-ops)")
            .build()?;
        let token_url = Url::parse(token_url).map_err(|e| ConnectorError::Auth {
            vendor: "google",
            hint: format!("invalid token URL '{token_url}': {e}"),
        })?;
        Ok(Self {
            client,
            client_id: client_id.to_owned(),
            client_secret: client_secret.to_owned(),
            token_url,
        })
    }

    /// Exchanges `refresh_token` for a fresh access token.
    ///
    /// # Errors
    ///
    /// - [`ConnectorError::Auth`] when Google rejects the grant
    ///   (`invalid_grant`, `invalid_client`): the stored refresh token or
    ///   client credential must be regenerated.
    /// - [`ConnectorError::Http`] on network failure.
    /// - [`ConnectorError::Deserialize`] if the response does not match the
    ///   expected shape.
    pub async fn access_token(&self, refresh_token: &str) -> Result<String, ConnectorError> {
        let response = self
            .client
            .post(self.token_url.clone())
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            if let Ok(err) = serde_json::from_str::<TokenErrorResponse>(&body) {
                let hint = match err.error.as_str() {
                    "invalid_grant" => {
                        "refresh token expired or revoked; re-run the OAuth consent flow"
                            .to_owned()
                    }
                    "invalid_client" => {
                        "client id/secret rejected; check the OAuth client credentials".to_owned()
                    }
                    other => err
                        .error_description
                        .unwrap_or_else(|| format!("token exchange failed: {other}")),
                };
                return Err(ConnectorError::Auth {
                    vendor: "google",
                    hint,
                });
            }
            return Err(ConnectorError::Upstream {
                vendor: "google",
                status: status.as_u16(),
                message: body,
            });
        }

        let parsed: TokenResponse =
            serde_json::from_str(&body).map_err(|e| ConnectorError::Deserialize {
                context: "oauth token exchange".to_owned(),
                source: e,
            })?;
        Ok(parsed.access_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn exchanger(server: &MockServer) -> GoogleOAuth {
        GoogleOAuth::with_token_url(
            "cid",
            "secret",
            5,
            &format!("{}/token", server.uri()),
        )
        .expect("client construction should not fail")
    }

    #[tokio::test]
    async fn exchanges_refresh_token_for_access_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "ya29.abc",
                "expires_in": 3599,
                "token_type": "Bearer"
            })))
            .mount(&server)
            .await;

        let token = exchanger(&server).await.access_token("1//rt").await.unwrap();
        assert_eq!(token, "ya29.abc");
    }

    #[tokio::test]
    async fn invalid_grant_becomes_auth_error_with_hint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "invalid_grant",
                "error_description": "Token has been expired or revoked."
            })))
            .mount(&server)
            .await;

        let err = exchanger(&server)
            .await
            .access_token("1//stale")
            .await
            .unwrap_err();
        assert!(err.is_auth());
        assert!(err.to_string().contains("consent"), "hint should be actionable: {err}");
    }
}

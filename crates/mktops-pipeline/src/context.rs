//! Explicit dependency bundle for job invocations.
//!
//! Handlers and the scheduler construct a [`JobContext`] once and pass it
//! into each job; nothing in the pipeline reads ambient global state, so
//! tests can build a context over a test pool and wiremock-backed clients.

use sqlx::PgPool;

use mktops_connectors::{
    ConnectorError, Ga4Client, GoogleAdsClient, GoogleOAuth, MauticClient, MetaClient,
    MetricoolClient, PipedriveClient, StapeClient, TokenizaClient,
};
use mktops_core::AppConfig;

use crate::PipelineError;

/// Retry parameters handed to [`mktops_connectors::retry_with_backoff`].
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_base_ms: u64,
}

/// Everything a job invocation needs: the pool plus vendor credentials and
/// tuning knobs from the loaded configuration.
#[derive(Clone)]
pub struct JobContext {
    pub pool: PgPool,
    pub config: AppConfig,
}

impl JobContext {
    #[must_use]
    pub fn new(pool: PgPool, config: AppConfig) -> Self {
        Self { pool, config }
    }

    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.config.connector_max_retries,
            backoff_base_ms: self.config.connector_backoff_base_ms,
        }
    }

    /// Builds the Meta client, or `None` when the token is not configured
    /// (a missing credential disables the connector, it does not fail the
    /// run).
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::Http`] if the HTTP client cannot be built.
    pub fn meta_client(&self) -> Result<Option<MetaClient>, ConnectorError> {
        let Some(token) = &self.config.vendor.meta_access_token else {
            return Ok(None);
        };
        MetaClient::new(token, self.config.connector_timeout_secs).map(Some)
    }

    /// Exchanges the stored refresh token and builds the Google Ads client.
    /// `None` when any of the Google credentials is not configured.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::Auth`] when the refresh token is rejected,
    /// or [`ConnectorError::Http`] on construction/network failure.
    pub async fn google_ads_client(&self) -> Result<Option<GoogleAdsClient>, ConnectorError> {
        let Some(access_token) = self.google_access_token().await? else {
            return Ok(None);
        };
        let vendor = &self.config.vendor;
        let Some(developer_token) = &vendor.google_developer_token else {
            return Ok(None);
        };
        GoogleAdsClient::new(
            developer_token,
            &access_token,
            None,
            self.config.connector_timeout_secs,
        )
        .map(Some)
    }

    /// Builds the GA4 client with a fresh access token. `None` when the
    /// Google OAuth credentials or the property id are not configured.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::Auth`] when the refresh token is rejected,
    /// or [`ConnectorError::Http`] on construction/network failure.
    pub async fn ga4_client(&self) -> Result<Option<(Ga4Client, String)>, ConnectorError> {
        let Some(property_id) = self.config.vendor.ga4_property_id.clone() else {
            return Ok(None);
        };
        let Some(access_token) = self.google_access_token().await? else {
            return Ok(None);
        };
        let client = Ga4Client::new(&access_token, self.config.connector_timeout_secs)?;
        Ok(Some((client, property_id)))
    }

    async fn google_access_token(&self) -> Result<Option<String>, ConnectorError> {
        let vendor = &self.config.vendor;
        let (Some(client_id), Some(client_secret), Some(refresh_token)) = (
            &vendor.google_client_id,
            &vendor.google_client_secret,
            &vendor.google_refresh_token,
        ) else {
            return Ok(None);
        };
        let oauth = GoogleOAuth::new(client_id, client_secret, self.config.connector_timeout_secs)?;
        oauth.access_token(refresh_token).await.map(Some)
    }

    /// # Errors
    ///
    /// Returns [`PipelineError::MissingCredentials`] when the token is not
    /// configured, or a connector error if the client cannot be built.
    pub fn pipedrive_client(&self) -> Result<PipedriveClient, PipelineError> {
        let token = self
            .config
            .vendor
            .pipedrive_api_token
            .as_deref()
            .ok_or(PipelineError::MissingCredentials { vendor: "pipedrive" })?;
        Ok(PipedriveClient::new(token, self.config.connector_timeout_secs)?)
    }

    /// # Errors
    ///
    /// Returns [`PipelineError::MissingCredentials`] when the instance URL or
    /// credentials are not configured.
    pub fn mautic_client(&self) -> Result<MauticClient, PipelineError> {
        let vendor = &self.config.vendor;
        let (Some(base_url), Some(username), Some(password)) = (
            vendor.mautic_base_url.as_deref(),
            vendor.mautic_username.as_deref(),
            vendor.mautic_password.as_deref(),
        ) else {
            return Err(PipelineError::MissingCredentials { vendor: "mautic" });
        };
        Ok(MauticClient::new(
            base_url,
            username,
            password,
            self.config.connector_timeout_secs,
        )?)
    }

    /// Builds the Metricool client for one connected brand. The `blog_id`
    /// comes from the company's `METRICOOL` ad-account row.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::MissingCredentials`] when the token is not
    /// configured.
    pub fn metricool_client(&self, blog_id: &str) -> Result<MetricoolClient, PipelineError> {
        let token = self
            .config
            .vendor
            .metricool_token
            .as_deref()
            .ok_or(PipelineError::MissingCredentials { vendor: "metricool" })?;
        Ok(MetricoolClient::new(
            token,
            blog_id,
            self.config.connector_timeout_secs,
        )?)
    }

    /// # Errors
    ///
    /// Returns [`PipelineError::MissingCredentials`] when the deployment URL
    /// or token is not configured.
    pub fn tokeniza_client(&self) -> Result<TokenizaClient, PipelineError> {
        let vendor = &self.config.vendor;
        let (Some(base_url), Some(token)) = (
            vendor.tokeniza_base_url.as_deref(),
            vendor.tokeniza_api_token.as_deref(),
        ) else {
            return Err(PipelineError::MissingCredentials { vendor: "tokeniza" });
        };
        Ok(TokenizaClient::new(
            base_url,
            token,
            self.config.connector_timeout_secs,
        )?)
    }

    /// # Errors
    ///
    /// Returns [`PipelineError::MissingCredentials`] when the container URL
    /// or key is not configured.
    pub fn stape_client(&self) -> Result<StapeClient, PipelineError> {
        let vendor = &self.config.vendor;
        let (Some(base_url), Some(key)) = (
            vendor.stape_base_url.as_deref(),
            vendor.stape_api_key.as_deref(),
        ) else {
            return Err(PipelineError::MissingCredentials { vendor: "stape" });
        };
        Ok(StapeClient::new(
            base_url,
            key,
            self.config.connector_timeout_secs,
        )?)
    }
}

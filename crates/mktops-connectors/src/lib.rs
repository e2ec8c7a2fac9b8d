//! Vendor API clients for the marketing-operations pipeline.
//!
//! One module per vendor, each exposing a thin typed client over `reqwest`
//! that normalizes responses into the shared [`types`] records. All clients
//! take a `with_base_url`-style constructor so tests can point them at a
//! wiremock server. Transient failures are retried by the caller through
//! [`retry::retry_with_backoff`]; auth failures never are.

pub mod error;
pub mod ga4;
pub mod google;
pub mod mautic;
pub mod meta;
pub mod metricool;
pub mod oauth;
pub mod pipedrive;
pub mod retry;
pub mod stape;
pub mod tokeniza;
pub mod types;

pub use error::ConnectorError;
pub use ga4::Ga4Client;
pub use google::GoogleAdsClient;
pub use mautic::MauticClient;
pub use meta::MetaClient;
pub use metricool::MetricoolClient;
pub use oauth::GoogleOAuth;
pub use pipedrive::PipedriveClient;
pub use retry::retry_with_backoff;
pub use stape::StapeClient;
pub use tokeniza::TokenizaClient;

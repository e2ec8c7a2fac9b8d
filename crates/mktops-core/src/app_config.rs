use std::net::SocketAddr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

/// Vendor credential set, all optional: a missing credential disables the
/// corresponding connector rather than failing startup.
#[derive(Clone, Default)]
pub struct VendorCredentials {
    pub meta_access_token: Option<String>,
    pub google_client_id: Option<String>,
    pub google_client_secret: Option<String>,
    pub google_refresh_token: Option<String>,
    pub google_developer_token: Option<String>,
    pub ga4_property_id: Option<String>,
    pub pipedrive_api_token: Option<String>,
    pub mautic_base_url: Option<String>,
    pub mautic_username: Option<String>,
    pub mautic_password: Option<String>,
    pub metricool_token: Option<String>,
    pub tokeniza_base_url: Option<String>,
    pub tokeniza_api_token: Option<String>,
    pub stape_base_url: Option<String>,
    pub stape_api_key: Option<String>,
}

impl std::fmt::Debug for VendorCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn mask(v: &Option<String>) -> Option<&'static str> {
            v.as_ref().map(|_| "[redacted]")
        }
        f.debug_struct("VendorCredentials")
            .field("meta_access_token", &mask(&self.meta_access_token))
            .field("google_client_id", &self.google_client_id)
            .field("google_client_secret", &mask(&self.google_client_secret))
            .field("google_refresh_token", &mask(&self.google_refresh_token))
            .field(
                "google_developer_token",
                &mask(&self.google_developer_token),
            )
            .field("ga4_property_id", &self.ga4_property_id)
            .field("pipedrive_api_token", &mask(&self.pipedrive_api_token))
            .field("mautic_base_url", &self.mautic_base_url)
            .field("mautic_username", &self.mautic_username)
            .field("mautic_password", &mask(&self.mautic_password))
            .field("metricool_token", &mask(&self.metricool_token))
            .field("tokeniza_base_url", &self.tokeniza_base_url)
            .field("tokeniza_api_token", &mask(&self.tokeniza_api_token))
            .field("stape_base_url", &self.stape_base_url)
            .field("stape_api_key", &mask(&self.stape_api_key))
            .finish()
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub bind_addr: SocketAddr,
    pub log_level: String,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub vendor: VendorCredentials,
    pub connector_timeout_secs: u64,
    pub connector_max_retries: u32,
    pub connector_backoff_base_ms: u64,
    pub max_concurrent_accounts: usize,
    pub orchestrator_budget_secs: u64,
    pub orchestrator_min_phase_secs: u64,
    pub creative_batch_size: usize,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("database_url", &"[redacted]")
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("vendor", &self.vendor)
            .field("connector_timeout_secs", &self.connector_timeout_secs)
            .field("connector_max_retries", &self.connector_max_retries)
            .field("connector_backoff_base_ms", &self.connector_backoff_base_ms)
            .field("max_concurrent_accounts", &self.max_concurrent_accounts)
            .field("orchestrator_budget_secs", &self.orchestrator_budget_secs)
            .field(
                "orchestrator_min_phase_secs",
                &self.orchestrator_min_phase_secs,
            )
            .field("creative_batch_size", &self.creative_batch_size)
            .finish()
    }
}

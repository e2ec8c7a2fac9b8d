//! Shared configuration and pure domain utilities for the mktops workspace.

mod app_config;
mod config;
pub mod phone;
pub mod ratio;
pub mod url_meta;
pub mod weeks;

pub use app_config::{AppConfig, Environment, VendorCredentials};
pub use config::{load_app_config, load_app_config_from_env, ConfigError};

use serde::{Deserialize, Serialize};

/// Ad platform tag carried by every ad account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Platform {
    Meta,
    Google,
}

impl Platform {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Platform::Meta => "META",
            Platform::Google => "GOOGLE",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "META" => Some(Platform::Meta),
            "GOOGLE" => Some(Platform::Google),
            _ => None,
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_parse_is_case_insensitive() {
        assert_eq!(Platform::parse("meta"), Some(Platform::Meta));
        assert_eq!(Platform::parse("GOOGLE"), Some(Platform::Google));
        assert_eq!(Platform::parse("tiktok"), None);
    }

    #[test]
    fn platform_serializes_uppercase() {
        let json = serde_json::to_string(&Platform::Meta).expect("serialize");
        assert_eq!(json, "\"META\"");
    }
}

use thiserror::Error;

/// Errors returned by the vendor API clients.
///
/// `Auth` is deliberately distinct from `Upstream`: an expired or
/// under-scoped token is user-actionable (regenerate the credential) and is
/// never retried, while upstream hiccups are transient and retriable.
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// Credential rejected: invalid, expired, or missing a required scope.
    #[error("{vendor} auth error: {hint}")]
    Auth { vendor: &'static str, hint: String },

    /// Network or TLS failure from the underlying HTTP client.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The vendor answered with a non-2xx status or an error envelope.
    #[error("{vendor} upstream error (status {status}): {message}")]
    Upstream {
        vendor: &'static str,
        status: u16,
        message: String,
    },

    /// The response body could not be deserialized into the expected type.
    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}

impl ConnectorError {
    /// Whether this is a credential problem the operator must fix.
    #[must_use]
    pub fn is_auth(&self) -> bool {
        matches!(self, ConnectorError::Auth { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_errors_carry_actionable_hint() {
        let err = ConnectorError::Auth {
            vendor: "google",
            hint: "refresh token expired; regenerate with scope adwords".to_string(),
        };
        assert!(err.is_auth());
        assert!(err.to_string().contains("regenerate"));
    }

    #[test]
    fn upstream_errors_are_not_auth() {
        let err = ConnectorError::Upstream {
            vendor: "meta",
            status: 500,
            message: "internal".to_string(),
        };
        assert!(!err.is_auth());
    }
}

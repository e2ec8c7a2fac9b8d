//! Retry with exponential back-off and jitter for vendor API calls.
//!
//! [`retry_with_backoff`] wraps any fallible async operation and retries on
//! transient errors (network failures, 5xx, 429 rate limits). Auth errors
//! and malformed responses are returned immediately: retrying cannot fix a
//! revoked token or a parse failure.

use std::future::Future;
use std::time::Duration;

use crate::error::ConnectorError;

/// Returns `true` for errors that are worth retrying after a back-off delay.
///
/// **Retriable:**
/// - Network-level failures: timeout, connection reset.
/// - HTTP 5xx responses and 429 rate limits.
///
/// **Not retriable (hard stop):**
/// - [`ConnectorError::Auth`] — operator must fix the credential.
/// - [`ConnectorError::Upstream`] with a 4xx other than 429.
/// - [`ConnectorError::Deserialize`] — retrying won't change the payload.
pub(crate) fn is_retriable(err: &ConnectorError) -> bool {
    match err {
        ConnectorError::Http(e) => {
            e.is_timeout() || e.is_connect() || e.status().is_some_and(|s| s.is_server_error())
        }
        ConnectorError::Upstream { status, .. } => *status == 429 || *status >= 500,
        ConnectorError::Auth { .. } | ConnectorError::Deserialize { .. } => false,
    }
}

/// Runs `operation` with up to `max_retries` additional attempts on
/// transient errors.
///
/// Delay doubles each attempt from `backoff_base_ms`, with ±25 % jitter,
/// capped at 60 s. Non-retriable errors are returned immediately.
pub async fn retry_with_backoff<T, F, Fut>(
    max_retries: u32,
    backoff_base_ms: u64,
    mut operation: F,
) -> Result<T, ConnectorError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ConnectorError>>,
{
    const MAX_DELAY_MS: u64 = 60_000;
    let mut attempt = 0u32;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !is_retriable(&err) || attempt >= max_retries {
                    return Err(err);
                }
                attempt += 1;
                let computed = backoff_base_ms.saturating_mul(1u64 << (attempt - 1).min(10));
                let capped = computed.min(MAX_DELAY_MS);
                #[allow(
                    clippy::cast_possible_truncation,
                    clippy::cast_sign_loss,
                    clippy::cast_precision_loss
                )]
                let delay_ms = (capped as f64 * (rand::random::<f64>() * 0.5 + 0.75)) as u64;
                tracing::warn!(
                    attempt,
                    max_retries,
                    delay_ms,
                    error = %err,
                    "transient connector error — retrying after back-off"
                );
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deserialize_err() -> ConnectorError {
        let src = serde_json::from_str::<()>("invalid").unwrap_err();
        ConnectorError::Deserialize {
            context: "test".to_owned(),
            source: src,
        }
    }

    #[test]
    fn auth_error_is_not_retriable() {
        assert!(!is_retriable(&ConnectorError::Auth {
            vendor: "meta",
            hint: "token expired".to_owned(),
        }));
    }

    #[test]
    fn rate_limit_is_retriable() {
        assert!(is_retriable(&ConnectorError::Upstream {
            vendor: "meta",
            status: 429,
            message: "rate limited".to_owned(),
        }));
    }

    #[test]
    fn client_error_is_not_retriable() {
        assert!(!is_retriable(&ConnectorError::Upstream {
            vendor: "pipedrive",
            status: 404,
            message: "not found".to_owned(),
        }));
    }

    #[test]
    fn server_error_is_retriable() {
        assert!(is_retriable(&ConnectorError::Upstream {
            vendor: "google",
            status: 503,
            message: "unavailable".to_owned(),
        }));
    }

    #[test]
    fn deserialize_error_is_not_retriable() {
        assert!(!is_retriable(&deserialize_err()));
    }

    #[tokio::test]
    async fn succeeds_immediately_on_first_try() {
        use std::sync::atomic::{AtomicU32, Ordering};
        use std::sync::Arc;
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(3, 0, || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok::<u32, ConnectorError>(42)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn does_not_retry_auth_errors() {
        use std::sync::atomic::{AtomicU32, Ordering};
        use std::sync::Arc;
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(3, 0, || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err::<u32, _>(ConnectorError::Auth {
                    vendor: "google",
                    hint: "invalid_grant".to_owned(),
                })
            }
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1, "auth must not be retried");
        assert!(matches!(result, Err(ConnectorError::Auth { .. })));
    }

    #[tokio::test]
    async fn retries_transient_upstream_then_succeeds() {
        use std::sync::atomic::{AtomicU32, Ordering};
        use std::sync::Arc;
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(3, 0, || {
            let c = Arc::clone(&c);
            async move {
                let attempt = c.fetch_add(1, Ordering::SeqCst) + 1;
                if attempt < 3 {
                    Err::<u32, _>(ConnectorError::Upstream {
                        vendor: "meta",
                        status: 500,
                        message: "flaky".to_owned(),
                    })
                } else {
                    Ok(99)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 99);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}

//! Blocking facade over the async reqwest client.
//!
//! Requests run on a shared tokio runtime so callers (rayon workers, the
//! orchestrator) stay synchronous.

use std::sync::{LazyLock, OnceLock};
use std::time::Duration;

use crate::error::CallError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Runtime-tunable HTTP settings, set once from the CLI.
#[derive(Debug, Clone, Copy)]
pub struct HttpConfig {
    /// Whole-request timeout. Expiry is a transient failure.
    pub request_timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(60),
        }
    }
}

static HTTP_CONFIG: OnceLock<HttpConfig> = OnceLock::new();

/// Install the HTTP settings. Only the first call has an effect.
pub fn set_http_config(config: HttpConfig) {
    let _ = HTTP_CONFIG.set(config);
}

pub fn http_config() -> HttpConfig {
    HTTP_CONFIG.get().copied().unwrap_or_default()
}

/// Shared async HTTP client with connection pooling.
static SHARED_CLIENT: LazyLock<reqwest::Client> = LazyLock::new(|| {
    reqwest::Client::builder()
        .user_agent(concat!("depoline/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(CONNECT_TIMEOUT)
        .pool_max_idle_per_host(4)
        .build()
        .expect("failed to build HTTP client")
});

pub fn http_client() -> &'static reqwest::Client {
    &SHARED_CLIENT
}

/// Shared tokio runtime for HTTP operations.
pub static SHARED_RUNTIME: LazyLock<tokio::runtime::Runtime> = LazyLock::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("failed to build tokio runtime")
});

/// Fully-read response. Non-2xx statuses are returned, not turned into errors.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
    pub retry_after: Option<Duration>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Classify a failed response, using `reason` as the human-readable message.
    pub fn into_error(self, reason: String) -> CallError {
        CallError::from_status(self.status, reason, self.retry_after)
    }

    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, CallError> {
        serde_json::from_str(&self.body).map_err(|e| CallError::Transient {
            status: Some(self.status),
            message: format!("invalid JSON response: {e}"),
        })
    }
}

/// Send a request and read the whole body.
///
/// Transport failures and timeouts become [`CallError::Transient`].
pub fn send(request: reqwest::RequestBuilder) -> Result<HttpResponse, CallError> {
    let timeout = http_config().request_timeout;
    SHARED_RUNTIME.handle().block_on(async move {
        let response = request
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| CallError::from_reqwest(&e))?;
        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);
        let body = response.text().await.map_err(|e| CallError::Transient {
            status: Some(status),
            message: format!("reading body: {e}"),
        })?;
        Ok(HttpResponse {
            status,
            body,
            retry_after,
        })
    })
}

/// `Retry-After` in delta-seconds form. HTTP-date values are ignored.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

/// Shorten a response body for inclusion in an error message.
pub fn truncate_body(body: &str, max: usize) -> String {
    let trimmed = body.trim();
    match trimmed.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_after_seconds() {
        assert_eq!(parse_retry_after("12"), Some(Duration::from_secs(12)));
        assert_eq!(parse_retry_after(" 3 "), Some(Duration::from_secs(3)));
    }

    #[test]
    fn retry_after_http_date_ignored() {
        assert_eq!(parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"), None);
    }

    #[test]
    fn response_error_classification() {
        let resp = HttpResponse {
            status: 429,
            body: String::new(),
            retry_after: Some(Duration::from_secs(5)),
        };
        assert!(!resp.is_success());
        assert_eq!(
            resp.into_error("slow down".into()),
            CallError::RateLimited {
                retry_after: Some(Duration::from_secs(5))
            }
        );
    }

    #[test]
    fn invalid_json_is_transient() {
        let resp = HttpResponse {
            status: 200,
            body: "<html>".into(),
            retry_after: None,
        };
        let err = resp.json::<serde_json::Value>().unwrap_err();
        assert!(matches!(err, CallError::Transient { .. }));
    }

    #[test]
    fn truncate_long_body() {
        assert_eq!(truncate_body("abcdef", 3), "abc...");
        assert_eq!(truncate_body("  ab  ", 3), "ab");
    }
}

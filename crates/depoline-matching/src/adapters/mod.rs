//! HTTP adapters for external bibliographic registries

pub mod crossref;
pub mod datacite;

use std::time::Duration;

use depoline_core::http::{self, HttpResponse};
use depoline_core::{CallError, RateLimitConfig, RateLimiter};

pub use crossref::{CROSSREF_URL, CrossrefAdapter};
pub use datacite::{DATACITE_URL, DataCiteAdapter};

/// Settings shared by the registry adapters.
#[derive(Debug, Clone)]
pub struct AdapterConfig {
    pub base_url: String,
    /// Results requested per search (clamped to 1..=100).
    pub rows: usize,
    /// Spacing between calls, also the pause before the single 429 retry.
    pub pause: Duration,
}

/// Courtesy-throttled GET shared by the adapters.
struct PoliteClient {
    limiter: RateLimiter,
    pause: Duration,
}

impl PoliteClient {
    fn new(pause: Duration) -> Self {
        let pause = pause.max(Duration::from_millis(100));
        Self {
            limiter: RateLimiter::new(RateLimitConfig {
                per_minute: 0,
                per_hour: 0,
                min_interval: pause,
            }),
            pause,
        }
    }

    /// GET with one retry after a 429.
    fn get(&self, name: &str, url: &str, query: &[(&str, String)]) -> Result<HttpResponse, CallError> {
        let mut retried = false;
        loop {
            self.limiter.acquire();
            let request = http::http_client()
                .get(url)
                .query(query)
                .header(reqwest::header::ACCEPT, "application/json");
            let response = http::send(request)?;
            if response.is_success() {
                return Ok(response);
            }
            if response.status == 429 && !retried {
                log::info!("{name} rate limit encountered; pausing {:?}", self.pause);
                self.limiter.on_rate_limited(Some(self.pause));
                retried = true;
                continue;
            }
            let reason = http::truncate_body(&response.body, 200);
            return Err(response.into_error(reason));
        }
    }
}

//! Error taxonomy for calls to the catalog and external registries

use std::time::Duration;

/// Failure of one outbound call, classified by how the caller should react.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    /// Timeout, connection failure, 5xx or 408. Retried with backoff.
    Transient {
        status: Option<u16>,
        message: String,
    },
    /// 429. Not counted as an attempt; the limiter is re-synchronized.
    RateLimited { retry_after: Option<Duration> },
    /// Any other 4xx. The record fails immediately with the server's reason.
    Validation { status: u16, message: String },
}

impl std::fmt::Display for CallError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transient {
                status: Some(s),
                message,
            } => write!(f, "HTTP {s}: {message}"),
            Self::Transient {
                status: None,
                message,
            } => write!(f, "network error: {message}"),
            Self::RateLimited {
                retry_after: Some(d),
            } => write!(f, "rate limited (retry after {}s)", d.as_secs()),
            Self::RateLimited { retry_after: None } => write!(f, "rate limited"),
            Self::Validation { status, message } => write!(f, "HTTP {status}: {message}"),
        }
    }
}

impl std::error::Error for CallError {}

impl CallError {
    /// Classify a non-success HTTP status.
    pub fn from_status(status: u16, message: String, retry_after: Option<Duration>) -> Self {
        match status {
            429 => Self::RateLimited { retry_after },
            408 | 500..=599 => Self::Transient {
                status: Some(status),
                message,
            },
            _ => Self::Validation { status, message },
        }
    }

    /// Classify a transport-level failure (no response).
    pub fn from_reqwest(e: &reqwest::Error) -> Self {
        match e.status() {
            Some(s) => Self::from_status(s.as_u16(), e.to_string(), None),
            None => Self::Transient {
                status: None,
                message: e.to_string(),
            },
        }
    }
}

//! Error taxonomy for the API invocation engine
//!
//! Retryability is a property of the error itself; the retry policy only
//! asks `is_retryable` and never inspects status codes on its own.

use crate::auth::AuthError;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while invoking a backend API
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Invalid parameter: {0}")]
    Parameter(String),

    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Client error ({status}): {body}")]
    Client { status: u16, body: String },

    #[error("Rate limited (429): {body}")]
    Throttled {
        retry_after: Option<u64>,
        body: String,
    },

    #[error("Server error ({status}): {body}")]
    Server { status: u16, body: String },

    #[error("Request timed out after {0} ms")]
    Timeout(u64),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Unsupported HTTP method: {0}")]
    UnsupportedMethod(String),

    #[error("Pagination aborted after {pages_fetched} pages: {source}")]
    Pagination {
        pages_fetched: usize,
        source: Box<ApiError>,
    },

    #[error("Parse error: {0}")]
    Parse(String),
}

impl ApiError {
    /// Whether the retry policy may attempt this operation again.
    ///
    /// 4xx responses other than 429 are terminal; throttling, 5xx, timeouts
    /// and transport failures are transient.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ApiError::Throttled { .. }
                | ApiError::Server { .. }
                | ApiError::Timeout(_)
                | ApiError::Network(_)
        )
    }

    /// Classify a non-success HTTP response.
    pub fn from_status(status: u16, body: String, retry_after: Option<u64>) -> Self {
        match status {
            429 => ApiError::Throttled { retry_after, body },
            s if (400..500).contains(&s) => ApiError::Client { status: s, body },
            s => ApiError::Server { status: s, body },
        }
    }

    /// Map a transport-level failure, distinguishing timeouts.
    pub fn from_reqwest(err: reqwest::Error, timeout_ms: u64) -> Self {
        if err.is_timeout() {
            ApiError::Timeout(timeout_ms)
        } else {
            ApiError::Network(err.to_string())
        }
    }

    /// HTTP status carried by this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Client { status, .. } | ApiError::Server { status, .. } => Some(*status),
            ApiError::Throttled { .. } => Some(429),
            ApiError::Pagination { source, .. } => source.status(),
            _ => None,
        }
    }

    /// Response body carried by this error, if any.
    pub fn response_body(&self) -> Option<&str> {
        match self {
            ApiError::Client { body, .. }
            | ApiError::Server { body, .. }
            | ApiError::Throttled { body, .. } => Some(body),
            ApiError::Pagination { source, .. } => source.response_body(),
            _ => None,
        }
    }

    /// Server-requested wait from a `Retry-After` header, if present.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ApiError::Throttled {
                retry_after: Some(secs),
                ..
            } => Some(Duration::from_secs(*secs)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_4xx_is_terminal_except_429() {
        assert!(!ApiError::from_status(400, String::new(), None).is_retryable());
        assert!(!ApiError::from_status(403, String::new(), None).is_retryable());
        assert!(!ApiError::from_status(404, String::new(), None).is_retryable());
        assert!(ApiError::from_status(429, String::new(), None).is_retryable());
    }

    #[test]
    fn test_5xx_timeout_network_are_transient() {
        assert!(ApiError::from_status(500, String::new(), None).is_retryable());
        assert!(ApiError::from_status(503, String::new(), None).is_retryable());
        assert!(ApiError::Timeout(30_000).is_retryable());
        assert!(ApiError::Network("connection reset".into()).is_retryable());
    }

    #[test]
    fn test_parameter_and_auth_are_terminal() {
        assert!(!ApiError::Parameter("apiVersion is required".into()).is_retryable());
        assert!(!ApiError::UnsupportedMethod("head".into()).is_retryable());
    }

    #[test]
    fn test_status_classification() {
        match ApiError::from_status(429, "slow down".into(), Some(7)) {
            ApiError::Throttled { retry_after, body } => {
                assert_eq!(retry_after, Some(7));
                assert_eq!(body, "slow down");
            }
            other => panic!("expected Throttled, got {other:?}"),
        }
        assert_eq!(
            ApiError::from_status(502, String::new(), None).status(),
            Some(502)
        );
    }

    #[test]
    fn test_pagination_error_exposes_inner_diagnostics() {
        let err = ApiError::Pagination {
            pages_fetched: 2,
            source: Box::new(ApiError::Server {
                status: 503,
                body: "unavailable".into(),
            }),
        };
        assert_eq!(err.status(), Some(503));
        assert_eq!(err.response_body(), Some("unavailable"));
        assert!(!err.is_retryable());
    }
}

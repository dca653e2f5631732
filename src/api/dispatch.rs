//! Call orchestration
//!
//! Validates a request before any I/O, routes it to the matching backend
//! executor wrapped in the retry policy (and the paginator when asked), and
//! shapes the outcome. Every failure is converted into a structured result;
//! nothing here panics or propagates an error to the protocol layer.

use crate::api::azure::AzureExecutor;
use crate::api::backend::BackendExecutor;
use crate::api::error::ApiError;
use crate::api::format::{format_response, CallOutcome};
use crate::api::graph::GraphExecutor;
use crate::api::paginate::fetch_all_pages;
use crate::api::rate_limit::RateLimiter;
use crate::api::request::{ApiRequest, Backend, HttpMethod};
use crate::api::retry::RetryPolicy;
use crate::auth::TokenCache;
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Final result of one dispatched call
#[derive(Debug)]
pub struct DispatchOutcome {
    pub text: String,
    pub is_error: bool,
}

pub struct ApiDispatcher {
    http: Client,
    auth: Arc<TokenCache>,
    rate_limiter: Option<Arc<dyn RateLimiter>>,
}

impl ApiDispatcher {
    pub fn new(auth: Arc<TokenCache>) -> Self {
        Self {
            http: Client::new(),
            auth,
            rate_limiter: None,
        }
    }

    pub fn with_rate_limiter(mut self, limiter: Arc<dyn RateLimiter>) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    /// Execute one call end to end. Never returns an Err: failures come back
    /// as a diagnostic envelope with `is_error` set.
    pub async fn invoke(&self, request: &ApiRequest) -> DispatchOutcome {
        let started = Instant::now();

        tracing::info!(
            "dispatch {} {} {} (fetchAll: {})",
            request.backend,
            request.method,
            request.path,
            request.fetch_all
        );

        match self.try_invoke(request).await {
            Ok(text) => DispatchOutcome {
                text,
                is_error: false,
            },
            Err(err) => {
                tracing::warn!(
                    "{} {} {} failed: {}",
                    request.backend,
                    request.method,
                    request.path,
                    err
                );
                DispatchOutcome {
                    text: error_envelope(request, &err, started.elapsed()),
                    is_error: true,
                }
            }
        }
    }

    async fn try_invoke(&self, request: &ApiRequest) -> Result<String, ApiError> {
        request.validate()?;

        if let Some(limiter) = &self.rate_limiter {
            limiter.check_limit().await?;
        }

        let retry = RetryPolicy::new(request.max_retries, Duration::from_millis(request.retry_delay));
        let executor: Box<dyn BackendExecutor> = match request.backend()? {
            Backend::Graph => Box::new(GraphExecutor::new(self.http.clone(), self.auth.clone())),
            Backend::Azure => Box::new(AzureExecutor::new(self.http.clone(), self.auth.clone())),
        };

        let started = Instant::now();
        let outcome = if request.fetch_all && request.method()? == HttpMethod::Get {
            CallOutcome::Collection(fetch_all_pages(executor.as_ref(), request, &retry).await?)
        } else {
            CallOutcome::Single(retry.execute(|| executor.execute_once(request)).await?)
        };

        Ok(format_response(
            outcome,
            request.response_format()?,
            started.elapsed(),
        ))
    }
}

/// Structured, non-throwing diagnostic for a failed call.
fn error_envelope(request: &ApiRequest, err: &ApiError, elapsed: Duration) -> String {
    let mut detail = json!({
        "message": err.to_string(),
        "attemptedUrl": request.attempted_url(),
        "elapsedMs": elapsed.as_millis() as u64,
        "maxRetries": request.max_retries,
    });

    if let Some(status) = err.status() {
        detail["statusCode"] = json!(status);
    }
    if let Some(body) = err.response_body() {
        // Error bodies are usually JSON; fall back to the raw text
        detail["responseBody"] =
            serde_json::from_str(body).unwrap_or_else(|_| Value::String(body.to_string()));
    }

    serde_json::to_string_pretty(&json!({ "error": detail })).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn dispatcher() -> ApiDispatcher {
        ApiDispatcher::new(Arc::new(TokenCache::new(
            "tenant".into(),
            "client".into(),
            "secret".into(),
        )))
    }

    #[tokio::test]
    async fn test_azure_without_api_version_fails_before_io() {
        let request = ApiRequest::new("azure", "/resourceGroups", "get");
        let outcome = dispatcher().invoke(&request).await;

        assert!(outcome.is_error);
        let envelope: Value = serde_json::from_str(&outcome.text).unwrap();
        assert!(envelope["error"]["message"]
            .as_str()
            .unwrap()
            .contains("apiVersion"));
        assert_eq!(
            envelope["error"]["attemptedUrl"],
            "https://management.azure.com/resourceGroups"
        );
        // Parameter errors carry no HTTP status
        assert!(envelope["error"].get("statusCode").is_none());
    }

    #[tokio::test]
    async fn test_unsupported_method_fails_before_io() {
        let request = ApiRequest::new("graph", "/users", "purge");
        let outcome = dispatcher().invoke(&request).await;

        assert!(outcome.is_error);
        let envelope: Value = serde_json::from_str(&outcome.text).unwrap();
        assert!(envelope["error"]["message"]
            .as_str()
            .unwrap()
            .contains("purge"));
    }

    #[test]
    fn test_error_envelope_includes_status_and_body() {
        let request = ApiRequest::new("graph", "/users", "get");
        let err = ApiError::Client {
            status: 403,
            body: r#"{"error": {"code": "Authorization_RequestDenied"}}"#.to_string(),
        };

        let text = error_envelope(&request, &err, Duration::from_millis(12));
        let envelope: Value = serde_json::from_str(&text).unwrap();

        assert_eq!(envelope["error"]["statusCode"], 403);
        assert_eq!(envelope["error"]["elapsedMs"], 12);
        assert_eq!(envelope["error"]["maxRetries"], 3);
        assert_eq!(
            envelope["error"]["responseBody"]["error"]["code"],
            "Authorization_RequestDenied"
        );
    }

    #[test]
    fn test_error_envelope_tolerates_plain_text_body() {
        let request = ApiRequest::new("azure", "/providers", "get");
        let err = ApiError::Server {
            status: 502,
            body: "Bad Gateway".to_string(),
        };

        let text = error_envelope(&request, &err, Duration::from_millis(1));
        let envelope: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(envelope["error"]["responseBody"], "Bad Gateway");
    }
}

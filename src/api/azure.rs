//! Azure Resource Management backend executor
//!
//! Raw HTTP against `https://management.azure.com`, with the mandatory
//! `api-version` query parameter and an optional subscription prefix. ARM
//! responses are JSON in the happy path but error bodies and long-running
//! operations can return plain text, so non-JSON bodies are tolerated.

use crate::api::backend::{parse_retry_after, BackendExecutor, Page};
use crate::api::error::ApiError;
use crate::api::request::{ApiRequest, Backend, HttpMethod, AZURE_BASE_URL, AZURE_SCOPE};
use crate::auth::TokenCache;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Url};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug)]
pub struct AzureExecutor {
    http: Client,
    auth: Arc<TokenCache>,
}

impl AzureExecutor {
    pub fn new(http: Client, auth: Arc<TokenCache>) -> Self {
        Self { http, auth }
    }

    fn build_url(&self, request: &ApiRequest) -> Result<String, ApiError> {
        let mut base = String::from(AZURE_BASE_URL);
        if let Some(sub) = &request.subscription_id {
            base.push_str("/subscriptions/");
            base.push_str(sub);
        }
        base.push_str(&request.normalized_path());

        let mut url = Url::parse(&base)
            .map_err(|e| ApiError::Parameter(format!("invalid path '{}': {}", request.path, e)))?;

        {
            let mut pairs = url.query_pairs_mut();
            // validate() guarantees presence for azure requests
            if let Some(api_version) = &request.api_version {
                pairs.append_pair("api-version", api_version);
            }
            for (key, value) in &request.query_params {
                pairs.append_pair(key, value);
            }
        }

        Ok(url.into())
    }

    async fn send(&self, request: &ApiRequest, url: String) -> Result<Value, ApiError> {
        let method = request.method()?;
        let token = self.auth.acquire(AZURE_SCOPE).await?;

        tracing::debug!("azure {} {}", request.method, url);

        let mut builder = self
            .http
            .request(method.as_reqwest(), url)
            .bearer_auth(&token)
            .header(CONTENT_TYPE, "application/json")
            .header("Accept", "application/json")
            .timeout(Duration::from_millis(request.timeout));

        for (key, value) in &request.custom_headers {
            builder = builder.header(key, value);
        }

        if matches!(
            method,
            HttpMethod::Post | HttpMethod::Put | HttpMethod::Patch
        ) {
            builder = builder.json(request.body.as_ref().unwrap_or(&json!({})));
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ApiError::from_reqwest(e, request.timeout))?;

        let status = response.status();
        let retry_after = parse_retry_after(response.headers());
        let text = response
            .text()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        if !status.is_success() {
            return Err(ApiError::from_status(status.as_u16(), text, retry_after));
        }

        if text.trim().is_empty() {
            return Ok(json!({ "status": format!("Success ({})", status.as_u16()) }));
        }

        match serde_json::from_str(&text) {
            Ok(value) => Ok(value),
            Err(_) => Ok(json!({ "rawResponse": text })),
        }
    }
}

/// Split an ARM page body: top-level `value` array and plain `nextLink`
/// cursor. A first page with neither is a single resource and becomes the
/// sole accumulated item.
pub(crate) fn parse_page(body: Value, first_page: bool) -> Page {
    let is_collection =
        body.get("value").map_or(false, Value::is_array) || body.get("nextLink").is_some();

    if first_page && !is_collection {
        return Page {
            items: vec![body],
            next_link: None,
            context: None,
        };
    }

    let next_link = body
        .get("nextLink")
        .and_then(Value::as_str)
        .map(String::from);

    let mut body = body;
    let items = match body.get_mut("value").map(Value::take) {
        Some(Value::Array(items)) => items,
        _ => Vec::new(),
    };

    Page {
        items,
        next_link,
        context: None,
    }
}

#[async_trait]
impl BackendExecutor for AzureExecutor {
    fn kind(&self) -> Backend {
        Backend::Azure
    }

    async fn execute_once(&self, request: &ApiRequest) -> Result<Value, ApiError> {
        let url = self.build_url(request)?;
        self.send(request, url).await
    }

    async fn fetch_page(
        &self,
        request: &ApiRequest,
        cursor: Option<&str>,
    ) -> Result<Value, ApiError> {
        // Token is re-acquired per page inside send(); long pagination runs
        // can outlive a single token's validity window.
        let url = match cursor {
            Some(link) => link.to_string(),
            None => self.build_url(request)?,
        };
        self.send(request, url).await
    }

    fn parse_page(&self, body: Value, first_page: bool) -> Page {
        parse_page(body, first_page)
    }
}

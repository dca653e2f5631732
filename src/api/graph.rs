//! Microsoft Graph backend executor
//!
//! Builds requests rooted at `https://graph.microsoft.com/{version}` with
//! OData query injection (`$select`, `$expand`, `$top`) and the
//! `ConsistencyLevel` header when advanced queries need it.

use crate::api::backend::{parse_retry_after, BackendExecutor, Page};
use crate::api::error::ApiError;
use crate::api::request::{ApiRequest, Backend, HttpMethod, GRAPH_BASE_URL, GRAPH_SCOPE};
use crate::auth::TokenCache;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, Url};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug)]
pub struct GraphExecutor {
    http: Client,
    auth: Arc<TokenCache>,
}

impl GraphExecutor {
    pub fn new(http: Client, auth: Arc<TokenCache>) -> Self {
        Self { http, auth }
    }

    /// Build the request URL, merging caller query params with injected
    /// OData options. Explicit `queryParams` always win over injection.
    fn build_url(&self, request: &ApiRequest) -> Result<String, ApiError> {
        let base = format!(
            "{}/{}{}",
            GRAPH_BASE_URL,
            request.graph_api_version,
            request.normalized_path()
        );
        let mut url = Url::parse(&base)
            .map_err(|e| ApiError::Parameter(format!("invalid path '{}': {}", request.path, e)))?;

        {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &request.query_params {
                pairs.append_pair(key, value);
            }
            if !request.select_fields.is_empty() && !request.query_params.contains_key("$select") {
                pairs.append_pair("$select", &request.select_fields.join(","));
            }
            if !request.expand_fields.is_empty() && !request.query_params.contains_key("$expand") {
                pairs.append_pair("$expand", &request.expand_fields.join(","));
            }
            if request.fetch_all && !request.query_params.contains_key("$top") {
                pairs.append_pair("$top", &request.batch_size.to_string());
            }
        }

        // An empty pair set leaves a dangling '?'
        if url.query().map_or(false, str::is_empty) {
            url.set_query(None);
        }

        Ok(url.into())
    }

    async fn send(&self, request: &ApiRequest, url: String) -> Result<Value, ApiError> {
        let method = request.method()?;
        let token = self.auth.acquire(GRAPH_SCOPE).await?;

        tracing::debug!("graph {} {}", request.method, url);

        let mut builder = self
            .http
            .request(method.as_reqwest(), url)
            .bearer_auth(&token)
            .header("Accept", "application/json")
            .timeout(Duration::from_millis(request.timeout));

        if let Some(level) = &request.consistency_level {
            builder = builder.header("ConsistencyLevel", level);
        }
        for (key, value) in &request.custom_headers {
            builder = builder.header(key, value);
        }

        builder = match method {
            // Graph expects a JSON body on writes; default to {} when absent
            HttpMethod::Post | HttpMethod::Put => {
                builder.json(request.body.as_ref().unwrap_or(&json!({})))
            }
            HttpMethod::Patch => match &request.body {
                Some(body) => builder.json(body),
                None => builder,
            },
            _ => builder,
        };

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

        if status.as_u16() == 204 || text.trim().is_empty() {
            return Ok(match method {
                HttpMethod::Delete => json!({
                    "status": "Success (No Content)",
                    "deletedAt": Utc::now().to_rfc3339(),
                }),
                _ => json!({ "status": format!("Success ({})", status.as_u16()) }),
            });
        }

        serde_json::from_str(&text)
            .map_err(|e| ApiError::Parse(format!("invalid JSON from Graph: {}", e)))
    }
}

/// Split a Graph page body per the OData convention: top-level `value`
/// array, `@odata.nextLink` cursor, `@odata.context` annotation.
pub(crate) fn parse_page(body: Value, _first_page: bool) -> Page {
    let next_link = body
        .get("@odata.nextLink")
        .and_then(Value::as_str)
        .map(String::from);
    let context = body
        .get("@odata.context")
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
        context,
    }
}

#[async_trait]
impl BackendExecutor for GraphExecutor {
    fn kind(&self) -> Backend {
        Backend::Graph
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

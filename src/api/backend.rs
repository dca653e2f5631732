//! Backend executor abstraction
//!
//! The two wire conventions (Microsoft Graph, Azure Resource Management) sit
//! behind one interface so the paginator and the dispatcher stay
//! convention-agnostic.

use crate::api::error::ApiError;
use crate::api::request::{ApiRequest, Backend};
use async_trait::async_trait;
use serde_json::Value;

/// One parsed page of a collection response
#[derive(Debug, Default)]
pub struct Page {
    pub items: Vec<Value>,
    pub next_link: Option<String>,
    /// `@odata.context` from the first Graph page; absent for Azure RM.
    pub context: Option<String>,
}

/// Parse a numeric `Retry-After` header if present.
pub(crate) fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get("Retry-After")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
}

#[async_trait]
pub trait BackendExecutor: Send + Sync {
    fn kind(&self) -> Backend;

    /// Execute the request as a single call and return the parsed body.
    /// Tokens are acquired internally per call.
    async fn execute_once(&self, request: &ApiRequest) -> Result<Value, ApiError>;

    /// Fetch one collection page: the initial URL built from the request
    /// when `cursor` is `None`, otherwise the continuation link verbatim.
    async fn fetch_page(
        &self,
        request: &ApiRequest,
        cursor: Option<&str>,
    ) -> Result<Value, ApiError>;

    /// Split a raw page body into items and continuation state.
    fn parse_page(&self, body: Value, first_page: bool) -> Page;
}

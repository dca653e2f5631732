//! Continuation-cursor pagination
//!
//! Pages are fetched strictly sequentially; each fetch carries its own retry
//! budget, and a fetch that exhausts it aborts the whole run. Partial
//! results are never surfaced.

use crate::api::backend::BackendExecutor;
use crate::api::error::ApiError;
use crate::api::request::ApiRequest;
use crate::api::retry::RetryPolicy;
use chrono::Utc;
use serde_json::{json, Value};

/// Accumulated result of a multi-page fetch
#[derive(Debug)]
pub struct PageSet {
    pub items: Vec<Value>,
    pub total_count: usize,
    pub fetched_at: String,
    /// `@odata.context` preserved from the first Graph page.
    pub context: Option<String>,
}

impl PageSet {
    /// Collapse into the collection payload handed to the formatter.
    pub fn into_payload(self) -> Value {
        let mut payload = json!({
            "value": self.items,
            "totalCount": self.total_count,
            "fetchedAt": self.fetched_at,
        });
        if let Some(context) = self.context {
            payload["@odata.context"] = Value::String(context);
        }
        payload
    }
}

/// Follow the continuation cursor until absent, accumulating `value` items.
pub async fn fetch_all_pages<E>(
    executor: &E,
    request: &ApiRequest,
    retry: &RetryPolicy,
) -> Result<PageSet, ApiError>
where
    E: BackendExecutor + ?Sized,
{
    let mut items: Vec<Value> = Vec::new();
    let mut context: Option<String> = None;
    let mut cursor: Option<String> = None;
    let mut pages = 0usize;

    loop {
        let body = retry
            .execute(|| executor.fetch_page(request, cursor.as_deref()))
            .await
            .map_err(|source| ApiError::Pagination {
                pages_fetched: pages,
                source: Box::new(source),
            })?;

        let first_page = pages == 0;
        let page = executor.parse_page(body, first_page);
        pages += 1;

        tracing::info!("page {}: fetched {} items", pages, page.items.len());

        if first_page {
            context = page.context;
        }
        items.extend(page.items);

        match page.next_link {
            Some(link) => cursor = Some(link),
            None => break,
        }
    }

    tracing::info!("total items fetched: {}", items.len());

    Ok(PageSet {
        total_count: items.len(),
        items,
        fetched_at: Utc::now().to_rfc3339(),
        context,
    })
}

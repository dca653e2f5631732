//! Request model for the generic Microsoft API tool
//!
//! The wire form is camelCase JSON as supplied by the MCP client. Backend,
//! method and response format arrive as strings and are validated before any
//! network I/O happens.

use crate::api::error::ApiError;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

pub const GRAPH_BASE_URL: &str = "https://graph.microsoft.com";
pub const AZURE_BASE_URL: &str = "https://management.azure.com";

pub const GRAPH_SCOPE: &str = "https://graph.microsoft.com/.default";
pub const AZURE_SCOPE: &str = "https://management.azure.com/.default";

/// Remote API family addressed by a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Graph,
    Azure,
}

impl Backend {
    pub fn parse(value: &str) -> Result<Self, ApiError> {
        match value {
            "graph" => Ok(Backend::Graph),
            "azure" => Ok(Backend::Azure),
            other => Err(ApiError::Parameter(format!(
                "unknown backend '{}', expected 'graph' or 'azure'",
                other
            ))),
        }
    }

    /// OAuth scope for bearer tokens against this backend.
    pub fn scope(&self) -> &'static str {
        match self {
            Backend::Graph => GRAPH_SCOPE,
            Backend::Azure => AZURE_SCOPE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn parse(value: &str) -> Result<Self, ApiError> {
        match value {
            "get" => Ok(HttpMethod::Get),
            "post" => Ok(HttpMethod::Post),
            "put" => Ok(HttpMethod::Put),
            "patch" => Ok(HttpMethod::Patch),
            "delete" => Ok(HttpMethod::Delete),
            other => Err(ApiError::UnsupportedMethod(other.to_string())),
        }
    }

    pub fn as_reqwest(&self) -> reqwest::Method {
        match self {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
        }
    }
}

/// Output shaping mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseFormat {
    #[default]
    Json,
    Minimal,
    Raw,
}

impl ResponseFormat {
    pub fn parse(value: &str) -> Result<Self, ApiError> {
        match value {
            "json" => Ok(ResponseFormat::Json),
            "minimal" => Ok(ResponseFormat::Minimal),
            "raw" => Ok(ResponseFormat::Raw),
            other => Err(ApiError::Parameter(format!(
                "unknown responseFormat '{}', expected 'json', 'minimal' or 'raw'",
                other
            ))),
        }
    }
}

/// One call against Microsoft Graph or Azure Resource Management
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiRequest {
    pub backend: String,
    pub path: String,
    pub method: String,

    /// Azure RM `api-version`; required iff `backend` is `azure`.
    #[serde(default)]
    pub api_version: Option<String>,

    #[serde(default)]
    pub subscription_id: Option<String>,

    #[serde(default)]
    pub query_params: BTreeMap<String, String>,

    #[serde(default)]
    pub body: Option<Value>,

    #[serde(default = "default_graph_api_version")]
    pub graph_api_version: String,

    #[serde(default)]
    pub fetch_all: bool,

    #[serde(default)]
    pub consistency_level: Option<String>,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base retry delay in milliseconds.
    #[serde(default = "default_retry_delay")]
    pub retry_delay: u64,

    /// Per-request timeout in milliseconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    #[serde(default)]
    pub custom_headers: BTreeMap<String, String>,

    #[serde(default = "default_response_format")]
    pub response_format: String,

    #[serde(default)]
    pub select_fields: Vec<String>,

    #[serde(default)]
    pub expand_fields: Vec<String>,

    /// `$top` page size used when `fetch_all` is set (Graph only).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_graph_api_version() -> String {
    "v1.0".to_string()
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    1000
}

fn default_timeout() -> u64 {
    30_000
}

fn default_response_format() -> String {
    "json".to_string()
}

fn default_batch_size() -> usize {
    100
}

impl ApiRequest {
    /// Construct a request with defaults, for programmatic callers.
    pub fn new(backend: &str, path: &str, method: &str) -> Self {
        Self {
            backend: backend.to_string(),
            path: path.to_string(),
            method: method.to_string(),
            api_version: None,
            subscription_id: None,
            query_params: BTreeMap::new(),
            body: None,
            graph_api_version: default_graph_api_version(),
            fetch_all: false,
            consistency_level: None,
            max_retries: default_max_retries(),
            retry_delay: default_retry_delay(),
            timeout: default_timeout(),
            custom_headers: BTreeMap::new(),
            response_format: default_response_format(),
            select_fields: Vec::new(),
            expand_fields: Vec::new(),
            batch_size: default_batch_size(),
        }
    }

    pub fn backend(&self) -> Result<Backend, ApiError> {
        Backend::parse(&self.backend)
    }

    pub fn method(&self) -> Result<HttpMethod, ApiError> {
        HttpMethod::parse(&self.method)
    }

    pub fn response_format(&self) -> Result<ResponseFormat, ApiError> {
        ResponseFormat::parse(&self.response_format)
    }

    /// Check every precondition that must hold before network I/O.
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.path.trim().is_empty() {
            return Err(ApiError::Parameter("path must not be empty".to_string()));
        }

        let backend = self.backend()?;
        self.method()?;
        self.response_format()?;

        match backend {
            Backend::Azure => {
                if self.api_version.as_deref().unwrap_or("").trim().is_empty() {
                    return Err(ApiError::Parameter(
                        "apiVersion is required for azure requests".to_string(),
                    ));
                }
            }
            Backend::Graph => {
                if self.graph_api_version != "v1.0" && self.graph_api_version != "beta" {
                    return Err(ApiError::Parameter(format!(
                        "unknown graphApiVersion '{}', expected 'v1.0' or 'beta'",
                        self.graph_api_version
                    )));
                }
            }
        }

        Ok(())
    }

    /// Path with a single leading slash.
    pub fn normalized_path(&self) -> String {
        format!("/{}", self.path.trim_start_matches('/'))
    }

    /// Best-effort base URL for diagnostics, usable even for invalid requests.
    pub fn attempted_url(&self) -> String {
        match Backend::parse(&self.backend) {
            Ok(Backend::Graph) => format!(
                "{}/{}{}",
                GRAPH_BASE_URL,
                self.graph_api_version,
                self.normalized_path()
            ),
            Ok(Backend::Azure) => {
                let mut url = String::from(AZURE_BASE_URL);
                if let Some(sub) = &self.subscription_id {
                    url.push_str("/subscriptions/");
                    url.push_str(sub);
                }
                url.push_str(&self.normalized_path());
                url
            }
            Err(_) => self.path.clone(),
        }
    }
}

//! MCP Server implementation for Microsoft 365 / Azure APIs
//!
//! Exposes the generic API invocation engine as tools

use crate::api::{ApiDispatcher, ApiRequest};
use crate::auth::TokenCache;
use crate::config::RuntimeConfig;
use crate::mcp::protocol::*;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// MCP Server for Microsoft Graph and Azure Resource Management
pub struct M365McpServer {
    dispatcher: Arc<ApiDispatcher>,
    auth: Arc<TokenCache>,
    config: Arc<RuntimeConfig>,
}

impl M365McpServer {
    /// Create a new MCP server instance
    pub fn new(
        dispatcher: Arc<ApiDispatcher>,
        auth: Arc<TokenCache>,
        config: Arc<RuntimeConfig>,
    ) -> Self {
        Self {
            dispatcher,
            auth,
            config,
        }
    }

    /// Get list of available tools
    pub fn get_tools(&self) -> Vec<Tool> {
        Self::get_tools_static()
    }

    /// Get list of available tools (static version for unconfigured server)
    pub fn get_tools_static() -> Vec<Tool> {
        vec![
            Tool {
                name: "microsoft_api".to_string(),
                description: "Call the Microsoft Graph API or the Azure Resource Management API. \
                              Handles authentication, retries, pagination (fetchAll) and response \
                              shaping uniformly for both backends."
                    .to_string(),
                input_schema: create_tool_schema(vec![
                    ToolProperty::required("backend", "string", "'graph' for Microsoft Graph, 'azure' for Azure Resource Management"),
                    ToolProperty::required("path", "string", "API path, e.g. '/users' or '/resourceGroups'"),
                    ToolProperty::required("method", "string", "HTTP method: get, post, put, patch or delete"),
                    ToolProperty::optional("apiVersion", "string", "Azure RM api-version, e.g. '2021-04-01'. Required for azure"),
                    ToolProperty::optional("subscriptionId", "string", "Azure subscription ID, prefixes the path with /subscriptions/{id}"),
                    ToolProperty::optional("queryParams", "object", "Query parameters as a string-to-string map"),
                    ToolProperty::optional("body", "object", "Request body for post/put/patch"),
                    ToolProperty::optional("graphApiVersion", "string", "Graph version: 'v1.0' (default) or 'beta'"),
                    ToolProperty::optional("fetchAll", "boolean", "Follow continuation links and accumulate every page (get only)"),
                    ToolProperty::optional("consistencyLevel", "string", "Graph ConsistencyLevel header, e.g. 'eventual' for advanced queries"),
                    ToolProperty::optional("maxRetries", "integer", "Retry budget for transient failures (default: 3)"),
                    ToolProperty::optional("retryDelay", "integer", "Base backoff delay in ms, doubled per retry (default: 1000)"),
                    ToolProperty::optional("timeout", "integer", "Per-request timeout in ms (default: 30000)"),
                    ToolProperty::optional("customHeaders", "object", "Extra request headers as a string-to-string map"),
                    ToolProperty::optional("responseFormat", "string", "'json' (annotated, default), 'minimal' (metadata stripped) or 'raw'"),
                    ToolProperty::optional("selectFields", "array", "Graph $select fields, injected unless $select is already set"),
                    ToolProperty::optional("expandFields", "array", "Graph $expand fields, injected unless $expand is already set"),
                    ToolProperty::optional("batchSize", "integer", "Page size ($top) used with fetchAll (default: 100)"),
                ]),
            },
            Tool {
                name: "get_environment_info".to_string(),
                description: "Get information about the connected tenant and engine configuration"
                    .to_string(),
                input_schema: create_tool_schema(vec![]),
            },
            Tool {
                name: "clear_token_cache".to_string(),
                description: "Drop every cached access token. The next call re-authenticates. \
                              Use this after changing app permissions or role assignments."
                    .to_string(),
                input_schema: create_tool_schema(vec![]),
            },
        ]
    }

    /// Handle a tool call
    pub async fn call_tool(&self, name: &str, args: &HashMap<String, Value>) -> CallToolResult {
        match name {
            "microsoft_api" => self.microsoft_api(args).await,
            "get_environment_info" => self.get_environment_info().await,
            "clear_token_cache" => self.clear_token_cache().await,
            _ => CallToolResult::error(format!("Unknown tool: {}", name)),
        }
    }

    async fn microsoft_api(&self, args: &HashMap<String, Value>) -> CallToolResult {
        let request = match parse_request(args) {
            Ok(request) => request,
            Err(message) => return CallToolResult::error(message),
        };

        let outcome = self.dispatcher.invoke(&request).await;
        if outcome.is_error {
            CallToolResult::error(outcome.text)
        } else {
            CallToolResult::text(outcome.text)
        }
    }

    async fn get_environment_info(&self) -> CallToolResult {
        let info = format!(
            "Microsoft API MCP Environment:\n\
             - Tenant: {}\n\
             - Client ID: {}\n\
             - Graph endpoint: https://graph.microsoft.com\n\
             - Azure RM endpoint: https://management.azure.com\n\
             - Rate limiting: {}",
            self.config.tenant_id,
            mask(&self.config.client_id),
            if self.config.rate_limit.enabled {
                format!(
                    "enabled ({}/min, burst {})",
                    self.config.rate_limit.requests_per_minute, self.config.rate_limit.burst_capacity
                )
            } else {
                "disabled".to_string()
            }
        );
        CallToolResult::text(info)
    }

    async fn clear_token_cache(&self) -> CallToolResult {
        self.auth.clear().await;
        CallToolResult::text(
            "Token cache cleared. New tokens will be acquired on the next call.".to_string(),
        )
    }
}

/// Parse tool arguments into an [`ApiRequest`]
fn parse_request(args: &HashMap<String, Value>) -> Result<ApiRequest, String> {
    let object: serde_json::Map<String, Value> =
        args.iter().map(|(k, v)| (k.clone(), v.clone())).collect();

    serde_json::from_value(Value::Object(object)).map_err(|e| format!("Invalid parameters: {}", e))
}

/// Show only the first segment of a client ID in diagnostics
fn mask(client_id: &str) -> String {
    match client_id.split('-').next() {
        Some(prefix) if prefix.len() < client_id.len() => format!("{}-****", prefix),
        _ => "****".to_string(),
    }
}

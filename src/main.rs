//! Microsoft API MCP Server
//!
//! Entry point for the MCP server binary.
//! Implements MCP protocol over stdio using JSON-RPC 2.0.

use anyhow::Context;
use futures::StreamExt;
use m365_api_mcp::api::{ApiDispatcher, TokenBucketLimiter};
use m365_api_mcp::auth::TokenCache;
use m365_api_mcp::config::Config;
use m365_api_mcp::mcp::{
    CallToolParams, CallToolResult, InitializeResult, JsonRpcRequest, JsonRpcResponse,
    ListToolsResult, M365McpServer, ServerCapabilities, ServerInfo, ToolsCapability,
};
use std::io;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio_util::codec::{FramedRead, LinesCodec};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logging goes to stderr; MCP owns stdout
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    tracing::info!("Starting Microsoft API MCP Server...");

    let config = Config::load_default().context("failed to load configuration")?;
    let runtime_config = config
        .to_runtime()
        .context("incomplete credentials: set TENANT_ID, CLIENT_ID and CLIENT_SECRET")?;

    tracing::info!("Configured for tenant {}", runtime_config.tenant_id);

    let auth = Arc::new(TokenCache::new(
        runtime_config.tenant_id.clone(),
        runtime_config.client_id.clone(),
        runtime_config.client_secret.clone(),
    ));

    let mut dispatcher = ApiDispatcher::new(auth.clone());
    if runtime_config.rate_limit.enabled {
        dispatcher = dispatcher.with_rate_limiter(Arc::new(TokenBucketLimiter::new(
            runtime_config.rate_limit.requests_per_minute,
            runtime_config.rate_limit.burst_capacity,
        )));
    }

    let server = M365McpServer::new(Arc::new(dispatcher), auth, Arc::new(runtime_config));

    tracing::info!("MCP Server ready, listening on stdio...");

    run_stdio_loop(server).await
}

async fn run_stdio_loop(server: M365McpServer) -> anyhow::Result<()> {
    let mut lines = FramedRead::new(tokio::io::stdin(), LinesCodec::new());
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next().await {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        tracing::debug!("Received: {}", line);

        let request: JsonRpcRequest = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(e) => {
                let response = JsonRpcResponse::error(None, -32700, &format!("Parse error: {}", e));
                send_response(&mut stdout, &response).await?;
                continue;
            }
        };

        if let Some(response) = handle_request(&server, request).await {
            send_response(&mut stdout, &response).await?;
        }
    }

    Ok(())
}

/// Handle one protocol message. Notifications return `None`.
async fn handle_request(server: &M365McpServer, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
    let id = request.id.clone();

    match request.method.as_str() {
        "initialize" => {
            let result = InitializeResult {
                protocol_version: "2024-11-05".to_string(),
                capabilities: ServerCapabilities {
                    tools: Some(ToolsCapability {
                        list_changed: Some(false),
                    }),
                },
                server_info: ServerInfo {
                    name: "m365-api-mcp".to_string(),
                    version: env!("CARGO_PKG_VERSION").to_string(),
                },
            };
            Some(JsonRpcResponse::success(
                id,
                serde_json::to_value(result).unwrap_or_default(),
            ))
        }

        "initialized" | "notifications/initialized" => None,

        "tools/list" => {
            let result = ListToolsResult {
                tools: server.get_tools(),
            };
            Some(JsonRpcResponse::success(
                id,
                serde_json::to_value(result).unwrap_or_default(),
            ))
        }

        "tools/call" => {
            let params: CallToolParams = match request.params {
                Some(params) => match serde_json::from_value(params) {
                    Ok(params) => params,
                    Err(e) => {
                        return Some(JsonRpcResponse::error(
                            id,
                            -32602,
                            &format!("Invalid params: {}", e),
                        ));
                    }
                },
                None => {
                    return Some(JsonRpcResponse::error(id, -32602, "Missing params"));
                }
            };

            let args = params.arguments.unwrap_or_default();
            let result: CallToolResult = server.call_tool(&params.name, &args).await;
            Some(JsonRpcResponse::success(
                id,
                serde_json::to_value(result).unwrap_or_default(),
            ))
        }

        "ping" => Some(JsonRpcResponse::success(id, serde_json::json!({}))),

        _ => Some(JsonRpcResponse::error(
            id,
            -32601,
            &format!("Method not found: {}", request.method),
        )),
    }
}

async fn send_response(
    stdout: &mut tokio::io::Stdout,
    response: &JsonRpcResponse,
) -> anyhow::Result<()> {
    let json = serde_json::to_string(response)?;
    tracing::debug!("Sending: {}", json);
    stdout.write_all(json.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await?;
    Ok(())
}

//! Microsoft API MCP Library
//!
//! Model Context Protocol server exposing Microsoft Graph and Azure
//! Resource Management through a generic invocation engine.

pub mod api;
pub mod auth;
pub mod config;
pub mod mcp;

pub use api::{ApiDispatcher, ApiError, ApiRequest, DispatchOutcome};
pub use auth::{AuthError, TokenCache};
pub use config::{Config, ConfigError, RuntimeConfig};

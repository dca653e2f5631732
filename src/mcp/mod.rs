//! MCP Server implementation for Microsoft 365 / Azure APIs
//!
//! Exposes the API invocation engine as Model Context Protocol tools

pub mod protocol;
mod server;

pub use protocol::*;
pub use server::M365McpServer;

//! MCP server for bookworm
//!
//! Exposes library search and question answering over stdio.

mod server;

pub use server::run_mcp_server;

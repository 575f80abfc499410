//! # pltm MCP Server
//!
//! Entry point for the MCP (Model Context Protocol) bridge to pltm.
//!
//! Reads configuration from environment variables:
//! - `PLTM_URL` — pltm server URL (default: `http://localhost:8080`)
//! - `PLTM_API_KEY` — Optional Bearer token for authentication
//!
//! Communicates with AI clients (Claude, GPT) via MCP over stdio,
//! and forwards requests to the pltm HTTP API.

mod client;
mod server;

use client::PltmClient;
use rmcp::{ServiceExt, transport::stdio};
use server::PltmMcp;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logging to stderr only — stdout is reserved for MCP stdio transport.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let url = std::env::var("PLTM_URL").unwrap_or_else(|_| "http://localhost:8080".into());
    let api_key = std::env::var("PLTM_API_KEY").ok();

    tracing::info!("pltm MCP server starting, target: {}", url);

    let client = PltmClient::new(url, api_key);
    let mcp = PltmMcp::new(client);

    let service = mcp.serve(stdio()).await.inspect_err(|e| {
        tracing::error!("MCP serve error: {:?}", e);
    })?;

    service.waiting().await?;
    Ok(())
}

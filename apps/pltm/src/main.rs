//! # pltm - Procedural Long-Term Memory Server
//!
//! The main binary for the PLTM engine.
//!
//! This application provides:
//! - HTTP REST API server (axum-based)
//! - CLI interface for atom/retrieval/decay/epistemic operations
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       apps/pltm (THE BINARY)                    │
//! │                                                                 │
//! │  ┌─────────────┐              ┌─────────────┐                  │
//! │  │   CLI       │              │   HTTP API  │                  │
//! │  │  (clap)     │              │   (axum)    │                  │
//! │  └──────┬──────┘              └──────┬──────┘                  │
//! │         │                            │                         │
//! │         └──────────────┬─────────────┘                         │
//! │                        ▼                                       │
//! │                 ┌───────────────┐                               │
//! │                 │   pltm-core   │                               │
//! │                 │ (THE ENGINE)  │                               │
//! │                 └───────────────┘                               │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # Start the HTTP server
//! pltm server --host 0.0.0.0 --port 8080
//!
//! # CLI operations
//! pltm status
//! pltm store-atom -s user -p likes -o tea --atom-type preference
//! pltm retrieve -s user -q "what does the user like" --top-k 5
//! ```

use clap::Parser;
use pltm::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // PLTM_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("PLTM_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "pltm=info,tower_http=debug".into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    let cli = cli::Cli::parse();

    if let Err(e) = cli::execute(cli).await {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

//! # structdb - Structure Database Client
//!
//! Command-line client for the atomistictools.org structure and property
//! database.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                apps/structdb (THE BINARY)            │
//! │                                                      │
//! │  ┌─────────────┐   ┌─────────────┐   ┌───────────┐   │
//! │  │    CLI      │   │   Config    │   │   HTTP    │   │
//! │  │   (clap)    │   │   (toml)    │   │ (reqwest) │   │
//! │  └──────┬──────┘   └──────┬──────┘   └─────┬─────┘   │
//! │         └─────────────────┼────────────────┘         │
//! │                           ▼                          │
//! │                  ┌────────────────┐                  │
//! │                  │ structdb-core  │                  │
//! │                  │  (THE LOGIC)   │                  │
//! │                  └────────────────┘                  │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! structdb --token $TOKEN property-types
//! structdb properties --type-name "bulk modulus" --composition "Al-1 Cu-1"
//! structdb --json-mode generics --strukturbericht B2
//! structdb compile "Al2*Cu"
//! ```

use clap::Parser;
use structdb::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

fn main() {
    // STRUCTDB_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("STRUCTDB_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "structdb=info,structdb_core=info".into());

    // Logs go to stderr; stdout carries query results only.
    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(std::io::stderr),
                )
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    let cli = cli::Cli::parse();

    if let Err(e) = cli::execute(cli) {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

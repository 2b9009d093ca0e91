//! # structdb CLI Module
//!
//! This module implements the CLI interface for structdb.
//!
//! ## Available Commands
//!
//! - `generics` - Query prototype structures
//! - `properties` - Query properties
//! - `property-types` - Query property types
//! - `calculators` - Query calculator types
//! - `comparators` - Query comparison types
//! - `compile` - Compile a composition pattern (offline)

mod commands;

use crate::config::Config;
use crate::transport::HttpTransport;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use structdb_core::{QueryClient, QueryOptions, StructDbError};

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// structdb - client for the atomistictools.org structure and property database
#[derive(Parser, Debug)]
#[command(name = "structdb")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Log response size and timing for every query
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to a TOML config file (default: ./structdb.toml if present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Database server URL
    #[arg(long, global = true)]
    pub url: Option<String>,

    /// Access token
    #[arg(long, global = true)]
    pub token: Option<String>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Pagination shared by every query command.
#[derive(Args, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    /// Maximum number of entries
    #[arg(long, default_value_t = structdb_core::primitives::DEFAULT_LIMIT)]
    pub limit: u64,

    /// Number of entries to skip
    #[arg(long, default_value_t = 0)]
    pub offset: u64,
}

impl Page {
    /// Query options for this page.
    pub fn options(self, verbose: bool) -> QueryOptions {
        QueryOptions {
            limit: self.limit,
            offset: self.offset,
            verbose,
        }
    }
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Query prototype structures
    Generics {
        /// Strukturbericht designation, e.g. "B2"
        #[arg(short, long)]
        strukturbericht: Option<String>,

        /// Prototype name, e.g. "CsCl"
        #[arg(short, long)]
        prototype_name: Option<String>,

        #[command(flatten)]
        page: Page,
    },

    /// Query properties
    Properties {
        /// Property type name
        #[arg(short = 't', long)]
        type_name: Option<String>,

        /// Property name
        #[arg(short, long)]
        name: Option<String>,

        /// Composition filter, sent as given (see `compile`)
        #[arg(long)]
        composition: Option<String>,

        /// Strukturbericht designation of the prototype
        #[arg(short, long)]
        strukturbericht: Option<String>,

        /// Prototype name
        #[arg(short, long)]
        prototype_name: Option<String>,

        /// Property identifier
        #[arg(long)]
        id: Option<String>,

        /// Calculator name
        #[arg(long)]
        calculator: Option<String>,

        /// Include properties hidden from comparison
        #[arg(long)]
        all: bool,

        #[command(flatten)]
        page: Page,
    },

    /// Query property types
    PropertyTypes {
        /// Property type name
        #[arg(short, long)]
        name: Option<String>,

        #[command(flatten)]
        page: Page,
    },

    /// Query calculator types
    Calculators {
        /// Calculator type name
        #[arg(short, long)]
        name: Option<String>,

        #[command(flatten)]
        page: Page,
    },

    /// Query comparison types
    Comparators {
        /// Property type name
        #[arg(short = 't', long)]
        type_name: Option<String>,

        /// Comparator name
        #[arg(short, long)]
        name: Option<String>,

        #[command(flatten)]
        page: Page,
    },

    /// Compile a composition pattern into a query string
    Compile {
        /// Pattern such as "Al2Cu", "Si-%" or "*Cu"
        pattern: String,
    },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub fn execute(cli: Cli) -> Result<(), StructDbError> {
    let json_mode = cli.json_mode;

    if let Commands::Compile { pattern } = &cli.command {
        return cmd_compile(pattern, json_mode);
    }

    let config = resolve_config(&cli, |name| std::env::var(name).ok())?;
    if config.token.is_empty() {
        tracing::warn!("No access token configured; the server may reject queries");
    }
    let transport = HttpTransport::new(&config)?;
    let mut client = QueryClient::new(transport, config.url, config.token);

    let entries = run_query(&mut client, &cli.command, cli.verbose)?;
    println!("{}", render_entries(&entries, json_mode));
    Ok(())
}

/// Resolve the configuration: file, then environment, then flags.
pub fn resolve_config(
    cli: &Cli,
    env: impl Fn(&str) -> Option<String>,
) -> Result<Config, StructDbError> {
    let mut config = Config::resolve(cli.config.as_deref(), env)?;
    config.apply_overrides(cli.url.as_deref(), cli.token.as_deref());
    Ok(config)
}

//! # Taskhub
//!
//! Entry point for the task tracker.
//!
//! `serve` starts in this order:
//!
//! 1. **Configuration** - TOML file (optional), then `TASKHUB_*` environment overrides
//! 2. **Store** - In-memory store, seeded from the JSON snapshot when one is configured
//! 3. **Background workers** - Recurrence generator and session sweeper
//! 4. **Axum API** - REST API under `/api`
//!
//! ## Shutdown
//!
//! Ctrl+C stops the server gracefully, signals the background workers, waits
//! for them, and writes the snapshot.

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::panic)]
#![deny(clippy::expect_used)]

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use cli::{Cli, Commands};

const DEFAULT_LOG_FILTER: &str =
    "info,taskhub=debug,taskhub_web=debug,taskhub_tracker=debug,tower_http=debug";

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    match cli.command {
        Commands::Serve { config, bind } => commands::serve(config.as_deref(), bind).await,
        Commands::CheckConfig { config } => commands::emit(commands::check_config(config.as_deref())),
        Commands::Permissions { role } => commands::emit(commands::permissions(role.as_deref())),
    }
}

/// Initialize tracing; `RUST_LOG` overrides the default filter.
fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

//! Mani batch proxy.
//!
//! Accepts one HTTP request carrying N sub-requests (`multipart/mixed` or
//! `application/json`), performs each sub-request against its target URL,
//! and streams the N sub-responses back in the same envelope format.
//!
//! # Architecture Overview
//!
//! ```text
//!   Client envelope        ┌──────────────────────────────────────────────┐
//!   ──────────────────────▶│ http::server ─▶ batch::reader ─▶ dispatch ──┼──▶ Upstreams
//!                          │                                     │        │
//!   Streamed envelope      │                                     ▼        │
//!   ◀──────────────────────┼───────────────────────────── batch::writer   │
//!                          │                                              │
//!                          │  config · observability · security · lifecycle
//!                          └──────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use mani_proxy::config::{load_config, override_bind_address, ProxyConfig};
use mani_proxy::lifecycle::startup;
use mani_proxy::observability::logging;

#[derive(Parser)]
#[command(name = "mani-proxy")]
#[command(about = "HTTP batch fan-out proxy", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file. Built-in defaults apply without one.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listener bind address (e.g. 0.0.0.0:9999).
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config = override_bind_address(config, bind)?;
    }

    logging::init_logging(&config.observability)?;
    tracing::info!("mani-proxy v{} starting", env!("CARGO_PKG_VERSION"));

    startup::start(config).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

//! web-deadend: HTTP deadend honeypot.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ http::server ──▶ http::request (UUIDv7) ──▶ http::capture
//!                                                                     │
//!                      ┌──────────────────────────────────────────────┘
//!                      ▼
//!           /deadend-status? ──▶ security::access_control ──▶ 200 | 204
//!                      │
//!                      ▼
//!           config::responses (re-read) ──▶ routing::resolver ──▶ template
//!                      │
//!     Client Response  ▼
//!     ◀────────────── canned status/body, or empty 204
//!
//!     Per request, after the handler:
//!         stats::accounting ──▶ access line ──▶ observability::shipper ──▶ GELF
//!
//!     Background:
//!         stats::reporter (interval / heartbeat)     shipper consumer task
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use web_deadend::config::loader::load_config;
use web_deadend::config::responses::load_route_table;
use web_deadend::config::validation::log_lint;
use web_deadend::config::DeadendConfig;
use web_deadend::http::{AppState, HttpServer};
use web_deadend::lifecycle::{shutdown_signal, BackgroundTasks};
use web_deadend::observability::{logging, metrics, LogShipper};

#[derive(Parser)]
#[command(name = "web-deadend", version, about = "HTTP deadend honeypot")]
struct Cli {
    /// Optional TOML config file
    #[arg(short, long, env = "DEADEND_CONFIG")]
    config: Option<PathBuf>,

    /// Listen port (overrides PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// Route table (overrides RESPONSES_FILE)
    #[arg(short, long)]
    responses_file: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load(&cli)?;

    logging::init_tracing(&config.observability.debug_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "web-deadend starting");
    tracing::info!(
        bind_address = %config.server.bind_address(),
        responses_file = %config.responses.file,
        strict_wildcards = config.responses.strict_wildcards,
        log_format = %config.stats.log_format,
        testing = config.testing,
        "Configuration loaded"
    );

    if let Some(addr) = &config.observability.metrics_address {
        match addr.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(metrics_address = %addr, error = %e, "Failed to parse metrics address"),
        }
    }

    match load_route_table(config.responses.file.as_ref()) {
        Ok(table) => {
            tracing::info!(routes = table.len(), "Route table loaded");
            log_lint(&table);
        }
        Err(e) => tracing::warn!(
            file = %config.responses.file,
            error = %e,
            "Route table unavailable; every request will get 204 until it is fixed"
        ),
    }

    let shipper = LogShipper::from_config(&config.gelf).map(Arc::new);
    let state = AppState::new(config, shipper.clone());
    let tasks = BackgroundTasks::start(&state.config, state.stats.clone(), shipper);

    let listener = TcpListener::bind(state.config.server.bind_address()).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let served = HttpServer::new(state).run(listener, shutdown_signal()).await;
    tasks.shutdown().await;
    served?;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// File, then environment, then flags.
fn load(cli: &Cli) -> Result<DeadendConfig, Box<dyn std::error::Error>> {
    let config = load_config(
        cli.config.as_deref(),
        |name| std::env::var(name).ok(),
        |config| {
            if let Some(port) = cli.port {
                config.server.port = port;
            }
            if let Some(file) = &cli.responses_file {
                config.responses.file = file.clone();
            }
        },
    )?;
    Ok(config)
}

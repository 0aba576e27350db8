//! Orvibo S20 HTTP server — entry point.
//!
//! # Usage
//!
//! ```text
//! s20-http [OPTIONS]
//!
//! Options:
//!   --config <FILE>   Configuration file [default: platform config dir]
//!   --bind   <IP>     HTTP bind address [default: from config, 0.0.0.0]
//!   --port   <PORT>   HTTP port [default: from config, 8080]
//!   --no-discovery    Skip the discovery run at startup
//! ```
//!
//! | Variable         | Description              |
//! |------------------|--------------------------|
//! | `S20_CONFIG`     | configuration file       |
//! | `S20_HTTP_BIND`  | HTTP bind address        |
//! | `S20_HTTP_PORT`  | HTTP port                |
//!
//! At startup the server broadcasts a discovery probe and remembers every
//! plug that answers; other addresses are looked up on first use.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use s20_client::infrastructure::storage::config::load_config;
use s20_client::UdpTransport;
use s20_http::application::PlugService;
use s20_http::domain::ServerConfig;
use s20_http::infrastructure::{router, serve};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

// ── CLI argument definitions ──────────────────────────────────────────────────

#[derive(Debug, Parser)]
#[command(
    name = "s20-http",
    about = "Control Orvibo S20 plugs on the local network through HTTP GET requests",
    version
)]
struct Cli {
    /// Configuration file.
    #[arg(long, env = "S20_CONFIG")]
    config: Option<PathBuf>,

    /// IP address the HTTP server binds to.
    #[arg(long, env = "S20_HTTP_BIND")]
    bind: Option<String>,

    /// TCP port the HTTP server listens on.
    #[arg(long, env = "S20_HTTP_PORT")]
    port: Option<u16>,

    /// Skip the discovery run at startup.
    #[arg(long)]
    no_discovery: bool,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut app_config = load_config(cli.config.as_deref()).context("loading configuration")?;
    if let Some(bind) = cli.bind {
        app_config.http.bind_address = bind;
    }
    if let Some(port) = cli.port {
        app_config.http.port = port;
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&app_config.general.log_level)),
        )
        .init();

    let config = ServerConfig::from_app_config(&app_config).context("invalid HTTP settings")?;
    info!("S20 HTTP server starting on {}", config.http_addr);

    let transport = UdpTransport::open(app_config.transport_config()?)
        .await
        .context("opening UDP socket")?;
    let http_addr = config.http_addr;
    let service = Arc::new(PlugService::new(transport, config));

    if !cli.no_discovery {
        match service.refresh_devices().await {
            Ok(count) => info!("startup discovery found {count} plug(s)"),
            Err(e) => warn!("startup discovery failed: {e}"),
        }
    }

    let shutdown = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("received Ctrl+C, shutting down"),
            Err(e) => tracing::error!("failed to listen for Ctrl+C signal: {e}"),
        }
    };

    serve(http_addr, router(service), shutdown)
        .await
        .with_context(|| format!("serving HTTP on {http_addr}"))?;

    info!("S20 HTTP server stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults_leave_config_values_alone() {
        // Arrange: parse with no arguments
        let cli = Cli::parse_from(["s20-http"]);

        // Assert
        assert_eq!(cli.port, None);
        assert_eq!(cli.bind, None);
        assert!(!cli.no_discovery);
    }

    #[test]
    fn test_cli_accepts_bind_and_port() {
        let cli = Cli::parse_from([
            "s20-http",
            "--bind",
            "127.0.0.1",
            "--port",
            "9000",
            "--no-discovery",
        ]);

        assert_eq!(cli.bind.as_deref(), Some("127.0.0.1"));
        assert_eq!(cli.port, Some(9000));
        assert!(cli.no_discovery);
    }

    #[test]
    fn test_cli_rejects_non_numeric_port() {
        assert!(Cli::try_parse_from(["s20-http", "--port", "http"]).is_err());
    }
}

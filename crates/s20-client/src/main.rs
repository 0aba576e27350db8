//! `s20` command-line tool.
//!
//! ```text
//! s20 status 192.168.1.40           # prints ON or OFF
//! s20 on 192.168.1.40 --mac ac:cf:23:12:34:56
//! s20 discover --window-ms 2000
//! ```
//!
//! Without `--mac`, the plug's hardware id is learned from a targeted
//! discovery before the command runs.
//!
//! # Exit codes
//!
//! | Code | Meaning                                   |
//! |------|-------------------------------------------|
//! | 0    | success                                   |
//! | 1    | configuration or socket failure           |
//! | 2    | no plug answered from the given address   |
//! | 3    | plug unreachable                          |
//! | 4    | plug refused the subscription             |
//! | 5    | malformed packet                          |

use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use s20_client::application::controller::on_off;
use s20_client::infrastructure::storage::config::{load_config, AppConfig};
use s20_client::{discover, locate, ControlError, DeviceController, UdpTransport};
use s20_core::{Device, HardwareId};
use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "s20", version, about = "Discover and switch Orvibo S20 smart plugs")]
struct Cli {
    /// Configuration file (default: platform config directory).
    #[arg(long, env = "S20_CONFIG")]
    config: Option<PathBuf>,

    /// UDP port the plugs listen on.
    #[arg(long, env = "S20_PORT")]
    port: Option<u16>,

    /// Wait per attempt, in milliseconds.
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Sends per exchange.
    #[arg(long)]
    retries: Option<u32>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print whether the plug is ON or OFF.
    Status(Target),
    /// Switch the plug on.
    On(Target),
    /// Switch the plug off.
    Off(Target),
    /// List plugs on the local network.
    Discover {
        /// How long to collect announcements, in milliseconds.
        #[arg(long)]
        window_ms: Option<u64>,
    },
}

#[derive(Debug, Args)]
struct Target {
    /// IPv4 address of the plug.
    address: Ipv4Addr,

    /// Hardware id of the plug; skips the lookup.
    #[arg(long)]
    mac: Option<HardwareId>,
}

/// `locate` found nothing at the address.
#[derive(Debug, Error)]
#[error("no S20 plug answered from {0}")]
struct NotFound(Ipv4Addr);

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e:#}");
            return ExitCode::from(1);
        }
    };

    // Logs go to stderr; stdout carries the command's answer.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.general.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(cli.command, &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(exit_code(&e))
        }
    }
}

/// Loads the config file and applies command-line overrides.
fn load(cli: &Cli) -> anyhow::Result<AppConfig> {
    let mut config = load_config(cli.config.as_deref()).context("loading configuration")?;
    if let Some(port) = cli.port {
        config.protocol.port = port;
    }
    if let Some(timeout_ms) = cli.timeout_ms {
        config.protocol.timeout_ms = timeout_ms;
    }
    if let Some(retries) = cli.retries {
        config.protocol.retries = retries;
    }
    if let Command::Discover {
        window_ms: Some(window_ms),
    } = cli.command
    {
        config.protocol.discovery_window_ms = window_ms;
    }
    config.validate().context("invalid command-line option")?;
    Ok(config)
}

async fn run(command: Command, config: &AppConfig) -> anyhow::Result<()> {
    let transport = UdpTransport::open(config.transport_config()?)
        .await
        .context("opening UDP socket")?;

    let window = config.discovery_window();
    let probes = config.retry_policy().attempts;

    let (target, action) = match command {
        Command::Discover { .. } => {
            let found = discover(&transport, window, probes).await?;
            for device in found.into_devices() {
                let state = device.announced_on.map_or("?", on_off);
                println!("{}\t{}\t{state}", device.address, device.hardware_id);
            }
            return Ok(());
        }
        Command::Status(target) => (target, None),
        Command::On(target) => (target, Some(true)),
        Command::Off(target) => (target, Some(false)),
    };

    let device = match target.mac {
        Some(hardware_id) => Device::new(target.address, hardware_id),
        None => locate(&transport, target.address, window, probes)
            .await?
            .ok_or(NotFound(target.address))?,
    };
    info!("using {} at {}", device.hardware_id, device.address);

    let mut controller = DeviceController::new(config.retry_policy(), config.subscription_ttl());
    let on = match action {
        None => controller.get_state(&transport, &device).await?,
        Some(on) => {
            controller.set_state(&transport, &device, on).await?;
            on
        }
    };
    println!("{}", on_off(on));
    Ok(())
}

fn exit_code(err: &anyhow::Error) -> u8 {
    if err.downcast_ref::<NotFound>().is_some() {
        return 2;
    }
    match err.downcast_ref::<ControlError>() {
        Some(ControlError::DeviceUnreachable { .. }) => 3,
        Some(ControlError::SubscriptionFailed { .. }) => 4,
        Some(ControlError::MalformedPacket(_)) => 5,
        _ => 1,
    }
}

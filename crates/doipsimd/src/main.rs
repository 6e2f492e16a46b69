//! doipsimd - DoIP gateway simulator daemon
//!
//! Usage:
//!   doipsimd [OPTIONS] [config.toml]
//!
//! Without a config file a demo gateway with one engine ECU is started on
//! the default DoIP port.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use doipsim_gateway::display::Addr;
use doipsim_gateway::{Gateway, GatewayConfig};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "doipsimd")]
#[command(version, about = "DoIP gateway simulator")]
struct Args {
    /// Gateway configuration file (TOML)
    #[arg(value_name = "CONFIG", conflicts_with = "config")]
    config_path: Option<PathBuf>,

    /// Gateway configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the local TCP/UDP port
    #[arg(short, long)]
    port: Option<u16>,

    /// Send vehicle announcements after start
    #[arg(long)]
    announce: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_filter = if args.verbose {
        "doipsimd=debug,doipsim_gateway=debug"
    } else {
        "doipsimd=info,doipsim_gateway=info"
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(fmt::layer())
        .init();

    let mut config = match args.config_path.as_ref().or(args.config.as_ref()) {
        Some(path) => {
            info!(path = %path.display(), "Loading config");
            GatewayConfig::from_file(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?
        }
        None => {
            info!("No config file provided, using demo gateway");
            GatewayConfig::default()
        }
    };
    if let Some(port) = args.port {
        config.local_port = port;
    }
    if args.announce {
        config.broadcast_enable = true;
    }

    let gateway = Gateway::new(config).context("Invalid gateway configuration")?;
    gateway.start().await.context("Failed to start gateway")?;
    for ecu in gateway.ecus() {
        info!(
            ecu = ecu.name(),
            physical = %Addr(ecu.physical_address()),
            functional = %Addr(ecu.functional_address()),
            "ECU ready"
        );
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");
    gateway.stop();
    Ok(())
}

// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the ctp10-gateway project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

// Main entry point for the CTP10 gateway
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use tokio::signal;

use ctp10_gateway::config::{self, Config};
use ctp10_gateway::daemon::launch_daemon::Daemon;

/// HTTP and WebSocket gateway for the EXFO CTP10 vector analyzer
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file, created with default values when missing
    #[arg(long)]
    config: Option<PathBuf>,

    /// Validate a configuration file and exit
    #[arg(long)]
    validate_config: Option<PathBuf>,

    /// Print the configuration JSON schema and exit
    #[arg(long)]
    show_config_schema: bool,

    /// Web server port
    #[arg(short = 'p', long)]
    web_port: Option<u16>,

    /// Web server address
    #[arg(short = 'w', long)]
    web_address: Option<String>,

    /// CTP10 IP address
    #[arg(long)]
    instrument_ip: Option<String>,

    /// CTP10 SCPI socket port
    #[arg(long)]
    instrument_port: Option<u16>,

    /// Use the built-in simulated CTP10
    #[arg(long)]
    simulated: bool,

    /// Do not connect to the instrument at startup
    #[arg(long)]
    no_auto_connect: bool,

    /// Debug logging
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,

    /// No logging at all
    #[arg(short = 'q', long = "quiet")]
    quiet: bool,
}

#[rocket::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.quiet {
        log::LevelFilter::Off
    } else if args.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    if args.show_config_schema {
        return config::output_config_schema();
    }

    if let Some(validate_path) = args.validate_config {
        if !validate_path.exists() {
            return Err(anyhow::anyhow!(
                "Configuration file does not exist: {}",
                validate_path.display()
            ));
        }

        Config::from_file(&validate_path)
            .map_err(|err| anyhow::anyhow!("Configuration validation failed: {}", err))?;
        println!("Configuration file is valid: {}", validate_path.display());
        return Ok(());
    }

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from("config.yaml"));
    let mut config = Config::from_file(&config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path.display()))?;

    config.apply_args(
        args.web_port,
        args.web_address.clone(),
        args.instrument_ip.clone(),
        args.instrument_port,
        args.simulated,
        args.no_auto_connect,
    );

    info!("Starting CTP10 gateway {}", env!("CARGO_PKG_VERSION"));
    let mut daemon = Daemon::new();
    daemon.launch(&config).await?;

    match signal::ctrl_c().await {
        Ok(()) => info!("Received shutdown signal, terminating daemon"),
        Err(err) => eprintln!("Error waiting for shutdown signal: {}", err),
    }
    daemon.shutdown();
    daemon.join().await?;

    Ok(())
}

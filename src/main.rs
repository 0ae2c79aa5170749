// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/sensorfleet-rs

//! Sensor fleet server binary

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use sensorfleet::{Config, Server, VERSION};

/// Simulated sensor fleet server with a message-bus control plane
#[derive(Parser, Debug)]
#[command(name = "sensorfleet")]
#[command(author = "bad-antics")]
#[command(version = VERSION)]
#[command(about = "Hosts virtual sensors and serves the bus control plane")]
struct Args {
    /// Configuration file path (overrides CONFIG_FILE)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = match args.config {
        Some(path) => Config::load(&path)?,
        None => Config::load_from_env()?,
    };

    init_logging(&config.logging.level, &config.logging.format)?;

    info!("sensorfleet v{VERSION}");
    info!("environment: {}", config.environment);

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(Server::new(config).run())
}

fn init_logging(level: &str, format: &str) -> Result<()> {
    let level = match level {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false);

    if format == "json" {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}

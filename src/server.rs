// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/sensorfleet-rs

//! Server bootstrap: wires bus, store, engine, and handlers together,
//! loads the initial sensor set, and performs ordered shutdown on signal.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info};

use crate::bus::{BusClient, MqttBus};
use crate::config::Config;
use crate::engine::SimulationEngine;
use crate::handlers::Handlers;
use crate::store::{SqliteStore, Store};

pub struct Server {
    config: Config,
}

impl Server {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Initializes all collaborators and runs until INT/TERM. Any
    /// initialization failure is fatal.
    pub async fn run(self) -> Result<()> {
        info!("sensor fleet server initializing");

        info!("connecting to bus: {}", self.config.bus.url);
        let bus: Arc<dyn BusClient> = Arc::new(
            MqttBus::connect(&self.config.bus.url, "sensorfleet-server")
                .await
                .context("failed to initialize bus")?,
        );
        info!("bus connection established");

        info!("initializing database: {}", self.config.database.kind);
        let store: Arc<dyn Store> = match self.config.database.kind.as_str() {
            "sqlite" => Arc::new(
                SqliteStore::open(&self.config.database.path)
                    .context("failed to initialize database")?,
            ),
            other => anyhow::bail!("unsupported database type: {other}"),
        };
        info!("database initialized");

        let engine = Arc::new(SimulationEngine::new(store.clone(), bus.clone()));

        let handlers = Handlers::new(store.clone(), engine.clone());
        handlers
            .register(bus.as_ref())
            .await
            .context("failed to register bus handlers")?;

        info!("loading {} sensors from configuration", self.config.sensors.len());
        for definition in &self.config.sensors {
            engine
                .add_sensor(definition.clone())
                .await
                .with_context(|| format!("failed to add sensor {}", definition.id))?;
            info!(
                "  - {} ({}): interval={}ms, threshold={:.2} [{}]",
                definition.id,
                definition.kind,
                definition.config.interval_ms,
                definition.config.threshold,
                if definition.config.enabled { "ENABLED" } else { "DISABLED" }
            );
        }
        info!("{} sensors ready", engine.sensor_count().await);

        print_banner(&self.config, engine.sensor_count().await);

        wait_for_shutdown().await;

        info!("shutting down gracefully");
        engine.stop().await;
        info!("simulator stopped");
        if let Err(e) = bus.close().await {
            error!("error closing bus connection: {e}");
        } else {
            info!("bus connection closed");
        }
        if let Err(e) = store.close().await {
            error!("error closing database: {e}");
        } else {
            info!("database closed");
        }

        info!("sensor fleet server stopped successfully");
        Ok(())
    }
}

fn print_banner(config: &Config, sensor_count: usize) {
    info!("sensor fleet server is running");
    info!("  bus:      {}", config.bus.url);
    info!("  database: {}", config.database.kind);
    info!("  sensors:  {sensor_count} active");
    info!("publishing subjects:");
    info!("  sensor.readings.<type>.<id>   (sensor readings)");
    info!("  sensor.alerts.<type>.<id>     (threshold alerts)");
    info!("request/reply endpoints:");
    info!("  sensor.config.get.<id>        (get sensor config)");
    info!("  sensor.config.set.<id>        (update sensor config)");
    info!("  sensor.readings.query.<id>    (query latest readings)");
    info!("  sensor.register               (register new sensors)");
    info!("  sensor.list                   (list registered sensors)");
    info!("press Ctrl+C to stop");
}

#[cfg(unix)]
async fn wait_for_shutdown() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate =
        signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("received interrupt signal"),
        _ = terminate.recv() => info!("received terminate signal"),
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown() {
    let _ = tokio::signal::ctrl_c().await;
    info!("received interrupt signal");
}

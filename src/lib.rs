// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/sensorfleet-rs

//! SensorFleet - Simulated Sensor Fleet Server
//!
//! Hosts a dynamic population of virtual sensors, each producing synthetic
//! readings on its own cadence, and exposes a message-bus control plane for
//! remote configuration, reading queries, and runtime sensor registration.
//! Readings are persisted for historical query and published as live events;
//! threshold excursions are republished as alerts.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                   Simulation Engine                        │
//! │  ┌─────────┐   ┌────────────┐   ┌───────────────────────┐  │
//! │  │ Tickers │ → │ Task Queue │ → │ Worker Pool           │  │
//! │  │ (1/sns) │   │ (bounded)  │   │ persist·publish·alert │  │
//! │  └─────────┘   └────────────┘   └───────────────────────┘  │
//! ├────────────────────────────────────────────────────────────┤
//! │  ┌──────────┐   ┌───────────┐   ┌────────────────────────┐ │
//! │  │  Store   │   │ Bus Client│   │ Request/Reply Handlers │ │
//! │  │ (SQLite) │   │ (MQTT/mem)│   │ config·query·register  │ │
//! │  └──────────┘   └───────────┘   └────────────────────────┘ │
//! └────────────────────────────────────────────────────────────┘
//! ```

#![allow(dead_code)]

pub mod bus;
pub mod config;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod model;
pub mod server;
pub mod store;

// Re-exports for convenience
pub use bus::{BusClient, MemoryBus, MqttBus};
pub use config::Config;
pub use engine::{SensorRegistry, SimulationEngine};
pub use error::{Error, Result};
pub use handlers::Handlers;
pub use model::{Alert, SensorConfig, SensorDefinition, SensorKind, SensorReading};
pub use server::Server;
pub use store::{SqliteStore, Store};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

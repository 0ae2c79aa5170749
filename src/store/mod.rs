// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/sensorfleet-rs

//! Persistence capability for readings and sensor configurations

mod sqlite;

pub use sqlite::SqliteStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::model::{SensorConfig, SensorReading};

/// Contract for persisting readings and configurations. Implementations are
/// safe for concurrent readers and writers; single-writer engines serialize
/// writers internally.
#[async_trait]
pub trait Store: Send + Sync {
    /// Appends a reading. Replaying the same reading id overwrites the row.
    async fn save_reading(&self, reading: &SensorReading) -> Result<()>;

    /// Up to `limit` readings for the sensor, newest first (insertion order
    /// breaks timestamp ties). Empty for unknown sensors.
    async fn latest_readings(&self, sensor_id: &str, limit: usize)
        -> Result<Vec<SensorReading>>;

    /// Readings with `start <= timestamp <= end`, newest first.
    async fn readings_in_range(
        &self,
        sensor_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<SensorReading>>;

    /// Upserts the configuration row keyed by `config.sensor_id`.
    async fn save_config(&self, config: &SensorConfig) -> Result<()>;

    /// The single configuration row for the sensor, or `NotFound`.
    async fn get_config(&self, sensor_id: &str) -> Result<SensorConfig>;

    /// Releases resources; subsequent operations fail with `StoreUnavailable`.
    async fn close(&self) -> Result<()>;
}

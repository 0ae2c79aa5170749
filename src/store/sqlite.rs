// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/sensorfleet-rs

//! SQLite-backed store

use std::path::Path;
use std::str::FromStr;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, Row};
use tracing::info;

use super::Store;
use crate::error::{Error, Result};
use crate::model::{SensorConfig, SensorKind, SensorReading};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS sensor_readings (
        id        TEXT PRIMARY KEY,
        sensor_id TEXT NOT NULL,
        type      TEXT NOT NULL,
        value     REAL NOT NULL,
        unit      TEXT NOT NULL,
        error     TEXT,
        timestamp TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_readings_sensor_time
        ON sensor_readings(sensor_id, timestamp DESC);

    CREATE TABLE IF NOT EXISTS sensor_configs (
        sensor_id  TEXT PRIMARY KEY,
        interval   INTEGER NOT NULL,
        threshold  REAL NOT NULL,
        enabled    INTEGER NOT NULL,
        updated_at TEXT NOT NULL
    );
"#;

/// Store implementation over a single SQLite connection. SQLite is a
/// single-writer engine; the connection mutex serializes writers.
pub struct SqliteStore {
    conn: Mutex<Option<Connection>>,
}

/// Fixed-width RFC3339 (nanoseconds, `Z` suffix) so lexicographic TEXT
/// comparison in SQL is chronological.
fn encode_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn decode_ts(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| Error::StoreIo(format!("failed to parse timestamp {raw}: {e}")))
}

struct ReadingRow {
    id: String,
    sensor_id: String,
    kind: String,
    value: f64,
    unit: String,
    error: Option<String>,
    timestamp: String,
}

fn reading_from_row(row: &Row<'_>) -> rusqlite::Result<ReadingRow> {
    Ok(ReadingRow {
        id: row.get(0)?,
        sensor_id: row.get(1)?,
        kind: row.get(2)?,
        value: row.get(3)?,
        unit: row.get(4)?,
        error: row.get(5)?,
        timestamp: row.get(6)?,
    })
}

fn finish_reading(row: ReadingRow) -> Result<SensorReading> {
    let kind = SensorKind::from_str(&row.kind)
        .map_err(|_| Error::StoreIo(format!("unknown sensor type in row: {}", row.kind)))?;
    Ok(SensorReading {
        id: row.id,
        sensor_id: row.sensor_id,
        kind,
        value: row.value,
        unit: row.unit,
        error: row.error,
        timestamp: decode_ts(&row.timestamp)?,
    })
}

impl SqliteStore {
    /// Opens (or creates) the database at `path` and applies the schema.
    /// `:memory:` gives an ephemeral store for tests.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| Error::StoreIo(format!("failed to create {parent:?}: {e}")))?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;

        info!("database opened at {:?}", path);
        Ok(Self {
            conn: Mutex::new(Some(conn)),
        })
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let guard = self.conn.lock().unwrap();
        match guard.as_ref() {
            Some(conn) => f(conn),
            None => Err(Error::StoreUnavailable),
        }
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn save_reading(&self, reading: &SensorReading) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO sensor_readings
                     (id, sensor_id, type, value, unit, error, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    reading.id,
                    reading.sensor_id,
                    reading.kind.as_str(),
                    reading.value,
                    reading.unit,
                    reading.error,
                    encode_ts(reading.timestamp),
                ],
            )?;
            Ok(())
        })
    }

    async fn latest_readings(
        &self,
        sensor_id: &str,
        limit: usize,
    ) -> Result<Vec<SensorReading>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, sensor_id, type, value, unit, error, timestamp
                 FROM sensor_readings
                 WHERE sensor_id = ?1
                 ORDER BY timestamp DESC, rowid ASC
                 LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![sensor_id, limit as i64], reading_from_row)?;

            let mut readings = Vec::new();
            for row in rows {
                readings.push(finish_reading(row?)?);
            }
            Ok(readings)
        })
    }

    async fn readings_in_range(
        &self,
        sensor_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<SensorReading>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, sensor_id, type, value, unit, error, timestamp
                 FROM sensor_readings
                 WHERE sensor_id = ?1 AND timestamp >= ?2 AND timestamp <= ?3
                 ORDER BY timestamp DESC, rowid ASC",
            )?;
            let rows = stmt.query_map(
                params![sensor_id, encode_ts(start), encode_ts(end)],
                reading_from_row,
            )?;

            let mut readings = Vec::new();
            for row in rows {
                readings.push(finish_reading(row?)?);
            }
            Ok(readings)
        })
    }

    async fn save_config(&self, config: &SensorConfig) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO sensor_configs (sensor_id, interval, threshold, enabled, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(sensor_id) DO UPDATE SET
                     interval = excluded.interval,
                     threshold = excluded.threshold,
                     enabled = excluded.enabled,
                     updated_at = excluded.updated_at",
                params![
                    config.sensor_id,
                    config.interval_ms as i64,
                    config.threshold,
                    config.enabled,
                    encode_ts(Utc::now()),
                ],
            )?;
            Ok(())
        })
    }

    async fn get_config(&self, sensor_id: &str) -> Result<SensorConfig> {
        self.with_conn(|conn| {
            let result = conn.query_row(
                "SELECT sensor_id, interval, threshold, enabled
                 FROM sensor_configs
                 WHERE sensor_id = ?1",
                params![sensor_id],
                |row| {
                    Ok(SensorConfig {
                        sensor_id: row.get(0)?,
                        interval_ms: row.get::<_, i64>(1)? as u64,
                        threshold: row.get(2)?,
                        enabled: row.get(3)?,
                    })
                },
            );
            match result {
                Ok(config) => Ok(config),
                Err(rusqlite::Error::QueryReturnedNoRows) => Err(Error::NotFound(format!(
                    "config not found for sensor {sensor_id}"
                ))),
                Err(e) => Err(e.into()),
            }
        })
    }

    async fn close(&self) -> Result<()> {
        if let Some(conn) = self.conn.lock().unwrap().take() {
            conn.close()
                .map_err(|(_, e)| Error::StoreIo(format!("failed to close database: {e}")))?;
            info!("database closed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn open_memory() -> SqliteStore {
        SqliteStore::open(":memory:").unwrap()
    }

    fn reading(id: &str, sensor_id: &str, ts: DateTime<Utc>) -> SensorReading {
        SensorReading {
            id: id.into(),
            sensor_id: sensor_id.into(),
            kind: SensorKind::Temperature,
            value: 22.5,
            unit: "°C".into(),
            error: None,
            timestamp: ts,
        }
    }

    #[tokio::test]
    async fn save_and_fetch_single_reading() {
        let store = open_memory();
        let r = reading("read-1", "temp-001", Utc::now());
        store.save_reading(&r).await.unwrap();

        let got = store.latest_readings("temp-001", 1).await.unwrap();
        assert_eq!(got, vec![r]);
    }

    #[tokio::test]
    async fn latest_readings_newest_first_and_prefix_law() {
        let store = open_memory();
        let base = Utc::now();
        for i in 0..5 {
            let r = reading(
                &format!("read-{i}"),
                "temp-001",
                base + ChronoDuration::milliseconds(i * 10),
            );
            store.save_reading(&r).await.unwrap();
        }

        let five = store.latest_readings("temp-001", 5).await.unwrap();
        assert_eq!(five[0].id, "read-4");
        assert_eq!(five[4].id, "read-0");

        let two = store.latest_readings("temp-001", 2).await.unwrap();
        assert_eq!(two, five[..2].to_vec());
    }

    #[tokio::test]
    async fn unknown_sensor_yields_empty() {
        let store = open_memory();
        assert!(store.latest_readings("ghost", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn error_reading_round_trips() {
        let store = open_memory();
        let mut r = reading("read-err", "p-1", Utc::now());
        r.kind = SensorKind::Pressure;
        r.unit = "hPa".into();
        r.value = 0.0;
        r.error = Some("sensor timeout".into());
        store.save_reading(&r).await.unwrap();

        let got = store.latest_readings("p-1", 1).await.unwrap();
        assert_eq!(got[0].error.as_deref(), Some("sensor timeout"));
        assert!(got[0].is_error());
    }

    #[tokio::test]
    async fn replayed_reading_id_does_not_duplicate() {
        let store = open_memory();
        let r = reading("read-1", "temp-001", Utc::now());
        store.save_reading(&r).await.unwrap();
        store.save_reading(&r).await.unwrap();

        let got = store.latest_readings("temp-001", 10).await.unwrap();
        assert_eq!(got.len(), 1);
    }

    #[tokio::test]
    async fn range_query_is_inclusive_on_both_bounds() {
        let store = open_memory();
        let base = Utc::now();
        let times: Vec<DateTime<Utc>> = (0..4)
            .map(|i| base + ChronoDuration::seconds(i))
            .collect();
        for (i, ts) in times.iter().enumerate() {
            store
                .save_reading(&reading(&format!("read-{i}"), "temp-001", *ts))
                .await
                .unwrap();
        }

        let got = store
            .readings_in_range("temp-001", times[1], times[2])
            .await
            .unwrap();
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].id, "read-2");
        assert_eq!(got[1].id, "read-1");

        let none = store
            .readings_in_range(
                "temp-001",
                base - ChronoDuration::hours(2),
                base - ChronoDuration::hours(1),
            )
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn config_upsert_round_trip() {
        let store = open_memory();
        let cfg = SensorConfig {
            sensor_id: "temp-001".into(),
            interval_ms: 5000,
            threshold: 30.0,
            enabled: true,
        };
        store.save_config(&cfg).await.unwrap();
        assert_eq!(store.get_config("temp-001").await.unwrap(), cfg);

        let updated = SensorConfig {
            sensor_id: "temp-001".into(),
            interval_ms: 200,
            threshold: 28.5,
            enabled: false,
        };
        store.save_config(&updated).await.unwrap();
        assert_eq!(store.get_config("temp-001").await.unwrap(), updated);
    }

    #[tokio::test]
    async fn missing_config_is_not_found() {
        let store = open_memory();
        assert!(matches!(
            store.get_config("ghost").await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn closed_store_is_unavailable() {
        let store = open_memory();
        store.close().await.unwrap();
        let r = reading("read-1", "temp-001", Utc::now());
        assert!(matches!(
            store.save_reading(&r).await,
            Err(Error::StoreUnavailable)
        ));
        assert!(matches!(
            store.latest_readings("temp-001", 1).await,
            Err(Error::StoreUnavailable)
        ));
        // close is idempotent
        store.close().await.unwrap();
    }
}

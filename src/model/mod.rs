// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/sensorfleet-rs

//! Sensor value types shared by the store, the bus, and the config file

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Kinds of virtual sensors hosted by the fleet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorKind {
    Temperature,
    Humidity,
    Pressure,
}

impl SensorKind {
    /// The measurement unit is a pure function of the kind.
    pub fn unit(&self) -> &'static str {
        match self {
            SensorKind::Temperature => "°C",
            SensorKind::Humidity => "%",
            SensorKind::Pressure => "hPa",
        }
    }

    /// Lowercase name used as the kind token in bus subjects.
    pub fn as_str(&self) -> &'static str {
        match self {
            SensorKind::Temperature => "temperature",
            SensorKind::Humidity => "humidity",
            SensorKind::Pressure => "pressure",
        }
    }
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SensorKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "temperature" => Ok(SensorKind::Temperature),
            "humidity" => Ok(SensorKind::Humidity),
            "pressure" => Ok(SensorKind::Pressure),
            other => Err(Error::Validation(format!("unknown sensor type: {other}"))),
        }
    }
}

/// Mutable per-sensor configuration. `interval` is the sampling period in
/// milliseconds; `threshold` is compared against generated values in the
/// sensor's natural unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorConfig {
    pub sensor_id: String,
    #[serde(rename = "interval")]
    pub interval_ms: u64,
    pub threshold: f64,
    pub enabled: bool,
}

impl SensorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.sensor_id.is_empty() {
            return Err(Error::Validation("sensor_id is required".into()));
        }
        if self.interval_ms == 0 {
            return Err(Error::Validation("interval must be greater than 0".into()));
        }
        Ok(())
    }

    /// Sampling period as a `Duration`.
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// A sensor to host: identity plus its current configuration.
/// `config.sensor_id` must equal `id`; the register handler normalizes this.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorDefinition {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: SensorKind,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub config: SensorConfig,
}

impl SensorDefinition {
    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(Error::Validation("sensor id is required".into()));
        }
        if self.name.is_empty() {
            return Err(Error::Validation("sensor name is required".into()));
        }
        self.config.validate()
    }
}

/// One timestamped sample. When `error` is present the value is irrelevant
/// (zero by convention) and threshold evaluation is skipped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub id: String,
    pub sensor_id: String,
    #[serde(rename = "type")]
    pub kind: SensorKind,
    pub value: f64,
    pub unit: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl SensorReading {
    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(Error::Validation("reading id is required".into()));
        }
        if self.sensor_id.is_empty() {
            return Err(Error::Validation("sensor_id is required".into()));
        }
        if self.unit.is_empty() {
            return Err(Error::Validation("unit is required".into()));
        }
        Ok(())
    }

    pub fn is_error(&self) -> bool {
        matches!(self.error.as_deref(), Some(e) if !e.is_empty())
    }
}

/// Threshold excursion event derived from a non-error reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub sensor_id: String,
    #[serde(rename = "type")]
    pub kind: SensorKind,
    pub value: f64,
    pub threshold: f64,
    pub unit: String,
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

impl Alert {
    pub fn from_reading(reading: &SensorReading, threshold: f64) -> Self {
        Alert {
            sensor_id: reading.sensor_id.clone(),
            kind: reading.kind,
            value: reading.value,
            threshold,
            unit: reading.unit.clone(),
            timestamp: reading.timestamp,
            message: format!(
                "Sensor {} exceeded threshold: {:.2} {} > {:.2} {}",
                reading.sensor_id, reading.value, reading.unit, threshold, reading.unit
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> SensorConfig {
        SensorConfig {
            sensor_id: "temp-001".into(),
            interval_ms: 5000,
            threshold: 30.0,
            enabled: true,
        }
    }

    #[test]
    fn kind_unit_mapping() {
        assert_eq!(SensorKind::Temperature.unit(), "°C");
        assert_eq!(SensorKind::Humidity.unit(), "%");
        assert_eq!(SensorKind::Pressure.unit(), "hPa");
    }

    #[test]
    fn kind_round_trips_through_str() {
        for kind in [
            SensorKind::Temperature,
            SensorKind::Humidity,
            SensorKind::Pressure,
        ] {
            assert_eq!(kind.as_str().parse::<SensorKind>().unwrap(), kind);
        }
        assert!("sonar".parse::<SensorKind>().is_err());
    }

    #[test]
    fn config_validation() {
        assert!(sample_config().validate().is_ok());

        let mut cfg = sample_config();
        cfg.sensor_id = String::new();
        assert!(cfg.validate().is_err());

        let mut cfg = sample_config();
        cfg.interval_ms = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn config_wire_field_names() {
        let json = serde_json::to_value(sample_config()).unwrap();
        assert_eq!(json["sensor_id"], "temp-001");
        assert_eq!(json["interval"], 5000);
        assert_eq!(json["threshold"], 30.0);
        assert_eq!(json["enabled"], true);
    }

    #[test]
    fn reading_serializes_without_absent_error() {
        let reading = SensorReading {
            id: "read-1".into(),
            sensor_id: "temp-001".into(),
            kind: SensorKind::Temperature,
            value: 21.5,
            unit: "°C".into(),
            error: None,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&reading).unwrap();
        assert_eq!(json["type"], "temperature");
        assert!(json.get("error").is_none());

        let back: SensorReading = serde_json::from_value(json).unwrap();
        assert_eq!(back, reading);
    }

    #[test]
    fn reading_error_flag() {
        let mut reading = SensorReading {
            id: "read-1".into(),
            sensor_id: "p-1".into(),
            kind: SensorKind::Pressure,
            value: 0.0,
            unit: "hPa".into(),
            error: Some("sensor timeout".into()),
            timestamp: Utc::now(),
        };
        assert!(reading.is_error());

        reading.error = Some(String::new());
        assert!(!reading.is_error());

        reading.error = None;
        assert!(!reading.is_error());
    }

    #[test]
    fn definition_omits_absent_location() {
        let def = SensorDefinition {
            id: "temp-001".into(),
            kind: SensorKind::Temperature,
            name: "Living room".into(),
            location: None,
            config: sample_config(),
        };
        let json = serde_json::to_value(&def).unwrap();
        assert!(json.get("location").is_none());
        assert_eq!(json["type"], "temperature");
    }

    #[test]
    fn alert_message_format() {
        let reading = SensorReading {
            id: "read-1".into(),
            sensor_id: "h-1".into(),
            kind: SensorKind::Humidity,
            value: 71.5,
            unit: "%".into(),
            error: None,
            timestamp: Utc::now(),
        };
        let alert = Alert::from_reading(&reading, 60.0);
        assert_eq!(
            alert.message,
            "Sensor h-1 exceeded threshold: 71.50 % > 60.00 %"
        );
        assert_eq!(alert.threshold, 60.0);
    }
}

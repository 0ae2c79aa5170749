// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/sensorfleet-rs

//! Configuration: YAML file plus `IOT_*` environment overrides

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Error, Result};
use crate::model::SensorDefinition;

/// Environment variable selecting a non-default config file.
pub const CONFIG_FILE_ENV: &str = "CONFIG_FILE";

const DEFAULT_CONFIG_PATHS: [&str; 2] = ["./configs/values_local.yaml", "./values_local.yaml"];

/// Full server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub environment: String,
    pub bus: BusConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub http: HttpConfig,
    pub sensors: Vec<SensorDefinition>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Message bus connection settings. `timeout` is the request/reply deadline
/// in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    pub url: String,
    #[serde(default = "default_bus_timeout")]
    pub timeout: u64,
    #[serde(default = "default_max_reconnects")]
    pub max_reconnects: u32,
}

fn default_bus_timeout() -> u64 {
    5
}

fn default_max_reconnects() -> u32 {
    10
}

impl BusConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub path: String,

    // settings for remote time-series backends
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
}

/// HTTP surface settings. Parsed for file compatibility; the HTTP server is
/// an external collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub enabled: bool,
    pub port: u16,
    pub host: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 8080,
            host: "0.0.0.0".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

impl Config {
    /// Loads and validates configuration from a YAML file, applying `IOT_*`
    /// environment overrides on top.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Validation(format!("failed to read config file {path:?}: {e}")))?;
        let mut config: Config = serde_yaml::from_str(&content)
            .map_err(|e| Error::Validation(format!("failed to parse config file {path:?}: {e}")))?;

        config.apply_env_overrides()?;
        config.validate()?;

        info!("loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Loads configuration from the path in `CONFIG_FILE`, falling back to
    /// the default locations.
    pub fn load_from_env() -> Result<Self> {
        if let Ok(path) = std::env::var(CONFIG_FILE_ENV) {
            return Self::load(Path::new(&path));
        }
        for candidate in DEFAULT_CONFIG_PATHS {
            let path = Path::new(candidate);
            if path.exists() {
                return Self::load(path);
            }
        }
        Err(Error::Validation(format!(
            "no config file found; set {CONFIG_FILE_ENV} or provide {}",
            DEFAULT_CONFIG_PATHS[0]
        )))
    }

    /// Scalar keys can be overridden with `IOT_` variables, `_` replacing
    /// `.` (e.g. `IOT_BUS_URL` overrides `bus.url`).
    fn apply_env_overrides(&mut self) -> Result<()> {
        override_string("IOT_ENVIRONMENT", &mut self.environment);
        override_string("IOT_BUS_URL", &mut self.bus.url);
        override_parsed("IOT_BUS_TIMEOUT", &mut self.bus.timeout)?;
        override_parsed("IOT_BUS_MAX_RECONNECTS", &mut self.bus.max_reconnects)?;
        override_string("IOT_DATABASE_TYPE", &mut self.database.kind);
        override_string("IOT_DATABASE_PATH", &mut self.database.path);
        override_optional("IOT_DATABASE_URL", &mut self.database.url);
        override_optional("IOT_DATABASE_TOKEN", &mut self.database.token);
        override_optional("IOT_DATABASE_ORG", &mut self.database.org);
        override_optional("IOT_DATABASE_BUCKET", &mut self.database.bucket);
        override_parsed("IOT_HTTP_ENABLED", &mut self.http.enabled)?;
        override_parsed("IOT_HTTP_PORT", &mut self.http.port)?;
        override_string("IOT_HTTP_HOST", &mut self.http.host);
        override_string("IOT_LOGGING_LEVEL", &mut self.logging.level);
        override_string("IOT_LOGGING_FORMAT", &mut self.logging.format);
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.environment.is_empty() {
            return Err(Error::Validation("environment is required".into()));
        }
        if self.bus.url.is_empty() {
            return Err(Error::Validation("bus.url is required".into()));
        }
        if self.bus.timeout == 0 {
            return Err(Error::Validation(
                "bus.timeout must be greater than 0".into(),
            ));
        }
        if self.database.kind.is_empty() {
            return Err(Error::Validation("database.type is required".into()));
        }
        if self.database.kind == "sqlite" && self.database.path.is_empty() {
            return Err(Error::Validation(
                "database.path is required for sqlite".into(),
            ));
        }
        if self.sensors.is_empty() {
            return Err(Error::Validation(
                "at least one sensor must be configured".into(),
            ));
        }
        for (i, sensor) in self.sensors.iter().enumerate() {
            sensor
                .validate()
                .map_err(|e| Error::Validation(format!("sensor[{i}]: {e}")))?;
        }
        Ok(())
    }
}

fn override_string(var: &str, target: &mut String) {
    if let Ok(value) = std::env::var(var) {
        *target = value;
    }
}

fn override_optional(var: &str, target: &mut Option<String>) {
    if let Ok(value) = std::env::var(var) {
        *target = Some(value);
    }
}

fn override_parsed<T: std::str::FromStr>(var: &str, target: &mut T) -> Result<()> {
    if let Ok(value) = std::env::var(var) {
        *target = value
            .parse()
            .map_err(|_| Error::Validation(format!("invalid value for {var}: {value}")))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
environment: local
bus:
  url: mqtt://localhost:1883
  timeout: 5
  max_reconnects: 10
database:
  type: sqlite
  path: ./data/sensors.db
http:
  enabled: false
  port: 8080
  host: 0.0.0.0
sensors:
  - id: temp-001
    type: temperature
    name: Living room temperature
    location: living-room
    config:
      sensor_id: temp-001
      interval: 5000
      threshold: 30.0
      enabled: true
  - id: hum-001
    type: humidity
    name: Basement humidity
    config:
      sensor_id: hum-001
      interval: 10000
      threshold: 70.0
      enabled: false
logging:
  level: info
  format: text
"#;

    fn parse_sample() -> Config {
        serde_yaml::from_str(SAMPLE).unwrap()
    }

    #[test]
    fn sample_parses_and_validates() {
        let config = parse_sample();
        config.validate().unwrap();

        assert_eq!(config.environment, "local");
        assert_eq!(config.bus.url, "mqtt://localhost:1883");
        assert_eq!(config.bus.request_timeout(), Duration::from_secs(5));
        assert_eq!(config.database.kind, "sqlite");
        assert_eq!(config.sensors.len(), 2);
        assert_eq!(config.sensors[0].config.interval_ms, 5000);
        assert_eq!(config.sensors[0].location.as_deref(), Some("living-room"));
        assert!(config.sensors[1].location.is_none());
        assert!(!config.sensors[1].config.enabled);
    }

    #[test]
    fn optional_sections_take_defaults() {
        let minimal = r#"
environment: local
bus:
  url: mqtt://localhost:1883
database:
  type: sqlite
  path: ./data/sensors.db
sensors:
  - id: temp-001
    type: temperature
    name: T
    config:
      sensor_id: temp-001
      interval: 1000
      threshold: 1.0
      enabled: true
"#;
        let config: Config = serde_yaml::from_str(minimal).unwrap();
        config.validate().unwrap();
        assert_eq!(config.bus.timeout, 5);
        assert_eq!(config.bus.max_reconnects, 10);
        assert_eq!(config.logging.level, "info");
        assert!(!config.http.enabled);
    }

    #[test]
    fn validation_rejects_incomplete_configs() {
        let mut config = parse_sample();
        config.environment.clear();
        assert!(config.validate().is_err());

        let mut config = parse_sample();
        config.bus.url.clear();
        assert!(config.validate().is_err());

        let mut config = parse_sample();
        config.database.path.clear();
        assert!(config.validate().is_err());

        let mut config = parse_sample();
        config.sensors.clear();
        assert!(config.validate().is_err());

        let mut config = parse_sample();
        config.sensors[0].config.interval_ms = 0;
        let err = config.validate().unwrap_err().to_string();
        assert!(err.starts_with("sensor[0]:"), "{err}");
    }

    // env vars are process-global, so both override cases live in one test
    #[test]
    fn env_overrides_scalar_keys() {
        std::env::set_var("IOT_BUS_URL", "mqtt://broker.lan:2883");
        std::env::set_var("IOT_LOGGING_LEVEL", "debug");

        let mut config = parse_sample();
        config.apply_env_overrides().unwrap();

        std::env::remove_var("IOT_BUS_URL");
        std::env::remove_var("IOT_LOGGING_LEVEL");

        assert_eq!(config.bus.url, "mqtt://broker.lan:2883");
        assert_eq!(config.logging.level, "debug");

        std::env::set_var("IOT_BUS_TIMEOUT", "not-a-number");
        let mut config = parse_sample();
        let result = config.apply_env_overrides();
        std::env::remove_var("IOT_BUS_TIMEOUT");
        assert!(result.is_err());
    }
}

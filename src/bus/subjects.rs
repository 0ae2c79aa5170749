// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/sensorfleet-rs

//! Subject vocabulary for the bus control plane.
//!
//! Subjects are dot-separated routing keys. The sensor id is always the
//! final token of id-bearing subjects.

pub const SUBJECT_READINGS: &str = "sensor.readings";
pub const SUBJECT_READINGS_QUERY: &str = "sensor.readings.query";
pub const SUBJECT_CONFIG: &str = "sensor.config";
pub const SUBJECT_ALERTS: &str = "sensor.alerts";
pub const SUBJECT_REGISTER: &str = "sensor.register";
pub const SUBJECT_LIST: &str = "sensor.list";

/// Subject a reading is published on, e.g. `sensor.readings.temperature.temp-001`.
pub fn reading_subject(kind: &str, sensor_id: &str) -> String {
    format!("{SUBJECT_READINGS}.{kind}.{sensor_id}")
}

/// Subject an alert is published on, e.g. `sensor.alerts.temperature.temp-001`.
pub fn alert_subject(kind: &str, sensor_id: &str) -> String {
    format!("{SUBJECT_ALERTS}.{kind}.{sensor_id}")
}

/// Request subject for fetching a sensor's configuration.
pub fn config_get_subject(sensor_id: &str) -> String {
    format!("{SUBJECT_CONFIG}.get.{sensor_id}")
}

/// Request subject for updating a sensor's configuration.
pub fn config_set_subject(sensor_id: &str) -> String {
    format!("{SUBJECT_CONFIG}.set.{sensor_id}")
}

/// Request subject for querying a sensor's latest readings.
pub fn readings_query_subject(sensor_id: &str) -> String {
    format!("{SUBJECT_READINGS_QUERY}.{sensor_id}")
}

/// Extracts the sensor id from an id-bearing subject, e.g.
/// `sensor.config.get.temp-001` -> `temp-001`. Returns an empty string for
/// subjects that carry no id token.
pub fn extract_sensor_id(subject: &str) -> &str {
    let parts: Vec<&str> = subject.split('.').collect();
    if parts.len() < 4 {
        return "";
    }
    parts[parts.len() - 1]
}

/// Token-wise subject match. `*` in the pattern matches exactly one token.
pub fn subject_matches(pattern: &str, subject: &str) -> bool {
    let pattern: Vec<&str> = pattern.split('.').collect();
    let subject: Vec<&str> = subject.split('.').collect();
    if pattern.len() != subject.len() {
        return false;
    }
    pattern
        .iter()
        .zip(subject.iter())
        .all(|(p, s)| *p == "*" || p == s)
}

// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/sensorfleet-rs

//! Synthetic reading generation

use std::sync::Mutex;

use chrono::Utc;
use rand::rngs::StdRng;
use rand::Rng;

use crate::model::{SensorKind, SensorReading};

/// Per-sample probability of synthesizing an error reading.
pub(crate) const ERROR_PROBABILITY: f64 = 0.05;

const ERROR_MESSAGES: [&str; 5] = [
    "sensor timeout",
    "reading error",
    "connection lost",
    "calibration error",
    "sensor malfunction",
];

fn next_reading_id() -> String {
    format!(
        "read-{}",
        Utc::now().timestamp_nanos_opt().unwrap_or_default()
    )
}

/// Generates one reading for the sensor. With probability
/// [`ERROR_PROBABILITY`] the reading carries an error message and a zero
/// value; threshold evaluation skips such readings.
pub(crate) fn generate_reading(
    sensor_id: &str,
    kind: SensorKind,
    rng: &Mutex<StdRng>,
) -> SensorReading {
    let mut rng = rng.lock().unwrap();

    let mut reading = SensorReading {
        id: next_reading_id(),
        sensor_id: sensor_id.to_string(),
        kind,
        value: 0.0,
        unit: kind.unit().to_string(),
        error: None,
        timestamp: Utc::now(),
    };

    if rng.gen::<f64>() < ERROR_PROBABILITY {
        let message = ERROR_MESSAGES[rng.gen_range(0..ERROR_MESSAGES.len())];
        reading.error = Some(message.to_string());
        return reading;
    }

    reading.value = generate_value(kind, &mut rng);
    reading
}

fn generate_value(kind: SensorKind, rng: &mut StdRng) -> f64 {
    match kind {
        // 25 °C ± 10
        SensorKind::Temperature => 25.0 + (rng.gen::<f64>() - 0.5) * 20.0,
        // 55 % ± 25, clamped to the physical range
        SensorKind::Humidity => {
            let value = 55.0 + (rng.gen::<f64>() - 0.5) * 50.0;
            value.clamp(0.0, 100.0)
        }
        // 1010 hPa ± 30
        SensorKind::Pressure => 1010.0 + (rng.gen::<f64>() - 0.5) * 60.0,
    }
}

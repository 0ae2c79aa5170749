// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/sensorfleet-rs

//! End-to-end scenarios over the in-process bus with an in-memory store.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Value};

use sensorfleet::bus::{BusClient, MessageHandler};
use sensorfleet::{
    Alert, Handlers, MemoryBus, SensorReading, SimulationEngine, SqliteStore, Store,
};

const TIMEOUT: Duration = Duration::from_secs(2);

struct Harness {
    bus: Arc<MemoryBus>,
    store: Arc<SqliteStore>,
    engine: Arc<SimulationEngine>,
}

async fn start_server() -> Harness {
    let bus = Arc::new(MemoryBus::new());
    let store = Arc::new(SqliteStore::open(":memory:").unwrap());
    let engine = Arc::new(SimulationEngine::new(store.clone(), bus.clone()));
    let handlers = Handlers::new(store.clone(), engine.clone());
    handlers.register(bus.as_ref()).await.unwrap();
    Harness { bus, store, engine }
}

fn capture() -> (Arc<Mutex<Vec<(String, Vec<u8>)>>>, MessageHandler) {
    let seen: Arc<Mutex<Vec<(String, Vec<u8>)>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let handler: MessageHandler = Arc::new(move |msg| {
        let sink = sink.clone();
        Box::pin(async move {
            sink.lock()
                .unwrap()
                .push((msg.subject().to_string(), msg.payload().to_vec()));
        })
    });
    (seen, handler)
}

async fn register_sensor(
    bus: &MemoryBus,
    id: &str,
    kind: &str,
    interval_ms: u64,
    threshold: f64,
) -> Value {
    let body = serde_json::to_vec(&json!({
        "id": id,
        "type": kind,
        "name": format!("{id} sensor"),
        "config": {
            "sensor_id": id,
            "interval": interval_ms,
            "threshold": threshold,
            "enabled": true,
        }
    }))
    .unwrap();
    let reply = bus.request("sensor.register", body, TIMEOUT).await.unwrap();
    serde_json::from_slice(&reply).unwrap()
}

// Scenario: a registered sensor's config comes back verbatim.
#[tokio::test]
async fn config_round_trips_through_register_and_get() {
    let h = start_server().await;

    let reply = register_sensor(&h.bus, "t-1", "temperature", 5000, 30.0).await;
    assert_eq!(reply["status"], "ok");

    let reply = h
        .bus
        .request("sensor.config.get.t-1", Vec::new(), TIMEOUT)
        .await
        .unwrap();
    let config: Value = serde_json::from_slice(&reply).unwrap();
    assert_eq!(config["sensor_id"], "t-1");
    assert_eq!(config["interval"], 5000);
    assert_eq!(config["threshold"], 30.0);
    assert_eq!(config["enabled"], true);

    h.engine.stop().await;
}

// Scenario: a live interval change speeds up an already-running sensor.
#[tokio::test]
async fn interval_change_applies_to_running_sensor() {
    let h = start_server().await;
    let (seen, handler) = capture();
    h.bus
        .subscribe("sensor.readings.temperature.t-1", handler)
        .await
        .unwrap();

    register_sensor(&h.bus, "t-1", "temperature", 5000, 30.0).await;

    let reply = h
        .bus
        .request(
            "sensor.config.set.t-1",
            serde_json::to_vec(&json!({
                "sensor_id": "t-1",
                "interval": 50,
                "threshold": 30.0,
                "enabled": true,
            }))
            .unwrap(),
            TIMEOUT,
        )
        .await
        .unwrap();
    let reply: Value = serde_json::from_slice(&reply).unwrap();
    assert_eq!(reply["status"], "ok");

    tokio::time::sleep(Duration::from_secs(1)).await;
    let count = seen.lock().unwrap().len();
    assert!(count >= 3, "only {count} readings after the interval change");

    h.engine.stop().await;
}

// Scenario: a zero threshold fires alerts, and alert values exceed it.
#[tokio::test]
async fn zero_threshold_humidity_sensor_alerts() {
    let h = start_server().await;
    let (seen, handler) = capture();
    h.bus
        .subscribe("sensor.alerts.humidity.h-1", handler)
        .await
        .unwrap();

    register_sensor(&h.bus, "h-1", "humidity", 20, 0.0).await;
    tokio::time::sleep(Duration::from_secs(2)).await;
    h.engine.stop().await;

    let alerts: Vec<Alert> = seen
        .lock()
        .unwrap()
        .iter()
        .map(|(_, p)| serde_json::from_slice(p).unwrap())
        .collect();
    assert!(!alerts.is_empty(), "expected at least one alert");
    for alert in alerts {
        assert!(alert.value > 0.0);
        assert_eq!(alert.sensor_id, "h-1");
        assert_eq!(alert.unit, "%");
    }
}

// Scenario: error readings suppress alerts; every non-error pressure reading
// above a zero threshold alerts.
#[tokio::test]
async fn alert_count_matches_non_error_readings() {
    let h = start_server().await;
    let (readings_seen, readings_handler) = capture();
    let (alerts_seen, alerts_handler) = capture();
    h.bus
        .subscribe("sensor.readings.pressure.p-1", readings_handler)
        .await
        .unwrap();
    h.bus
        .subscribe("sensor.alerts.pressure.p-1", alerts_handler)
        .await
        .unwrap();

    register_sensor(&h.bus, "p-1", "pressure", 10, 0.0).await;
    tokio::time::sleep(Duration::from_secs(2)).await;
    h.engine.stop().await;
    // let spawned deliveries settle
    tokio::time::sleep(Duration::from_millis(100)).await;

    let readings: Vec<SensorReading> = readings_seen
        .lock()
        .unwrap()
        .iter()
        .map(|(_, p)| serde_json::from_slice(p).unwrap())
        .collect();
    let alert_count = alerts_seen.lock().unwrap().len();

    assert!(readings.len() >= 50, "only {} readings", readings.len());
    let non_error = readings
        .iter()
        .filter(|r| !r.is_error() && r.value > 0.0)
        .count();
    assert_eq!(alert_count, non_error);
}

// Scenario: ordered shutdown stops event flow promptly and the store holds
// one row per published reading.
#[tokio::test]
async fn shutdown_stops_events_and_store_matches_bus() {
    let h = start_server().await;
    let (seen, handler) = capture();
    h.bus.subscribe("sensor.readings.*.*", handler).await.unwrap();

    register_sensor(&h.bus, "t-1", "temperature", 40, 1000.0).await;
    register_sensor(&h.bus, "h-1", "humidity", 70, 1000.0).await;
    register_sensor(&h.bus, "p-1", "pressure", 110, 1000.0).await;

    tokio::time::sleep(Duration::from_secs(1)).await;
    h.engine.stop().await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let count_at_stop = seen.lock().unwrap().len();
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(seen.lock().unwrap().len(), count_at_stop);

    for id in ["t-1", "h-1", "p-1"] {
        let published = seen
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, _)| s.ends_with(&format!(".{id}")))
            .count();
        let stored = h.store.latest_readings(id, 10_000).await.unwrap().len();
        assert_eq!(stored, published, "sensor {id}");
    }
}

// A removed sensor produces no further events.
#[tokio::test]
async fn removed_sensor_goes_quiet() {
    let h = start_server().await;
    let (seen, handler) = capture();
    h.bus
        .subscribe("sensor.readings.temperature.t-1", handler)
        .await
        .unwrap();

    register_sensor(&h.bus, "t-1", "temperature", 30, 1000.0).await;
    tokio::time::sleep(Duration::from_millis(300)).await;

    h.engine.remove_sensor("t-1").await.unwrap();
    // one queue-drain interval for in-flight tasks
    tokio::time::sleep(Duration::from_millis(150)).await;

    let frozen = seen.lock().unwrap().len();
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(seen.lock().unwrap().len(), frozen);

    h.engine.stop().await;
}

// Dynamic registration: a sensor registered over the bus shows up in
// sensor.list and starts producing immediately.
#[tokio::test]
async fn registered_sensor_is_listed_and_produces() {
    let h = start_server().await;
    let (seen, handler) = capture();
    h.bus
        .subscribe("sensor.readings.humidity.h-9", handler)
        .await
        .unwrap();

    let reply = h
        .bus
        .request("sensor.list", Vec::new(), TIMEOUT)
        .await
        .unwrap();
    assert_eq!(serde_json::from_slice::<Value>(&reply).unwrap(), json!([]));

    register_sensor(&h.bus, "h-9", "humidity", 30, 1000.0).await;

    let reply = h
        .bus
        .request("sensor.list", Vec::new(), TIMEOUT)
        .await
        .unwrap();
    let list: Value = serde_json::from_slice(&reply).unwrap();
    assert_eq!(list.as_array().unwrap().len(), 1);
    assert_eq!(list[0]["id"], "h-9");
    assert_eq!(list[0]["type"], "humidity");

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(!seen.lock().unwrap().is_empty());

    // and the readings are queryable
    let reply = h
        .bus
        .request("sensor.readings.query.h-9", Vec::new(), TIMEOUT)
        .await
        .unwrap();
    let rows: Value = serde_json::from_slice(&reply).unwrap();
    assert!(!rows.as_array().unwrap().is_empty());

    h.engine.stop().await;
}

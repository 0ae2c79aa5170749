// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/sensorfleet-rs

//! Simulation engine: sensor table, per-sensor tickers, and the worker pool
//! that persists, publishes, and alert-checks every sample.

mod generator;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::bus::{subjects, BusClient};
use crate::error::{Error, Result};
use crate::model::{Alert, SensorConfig, SensorDefinition, SensorKind};
use crate::store::Store;

const DEFAULT_WORKERS: usize = 5;
const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Callback capability the request/reply handlers use to reach the engine.
#[async_trait]
pub trait SensorRegistry: Send + Sync {
    async fn add_sensor(&self, definition: SensorDefinition) -> Result<()>;
    async fn update_sensor_config(&self, sensor_id: &str, config: SensorConfig) -> Result<()>;
    async fn list_definitions(&self) -> Vec<SensorDefinition>;
}

/// Engine-private state for one registered sensor.
struct SensorState {
    definition: SensorDefinition,
    rng: Arc<StdMutex<StdRng>>,
    period_tx: watch::Sender<Duration>,
    cancel: CancellationToken,
    ticker: Option<JoinHandle<()>>,
    last_read: StdMutex<DateTime<Utc>>,
}

/// One enqueued sampling job. `threshold` is the value snapshotted at tick
/// time; it only backs alert evaluation when the sensor was removed while
/// the task was in flight.
struct ReadingTask {
    sensor_id: String,
    kind: SensorKind,
    threshold: f64,
    rng: Arc<StdMutex<StdRng>>,
}

type SensorTable = Arc<RwLock<HashMap<String, SensorState>>>;

/// Hosts the live sensor population and drives periodic sampling through a
/// bounded worker pool.
pub struct SimulationEngine {
    store: Arc<dyn Store>,
    bus: Arc<dyn BusClient>,
    sensors: SensorTable,
    task_tx: flume::Sender<ReadingTask>,
    cancel: CancellationToken,
    workers: StdMutex<Vec<JoinHandle<()>>>,
    stopped: AtomicBool,
}

impl SimulationEngine {
    /// Creates the engine and immediately starts the worker pool.
    pub fn new(store: Arc<dyn Store>, bus: Arc<dyn BusClient>) -> Self {
        Self::with_options(store, bus, DEFAULT_WORKERS, DEFAULT_QUEUE_CAPACITY)
    }

    pub fn with_options(
        store: Arc<dyn Store>,
        bus: Arc<dyn BusClient>,
        worker_count: usize,
        queue_capacity: usize,
    ) -> Self {
        let (task_tx, task_rx) = flume::bounded::<ReadingTask>(queue_capacity);
        let sensors: SensorTable = Arc::new(RwLock::new(HashMap::new()));
        let cancel = CancellationToken::new();

        info!("starting worker pool with {worker_count} workers");
        let mut workers = Vec::with_capacity(worker_count);
        for id in 0..worker_count {
            workers.push(tokio::spawn(worker_loop(
                id,
                task_rx.clone(),
                cancel.clone(),
                store.clone(),
                bus.clone(),
                sensors.clone(),
            )));
        }

        Self {
            store,
            bus,
            sensors,
            task_tx,
            cancel,
            workers: StdMutex::new(workers),
            stopped: AtomicBool::new(false),
        }
    }

    /// Persists the config, registers the sensor, and (when enabled) arms
    /// its ticker. The ticker is armed and the config durable before return.
    pub async fn add_sensor(&self, definition: SensorDefinition) -> Result<()> {
        let mut sensors = self.sensors.write().await;
        if sensors.contains_key(&definition.id) {
            return Err(Error::AlreadyExists(format!(
                "sensor {} already exists",
                definition.id
            )));
        }

        self.store.save_config(&definition.config).await?;

        let seed = Utc::now().timestamp_nanos_opt().unwrap_or_default() as u64;
        let rng = Arc::new(StdMutex::new(StdRng::seed_from_u64(seed)));
        let (period_tx, period_rx) = watch::channel(definition.config.interval());
        let cancel = self.cancel.child_token();

        let ticker = if definition.config.enabled {
            Some(spawn_ticker(
                definition.id.clone(),
                self.sensors.clone(),
                self.task_tx.clone(),
                cancel.clone(),
                period_rx,
            ))
        } else {
            None
        };

        info!(
            sensor_id = %definition.id,
            kind = %definition.kind,
            interval = definition.config.interval_ms,
            "sensor added"
        );

        sensors.insert(
            definition.id.clone(),
            SensorState {
                definition,
                rng,
                period_tx,
                cancel,
                ticker,
                last_read: StdMutex::new(Utc::now()),
            },
        );
        Ok(())
    }

    /// Stops the sensor's ticker and removes it. Tasks already queued for
    /// this sensor are allowed to complete.
    pub async fn remove_sensor(&self, sensor_id: &str) -> Result<()> {
        let mut sensors = self.sensors.write().await;
        let state = sensors
            .remove(sensor_id)
            .ok_or_else(|| Error::NotFound(format!("sensor {sensor_id} not found")))?;
        state.cancel.cancel();

        info!(sensor_id = %sensor_id, "sensor removed");
        Ok(())
    }

    /// Replaces the sensor's config, retunes its ticker, and persists the
    /// new config. A disabled sensor that becomes enabled gets its ticker
    /// (re)started.
    pub async fn update_sensor_config(
        &self,
        sensor_id: &str,
        new_config: SensorConfig,
    ) -> Result<()> {
        let mut sensors = self.sensors.write().await;
        let state = sensors
            .get_mut(sensor_id)
            .ok_or_else(|| Error::NotFound(format!("sensor {sensor_id} not found")))?;

        state.definition.config = new_config.clone();
        state.period_tx.send_replace(new_config.interval());

        let ticker_live = state.ticker.as_ref().is_some_and(|t| !t.is_finished());
        if new_config.enabled && !ticker_live {
            state.ticker = Some(spawn_ticker(
                sensor_id.to_string(),
                self.sensors.clone(),
                self.task_tx.clone(),
                state.cancel.clone(),
                state.period_tx.subscribe(),
            ));
        }

        self.store.save_config(&new_config).await?;

        info!(
            sensor_id = %sensor_id,
            interval = new_config.interval_ms,
            threshold = new_config.threshold,
            "sensor config updated"
        );
        Ok(())
    }

    pub async fn sensor_count(&self) -> usize {
        self.sensors.read().await.len()
    }

    pub async fn list_sensor_ids(&self) -> Vec<String> {
        self.sensors.read().await.keys().cloned().collect()
    }

    /// Snapshot of all registered sensor definitions.
    pub async fn list_definitions(&self) -> Vec<SensorDefinition> {
        self.sensors
            .read()
            .await
            .values()
            .map(|s| s.definition.clone())
            .collect()
    }

    /// Ordered shutdown: stop tickers, signal cancellation, drain the task
    /// queue, join the workers. Idempotent.
    pub async fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("stopping simulation engine");

        let tickers: Vec<(CancellationToken, Option<JoinHandle<()>>)> = {
            let mut sensors = self.sensors.write().await;
            sensors
                .values_mut()
                .map(|s| (s.cancel.clone(), s.ticker.take()))
                .collect()
        };
        for (cancel, _) in &tickers {
            cancel.cancel();
        }
        for (_, ticker) in tickers {
            if let Some(ticker) = ticker {
                let _ = ticker.await;
            }
        }

        self.cancel.cancel();

        let workers = std::mem::take(&mut *self.workers.lock().unwrap());
        for worker in workers {
            let _ = worker.await;
        }

        info!("simulation engine stopped");
    }
}

#[async_trait]
impl SensorRegistry for SimulationEngine {
    async fn add_sensor(&self, definition: SensorDefinition) -> Result<()> {
        SimulationEngine::add_sensor(self, definition).await
    }

    async fn update_sensor_config(&self, sensor_id: &str, config: SensorConfig) -> Result<()> {
        SimulationEngine::update_sensor_config(self, sensor_id, config).await
    }

    async fn list_definitions(&self) -> Vec<SensorDefinition> {
        SimulationEngine::list_definitions(self).await
    }
}

/// Ticker task for one sensor: fires at the current period and enqueues
/// sampling work without blocking. A full queue drops the tick.
fn spawn_ticker(
    sensor_id: String,
    sensors: SensorTable,
    task_tx: flume::Sender<ReadingTask>,
    cancel: CancellationToken,
    mut period_rx: watch::Receiver<Duration>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        debug!(sensor_id = %sensor_id, "sensor ticker started");

        let mut period = *period_rx.borrow_and_update();
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                changed = period_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    period = *period_rx.borrow_and_update();
                    ticker = interval_at(Instant::now() + period, period);
                    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                }
                _ = ticker.tick() => {
                    let task = {
                        let table = sensors.read().await;
                        match table.get(&sensor_id) {
                            None => break,
                            Some(state) if !state.definition.config.enabled => None,
                            Some(state) => {
                                *state.last_read.lock().unwrap() = Utc::now();
                                Some(ReadingTask {
                                    sensor_id: sensor_id.clone(),
                                    kind: state.definition.kind,
                                    threshold: state.definition.config.threshold,
                                    rng: state.rng.clone(),
                                })
                            }
                        }
                    };
                    let Some(task) = task else { continue };
                    match task_tx.try_send(task) {
                        Ok(()) => {}
                        Err(flume::TrySendError::Full(_)) => {
                            warn!(sensor_id = %sensor_id, "task queue full, skipping reading");
                        }
                        Err(flume::TrySendError::Disconnected(_)) => break,
                    }
                }
            }
        }

        debug!(sensor_id = %sensor_id, "sensor ticker stopped");
    })
}

/// Worker: pulls sampling tasks until shutdown, draining whatever is already
/// queued before exiting.
async fn worker_loop(
    id: usize,
    task_rx: flume::Receiver<ReadingTask>,
    cancel: CancellationToken,
    store: Arc<dyn Store>,
    bus: Arc<dyn BusClient>,
    sensors: SensorTable,
) {
    debug!(worker_id = id, "worker started");
    loop {
        tokio::select! {
            biased;
            task = task_rx.recv_async() => match task {
                Ok(task) => process_task(&store, &bus, &sensors, task).await,
                Err(_) => break,
            },
            _ = cancel.cancelled() => {
                while let Ok(task) = task_rx.try_recv() {
                    process_task(&store, &bus, &sensors, task).await;
                }
                break;
            }
        }
    }
    debug!(worker_id = id, "worker stopped");
}

/// Generate, persist, publish, alert-check. The three sinks are independent:
/// failure of one is logged and never short-circuits the others.
async fn process_task(
    store: &Arc<dyn Store>,
    bus: &Arc<dyn BusClient>,
    sensors: &SensorTable,
    task: ReadingTask,
) {
    let reading = generator::generate_reading(&task.sensor_id, task.kind, &task.rng);

    if let Err(e) = store.save_reading(&reading).await {
        error!(sensor_id = %task.sensor_id, "error saving reading: {e}");
    }

    let subject = subjects::reading_subject(task.kind.as_str(), &task.sensor_id);
    match serde_json::to_vec(&reading) {
        Ok(data) => {
            if let Err(e) = bus.publish(&subject, data).await {
                error!(sensor_id = %task.sensor_id, subject = %subject, "error publishing reading: {e}");
            }
        }
        Err(e) => error!(sensor_id = %task.sensor_id, "error serializing reading: {e}"),
    }

    if reading.is_error() {
        return;
    }

    // Current threshold, unless the sensor was removed mid-flight.
    let threshold = sensors
        .read()
        .await
        .get(&task.sensor_id)
        .map(|s| s.definition.config.threshold)
        .unwrap_or(task.threshold);

    if reading.value > threshold {
        let alert = Alert::from_reading(&reading, threshold);
        let subject = subjects::alert_subject(task.kind.as_str(), &task.sensor_id);
        match serde_json::to_vec(&alert) {
            Ok(data) => match bus.publish(&subject, data).await {
                Ok(()) => warn!(
                    sensor_id = %reading.sensor_id,
                    value = reading.value,
                    threshold,
                    unit = %reading.unit,
                    "sensor exceeded threshold"
                ),
                Err(e) => {
                    error!(sensor_id = %reading.sensor_id, subject = %subject, "error publishing alert: {e}")
                }
            },
            Err(e) => error!(sensor_id = %reading.sensor_id, "error serializing alert: {e}"),
        }
    }
}

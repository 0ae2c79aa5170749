// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/sensorfleet-rs

//! Request/reply handlers bridging bus commands into the engine and store

use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::bus::subjects::{
    self, SUBJECT_CONFIG, SUBJECT_LIST, SUBJECT_READINGS_QUERY, SUBJECT_REGISTER,
};
use crate::bus::{BusClient, BusMessage, MessageHandler};
use crate::engine::SensorRegistry;
use crate::error::{Error, Result};
use crate::model::{SensorConfig, SensorDefinition};
use crate::store::Store;

const DEFAULT_QUERY_LIMIT: usize = 10;

#[derive(Deserialize, Default)]
struct ReadingsQuery {
    #[serde(default)]
    limit: i64,
}

/// Control-plane handler layer. Subscribes once at startup; every handler
/// parses JSON, calls the store or the engine, and replies exactly once.
pub struct Handlers {
    store: Arc<dyn Store>,
    registry: Arc<dyn SensorRegistry>,
}

impl Handlers {
    pub fn new(store: Arc<dyn Store>, registry: Arc<dyn SensorRegistry>) -> Arc<Self> {
        Arc::new(Self { store, registry })
    }

    /// Registers all control-plane subscriptions on the bus.
    pub async fn register(self: &Arc<Self>, bus: &dyn BusClient) -> Result<()> {
        let subscriptions: [(String, MessageHandler); 5] = [
            (
                format!("{SUBJECT_CONFIG}.get.*"),
                self.handler(|h, msg| async move { h.handle_config_get(msg).await }),
            ),
            (
                format!("{SUBJECT_CONFIG}.set.*"),
                self.handler(|h, msg| async move { h.handle_config_set(msg).await }),
            ),
            (
                format!("{SUBJECT_READINGS_QUERY}.*"),
                self.handler(|h, msg| async move { h.handle_readings_query(msg).await }),
            ),
            (
                SUBJECT_REGISTER.to_string(),
                self.handler(|h, msg| async move { h.handle_register(msg).await }),
            ),
            (
                SUBJECT_LIST.to_string(),
                self.handler(|h, msg| async move { h.handle_list(msg).await }),
            ),
        ];

        for (pattern, handler) in subscriptions {
            bus.subscribe(&pattern, handler).await?;
            info!(subject = %pattern, "handler registered");
        }
        Ok(())
    }

    fn handler<F, Fut>(self: &Arc<Self>, f: F) -> MessageHandler
    where
        F: Fn(Arc<Self>, BusMessage) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let this = self.clone();
        let handler: MessageHandler = Arc::new(move |msg| Box::pin(f(this.clone(), msg)));
        handler
    }

    async fn handle_config_get(&self, msg: BusMessage) {
        let sensor_id = subjects::extract_sensor_id(msg.subject()).to_string();
        if sensor_id.is_empty() {
            reply_error(msg, "invalid subject format").await;
            return;
        }

        match self.store.get_config(&sensor_id).await {
            Ok(config) => reply_json(msg, &config).await,
            Err(e) => {
                debug!(sensor_id = %sensor_id, "config lookup failed: {e}");
                reply_error(msg, &format!("config not found for sensor {sensor_id}")).await;
            }
        }
    }

    async fn handle_config_set(&self, msg: BusMessage) {
        let sensor_id = subjects::extract_sensor_id(msg.subject()).to_string();
        if sensor_id.is_empty() {
            reply_error(msg, "invalid subject format").await;
            return;
        }

        let config: SensorConfig = match serde_json::from_slice(msg.payload()) {
            Ok(config) => config,
            Err(_) => {
                reply_error(msg, "invalid config format").await;
                return;
            }
        };
        if let Err(e) = config.validate() {
            reply_error(msg, &format!("invalid config: {e}")).await;
            return;
        }

        // Forward to the engine so a running sensor picks the change up
        // immediately; a sensor unknown to the engine is persist-only and
        // the stored config applies on its next registration.
        match self
            .registry
            .update_sensor_config(&sensor_id, config.clone())
            .await
        {
            Ok(()) => {}
            Err(Error::NotFound(_)) => {
                if let Err(e) = self.store.save_config(&config).await {
                    reply_error(msg, &format!("failed to save config: {e}")).await;
                    return;
                }
            }
            Err(e) => {
                reply_error(msg, &format!("failed to save config: {e}")).await;
                return;
            }
        }

        reply_json(msg, &json!({"status": "ok"})).await;
    }

    async fn handle_readings_query(&self, msg: BusMessage) {
        let sensor_id = subjects::extract_sensor_id(msg.subject()).to_string();
        if sensor_id.is_empty() {
            reply_error(msg, "invalid subject format").await;
            return;
        }

        let mut limit = DEFAULT_QUERY_LIMIT;
        if !msg.payload().is_empty() {
            if let Ok(query) = serde_json::from_slice::<ReadingsQuery>(msg.payload()) {
                if query.limit > 0 {
                    limit = query.limit as usize;
                }
            }
        }

        match self.store.latest_readings(&sensor_id, limit).await {
            Ok(readings) => reply_json(msg, &readings).await,
            Err(e) => reply_error(msg, &format!("failed to get readings: {e}")).await,
        }
    }

    async fn handle_register(&self, msg: BusMessage) {
        let mut definition: SensorDefinition = match serde_json::from_slice(msg.payload()) {
            Ok(definition) => definition,
            Err(e) => {
                reply_error(msg, &format!("invalid sensor definition: {e}")).await;
                return;
            }
        };

        if definition.id.is_empty() {
            reply_error(msg, "sensor ID is required").await;
            return;
        }

        // the config's sensor_id always follows the definition's id
        definition.config.sensor_id = definition.id.clone();

        if let Err(e) = definition.config.validate() {
            reply_error(msg, &format!("invalid config: {e}")).await;
            return;
        }

        if let Err(e) = self.registry.add_sensor(definition.clone()).await {
            reply_error(msg, &format!("failed to add sensor: {e}")).await;
            return;
        }

        reply_json(
            msg,
            &json!({
                "status": "ok",
                "sensor_id": definition.id,
                "message": format!("sensor {} registered successfully", definition.id),
            }),
        )
        .await;
    }

    async fn handle_list(&self, msg: BusMessage) {
        let definitions = self.registry.list_definitions().await;
        reply_json(msg, &definitions).await;
    }
}

async fn reply_json<T: serde::Serialize>(msg: BusMessage, value: &T) {
    match serde_json::to_vec(value) {
        Ok(data) => {
            if let Err(e) = msg.respond(data).await {
                warn!("failed to send reply: {e}");
            }
        }
        Err(e) => {
            warn!("failed to serialize reply: {e}");
            reply_error(msg, "internal serialization error").await;
        }
    }
}

async fn reply_error(msg: BusMessage, error: &str) {
    let data = serde_json::to_vec(&json!({"error": error})).unwrap_or_default();
    if let Err(e) = msg.respond(data).await {
        warn!("failed to send error reply: {e}");
    }
}

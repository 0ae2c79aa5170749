// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/sensorfleet-rs

//! MQTT-backed bus client.
//!
//! Dot-separated subjects are canonical everywhere in the crate; this module
//! maps them to MQTT topics (`.` <-> `/`, `*` <-> `+`) at the transport edge
//! only. MQTT has no native reply-to, so requests travel inside a
//! `{reply_to, payload}` envelope that is unwrapped here before handlers see
//! the message; replies ride a per-request `_inbox.<nonce>` subject.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use tokio::sync::{oneshot, RwLock};
use tracing::{debug, info, warn};

use super::subjects::subject_matches;
use super::{BusClient, BusMessage, MessageHandler, SubscriptionId};
use crate::error::{Error, Result};

#[derive(Serialize)]
struct EnvelopeOut<'a> {
    reply_to: &'a str,
    payload: &'a RawValue,
}

#[derive(Deserialize)]
struct EnvelopeIn {
    reply_to: String,
    payload: Box<RawValue>,
}

struct Subscription {
    id: SubscriptionId,
    pattern: String,
    handler: MessageHandler,
}

type InboxMap = Arc<Mutex<HashMap<String, oneshot::Sender<Vec<u8>>>>>;

/// Bus client over an MQTT broker.
pub struct MqttBus {
    client: AsyncClient,
    subscriptions: Arc<RwLock<Vec<Subscription>>>,
    inboxes: InboxMap,
    next_id: AtomicU64,
    closed: Arc<AtomicBool>,
}

fn subject_to_topic(subject: &str) -> String {
    subject.replace('.', "/").replace('*', "+")
}

fn topic_to_subject(topic: &str) -> String {
    topic.replace('/', ".")
}

fn parse_broker_url(url: &str) -> Result<(String, u16)> {
    let trimmed = url
        .strip_prefix("mqtt://")
        .or_else(|| url.strip_prefix("tcp://"))
        .unwrap_or(url);
    match trimmed.rsplit_once(':') {
        Some((host, port)) => {
            let port = port
                .parse::<u16>()
                .map_err(|_| Error::Validation(format!("invalid broker url: {url}")))?;
            Ok((host.to_string(), port))
        }
        None => Ok((trimmed.to_string(), 1883)),
    }
}

impl MqttBus {
    /// Connects to the broker and waits for the session to be acknowledged.
    pub async fn connect(url: &str, client_id: &str) -> Result<Self> {
        let (host, port) = parse_broker_url(url)?;
        let mut options = MqttOptions::new(client_id, host, port);
        options.set_keep_alive(Duration::from_secs(30));

        let (client, mut eventloop) = AsyncClient::new(options, 100);

        let subscriptions: Arc<RwLock<Vec<Subscription>>> = Arc::new(RwLock::new(Vec::new()));
        let inboxes: InboxMap = Arc::new(Mutex::new(HashMap::new()));
        let closed = Arc::new(AtomicBool::new(false));

        let (connected_tx, connected_rx) = oneshot::channel::<()>();

        {
            let subscriptions = subscriptions.clone();
            let inboxes = inboxes.clone();
            let closed = closed.clone();
            let reply_client = client.clone();
            let mut connected_tx = Some(connected_tx);
            tokio::spawn(async move {
                loop {
                    match eventloop.poll().await {
                        Ok(Event::Incoming(Packet::ConnAck(_))) => {
                            info!("bus connected");
                            if let Some(tx) = connected_tx.take() {
                                let _ = tx.send(());
                            }
                        }
                        Ok(Event::Incoming(Packet::Publish(publish))) => {
                            let subject = topic_to_subject(&publish.topic);
                            dispatch(
                                &subject,
                                publish.payload.to_vec(),
                                &subscriptions,
                                &inboxes,
                                &reply_client,
                            )
                            .await;
                        }
                        Ok(_) => {}
                        Err(e) => {
                            if closed.load(Ordering::SeqCst) {
                                debug!("bus event loop stopped");
                                break;
                            }
                            warn!("bus connection error: {e}, retrying");
                            tokio::time::sleep(Duration::from_secs(1)).await;
                        }
                    }
                }
            });
        }

        match tokio::time::timeout(Duration::from_secs(10), connected_rx).await {
            Ok(Ok(())) => {}
            _ => return Err(Error::Transport(format!("failed to connect to bus at {url}"))),
        }

        Ok(Self {
            client,
            subscriptions,
            inboxes,
            next_id: AtomicU64::new(0),
            closed,
        })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::Transport("bus is closed".into()));
        }
        Ok(())
    }
}

/// Routes one inbound message: reply inboxes first, then local subscriptions,
/// unwrapping the request envelope when present.
async fn dispatch(
    subject: &str,
    payload: Vec<u8>,
    subscriptions: &RwLock<Vec<Subscription>>,
    inboxes: &InboxMap,
    reply_client: &AsyncClient,
) {
    if let Some(tx) = inboxes.lock().unwrap().remove(subject) {
        let _ = tx.send(payload);
        return;
    }

    let (body, reply_to) = match serde_json::from_slice::<EnvelopeIn>(&payload) {
        Ok(envelope) => {
            let raw = envelope.payload.get();
            // empty request bodies travel as JSON null
            let body = if raw == "null" {
                Vec::new()
            } else {
                raw.as_bytes().to_vec()
            };
            (body, Some(envelope.reply_to))
        }
        Err(_) => (payload, None),
    };

    let subscriptions = subscriptions.read().await;
    for sub in subscriptions
        .iter()
        .filter(|s| subject_matches(&s.pattern, subject))
    {
        let handler = sub.handler.clone();
        let msg = match &reply_to {
            Some(reply_subject) => {
                let client = reply_client.clone();
                let topic = subject_to_topic(reply_subject);
                let reply = Box::new(move |data: Vec<u8>| {
                    let fut: futures_util::future::BoxFuture<'static, Result<()>> =
                        Box::pin(async move {
                            client
                                .publish(topic, QoS::AtLeastOnce, false, data)
                                .await
                                .map_err(|e| Error::Transport(e.to_string()))
                        });
                    fut
                });
                BusMessage::with_reply(subject.to_string(), body.clone(), reply)
            }
            None => BusMessage::new(subject.to_string(), body.clone()),
        };
        tokio::spawn(async move { handler(msg).await });
    }
}

#[async_trait]
impl BusClient for MqttBus {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<()> {
        self.ensure_open()?;
        self.client
            .publish(subject_to_topic(subject), QoS::AtLeastOnce, false, payload)
            .await
            .map_err(|e| Error::Transport(e.to_string()))
    }

    async fn subscribe(&self, pattern: &str, handler: MessageHandler) -> Result<SubscriptionId> {
        self.ensure_open()?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.subscriptions.write().await.push(Subscription {
            id,
            pattern: pattern.to_string(),
            handler,
        });
        self.client
            .subscribe(subject_to_topic(pattern), QoS::AtLeastOnce)
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;
        Ok(id)
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> Result<()> {
        let mut subscriptions = self.subscriptions.write().await;
        let Some(position) = subscriptions.iter().position(|s| s.id == id) else {
            return Ok(());
        };
        let removed = subscriptions.remove(position);
        let pattern_still_used = subscriptions.iter().any(|s| s.pattern == removed.pattern);
        drop(subscriptions);

        if !pattern_still_used {
            self.client
                .unsubscribe(subject_to_topic(&removed.pattern))
                .await
                .map_err(|e| Error::Transport(e.to_string()))?;
        }
        Ok(())
    }

    async fn request(
        &self,
        subject: &str,
        payload: Vec<u8>,
        timeout: Duration,
    ) -> Result<Vec<u8>> {
        self.ensure_open()?;
        let inbox = format!("_inbox.{:016x}", rand::random::<u64>());
        let inbox_topic = subject_to_topic(&inbox);

        let (tx, rx) = oneshot::channel::<Vec<u8>>();
        self.inboxes.lock().unwrap().insert(inbox.clone(), tx);
        self.client
            .subscribe(&inbox_topic, QoS::AtLeastOnce)
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;

        let body = if payload.is_empty() {
            "null".to_string()
        } else {
            String::from_utf8(payload).map_err(|_| {
                Error::Transport("request payload is not valid UTF-8 JSON".into())
            })?
        };
        let raw = RawValue::from_string(body)?;
        let envelope = serde_json::to_vec(&EnvelopeOut {
            reply_to: &inbox,
            payload: &raw,
        })?;

        let result = async {
            self.client
                .publish(subject_to_topic(subject), QoS::AtLeastOnce, false, envelope)
                .await
                .map_err(|e| Error::Transport(e.to_string()))?;
            match tokio::time::timeout(timeout, rx).await {
                Ok(Ok(data)) => Ok(data),
                Ok(Err(_)) => Err(Error::Transport("request dropped without reply".into())),
                Err(_) => Err(Error::Timeout),
            }
        }
        .await;

        self.inboxes.lock().unwrap().remove(&inbox);
        let _ = self.client.unsubscribe(&inbox_topic).await;
        result
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.subscriptions.write().await.clear();
        self.client
            .disconnect()
            .await
            .map_err(|e| Error::Transport(e.to_string()))
    }
}

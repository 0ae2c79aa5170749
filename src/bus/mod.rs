// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/sensorfleet-rs

//! Message-bus abstraction: publish, subscribe-with-handler, request/reply

pub mod memory;
pub mod mqtt;
pub mod subjects;

pub use memory::MemoryBus;
pub use mqtt::MqttBus;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::BoxFuture;

use crate::error::{Error, Result};

/// Default request/reply deadline.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Asynchronous callback invoked once per delivered message. Handlers run
/// concurrently with one another.
pub type MessageHandler = Arc<dyn Fn(BusMessage) -> BoxFuture<'static, ()> + Send + Sync>;

/// Identifies a live subscription; pass to [`BusClient::unsubscribe`].
pub type SubscriptionId = u64;

/// One-shot reply callback a bus implementation attaches to request messages.
pub type ReplyFn = Box<dyn FnOnce(Vec<u8>) -> BoxFuture<'static, Result<()>> + Send>;

/// A message delivered to a subscription handler. Requests carry a reply
/// address; [`BusMessage::respond`] consumes the message, so a handler can
/// reply at most once.
pub struct BusMessage {
    subject: String,
    payload: Vec<u8>,
    reply: Option<ReplyFn>,
}

impl BusMessage {
    pub fn new(subject: String, payload: Vec<u8>) -> Self {
        Self {
            subject,
            payload,
            reply: None,
        }
    }

    pub fn with_reply(subject: String, payload: Vec<u8>, reply: ReplyFn) -> Self {
        Self {
            subject,
            payload,
            reply: Some(reply),
        }
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn wants_reply(&self) -> bool {
        self.reply.is_some()
    }

    /// Sends the reply for a request message.
    pub async fn respond(mut self, payload: Vec<u8>) -> Result<()> {
        match self.reply.take() {
            Some(reply) => reply(payload).await,
            None => Err(Error::Transport("message has no reply address".into())),
        }
    }
}

/// Capability over the bus transport. Implementations: [`MqttBus`] for the
/// broker-backed deployment, [`MemoryBus`] for embedded runs and tests.
#[async_trait]
pub trait BusClient: Send + Sync {
    /// Fire-and-forget publish. Returns once the client accepted the message.
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<()>;

    /// Registers a handler for subjects matching `pattern` (`*` matches one
    /// dot token). The handler stays active until `unsubscribe` or `close`.
    async fn subscribe(&self, pattern: &str, handler: MessageHandler) -> Result<SubscriptionId>;

    /// Removes a subscription registered with `subscribe`.
    async fn unsubscribe(&self, id: SubscriptionId) -> Result<()>;

    /// Sends a request and awaits exactly one reply. Fails with
    /// [`Error::Timeout`] when no reply arrives before the deadline.
    async fn request(&self, subject: &str, payload: Vec<u8>, timeout: Duration)
        -> Result<Vec<u8>>;

    /// Drains pending outbound messages, then disconnects. Idempotent.
    async fn close(&self) -> Result<()>;
}

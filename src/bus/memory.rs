// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/sensorfleet-rs

//! In-process bus: subject routing over tokio channels.
//!
//! Serves embedded runs and tests; implements the same contract as the
//! broker-backed client, including request/reply and wildcard subjects.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{oneshot, RwLock};

use super::subjects::subject_matches;
use super::{BusClient, BusMessage, MessageHandler, SubscriptionId};
use crate::error::{Error, Result};

struct Subscription {
    id: SubscriptionId,
    pattern: String,
    handler: MessageHandler,
}

/// Bus implementation that dispatches entirely inside the process.
#[derive(Default)]
pub struct MemoryBus {
    subscriptions: RwLock<Vec<Subscription>>,
    next_id: AtomicU64,
    closed: AtomicBool,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::Transport("bus is closed".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl BusClient for MemoryBus {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<()> {
        self.ensure_open()?;
        let subscriptions = self.subscriptions.read().await;
        for sub in subscriptions
            .iter()
            .filter(|s| subject_matches(&s.pattern, subject))
        {
            let handler = sub.handler.clone();
            let msg = BusMessage::new(subject.to_string(), payload.clone());
            tokio::spawn(async move { handler(msg).await });
        }
        Ok(())
    }

    async fn subscribe(&self, pattern: &str, handler: MessageHandler) -> Result<SubscriptionId> {
        self.ensure_open()?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.subscriptions.write().await.push(Subscription {
            id,
            pattern: pattern.to_string(),
            handler,
        });
        Ok(id)
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> Result<()> {
        self.subscriptions.write().await.retain(|s| s.id != id);
        Ok(())
    }

    async fn request(
        &self,
        subject: &str,
        payload: Vec<u8>,
        timeout: Duration,
    ) -> Result<Vec<u8>> {
        self.ensure_open()?;
        let (tx, rx) = oneshot::channel::<Vec<u8>>();
        // First respond wins; the sender slot is shared across all matching
        // handlers and taken exactly once.
        let slot = Arc::new(Mutex::new(Some(tx)));

        {
            let subscriptions = self.subscriptions.read().await;
            for sub in subscriptions
                .iter()
                .filter(|s| subject_matches(&s.pattern, subject))
            {
                let handler = sub.handler.clone();
                let slot = slot.clone();
                let reply = Box::new(move |data: Vec<u8>| {
                    let fut: futures_util::future::BoxFuture<'static, Result<()>> =
                        Box::pin(async move {
                            if let Some(tx) = slot.lock().unwrap().take() {
                                let _ = tx.send(data);
                            }
                            Ok(())
                        });
                    fut
                });
                let msg =
                    BusMessage::with_reply(subject.to_string(), payload.clone(), reply);
                tokio::spawn(async move { handler(msg).await });
            }
        }

        // Hold the slot so an unanswered request times out instead of
        // failing early when no handler matched.
        let _slot = slot;
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(data)) => Ok(data),
            Ok(Err(_)) => Err(Error::Transport("request dropped without reply".into())),
            Err(_) => Err(Error::Timeout),
        }
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        self.subscriptions.write().await.clear();
        Ok(())
    }
}

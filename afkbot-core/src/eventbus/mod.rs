//! src/eventbus/mod.rs
//!
//! Provides an in-process event bus that supports guaranteed delivery
//! to multiple subscribers via bounded MPSC queues. This is the surface
//! the operator console subscribes to for live chat and status traffic.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Mutex, mpsc, watch};
use tracing::warn;
use uuid::Uuid;

use afkbot_common::models::chat::{ChatDirection, ChatRecord};
use afkbot_common::models::connection::ConnectionState;

/// Everything the supervisor publishes about the fleet.
#[derive(Debug, Clone)]
pub enum BotEvent {
    /// A chat line sent or received by one account.
    ChatMessage {
        account_id: Uuid,
        direction: ChatDirection,
        text: String,
        timestamp: DateTime<Utc>,
    },

    /// An account moved through the connection state machine.
    StatusChanged {
        account_id: Uuid,
        state: ConnectionState,
        last_error: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// One account dropped out of a spam job; the job itself continues.
    SpamAccountFailed {
        spam_id: Uuid,
        account_id: Uuid,
        reason: String,
    },

    /// System-wide event for debugging or administration.
    SystemMessage(String),

    /// Periodic heartbeat event.
    Tick,
}

impl BotEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            BotEvent::ChatMessage { .. } => "chat_message",
            BotEvent::StatusChanged { .. } => "status_changed",
            BotEvent::SpamAccountFailed { .. } => "spam_account_failed",
            BotEvent::SystemMessage(_) => "system_message",
            BotEvent::Tick => "tick",
        }
    }
}

/// Each subscriber gets its own `mpsc::Sender<BotEvent>` for guaranteed
/// delivery.
///
/// - If the subscriber's channel buffer fills, `publish` will await
///   until there's space (backpressure).
/// - If the subscriber has dropped the `Receiver`, the channel is closed
///   and sending returns an error.
#[derive(Clone)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<mpsc::Sender<BotEvent>>>>,
    dropped: Arc<AtomicU64>,
    shutdown_tx: watch::Sender<bool>,
    pub shutdown_rx: watch::Receiver<bool>,
}

/// Default size for each subscriber's buffer.
const DEFAULT_BUFFER_SIZE: usize = 10000;

impl EventBus {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            subscribers: Arc::new(Mutex::new(vec![])),
            dropped: Arc::new(AtomicU64::new(0)),
            shutdown_tx: tx,
            shutdown_rx: rx,
        }
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.shutdown_rx.borrow()
    }

    /// Returns a receiver on which events will be delivered.
    pub async fn subscribe(&self, buffer_size: Option<usize>) -> mpsc::Receiver<BotEvent> {
        let size = buffer_size.unwrap_or(DEFAULT_BUFFER_SIZE);
        let (tx, rx) = mpsc::channel(size);
        let mut subs = self.subscribers.lock().await;
        subs.push(tx);
        rx
    }

    /// Publish an event to all subscribers.
    pub async fn publish(&self, event: BotEvent) {
        let senders = {
            let subs = self.subscribers.lock().await;
            subs.clone()
        };
        for s in senders {
            let _ = s.send(event.clone()).await;
        }
    }

    /// Publish without waiting for subscriber capacity. A subscriber
    /// whose buffer is full loses this event (counted); the publisher is
    /// never stalled. This is the variant the supervisor uses, so one
    /// wedged subscriber cannot stop connection scheduling.
    pub async fn try_publish(&self, event: BotEvent) {
        let senders = {
            let subs = self.subscribers.lock().await;
            subs.clone()
        };
        for s in senders {
            match s.try_send(event.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(ev)) => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    warn!("subscriber queue full; dropping {}", ev.event_type());
                }
                Err(TrySendError::Closed(_)) => {}
            }
        }
    }

    /// Number of events lost to full subscriber queues.
    pub fn dropped_events(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Convenience method: publish the bus view of a chat record.
    pub async fn publish_chat(&self, record: &ChatRecord) {
        self.publish(BotEvent::ChatMessage {
            account_id: record.account_id,
            direction: record.direction,
            text: record.text.clone(),
            timestamp: record.timestamp,
        })
        .await;
    }

    /// Non-stalling counterpart of `publish_chat`.
    pub async fn try_publish_chat(&self, record: &ChatRecord) {
        self.try_publish(BotEvent::ChatMessage {
            account_id: record.account_id,
            direction: record.direction,
            text: record.text.clone(),
            timestamp: record.timestamp,
        })
        .await;
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

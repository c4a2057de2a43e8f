//! src/bridge.rs
//!
//! The EventBridge is the only path from a protocol session's threads into
//! the supervisor's scheduling domain. Posting never blocks the caller:
//! when the supervisor's queue is full the event is dropped and counted,
//! because blocking an I/O thread here can deadlock against the protocol
//! library's internal locks.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::sessions::SessionEvent;

/// A session event tagged with the account it belongs to and the session
/// incarnation that produced it. A disconnect-then-reconnect gives the
/// account a fresh `session_id`; events still arriving from the old
/// incarnation's threads no longer match and are discarded by the
/// supervisor.
#[derive(Debug)]
pub struct BridgedEvent {
    pub account_id: Uuid,
    pub session_id: Uuid,
    pub event: SessionEvent,
}

#[derive(Clone)]
pub struct EventBridge {
    tx: mpsc::Sender<BridgedEvent>,
    dropped: Arc<AtomicU64>,
}

/// Create a bridge and the receiving end the supervisor consumes.
/// Submission order per sender is preserved by the underlying channel.
pub fn channel(capacity: usize) -> (EventBridge, mpsc::Receiver<BridgedEvent>) {
    let (tx, rx) = mpsc::channel(capacity);
    (
        EventBridge {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        },
        rx,
    )
}

impl EventBridge {
    /// Forward one event into the scheduling domain. Never blocks; a full
    /// queue drops the event, a closed queue (supervisor shut down) drops
    /// it silently.
    pub fn post(&self, account_id: Uuid, session_id: Uuid, event: SessionEvent) {
        match self.tx.try_send(BridgedEvent {
            account_id,
            session_id,
            event,
        }) {
            Ok(()) => {}
            Err(TrySendError::Full(ev)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(
                    "event bridge queue full; dropping {:?} for account {}",
                    ev.event, account_id
                );
            }
            Err(TrySendError::Closed(_)) => {
                debug!("event bridge closed; dropping event for account {}", account_id);
            }
        }
    }

    /// Number of events dropped because the queue was full.
    pub fn dropped_events(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn sink(&self, account_id: Uuid, session_id: Uuid) -> EventSink {
        EventSink {
            account_id,
            session_id,
            bridge: self.clone(),
        }
    }
}

/// Per-incarnation posting handle given to a protocol session. Cheap to
/// clone and safe to call from any thread.
#[derive(Clone)]
pub struct EventSink {
    account_id: Uuid,
    session_id: Uuid,
    bridge: EventBridge,
}

impl EventSink {
    pub fn post(&self, event: SessionEvent) {
        self.bridge.post(self.account_id, self.session_id, event);
    }
}

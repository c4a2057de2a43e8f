//! src/test_utils/mod.rs
//!
//! Shared fakes for supervisor and repository tests: an in-memory
//! database and a scriptable session factory that stands in for the
//! protocol library.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use uuid::Uuid;

use afkbot_common::models::account::Account;
use afkbot_common::models::connection::{HandshakeFailure, HandshakeFailureKind};

use crate::Error;
use crate::bridge::EventSink;
use crate::db::Database;
use crate::sessions::{ProtocolSession, SessionControl, SessionFactory};

/// Fresh in-memory database with the schema applied.
pub async fn setup_test_database() -> Database {
    let db = Database::open_in_memory()
        .await
        .expect("in-memory database");
    db.migrate().await.expect("migrations");
    db
}

/// What the next `connect` for an account should do.
#[derive(Debug, Clone, Copy)]
pub enum FakeConnectOutcome {
    Succeed,
    Fail(HandshakeFailureKind),
    /// Hang until cancelled, then return a cancelled failure.
    Block,
}

#[derive(Default)]
struct CancelFlag {
    cancelled: Mutex<bool>,
    cv: Condvar,
}

impl CancelFlag {
    fn cancel(&self) {
        let mut flag = self.cancelled.lock().unwrap();
        *flag = true;
        self.cv.notify_all();
    }

    fn wait(&self) {
        let mut flag = self.cancelled.lock().unwrap();
        while !*flag {
            flag = self.cv.wait(flag).unwrap();
        }
    }
}

struct FakeControl(Arc<CancelFlag>);

impl SessionControl for FakeControl {
    fn cancel(&self) {
        self.0.cancel();
    }
}

// Losing the control handle means the supervisor is gone; unblock any
// scripted `Block` handshake so runtime shutdown never waits on it.
impl Drop for FakeControl {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

/// Scriptable stand-in for the protocol library. Connect outcomes are
/// queued per account (default: succeed); sent chat lines and jumps are
/// recorded; the sink of each successfully connected session is kept so
/// tests can inject inbound events.
#[derive(Default)]
pub struct FakeSessionFactory {
    scripts: Mutex<HashMap<Uuid, VecDeque<FakeConnectOutcome>>>,
    sinks: Arc<Mutex<HashMap<Uuid, EventSink>>>,
    sent: Arc<Mutex<Vec<(Uuid, String)>>>,
    jumps: Arc<AtomicU64>,
}

impl FakeSessionFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the outcome of the account's next connect attempt.
    pub fn push_outcome(&self, account_id: Uuid, outcome: FakeConnectOutcome) {
        self.scripts
            .lock()
            .unwrap()
            .entry(account_id)
            .or_default()
            .push_back(outcome);
    }

    /// The sink of the account's most recent live session, for injecting
    /// inbound events from a test.
    pub fn sink(&self, account_id: Uuid) -> Option<EventSink> {
        self.sinks.lock().unwrap().get(&account_id).cloned()
    }

    pub fn sent(&self) -> Vec<(Uuid, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_by(&self, account_id: Uuid) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| *id == account_id)
            .map(|(_, text)| text.clone())
            .collect()
    }

    pub fn jump_count(&self) -> u64 {
        self.jumps.load(Ordering::SeqCst)
    }

    fn next_outcome(&self, account_id: Uuid) -> FakeConnectOutcome {
        self.scripts
            .lock()
            .unwrap()
            .get_mut(&account_id)
            .and_then(|q| q.pop_front())
            .unwrap_or(FakeConnectOutcome::Succeed)
    }
}

struct FakeSession {
    account_id: Uuid,
    outcome: FakeConnectOutcome,
    cancel: Arc<CancelFlag>,
    sent: Arc<Mutex<Vec<(Uuid, String)>>>,
    jumps: Arc<AtomicU64>,
    sinks: Arc<Mutex<HashMap<Uuid, EventSink>>>,
}

impl ProtocolSession for FakeSession {
    fn connect(
        &mut self,
        _address: &str,
        _account: &Account,
        events: EventSink,
    ) -> Result<(), HandshakeFailure> {
        match self.outcome {
            FakeConnectOutcome::Succeed => {
                self.sinks.lock().unwrap().insert(self.account_id, events);
                Ok(())
            }
            FakeConnectOutcome::Fail(kind) => {
                Err(HandshakeFailure::new(kind, "scripted failure"))
            }
            FakeConnectOutcome::Block => {
                self.cancel.wait();
                Err(HandshakeFailure::cancelled())
            }
        }
    }

    fn send_chat(&mut self, text: &str) -> Result<(), Error> {
        self.sent
            .lock()
            .unwrap()
            .push((self.account_id, text.to_string()));
        Ok(())
    }

    fn jump(&mut self) -> Result<(), Error> {
        self.jumps.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn disconnect(&mut self) {}
}

impl SessionFactory for FakeSessionFactory {
    fn create(&self, account: &Account) -> (Box<dyn ProtocolSession>, Arc<dyn SessionControl>) {
        let account_id = account.account_id;
        let cancel = Arc::new(CancelFlag::default());
        let session = FakeSession {
            account_id,
            outcome: self.next_outcome(account_id),
            cancel: Arc::clone(&cancel),
            sent: Arc::clone(&self.sent),
            jumps: Arc::clone(&self.jumps),
            sinks: Arc::clone(&self.sinks),
        };
        (Box::new(session), Arc::new(FakeControl(cancel)))
    }
}

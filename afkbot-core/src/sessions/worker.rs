//! src/sessions/worker.rs
//!
//! One dedicated blocking worker per live session. The worker performs
//! the handshake, reports the outcome through the bridge, then serves a
//! command loop until told to disconnect. All blocking I/O happens here;
//! the supervisor only ever pushes commands into the channel.

use std::sync::Arc;
use std::sync::mpsc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use afkbot_common::models::account::Account;

use crate::bridge::EventSink;
use crate::sessions::{ProtocolSession, SessionControl, SessionEvent};

#[derive(Debug)]
pub enum SessionCommand {
    SendChat(String),
    Jump,
    Disconnect,
}

/// Supervisor-side handle to a session worker. Owned exclusively by the
/// account's registry entry.
pub struct SessionHandle {
    cmd_tx: mpsc::Sender<SessionCommand>,
    control: Arc<dyn SessionControl>,
}

impl SessionHandle {
    /// Push a command to the worker. Returns false if the worker is gone.
    pub fn send(&self, cmd: SessionCommand) -> bool {
        self.cmd_tx.send(cmd).is_ok()
    }

    /// Unblock an in-flight handshake; the worker observes this as a
    /// `cancelled` handshake failure.
    pub fn cancel(&self) {
        self.control.cancel();
    }
}

pub fn spawn(
    account_id: Uuid,
    mut session: Box<dyn ProtocolSession>,
    control: Arc<dyn SessionControl>,
    address: String,
    account: Account,
    sink: EventSink,
) -> SessionHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel::<SessionCommand>();

    tokio::task::spawn_blocking(move || {
        debug!("session worker for {} connecting to {}", account_id, address);
        match session.connect(&address, &account, sink.clone()) {
            Ok(()) => {
                info!("account {} completed handshake with {}", account_id, address);
                sink.post(SessionEvent::HandshakeSucceeded);
                run_command_loop(account_id, session.as_mut(), &cmd_rx);
                session.disconnect();
                debug!("session worker for {} ended", account_id);
            }
            Err(failure) => {
                warn!("account {} handshake failed: {}", account_id, failure);
                sink.post(SessionEvent::HandshakeFailed(failure));
            }
        }
    });

    SessionHandle { cmd_tx, control }
}

fn run_command_loop(
    account_id: Uuid,
    session: &mut dyn ProtocolSession,
    cmd_rx: &mpsc::Receiver<SessionCommand>,
) {
    loop {
        match cmd_rx.recv() {
            Ok(SessionCommand::SendChat(text)) => {
                if let Err(e) = session.send_chat(&text) {
                    warn!("account {} failed to send chat: {}", account_id, e);
                }
            }
            Ok(SessionCommand::Jump) => {
                if let Err(e) = session.jump() {
                    warn!("account {} anti-idle jump failed: {}", account_id, e);
                }
            }
            Ok(SessionCommand::Disconnect) => break,
            // Supervisor dropped the handle; treat it like a disconnect.
            Err(_) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sessions::MockProtocolSession;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::time::{Duration, sleep};

    struct NoopControl;
    impl SessionControl for NoopControl {
        fn cancel(&self) {}
    }

    fn offline_account() -> Account {
        Account::new(
            afkbot_common::models::account::CredentialKind::Token,
            None,
            Some("tester".into()),
        )
    }

    #[tokio::test]
    async fn reports_success_and_serves_commands() {
        let (bridge, mut rx) = crate::bridge::channel(16);
        let account = offline_account();
        let account_id = account.account_id;

        let sent = Arc::new(AtomicBool::new(false));
        let sent2 = sent.clone();

        let mut session = MockProtocolSession::new();
        session.expect_connect().returning(|_, _, _| Ok(()));
        session.expect_send_chat().returning(move |text| {
            assert_eq!(text, "hi");
            sent2.store(true, Ordering::SeqCst);
            Ok(())
        });
        session.expect_disconnect().returning(|| ());

        let handle = spawn(
            account_id,
            Box::new(session),
            Arc::new(NoopControl),
            "localhost:25565".into(),
            account,
            bridge.sink(account_id, Uuid::new_v4()),
        );

        let ev = rx.recv().await.unwrap();
        assert!(matches!(ev.event, SessionEvent::HandshakeSucceeded));

        assert!(handle.send(SessionCommand::SendChat("hi".into())));
        assert!(handle.send(SessionCommand::Disconnect));

        // Give the blocking worker a moment to drain the channel.
        for _ in 0..50 {
            if sent.load(Ordering::SeqCst) {
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }
        assert!(sent.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn reports_handshake_failure() {
        use afkbot_common::models::connection::{HandshakeFailure, HandshakeFailureKind};

        let (bridge, mut rx) = crate::bridge::channel(16);
        let account = offline_account();
        let account_id = account.account_id;

        let mut session = MockProtocolSession::new();
        session.expect_connect().returning(|_, _, _| {
            Err(HandshakeFailure::new(
                HandshakeFailureKind::Refused,
                "connection refused",
            ))
        });

        let _handle = spawn(
            account_id,
            Box::new(session),
            Arc::new(NoopControl),
            "localhost:25565".into(),
            account,
            bridge.sink(account_id, Uuid::new_v4()),
        );

        let ev = rx.recv().await.unwrap();
        match ev.event {
            SessionEvent::HandshakeFailed(f) => {
                assert_eq!(f.kind, HandshakeFailureKind::Refused)
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }
}

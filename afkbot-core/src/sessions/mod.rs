// File: src/sessions/mod.rs

use std::io;
use std::sync::Arc;

use afkbot_common::models::account::Account;
use afkbot_common::models::connection::{HandshakeFailure, HandshakeFailureKind};

use crate::Error;
use crate::bridge::EventSink;

pub mod worker;

/// Events a protocol session pushes at the supervisor. Delivered through
/// an [`EventSink`], possibly from the protocol library's own threads.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    HandshakeSucceeded,
    HandshakeFailed(HandshakeFailure),
    ChatReceived { text: String },
    WorldChanged { world: String },
    PeerDisconnected { reason: String },
    PeerKicked { reason: String },
}

/// One account's live connection to the game server. Implementations wrap
/// the external protocol library; the supervisor never sees packets, only
/// this surface. All methods may block and are only ever called from the
/// session's dedicated worker.
#[cfg_attr(test, mockall::automock)]
pub trait ProtocolSession: Send {
    /// Perform the blocking handshake (auth + join). On success the
    /// session keeps `events` and uses it to deliver inbound
    /// [`SessionEvent`]s until disconnected.
    fn connect(
        &mut self,
        address: &str,
        account: &Account,
        events: EventSink,
    ) -> Result<(), HandshakeFailure>;

    fn send_chat(&mut self, text: &str) -> Result<(), Error>;

    /// Anti-idle action: a trivial movement the server notices.
    fn jump(&mut self) -> Result<(), Error>;

    fn disconnect(&mut self);
}

/// Supervisor-side cancellation handle for a session. `cancel()` must
/// unblock an in-flight `connect`, which then returns a
/// `cancelled` handshake failure.
pub trait SessionControl: Send + Sync {
    fn cancel(&self);
}

/// Creates sessions; injected into the supervisor so the protocol library
/// stays an external collaborator.
#[cfg_attr(test, mockall::automock)]
pub trait SessionFactory: Send + Sync {
    fn create(&self, account: &Account) -> (Box<dyn ProtocolSession>, Arc<dyn SessionControl>);
}

/// Split "host[:port]" into host and port, defaulting to 25565.
pub fn parse_server_address(address: &str) -> Result<(String, u16), Error> {
    let trimmed = address.trim();
    if trimmed.is_empty() {
        return Err(Error::Configuration("server address is not set".into()));
    }
    match trimmed.rsplit_once(':') {
        Some((host, port)) => {
            let port: u16 = port
                .parse()
                .map_err(|_| Error::Configuration(format!("invalid port in address '{}'", trimmed)))?;
            Ok((host.to_string(), port))
        }
        None => Ok((trimmed.to_string(), 25565)),
    }
}

/// Map a connect-time I/O error to a handshake failure kind.
pub fn classify_connect_error(err: &io::Error) -> HandshakeFailureKind {
    match err.kind() {
        io::ErrorKind::ConnectionRefused
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted => HandshakeFailureKind::Refused,
        io::ErrorKind::TimedOut => HandshakeFailureKind::Timeout,
        io::ErrorKind::NotFound => HandshakeFailureKind::Dns,
        _ => {
            let msg = err.to_string();
            if msg.contains("lookup") || msg.contains("resolve") || msg.contains("name") {
                HandshakeFailureKind::Dns
            } else {
                HandshakeFailureKind::Protocol
            }
        }
    }
}

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Lifecycle state of one account's connection. The state machine in
/// afkbot-core is the only writer; everything else derives from this
/// (`is_online` in particular is never an independent flag).
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Disconnecting,
    Failed,
}

impl ConnectionState {
    pub fn is_online(self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Reconnecting => write!(f, "reconnecting"),
            ConnectionState::Disconnecting => write!(f, "disconnecting"),
            ConnectionState::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeFailureKind {
    Dns,
    Refused,
    Timeout,
    AuthRejected,
    Protocol,
    Cancelled,
}

impl fmt::Display for HandshakeFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandshakeFailureKind::Dns => write!(f, "dns"),
            HandshakeFailureKind::Refused => write!(f, "refused"),
            HandshakeFailureKind::Timeout => write!(f, "timeout"),
            HandshakeFailureKind::AuthRejected => write!(f, "auth-rejected"),
            HandshakeFailureKind::Protocol => write!(f, "protocol"),
            HandshakeFailureKind::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Why a connect-time handshake did not end in `Connected`. Always
/// surfaced; never converted into a fabricated success.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct HandshakeFailure {
    pub kind: HandshakeFailureKind,
    pub message: String,
}

impl HandshakeFailure {
    pub fn new(kind: HandshakeFailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn cancelled() -> Self {
        Self::new(HandshakeFailureKind::Cancelled, "connection cancelled")
    }
}

/// Read-only live status of one account, as exposed to the API layer and
/// the operator console.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ConnectionSnapshot {
    pub account_id: Uuid,
    pub state: ConnectionState,
    pub last_error: Option<String>,
    pub last_seen: Option<DateTime<Utc>>,
}

impl ConnectionSnapshot {
    pub fn offline(account_id: Uuid) -> Self {
        Self {
            account_id,
            state: ConnectionState::Disconnected,
            last_error: None,
            last_seen: None,
        }
    }
}

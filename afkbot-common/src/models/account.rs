use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How an account authenticates against the game server.
///
/// `Password` is a full account (email + password handled by the external
/// auth flow); `Token` is an offline-mode account that joins by nickname
/// and is only usable when the server settings allow offline accounts.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum CredentialKind {
    Password,
    Token,
}

impl fmt::Display for CredentialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialKind::Password => write!(f, "password"),
            CredentialKind::Token => write!(f, "token"),
        }
    }
}

impl FromStr for CredentialKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "password" => Ok(CredentialKind::Password),
            "token" => Ok(CredentialKind::Token),
            _ => Err(format!("Invalid credential kind: {}", s)),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Account {
    pub account_id: Uuid,
    pub kind: CredentialKind,
    pub email: Option<String>,
    pub nickname: Option<String>,
    pub is_online: bool,
    pub last_seen: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn new(kind: CredentialKind, email: Option<String>, nickname: Option<String>) -> Self {
        Self {
            account_id: Uuid::new_v4(),
            kind,
            email,
            nickname,
            is_online: false,
            last_seen: None,
            created_at: Utc::now(),
        }
    }

    /// In-game username: the nickname if set, else the local part of the
    /// email address, else a generic fallback.
    pub fn username(&self) -> String {
        if let Some(nick) = &self.nickname {
            if !nick.is_empty() {
                return nick.clone();
            }
        }
        if let Some(email) = &self.email {
            if let Some(local) = email.split('@').next() {
                if !local.is_empty() {
                    return local.to_string();
                }
            }
        }
        "Player".to_string()
    }
}

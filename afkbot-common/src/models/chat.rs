use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum ChatDirection {
    Incoming,
    Outgoing,
}

impl fmt::Display for ChatDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatDirection::Incoming => write!(f, "incoming"),
            ChatDirection::Outgoing => write!(f, "outgoing"),
        }
    }
}

impl FromStr for ChatDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "incoming" => Ok(ChatDirection::Incoming),
            "outgoing" => Ok(ChatDirection::Outgoing),
            _ => Err(format!("Invalid chat direction: {}", s)),
        }
    }
}

/// A single line of chat traffic, appended by the supervisor on every
/// send and on every (deduplicated) receive.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChatRecord {
    pub record_id: Uuid,
    pub account_id: Uuid,
    pub text: String,
    pub direction: ChatDirection,
    pub timestamp: DateTime<Utc>,
}

impl ChatRecord {
    pub fn new(account_id: Uuid, text: impl Into<String>, direction: ChatDirection) -> Self {
        Self {
            record_id: Uuid::new_v4(),
            account_id,
            text: text.into(),
            direction,
            timestamp: Utc::now(),
        }
    }
}

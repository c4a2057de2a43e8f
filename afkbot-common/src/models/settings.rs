use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One entry of a timed message sequence. `delay_seconds` is the delay
/// before this message, relative to the previous one in the sequence.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct TimedMessage {
    pub text: String,
    pub delay_seconds: u64,
}

impl TimedMessage {
    pub fn new(text: impl Into<String>, delay_seconds: u64) -> Self {
        Self {
            text: text.into(),
            delay_seconds,
        }
    }
}

/// Operator-editable server settings. A single record; mutable at any
/// time, but the supervisor captures a copy at connect time, so edits
/// only affect subsequently started sessions.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ServerSettings {
    pub server_address: String,
    pub login_delay_seconds: u64,
    pub offline_accounts_enabled: bool,
    pub anti_idle_enabled: bool,
    pub auto_reconnect_enabled: bool,
    pub login_messages_enabled: bool,
    pub login_messages: Vec<TimedMessage>,
    pub world_change_messages_enabled: bool,
    pub world_change_messages: Vec<TimedMessage>,
    pub updated_at: DateTime<Utc>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            server_address: String::new(),
            login_delay_seconds: 5,
            offline_accounts_enabled: true,
            anti_idle_enabled: false,
            auto_reconnect_enabled: false,
            login_messages_enabled: false,
            login_messages: Vec::new(),
            world_change_messages_enabled: false,
            world_change_messages: Vec::new(),
            updated_at: Utc::now(),
        }
    }
}

// ================================================================
// File: afkbot-common/src/error.rs
// ================================================================

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Operation already in progress for account {0}")]
    AlreadyInProgress(Uuid),

    #[error("Account {0} is not connected")]
    NotConnected(Uuid),

    #[error("Spam validation error: {0}")]
    SpamValidation(String),

    #[error("Invalid state transition: {0}")]
    InvalidTransition(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Timeout error: {0}")]
    Timeout(#[from] tokio::time::error::Elapsed),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Event bus error: {0}")]
    EventBus(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid credential kind: {0}")]
    InvalidCredentialKind(String),
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Parse(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Parse(s.to_string())
    }
}

impl From<anyhow::Error> for Error {
    fn from(e: anyhow::Error) -> Self {
        Error::Parse(e.to_string())
    }
}

impl From<uuid::Error> for Error {
    fn from(e: uuid::Error) -> Self {
        Error::Parse(e.to_string())
    }
}

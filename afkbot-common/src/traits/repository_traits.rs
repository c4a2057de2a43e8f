use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Error;
use crate::models::account::Account;
use crate::models::chat::ChatRecord;
use crate::models::settings::ServerSettings;

/// Persisted account records. The supervisor only reads accounts and
/// mirrors `is_online`/`last_seen` back; it never owns the stored data.
#[async_trait]
pub trait AccountRepository: Send + Sync {
    async fn create_account(&self, account: &Account) -> Result<(), Error>;
    async fn get_account(&self, account_id: Uuid) -> Result<Option<Account>, Error>;
    async fn list_accounts(&self) -> Result<Vec<Account>, Error>;
    async fn delete_account(&self, account_id: Uuid) -> Result<(), Error>;

    /// Mirror the runtime connection state onto the stored record.
    async fn set_online(
        &self,
        account_id: Uuid,
        is_online: bool,
        last_seen: DateTime<Utc>,
    ) -> Result<(), Error>;
}

/// The singleton server-settings record.
#[async_trait]
pub trait SettingsRepository: Send + Sync {
    /// Returns the settings, creating a default record if none exists.
    async fn get_settings(&self) -> Result<ServerSettings, Error>;
    async fn update_settings(&self, settings: &ServerSettings) -> Result<(), Error>;
}

#[async_trait]
pub trait ChatLogRepository: Send + Sync {
    async fn append(&self, record: &ChatRecord) -> Result<(), Error>;
    async fn recent(&self, limit: i64) -> Result<Vec<ChatRecord>, Error>;
    async fn recent_for_account(
        &self,
        account_id: Uuid,
        limit: i64,
    ) -> Result<Vec<ChatRecord>, Error>;
}

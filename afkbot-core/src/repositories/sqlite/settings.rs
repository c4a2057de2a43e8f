//! src/repositories/sqlite/settings.rs
//!
//! The server settings are a singleton row. `get_settings` creates the
//! default record on first read so a fresh install always has something
//! the operator can edit.

use sqlx::{Pool, Row, Sqlite};

use afkbot_common::models::settings::{ServerSettings, TimedMessage};
use afkbot_common::traits::repository_traits::SettingsRepository;

use crate::Error;
use crate::utils::time::{from_epoch, to_epoch};

const SETTINGS_ID: &str = "default";

#[derive(Clone)]
pub struct SqliteSettingsRepository {
    pool: Pool<Sqlite>,
}

impl SqliteSettingsRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    async fn fetch(&self) -> Result<Option<ServerSettings>, Error> {
        let row = sqlx::query(
            r#"
            SELECT server_address, login_delay_seconds, offline_accounts_enabled,
                   anti_idle_enabled, auto_reconnect_enabled,
                   login_messages_enabled, login_messages,
                   world_change_messages_enabled, world_change_messages,
                   updated_at
            FROM server_settings
            WHERE settings_id = ?
            "#,
        )
        .bind(SETTINGS_ID)
        .fetch_optional(&self.pool)
        .await?;

        let Some(r) = row else { return Ok(None) };

        let login_messages: Vec<TimedMessage> =
            serde_json::from_str(r.try_get::<String, _>("login_messages")?.as_str())?;
        let world_change_messages: Vec<TimedMessage> =
            serde_json::from_str(r.try_get::<String, _>("world_change_messages")?.as_str())?;

        Ok(Some(ServerSettings {
            server_address: r.try_get("server_address")?,
            login_delay_seconds: r.try_get::<i64, _>("login_delay_seconds")? as u64,
            offline_accounts_enabled: r.try_get::<i64, _>("offline_accounts_enabled")? != 0,
            anti_idle_enabled: r.try_get::<i64, _>("anti_idle_enabled")? != 0,
            auto_reconnect_enabled: r.try_get::<i64, _>("auto_reconnect_enabled")? != 0,
            login_messages_enabled: r.try_get::<i64, _>("login_messages_enabled")? != 0,
            login_messages,
            world_change_messages_enabled: r.try_get::<i64, _>("world_change_messages_enabled")?
                != 0,
            world_change_messages,
            updated_at: from_epoch(r.try_get("updated_at")?),
        }))
    }
}

#[async_trait::async_trait]
impl SettingsRepository for SqliteSettingsRepository {
    async fn get_settings(&self) -> Result<ServerSettings, Error> {
        if let Some(settings) = self.fetch().await? {
            return Ok(settings);
        }
        let defaults = ServerSettings::default();
        self.update_settings(&defaults).await?;
        Ok(defaults)
    }

    async fn update_settings(&self, settings: &ServerSettings) -> Result<(), Error> {
        let login_messages = serde_json::to_string(&settings.login_messages)?;
        let world_change_messages = serde_json::to_string(&settings.world_change_messages)?;

        sqlx::query(
            r#"
            INSERT INTO server_settings
               (settings_id, server_address, login_delay_seconds, offline_accounts_enabled,
                anti_idle_enabled, auto_reconnect_enabled,
                login_messages_enabled, login_messages,
                world_change_messages_enabled, world_change_messages, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (settings_id) DO UPDATE SET
                server_address = excluded.server_address,
                login_delay_seconds = excluded.login_delay_seconds,
                offline_accounts_enabled = excluded.offline_accounts_enabled,
                anti_idle_enabled = excluded.anti_idle_enabled,
                auto_reconnect_enabled = excluded.auto_reconnect_enabled,
                login_messages_enabled = excluded.login_messages_enabled,
                login_messages = excluded.login_messages,
                world_change_messages_enabled = excluded.world_change_messages_enabled,
                world_change_messages = excluded.world_change_messages,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(SETTINGS_ID)
        .bind(&settings.server_address)
        .bind(settings.login_delay_seconds as i64)
        .bind(settings.offline_accounts_enabled as i64)
        .bind(settings.anti_idle_enabled as i64)
        .bind(settings.auto_reconnect_enabled as i64)
        .bind(settings.login_messages_enabled as i64)
        .bind(login_messages)
        .bind(settings.world_change_messages_enabled as i64)
        .bind(world_change_messages)
        .bind(to_epoch(settings.updated_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

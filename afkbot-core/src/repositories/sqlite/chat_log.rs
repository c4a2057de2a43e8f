//! src/repositories/sqlite/chat_log.rs

use std::str::FromStr;

use sqlx::{Pool, Row, Sqlite};
use uuid::Uuid;

use afkbot_common::models::chat::{ChatDirection, ChatRecord};
use afkbot_common::traits::repository_traits::ChatLogRepository;

use crate::Error;
use crate::utils::time::{from_epoch, to_epoch};

#[derive(Clone)]
pub struct SqliteChatLogRepository {
    pool: Pool<Sqlite>,
}

impl SqliteChatLogRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }
}

fn row_to_record(r: &sqlx::sqlite::SqliteRow) -> Result<ChatRecord, Error> {
    let record_id: String = r.try_get("record_id")?;
    let account_id: String = r.try_get("account_id")?;
    let direction: String = r.try_get("direction")?;

    Ok(ChatRecord {
        record_id: Uuid::parse_str(&record_id)?,
        account_id: Uuid::parse_str(&account_id)?,
        text: r.try_get("message")?,
        direction: ChatDirection::from_str(&direction).map_err(Error::Parse)?,
        timestamp: from_epoch(r.try_get("timestamp")?),
    })
}

#[async_trait::async_trait]
impl ChatLogRepository for SqliteChatLogRepository {
    async fn append(&self, record: &ChatRecord) -> Result<(), Error> {
        sqlx::query(
            r#"
            INSERT INTO chat_messages (record_id, account_id, direction, message, timestamp)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.record_id.to_string())
        .bind(record.account_id.to_string())
        .bind(record.direction.to_string())
        .bind(&record.text)
        .bind(to_epoch(record.timestamp))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn recent(&self, limit: i64) -> Result<Vec<ChatRecord>, Error> {
        let rows = sqlx::query(
            r#"
            SELECT record_id, account_id, direction, message, timestamp
            FROM chat_messages
            ORDER BY timestamp DESC, record_id
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_record).collect()
    }

    async fn recent_for_account(
        &self,
        account_id: Uuid,
        limit: i64,
    ) -> Result<Vec<ChatRecord>, Error> {
        let rows = sqlx::query(
            r#"
            SELECT record_id, account_id, direction, message, timestamp
            FROM chat_messages
            WHERE account_id = ?
            ORDER BY timestamp DESC, record_id
            LIMIT ?
            "#,
        )
        .bind(account_id.to_string())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_record).collect()
    }
}

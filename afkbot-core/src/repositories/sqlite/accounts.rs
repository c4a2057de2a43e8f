//! src/repositories/sqlite/accounts.rs

use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::{Pool, Row, Sqlite};
use uuid::Uuid;

use afkbot_common::models::account::{Account, CredentialKind};
use afkbot_common::traits::repository_traits::AccountRepository;

use crate::Error;
use crate::utils::time::{from_epoch, to_epoch};

#[derive(Clone)]
pub struct SqliteAccountRepository {
    pool: Pool<Sqlite>,
}

impl SqliteAccountRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }
}

fn row_to_account(r: &sqlx::sqlite::SqliteRow) -> Result<Account, Error> {
    let id_str: String = r.try_get("account_id")?;
    let kind_str: String = r.try_get("credential_kind")?;
    let kind = CredentialKind::from_str(&kind_str).map_err(Error::InvalidCredentialKind)?;
    let last_seen: Option<i64> = r.try_get("last_seen")?;
    let created_at: i64 = r.try_get("created_at")?;
    let is_online: i64 = r.try_get("is_online")?;

    Ok(Account {
        account_id: Uuid::parse_str(&id_str)?,
        kind,
        email: r.try_get("email")?,
        nickname: r.try_get("nickname")?,
        is_online: is_online != 0,
        last_seen: last_seen.map(from_epoch),
        created_at: from_epoch(created_at),
    })
}

#[async_trait::async_trait]
impl AccountRepository for SqliteAccountRepository {
    async fn create_account(&self, account: &Account) -> Result<(), Error> {
        sqlx::query(
            r#"
            INSERT INTO accounts
               (account_id, credential_kind, email, nickname, is_online, last_seen, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(account.account_id.to_string())
        .bind(account.kind.to_string())
        .bind(&account.email)
        .bind(&account.nickname)
        .bind(account.is_online as i64)
        .bind(account.last_seen.map(to_epoch))
        .bind(to_epoch(account.created_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_account(&self, account_id: Uuid) -> Result<Option<Account>, Error> {
        let row = sqlx::query(
            r#"
            SELECT account_id, credential_kind, email, nickname, is_online, last_seen, created_at
            FROM accounts
            WHERE account_id = ?
            "#,
        )
        .bind(account_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) => Ok(Some(row_to_account(&r)?)),
            None => Ok(None),
        }
    }

    async fn list_accounts(&self) -> Result<Vec<Account>, Error> {
        let rows = sqlx::query(
            r#"
            SELECT account_id, credential_kind, email, nickname, is_online, last_seen, created_at
            FROM accounts
            ORDER BY created_at
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_account).collect()
    }

    async fn delete_account(&self, account_id: Uuid) -> Result<(), Error> {
        let result = sqlx::query("DELETE FROM accounts WHERE account_id = ?")
            .bind(account_id.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("account {}", account_id)));
        }
        Ok(())
    }

    async fn set_online(
        &self,
        account_id: Uuid,
        is_online: bool,
        last_seen: DateTime<Utc>,
    ) -> Result<(), Error> {
        sqlx::query(
            r#"
            UPDATE accounts
            SET is_online = ?, last_seen = ?
            WHERE account_id = ?
            "#,
        )
        .bind(is_online as i64)
        .bind(to_epoch(last_seen))
        .bind(account_id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

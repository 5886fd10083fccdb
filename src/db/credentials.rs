use async_trait::async_trait;
use chrono::Utc;
use sqlx::{FromRow, SqlitePool};

use crate::error::AppError;
use crate::session::{CredentialStore, Credentials};

const TOKEN_KEY: &str = "authToken";
const UUID_KEY: &str = "uuid";

#[derive(Debug, FromRow)]
struct CredentialRow {
    key: String,
    value: String,
}

/// Key/value credential table: `authToken` and `uuid` are written and
/// removed together.
#[derive(Clone)]
pub struct SqliteCredentialStore {
    db: SqlitePool,
}

impl SqliteCredentialStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CredentialStore for SqliteCredentialStore {
    async fn load(&self) -> Result<Option<Credentials>, AppError> {
        let rows = sqlx::query_as::<_, CredentialRow>(
            r#"
            SELECT key, value
            FROM credentials
            WHERE key IN (?1, ?2)
            "#,
        )
        .bind(TOKEN_KEY)
        .bind(UUID_KEY)
        .fetch_all(&self.db)
        .await?;

        let mut token = None;
        let mut user_uuid = None;
        for row in rows {
            match row.key.as_str() {
                TOKEN_KEY => token = Some(row.value),
                UUID_KEY => user_uuid = Some(row.value),
                _ => {}
            }
        }

        Ok(match (token, user_uuid) {
            (Some(token), Some(user_uuid)) if !token.is_empty() && !user_uuid.is_empty() => {
                Some(Credentials { token, user_uuid })
            }
            _ => None,
        })
    }

    async fn save(&self, credentials: &Credentials) -> Result<(), AppError> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.db.begin().await?;

        for (key, value) in [
            (TOKEN_KEY, credentials.token.as_str()),
            (UUID_KEY, credentials.user_uuid.as_str()),
        ] {
            sqlx::query(
                r#"
                INSERT INTO credentials (key, value, updated_at)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(key) DO UPDATE SET
                    value = excluded.value,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(key)
            .bind(value)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn clear(&self) -> Result<(), AppError> {
        sqlx::query("DELETE FROM credentials WHERE key IN (?1, ?2)")
            .bind(TOKEN_KEY)
            .bind(UUID_KEY)
            .execute(&self.db)
            .await?;
        Ok(())
    }
}

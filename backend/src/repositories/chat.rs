//! Chat history repository

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

/// Who wrote a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }
}

/// Chat message record from database
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ChatMessageRecord {
    pub id: Uuid,
    pub user_id: String,
    pub role: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Chat message repository
pub struct ChatMessageRepository;

impl ChatMessageRepository {
    /// Store one message
    pub async fn save(pool: &PgPool, user_id: &str, role: ChatRole, content: &str) -> Result<ChatMessageRecord> {
        let record = sqlx::query_as::<_, ChatMessageRecord>(
            r#"
            INSERT INTO chat_messages (user_id, role, content)
            VALUES ($1, $2, $3)
            RETURNING id, user_id, role, content, created_at
            "#,
        )
        .bind(user_id)
        .bind(role.as_str())
        .bind(content)
        .fetch_one(pool)
        .await?;

        Ok(record)
    }

    /// Most recent messages, newest first
    pub async fn recent(pool: &PgPool, user_id: &str, limit: i64) -> Result<Vec<ChatMessageRecord>> {
        let records = sqlx::query_as::<_, ChatMessageRecord>(
            r#"
            SELECT id, user_id, role, content, created_at
            FROM chat_messages
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(pool)
        .await?;

        Ok(records)
    }

    /// Forget a user's conversation
    pub async fn clear(pool: &PgPool, user_id: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM chat_messages WHERE user_id = $1")
            .bind(user_id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected())
    }
}

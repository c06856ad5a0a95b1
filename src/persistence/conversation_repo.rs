//! Conversation history repository.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::models::history::ConversationRecord;
use crate::{AppError, Result};

use super::db::Database;

/// Repository wrapper around `SQLite` for conversation exchanges.
#[derive(Clone)]
pub struct ConversationRepo {
    db: Arc<Database>,
}

#[derive(sqlx::FromRow)]
struct ConversationRow {
    id: String,
    user_id: String,
    user_message: String,
    bot_reply: String,
    image_urls: String,
    created_at: String,
}

impl ConversationRow {
    fn into_record(self) -> Result<ConversationRecord> {
        let created_at = DateTime::parse_from_rfc3339(&self.created_at)
            .map_err(|e| AppError::Db(format!("invalid created_at: {e}")))?
            .with_timezone(&Utc);
        let image_urls = serde_json::from_str(&self.image_urls)
            .map_err(|e| AppError::Db(format!("invalid image_urls: {e}")))?;
        Ok(ConversationRecord {
            id: self.id,
            user_id: self.user_id,
            user_message: self.user_message,
            bot_reply: self.bot_reply,
            image_urls,
            created_at,
        })
    }
}

impl ConversationRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert one exchange.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the insert fails.
    pub async fn insert(&self, record: &ConversationRecord) -> Result<()> {
        let image_urls = serde_json::to_string(&record.image_urls)
            .map_err(|e| AppError::Db(format!("serialize image_urls: {e}")))?;
        sqlx::query(
            "INSERT INTO conversations (id, user_id, user_message, bot_reply, image_urls, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(&record.id)
        .bind(&record.user_id)
        .bind(&record.user_message)
        .bind(&record.bot_reply)
        .bind(&image_urls)
        .bind(record.created_at.to_rfc3339())
        .execute(self.db.as_ref())
        .await?;
        Ok(())
    }

    /// The user's most recent `limit` exchanges, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails or a row is malformed.
    pub async fn recent_for_user(&self, user_id: &str, limit: u32) -> Result<Vec<ConversationRecord>> {
        let rows: Vec<ConversationRow> = sqlx::query_as(
            "SELECT id, user_id, user_message, bot_reply, image_urls, created_at
             FROM conversations WHERE user_id = ?1
             ORDER BY created_at DESC, rowid DESC LIMIT ?2",
        )
        .bind(user_id)
        .bind(i64::from(limit))
        .fetch_all(self.db.as_ref())
        .await?;
        let mut records = rows
            .into_iter()
            .map(ConversationRow::into_record)
            .collect::<Result<Vec<_>>>()?;
        records.reverse();
        Ok(records)
    }

    /// Delete exchanges created before `cutoff`. Returns the number removed.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the delete fails.
    pub async fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM conversations WHERE created_at < ?1")
            .bind(cutoff.to_rfc3339())
            .execute(self.db.as_ref())
            .await?;
        Ok(result.rows_affected())
    }
}

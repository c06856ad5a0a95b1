//! Analytics event repository.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::models::analytics::AnalyticsEvent;
use crate::{AppError, Result};

use super::db::Database;

/// Repository wrapper around `SQLite` for analytics events.
#[derive(Clone)]
pub struct AnalyticsRepo {
    db: Arc<Database>,
}

#[derive(sqlx::FromRow)]
struct AnalyticsRow {
    id: String,
    event_type: String,
    user_id: String,
    data: String,
    created_at: String,
}

impl AnalyticsRow {
    fn into_event(self) -> Result<AnalyticsEvent> {
        let created_at = DateTime::parse_from_rfc3339(&self.created_at)
            .map_err(|e| AppError::Db(format!("invalid created_at: {e}")))?
            .with_timezone(&Utc);
        let data = serde_json::from_str(&self.data)
            .map_err(|e| AppError::Db(format!("invalid data: {e}")))?;
        Ok(AnalyticsEvent {
            id: self.id,
            event_type: self.event_type,
            user_id: self.user_id,
            data,
            created_at,
        })
    }
}

impl AnalyticsRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert one event.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the insert fails.
    pub async fn insert(&self, event: &AnalyticsEvent) -> Result<()> {
        sqlx::query(
            "INSERT INTO analytics_events (id, event_type, user_id, data, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(&event.id)
        .bind(&event.event_type)
        .bind(&event.user_id)
        .bind(event.data.to_string())
        .bind(event.created_at.to_rfc3339())
        .execute(self.db.as_ref())
        .await?;
        Ok(())
    }

    /// All events for a user, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails or a row is malformed.
    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<AnalyticsEvent>> {
        let rows: Vec<AnalyticsRow> = sqlx::query_as(
            "SELECT id, event_type, user_id, data, created_at
             FROM analytics_events WHERE user_id = ?1
             ORDER BY created_at ASC, rowid ASC",
        )
        .bind(user_id)
        .fetch_all(self.db.as_ref())
        .await?;
        rows.into_iter().map(AnalyticsRow::into_event).collect()
    }

    /// Number of events of `event_type`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn count_by_type(&self, event_type: &str) -> Result<u64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM analytics_events WHERE event_type = ?1")
                .bind(event_type)
                .fetch_one(self.db.as_ref())
                .await?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    /// Delete events created before `cutoff`. Returns the number removed.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the delete fails.
    pub async fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM analytics_events WHERE created_at < ?1")
            .bind(cutoff.to_rfc3339())
            .execute(self.db.as_ref())
            .await?;
        Ok(result.rows_affected())
    }
}

//! User profile repository.

use std::sync::Arc;

use chrono::Utc;

use crate::models::user::UserProfile;
use crate::{AppError, Result};

use super::db::Database;

/// Repository wrapper around `SQLite` for user profiles.
#[derive(Clone)]
pub struct UserRepo {
    db: Arc<Database>,
}

#[derive(sqlx::FromRow)]
struct UserRow {
    user_id: String,
    name: String,
    avatar_url: Option<String>,
    platform: String,
    first_seen_at: String,
}

impl UserRow {
    fn into_profile(self) -> Result<UserProfile> {
        let first_seen_at = chrono::DateTime::parse_from_rfc3339(&self.first_seen_at)
            .map_err(|e| AppError::Db(format!("invalid first_seen_at: {e}")))?
            .with_timezone(&Utc);
        Ok(UserProfile {
            user_id: self.user_id,
            name: self.name,
            avatar_url: self.avatar_url,
            platform: self.platform,
            first_seen_at,
        })
    }
}

impl UserRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert or refresh a profile. `first_seen_at` is kept from the first insert.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the upsert fails.
    pub async fn upsert(&self, profile: &UserProfile) -> Result<()> {
        sqlx::query(
            "INSERT INTO users (user_id, name, avatar_url, platform, first_seen_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(user_id) DO UPDATE SET
                name = excluded.name,
                avatar_url = excluded.avatar_url,
                platform = excluded.platform",
        )
        .bind(&profile.user_id)
        .bind(&profile.name)
        .bind(&profile.avatar_url)
        .bind(&profile.platform)
        .bind(profile.first_seen_at.to_rfc3339())
        .execute(self.db.as_ref())
        .await?;
        Ok(())
    }

    /// Look up a profile by user id.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails or the row is malformed.
    pub async fn get(&self, user_id: &str) -> Result<Option<UserProfile>> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT user_id, name, avatar_url, platform, first_seen_at
             FROM users WHERE user_id = ?1",
        )
        .bind(user_id)
        .fetch_optional(self.db.as_ref())
        .await?;
        row.map(UserRow::into_profile).transpose()
    }
}

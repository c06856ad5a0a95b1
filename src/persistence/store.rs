//! Storage seam used by the orchestration engine.

use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;

use crate::models::analytics::AnalyticsEvent;
use crate::models::history::{ConversationRecord, HistoryTurn};
use crate::models::user::UserProfile;
use crate::Result;

use super::analytics_repo::AnalyticsRepo;
use super::conversation_repo::ConversationRepo;
use super::db::Database;
use super::user_repo::UserRepo;

/// Persistence operations the engine depends on.
pub trait ConversationStore: Send + Sync {
    /// Look up a known user.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the lookup fails.
    fn get_user<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, Result<Option<UserProfile>>>;

    /// Insert or refresh a user profile.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the write fails.
    fn save_user<'a>(&'a self, profile: &'a UserProfile) -> BoxFuture<'a, Result<()>>;

    /// Persist one exchange.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the write fails.
    fn save_conversation<'a>(&'a self, record: &'a ConversationRecord)
        -> BoxFuture<'a, Result<()>>;

    /// The last `limit` exchanges for a user as chronological turns.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the read fails.
    fn get_conversation_history<'a>(
        &'a self,
        user_id: &'a str,
        limit: u32,
    ) -> BoxFuture<'a, Result<Vec<HistoryTurn>>>;

    /// Record an analytics event.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the write fails.
    fn log_analytics_event<'a>(&'a self, event: &'a AnalyticsEvent) -> BoxFuture<'a, Result<()>>;
}

/// [`ConversationStore`] backed by the `SQLite` repositories.
#[derive(Clone)]
pub struct SqliteStore {
    users: UserRepo,
    conversations: ConversationRepo,
    analytics: AnalyticsRepo,
}

impl SqliteStore {
    /// Wrap a connected pool.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            users: UserRepo::new(Arc::clone(&db)),
            conversations: ConversationRepo::new(Arc::clone(&db)),
            analytics: AnalyticsRepo::new(db),
        }
    }

    /// Analytics repository, for reporting queries.
    #[must_use]
    pub fn analytics(&self) -> &AnalyticsRepo {
        &self.analytics
    }
}

impl ConversationStore for SqliteStore {
    fn get_user<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, Result<Option<UserProfile>>> {
        self.users.get(user_id).boxed()
    }

    fn save_user<'a>(&'a self, profile: &'a UserProfile) -> BoxFuture<'a, Result<()>> {
        self.users.upsert(profile).boxed()
    }

    fn save_conversation<'a>(
        &'a self,
        record: &'a ConversationRecord,
    ) -> BoxFuture<'a, Result<()>> {
        self.conversations.insert(record).boxed()
    }

    fn get_conversation_history<'a>(
        &'a self,
        user_id: &'a str,
        limit: u32,
    ) -> BoxFuture<'a, Result<Vec<HistoryTurn>>> {
        async move {
            let records = self.conversations.recent_for_user(user_id, limit).await?;
            Ok(records
                .into_iter()
                .flat_map(ConversationRecord::into_turns)
                .collect())
        }
        .boxed()
    }

    fn log_analytics_event<'a>(&'a self, event: &'a AnalyticsEvent) -> BoxFuture<'a, Result<()>> {
        self.analytics.insert(event).boxed()
    }
}

//! Persistence layer modules.

pub mod analytics_repo;
pub mod conversation_repo;
pub mod db;
pub mod retention;
pub mod schema;
pub mod store;
pub mod user_repo;

pub use db::Database;
pub use store::{ConversationStore, SqliteStore};

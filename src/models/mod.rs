//! Domain model module declarations.

pub mod analytics;
pub mod conversation;
pub mod event;
pub mod follow_up;
pub mod history;
pub mod trigger;
pub mod user;

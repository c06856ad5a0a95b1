//! Crate-wide error type.

use std::fmt::{Display, Formatter};

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, AppError>;

/// Failures grouped by the subsystem that raised them.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// Persistence failure when interacting with `SQLite`.
    Db(String),
    /// Messaging platform API failure (send, typing indicator, profile).
    Platform(String),
    /// Reply generation failure (LLM call errored or returned garbage).
    Generation(String),
    /// Malformed inbound webhook payload.
    Webhook(String),
    /// Requested entity does not exist.
    NotFound(String),
    /// Local I/O failure (files, sockets, runtime setup).
    Io(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Db(msg) => write!(f, "db: {msg}"),
            Self::Platform(msg) => write!(f, "platform: {msg}"),
            Self::Generation(msg) => write!(f, "generation: {msg}"),
            Self::Webhook(msg) => write!(f, "webhook: {msg}"),
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        Self::Db(err.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        Self::Platform(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Webhook(format!("invalid payload: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

#![forbid(unsafe_code)]

//! `concierge`: conversational-commerce bot orchestration.
//!
//! Inbound chat events are deduplicated, merged into fixed-window batches,
//! answered by a reply generator with human-paced delivery, and followed up
//! proactively when the user goes quiet.

pub mod config;
pub mod errors;
pub mod llm;
pub mod models;
pub mod orchestrator;
pub mod persistence;
pub mod platform;
pub mod webhook;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};

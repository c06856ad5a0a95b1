//! Inbound webhook HTTP surface.

pub mod server;

pub use server::{router, serve, WebhookState};

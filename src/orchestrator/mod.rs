//! Conversation orchestration.
//!
//! Dedup, fixed-window batching, reply splitting and paced delivery,
//! trigger detection, conversation state, and follow-up scheduling.

pub mod analytics;
pub mod batcher;
pub mod dedup;
pub mod delivery;
pub mod detector;
pub mod engine;
pub mod follow_up;
pub mod postback;
pub mod shard;
pub mod splitter;
pub mod state_store;
pub mod sweeper;
pub mod timers;

pub use engine::{Collaborators, Engine, EngineSettings, HandleOutcome};

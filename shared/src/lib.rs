//! Shared types for the Perks loyalty platform
//!
//! Domain models and realtime channel types used by the workflow engine
//! and any embedding UI shell. Everything here is plain data: the engine
//! crate owns all behavior and I/O.

pub mod models;
pub mod realtime;
pub mod util;

// Re-exports
pub use serde::{Deserialize, Serialize};

// Realtime re-exports (for convenient access)
pub use realtime::{ChannelEvent, PresenceMeta, PresenceState};

//! Host Stand - waitlist queue management for restaurants and venues
//!
//! This crate admits parties into per-venue FIFO waitlists, keeps queue
//! positions and wait estimates current, and streams live updates to every
//! connected guest and staff dashboard over server-sent events.

pub mod api;
pub mod config;
pub mod error;
pub mod hub;
pub mod metrics;
pub mod queue;
pub mod service;
pub mod store;
pub mod stream;
pub mod types;
pub mod utils;

// Re-export commonly used types and traits
pub use error::{QueueError, Result};
pub use types::*;

// Re-export key components
pub use hub::{BroadcastHub, QueueEvent};
pub use queue::QueueEngine;
pub use store::{InMemoryQueueStore, QueueStore};
pub use stream::{StreamSession, StreamSessionConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

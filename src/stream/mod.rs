//! Streaming connections for live queue updates
//!
//! This module drives one long-lived session per connected client and
//! provides the reconnect schedule stream clients follow after a drop.

pub mod backoff;
pub mod session;

// Re-export commonly used types
pub use backoff::ReconnectPolicy;
pub use session::{StreamSession, StreamSessionConfig};

//! Queue management for venue waitlists
//!
//! This module owns position assignment, the entry lifecycle, and wait
//! time estimation for every venue's waitlist.

pub mod engine;
pub mod estimator;

// Re-export commonly used types
pub use engine::QueueEngine;
pub use estimator::{estimate_wait_minutes, estimated_seating_time, rush_factor};

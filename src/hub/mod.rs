//! Live update fan-out for the waitlist service
//!
//! This module carries queue events from the position engine to every
//! open stream session subscribed to the affected venue.

pub mod broadcaster;
pub mod events;

// Re-export commonly used types
pub use broadcaster::{BroadcastHub, SubscriberId, Subscription};
pub use events::*;

//! HTTP surface for the waitlist service
//!
//! Guests join, leave, and watch the queue here; staff call, seat, and
//! mark no-shows; operators read health and metrics.

pub mod handlers;
pub mod routes;

// Re-export commonly used types
pub use handlers::ApiState;
pub use routes::router;

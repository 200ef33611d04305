//! Error types for the waitlist service
//!
//! This module defines all error types using anyhow for consistent error handling
//! throughout the application.

/// Result type alias for convenience
pub type Result<T> = anyhow::Result<T>;

/// Custom error types for specific waitlist scenarios
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Invalid request: {reason}")]
    InvalidRequest { reason: String },

    #[error("Not found: {what}")]
    NotFound { what: String },

    #[error("Invalid state: {reason}")]
    InvalidState { reason: String },

    #[error("Party already queued at venue {venue_id}")]
    DuplicateEntry { venue_id: String },

    #[error("Queue is empty for venue {venue_id}")]
    QueueEmpty { venue_id: String },

    #[error("Store unavailable: {message}")]
    StoreUnavailable { message: String },

    #[error("Internal service error: {message}")]
    Internal { message: String },
}

impl QueueError {
    /// Machine-readable kind string used in structured API error bodies
    pub fn kind(&self) -> &'static str {
        match self {
            QueueError::InvalidRequest { .. } => "invalid_request",
            QueueError::NotFound { .. } => "not_found",
            QueueError::InvalidState { .. } => "invalid_state",
            QueueError::DuplicateEntry { .. } => "duplicate_entry",
            QueueError::QueueEmpty { .. } => "queue_empty",
            QueueError::StoreUnavailable { .. } => "store_unavailable",
            QueueError::Internal { .. } => "internal",
        }
    }
}

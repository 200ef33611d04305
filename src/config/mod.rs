//! Configuration management for the host-stand service
//!
//! This module handles all configuration loading from environment variables,
//! TOML files, validation, and default values for the waitlist service.

pub mod app;

// Re-export commonly used types
pub use app::{validate_config, AppConfig, QueueSettings, ServiceSettings, StreamSettings};

//! Main application configuration
//!
//! This module defines the primary configuration structures for the host-stand
//! waitlist service, including environment variable loading and validation.

use crate::types::VenueQueueSettings;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub service: ServiceSettings,
    pub queue: QueueSettings,
    pub stream: StreamSettings,
}

/// Service-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Service name for logging and metrics
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Host to bind the HTTP server to
    pub http_host: String,
    /// Port for the queue API and health endpoints
    pub http_port: u16,
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_seconds: u64,
}

/// Default per-venue queue behavior; venues without a stored settings
/// record fall back to these values
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueSettings {
    /// Average minutes one table occupies a seat
    pub avg_service_minutes: u32,
    /// Number of tables served concurrently
    pub seating_capacity: u32,
    /// Largest party accepted into a queue
    pub max_party_size: u32,
    /// How long a called party may take to confirm before expiring
    pub called_timeout_seconds: u64,
    /// Interval between expiry sweep passes
    pub sweep_interval_seconds: u64,
}

/// Streaming connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamSettings {
    /// Interval between heartbeat events on each session
    pub heartbeat_interval_seconds: u64,
    /// Interval between personalized position refreshes
    pub position_refresh_interval_seconds: u64,
    /// Position at or below which a waiting party is notified once
    pub almost_ready_threshold: u32,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            name: "host-stand".to_string(),
            log_level: "info".to_string(),
            http_host: "0.0.0.0".to_string(),
            http_port: 8080,
            shutdown_timeout_seconds: 30,
        }
    }
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            avg_service_minutes: 15,
            seating_capacity: 10,
            max_party_size: 8,
            called_timeout_seconds: 300, // 5 minutes to show up once called
            sweep_interval_seconds: 15,
        }
    }
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            heartbeat_interval_seconds: 30,
            position_refresh_interval_seconds: 30,
            almost_ready_threshold: 3,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables with fallback to defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        // Service settings
        if let Ok(name) = env::var("SERVICE_NAME") {
            config.service.name = name;
        }
        if let Ok(log_level) = env::var("LOG_LEVEL") {
            config.service.log_level = log_level;
        }
        if let Ok(host) = env::var("HTTP_HOST") {
            config.service.http_host = host;
        }
        if let Ok(port) = env::var("HTTP_PORT") {
            config.service.http_port = port
                .parse()
                .map_err(|_| anyhow!("Invalid HTTP_PORT value: {}", port))?;
        }
        if let Ok(timeout) = env::var("SHUTDOWN_TIMEOUT_SECONDS") {
            config.service.shutdown_timeout_seconds = timeout
                .parse()
                .map_err(|_| anyhow!("Invalid SHUTDOWN_TIMEOUT_SECONDS value: {}", timeout))?;
        }

        // Queue settings
        if let Ok(minutes) = env::var("AVG_SERVICE_MINUTES") {
            config.queue.avg_service_minutes = minutes
                .parse()
                .map_err(|_| anyhow!("Invalid AVG_SERVICE_MINUTES value: {}", minutes))?;
        }
        if let Ok(capacity) = env::var("SEATING_CAPACITY") {
            config.queue.seating_capacity = capacity
                .parse()
                .map_err(|_| anyhow!("Invalid SEATING_CAPACITY value: {}", capacity))?;
        }
        if let Ok(size) = env::var("MAX_PARTY_SIZE") {
            config.queue.max_party_size = size
                .parse()
                .map_err(|_| anyhow!("Invalid MAX_PARTY_SIZE value: {}", size))?;
        }
        if let Ok(timeout) = env::var("CALLED_TIMEOUT_SECONDS") {
            config.queue.called_timeout_seconds = timeout
                .parse()
                .map_err(|_| anyhow!("Invalid CALLED_TIMEOUT_SECONDS value: {}", timeout))?;
        }
        if let Ok(interval) = env::var("SWEEP_INTERVAL_SECONDS") {
            config.queue.sweep_interval_seconds = interval
                .parse()
                .map_err(|_| anyhow!("Invalid SWEEP_INTERVAL_SECONDS value: {}", interval))?;
        }

        // Stream settings
        if let Ok(interval) = env::var("HEARTBEAT_INTERVAL_SECONDS") {
            config.stream.heartbeat_interval_seconds = interval
                .parse()
                .map_err(|_| anyhow!("Invalid HEARTBEAT_INTERVAL_SECONDS value: {}", interval))?;
        }
        if let Ok(interval) = env::var("POSITION_REFRESH_INTERVAL_SECONDS") {
            config.stream.position_refresh_interval_seconds = interval.parse().map_err(|_| {
                anyhow!(
                    "Invalid POSITION_REFRESH_INTERVAL_SECONDS value: {}",
                    interval
                )
            })?;
        }
        if let Ok(threshold) = env::var("ALMOST_READY_THRESHOLD") {
            config.stream.almost_ready_threshold = threshold
                .parse()
                .map_err(|_| anyhow!("Invalid ALMOST_READY_THRESHOLD value: {}", threshold))?;
        }

        validate_config(&config)?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        validate_config(&config)?;
        Ok(config)
    }

    /// Default venue settings derived from the queue section
    pub fn default_venue_settings(&self) -> VenueQueueSettings {
        VenueQueueSettings {
            avg_service_minutes: self.queue.avg_service_minutes,
            seating_capacity: self.queue.seating_capacity,
            max_party_size: self.queue.max_party_size,
            called_timeout_seconds: self.queue.called_timeout_seconds,
            ..VenueQueueSettings::default()
        }
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.service.shutdown_timeout_seconds)
    }

    /// Get expiry sweep interval as Duration
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.queue.sweep_interval_seconds)
    }

    /// Get heartbeat interval as Duration
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.stream.heartbeat_interval_seconds)
    }

    /// Get position refresh interval as Duration
    pub fn position_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.stream.position_refresh_interval_seconds)
    }
}

/// Validate configuration values
pub fn validate_config(config: &AppConfig) -> Result<()> {
    // Validate log level
    match config.service.log_level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        _ => return Err(anyhow!("Invalid log level: {}", config.service.log_level)),
    }

    // Validate ports
    if config.service.http_port == 0 {
        return Err(anyhow!("HTTP port cannot be 0"));
    }

    // Validate timeouts and intervals
    if config.service.shutdown_timeout_seconds == 0 {
        return Err(anyhow!("Shutdown timeout must be greater than 0"));
    }
    if config.queue.called_timeout_seconds == 0 {
        return Err(anyhow!("Called timeout must be greater than 0"));
    }
    if config.queue.sweep_interval_seconds == 0 {
        return Err(anyhow!("Sweep interval must be greater than 0"));
    }
    if config.stream.heartbeat_interval_seconds == 0 {
        return Err(anyhow!("Heartbeat interval must be greater than 0"));
    }
    if config.stream.position_refresh_interval_seconds == 0 {
        return Err(anyhow!("Position refresh interval must be greater than 0"));
    }

    // Validate queue defaults
    if config.queue.avg_service_minutes == 0 {
        return Err(anyhow!("Average service minutes must be greater than 0"));
    }
    if config.queue.max_party_size == 0 {
        return Err(anyhow!("Max party size must be greater than 0"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(validate_config(&config).is_ok());
        assert_eq!(config.service.http_port, 8080);
        assert_eq!(config.stream.heartbeat_interval_seconds, 30);
        assert_eq!(config.stream.almost_ready_threshold, 3);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = AppConfig::default();
        config.service.log_level = "verbose".to_string();
        assert!(validate_config(&config).is_err());

        let mut config = AppConfig::default();
        config.service.http_port = 0;
        assert!(validate_config(&config).is_err());

        let mut config = AppConfig::default();
        config.queue.sweep_interval_seconds = 0;
        assert!(validate_config(&config).is_err());

        let mut config = AppConfig::default();
        config.stream.heartbeat_interval_seconds = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_default_venue_settings_follow_queue_section() {
        let mut config = AppConfig::default();
        config.queue.avg_service_minutes = 20;
        config.queue.max_party_size = 12;

        let settings = config.default_venue_settings();
        assert_eq!(settings.avg_service_minutes, 20);
        assert_eq!(settings.max_party_size, 12);
        assert_eq!(settings.called_timeout_seconds, 300);
    }

    #[test]
    fn test_duration_helpers() {
        let config = AppConfig::default();
        assert_eq!(config.heartbeat_interval(), Duration::from_secs(30));
        assert_eq!(config.position_refresh_interval(), Duration::from_secs(30));
        assert_eq!(config.sweep_interval(), Duration::from_secs(15));
    }

    #[test]
    fn test_toml_round_trip() {
        let config = AppConfig::default();
        let serialized = toml::to_string(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&serialized).unwrap();
        assert_eq!(parsed.service.http_port, config.service.http_port);
        assert_eq!(
            parsed.queue.avg_service_minutes,
            config.queue.avg_service_minutes
        );
    }
}

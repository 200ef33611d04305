//! Main application state and service coordination
//!
//! This module contains the production AppState that wires the store,
//! position engine, broadcast hub, and HTTP server together and manages
//! background tasks (expiry sweep, uptime metrics) and graceful shutdown.

use crate::api::{router, ApiState};
use crate::config::AppConfig;
use crate::hub::BroadcastHub;
use crate::metrics::MetricsCollector;
use crate::queue::QueueEngine;
use crate::store::{InMemoryQueueStore, QueueStore};
use crate::stream::StreamSessionConfig;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{debug, error, info, warn};

/// Service-level errors
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Service initialization error: {message}")]
    Initialization { message: String },

    #[error("HTTP server error: {message}")]
    HttpServer { message: String },

    #[error("Background task error: {message}")]
    BackgroundTask { message: String },
}

/// Main application state containing all service components
pub struct AppState {
    /// Application configuration
    config: AppConfig,

    /// Persistence for entries and settings
    store: Arc<dyn QueueStore>,

    /// Core queue engine
    engine: Arc<QueueEngine>,

    /// Live update fan-out
    hub: Arc<BroadcastHub>,

    /// Metrics collector
    metrics: Arc<MetricsCollector>,

    /// Background task handles
    background_tasks: Vec<JoinHandle<()>>,

    /// Shutdown signal for the HTTP server
    shutdown_tx: broadcast::Sender<()>,

    /// Service status
    is_running: Arc<RwLock<bool>>,
}

impl AppState {
    /// Initialize the application with all dependencies
    pub async fn new(config: AppConfig) -> Result<Self, ServiceError> {
        info!("Initializing host-stand waitlist service");
        info!(
            "Configuration: service={}, http={}:{}",
            config.service.name, config.service.http_host, config.service.http_port
        );

        let metrics = Arc::new(MetricsCollector::new().map_err(|e| {
            ServiceError::Initialization {
                message: format!("Failed to create metrics collector: {}", e),
            }
        })?);

        let store: Arc<dyn QueueStore> = Arc::new(InMemoryQueueStore::new());
        let hub = Arc::new(BroadcastHub::new());
        let engine = Arc::new(QueueEngine::with_default_settings(
            store.clone(),
            hub.clone(),
            metrics.clone(),
            config.default_venue_settings(),
        ));

        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(Self {
            config,
            store,
            engine,
            hub,
            metrics,
            background_tasks: Vec::new(),
            shutdown_tx,
            is_running: Arc::new(RwLock::new(false)),
        })
    }

    /// Start the HTTP server and all background services
    pub async fn start(&mut self) -> Result<(), ServiceError> {
        info!("Starting host-stand waitlist service");

        *self.is_running.write().await = true;

        self.start_http_server().await?;
        self.start_background_tasks().await?;

        info!("Host-stand waitlist service started successfully");
        Ok(())
    }

    /// Perform graceful shutdown
    pub async fn shutdown(&mut self) -> Result<(), ServiceError> {
        info!("Starting graceful shutdown of host-stand service");

        *self.is_running.write().await = false;

        // Signal the HTTP server to drain
        if let Err(e) = self.shutdown_tx.send(()) {
            warn!("Failed to send shutdown signal to HTTP server: {}", e);
        }

        self.stop_background_tasks().await;

        info!(
            "Final state: {} live stream subscribers",
            self.hub.total_subscribers()
        );
        info!("Host-stand service shutdown completed");

        Ok(())
    }

    /// Get service configuration
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Check if service is running
    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    /// Get the queue engine
    pub fn engine(&self) -> Arc<QueueEngine> {
        self.engine.clone()
    }

    /// Get the broadcast hub
    pub fn hub(&self) -> Arc<BroadcastHub> {
        self.hub.clone()
    }

    /// Get the metrics collector
    pub fn metrics(&self) -> Arc<MetricsCollector> {
        self.metrics.clone()
    }

    /// Get the queue store
    pub fn store(&self) -> Arc<dyn QueueStore> {
        self.store.clone()
    }

    /// Shared state handed to API handlers
    fn api_state(&self) -> ApiState {
        ApiState {
            engine: self.engine.clone(),
            hub: self.hub.clone(),
            store: self.store.clone(),
            metrics: self.metrics.clone(),
            stream_config: StreamSessionConfig {
                heartbeat_interval: self.config.heartbeat_interval(),
                position_refresh_interval: self.config.position_refresh_interval(),
                almost_ready_threshold: self.config.stream.almost_ready_threshold,
            },
        }
    }

    /// Bind the listener and serve the queue API with graceful shutdown
    async fn start_http_server(&mut self) -> Result<(), ServiceError> {
        let addr: SocketAddr = format!(
            "{}:{}",
            self.config.service.http_host, self.config.service.http_port
        )
        .parse()
        .map_err(|e| ServiceError::Configuration {
            message: format!("Invalid HTTP bind address: {}", e),
        })?;

        let app = router(self.api_state());
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServiceError::HttpServer {
                message: format!("Failed to bind {}: {}", addr, e),
            })?;

        info!("Queue API listening on http://{}", addr);

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let server_task = tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.recv().await;
                    info!("HTTP server shutdown signal received");
                })
                .await;

            if let Err(e) = result {
                error!("HTTP server failed: {}", e);
            } else {
                info!("HTTP server stopped");
            }
        });

        self.background_tasks.push(server_task);
        Ok(())
    }

    /// Start background maintenance tasks
    async fn start_background_tasks(&mut self) -> Result<(), ServiceError> {
        info!("Starting background maintenance tasks...");

        // Expiry sweep task
        info!(
            "Starting expiry sweep task ({}s interval)...",
            self.config.sweep_interval().as_secs()
        );
        let sweep_task = {
            let engine = self.engine.clone();
            let sweep_interval = self.config.sweep_interval();
            let is_running = self.is_running.clone();

            tokio::spawn(async move {
                let mut interval = tokio::time::interval(sweep_interval);
                info!("Expiry sweep task started");

                while *is_running.read().await {
                    interval.tick().await;

                    match engine.expire_overdue().await {
                        Ok(expired) => {
                            if expired > 0 {
                                info!("Expiry sweep expired {} overdue entries", expired);
                            } else {
                                debug!("Expiry sweep completed - nothing overdue");
                            }
                        }
                        Err(e) => {
                            // Retried on the next tick
                            warn!("Expiry sweep failed: {}", e);
                        }
                    }
                }

                info!("Expiry sweep task stopped");
            })
        };

        // Service uptime metrics task
        info!("Starting uptime metrics task (60s interval)...");
        let uptime_task = {
            let metrics = self.metrics.clone();
            let is_running = self.is_running.clone();

            tokio::spawn(async move {
                let mut interval = tokio::time::interval(Duration::from_secs(60));
                let start_time = tokio::time::Instant::now();
                info!("Uptime metrics task started");

                while *is_running.read().await {
                    interval.tick().await;

                    let uptime_seconds = start_time.elapsed().as_secs() as i64;
                    metrics.service().uptime_seconds.set(uptime_seconds);
                    debug!("Updated service uptime metric: {}s", uptime_seconds);
                }

                info!("Uptime metrics task stopped");
            })
        };

        self.background_tasks.push(sweep_task);
        self.background_tasks.push(uptime_task);

        info!("2 background maintenance tasks started successfully");
        Ok(())
    }

    /// Stop all background tasks
    async fn stop_background_tasks(&mut self) {
        let task_count = self.background_tasks.len();
        if task_count == 0 {
            info!("No background tasks to stop");
            return;
        }

        info!("Stopping {} background tasks...", task_count);

        for (i, task) in self.background_tasks.drain(..).enumerate() {
            debug!("Aborting background task {}/{}", i + 1, task_count);
            task.abort();
        }

        // Give tasks time to observe cancellation
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        info!("All {} background tasks stopped", task_count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> AppConfig {
        let mut config = AppConfig::default();
        // Port 0 lets the OS pick a free port for tests
        config.service.http_port = 0;
        config
    }

    #[tokio::test]
    async fn test_app_state_initialization() {
        let state = AppState::new(test_config()).await.unwrap();

        assert!(!state.is_running().await);
        assert_eq!(state.hub().total_subscribers(), 0);
        assert_eq!(state.config().service.name, "host-stand");
    }

    #[tokio::test]
    async fn test_engine_wired_to_config_defaults() {
        let mut config = test_config();
        config.queue.max_party_size = 4;

        let state = AppState::new(config).await.unwrap();

        let settings = state.engine().settings("venue-1").await.unwrap();
        assert_eq!(settings.max_party_size, 4);
    }

    #[tokio::test]
    async fn test_start_and_shutdown() {
        let mut state = AppState::new(test_config()).await.unwrap();

        state.start().await.unwrap();
        assert!(state.is_running().await);

        state.shutdown().await.unwrap();
        assert!(!state.is_running().await);
        assert!(state.background_tasks.is_empty());
    }
}

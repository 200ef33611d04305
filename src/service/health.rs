//! Health evaluation for the waitlist service
//!
//! Probes the store and the broadcast hub and summarizes the result for
//! the health endpoints and periodic self-checks.

use crate::hub::BroadcastHub;
use crate::metrics::MetricsCollector;
use crate::store::QueueStore;
use crate::utils::current_timestamp;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

/// Overall service health
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Degraded => write!(f, "degraded"),
            HealthStatus::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// Health of one service component
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentHealth {
    pub component: String,
    pub healthy: bool,
}

/// Full health report returned by the health endpoints
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: HealthStatus,
    pub checks: Vec<ComponentHealth>,
    pub active_streams: usize,
    pub timestamp: DateTime<Utc>,
}

/// Health check runner
pub struct HealthCheck;

impl HealthCheck {
    /// Probe the store and hub and roll the results up into one status
    pub async fn evaluate(
        store: &Arc<dyn QueueStore>,
        hub: &Arc<BroadcastHub>,
        metrics: &Arc<MetricsCollector>,
    ) -> HealthReport {
        let store_healthy = match store.ping().await {
            Ok(()) => true,
            Err(e) => {
                warn!("Store health probe failed: {}", e);
                false
            }
        };

        let checks = vec![
            ComponentHealth {
                component: "store".to_string(),
                healthy: store_healthy,
            },
            ComponentHealth {
                component: "broadcast_hub".to_string(),
                healthy: true,
            },
        ];

        let status = if store_healthy {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unhealthy
        };

        metrics.update_health_status(match status {
            HealthStatus::Healthy => 2,
            HealthStatus::Degraded => 1,
            HealthStatus::Unhealthy => 0,
        });

        HealthReport {
            status,
            checks,
            active_streams: hub.total_subscribers(),
            timestamp: current_timestamp(),
        }
    }
}

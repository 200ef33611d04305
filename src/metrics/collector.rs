//! Metrics collection using Prometheus
//!
//! This module provides metrics collection for the host-stand waitlist
//! service using Prometheus metrics.

use anyhow::Result;
use prometheus::{
    Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry,
};
use std::sync::Arc;

/// Main metrics collector for the waitlist service
#[derive(Clone)]
pub struct MetricsCollector {
    /// Prometheus registry
    registry: Arc<Registry>,

    /// Service-level metrics
    service_metrics: ServiceMetrics,

    /// Queue-related metrics
    queue_metrics: QueueMetrics,

    /// Streaming-related metrics
    stream_metrics: StreamMetrics,
}

/// Service-level metrics
#[derive(Clone)]
pub struct ServiceMetrics {
    /// Service uptime in seconds
    pub uptime_seconds: IntGauge,

    /// Health check status (0=unhealthy, 1=degraded, 2=healthy)
    pub health_status: IntGauge,
}

/// Queue-related metrics
#[derive(Clone)]
pub struct QueueMetrics {
    /// Total parties that joined a queue
    pub entries_joined_total: IntCounter,

    /// Lifecycle transitions by kind (called, seated, cancelled, expired, no_show)
    pub transitions_total: IntCounterVec,

    /// Parties currently waiting, by venue
    pub parties_waiting: IntGaugeVec,

    /// Queue mutation processing time
    pub mutation_duration_seconds: Histogram,
}

/// Streaming-related metrics
#[derive(Clone)]
pub struct StreamMetrics {
    /// Total stream sessions opened
    pub sessions_opened_total: IntCounter,

    /// Total stream sessions closed
    pub sessions_closed_total: IntCounter,

    /// Currently open stream sessions
    pub active_sessions: IntGauge,

    /// Events forwarded to clients across all sessions
    pub events_forwarded_total: IntCounter,
}

impl MetricsCollector {
    /// Create a new metrics collector with default registry
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());
        Self::with_registry(registry)
    }

    /// Create a new metrics collector with custom registry
    pub fn with_registry(registry: Arc<Registry>) -> Result<Self> {
        let service_metrics = ServiceMetrics::new(&registry)?;
        let queue_metrics = QueueMetrics::new(&registry)?;
        let stream_metrics = StreamMetrics::new(&registry)?;

        Ok(Self {
            registry,
            service_metrics,
            queue_metrics,
            stream_metrics,
        })
    }

    /// Get the Prometheus registry
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    /// Get service metrics
    pub fn service(&self) -> &ServiceMetrics {
        &self.service_metrics
    }

    /// Get queue metrics
    pub fn queue(&self) -> &QueueMetrics {
        &self.queue_metrics
    }

    /// Get streaming metrics
    pub fn stream(&self) -> &StreamMetrics {
        &self.stream_metrics
    }

    /// Record a party joining a queue
    pub fn record_join(&self, venue_id: &str, waiting: usize) {
        self.queue_metrics.entries_joined_total.inc();
        self.queue_metrics
            .parties_waiting
            .with_label_values(&[venue_id])
            .set(waiting as i64);
    }

    /// Record a lifecycle transition and the venue's new waiting count
    pub fn record_transition(&self, kind: &str, venue_id: &str, waiting: usize) {
        self.queue_metrics
            .transitions_total
            .with_label_values(&[kind])
            .inc();
        self.queue_metrics
            .parties_waiting
            .with_label_values(&[venue_id])
            .set(waiting as i64);
    }

    /// Record a queue mutation duration
    pub fn record_mutation_duration(&self, duration: std::time::Duration) {
        self.queue_metrics
            .mutation_duration_seconds
            .observe(duration.as_secs_f64());
    }

    /// Record a stream session opening
    pub fn record_session_opened(&self) {
        self.stream_metrics.sessions_opened_total.inc();
        self.stream_metrics.active_sessions.inc();
    }

    /// Record a stream session closing
    pub fn record_session_closed(&self) {
        self.stream_metrics.sessions_closed_total.inc();
        self.stream_metrics.active_sessions.dec();
    }

    /// Record an event forwarded to a client
    pub fn record_event_forwarded(&self) {
        self.stream_metrics.events_forwarded_total.inc();
    }

    /// Update health status
    pub fn update_health_status(&self, status: u8) {
        self.service_metrics.health_status.set(status as i64);
    }
}

impl ServiceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let uptime_seconds =
            IntGauge::new("host_stand_uptime_seconds", "Service uptime in seconds")?;
        registry.register(Box::new(uptime_seconds.clone()))?;

        let health_status = IntGauge::new(
            "host_stand_health_status",
            "Health status (0=unhealthy, 1=degraded, 2=healthy)",
        )?;
        registry.register(Box::new(health_status.clone()))?;

        Ok(Self {
            uptime_seconds,
            health_status,
        })
    }
}

impl QueueMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let entries_joined_total = IntCounter::new(
            "host_stand_entries_joined_total",
            "Total parties that joined a queue",
        )?;
        registry.register(Box::new(entries_joined_total.clone()))?;

        let transitions_total = IntCounterVec::new(
            Opts::new(
                "host_stand_transitions_total",
                "Queue entry lifecycle transitions",
            ),
            &["transition"],
        )?;
        registry.register(Box::new(transitions_total.clone()))?;

        let parties_waiting = IntGaugeVec::new(
            Opts::new("host_stand_parties_waiting", "Parties currently waiting"),
            &["venue"],
        )?;
        registry.register(Box::new(parties_waiting.clone()))?;

        let mutation_duration_seconds = Histogram::with_opts(HistogramOpts::new(
            "host_stand_mutation_duration_seconds",
            "Queue mutation processing time",
        ))?;
        registry.register(Box::new(mutation_duration_seconds.clone()))?;

        Ok(Self {
            entries_joined_total,
            transitions_total,
            parties_waiting,
            mutation_duration_seconds,
        })
    }
}

impl StreamMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let sessions_opened_total = IntCounter::new(
            "host_stand_sessions_opened_total",
            "Total stream sessions opened",
        )?;
        registry.register(Box::new(sessions_opened_total.clone()))?;

        let sessions_closed_total = IntCounter::new(
            "host_stand_sessions_closed_total",
            "Total stream sessions closed",
        )?;
        registry.register(Box::new(sessions_closed_total.clone()))?;

        let active_sessions = IntGauge::new(
            "host_stand_active_sessions",
            "Currently open stream sessions",
        )?;
        registry.register(Box::new(active_sessions.clone()))?;

        let events_forwarded_total = IntCounter::new(
            "host_stand_events_forwarded_total",
            "Events forwarded to stream clients",
        )?;
        registry.register(Box::new(events_forwarded_total.clone()))?;

        Ok(Self {
            sessions_opened_total,
            sessions_closed_total,
            active_sessions,
            events_forwarded_total,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collector_registers_metrics() {
        let collector = MetricsCollector::new().unwrap();

        collector.record_join("venue-1", 1);
        collector.record_transition("called", "venue-1", 0);
        collector.record_session_opened();
        collector.update_health_status(2);

        let families = collector.registry().gather();
        assert!(!families.is_empty());

        let names: Vec<String> = families.iter().map(|f| f.get_name().to_string()).collect();
        assert!(names.iter().any(|n| n.contains("entries_joined")));
        assert!(names.iter().any(|n| n.contains("active_sessions")));
        assert!(names.iter().any(|n| n.contains("health_status")));
    }

    #[test]
    fn test_session_gauge_balances() {
        let collector = MetricsCollector::new().unwrap();

        collector.record_session_opened();
        collector.record_session_opened();
        collector.record_session_closed();

        assert_eq!(collector.stream().active_sessions.get(), 1);
        assert_eq!(collector.stream().sessions_opened_total.get(), 2);
        assert_eq!(collector.stream().sessions_closed_total.get(), 1);
    }
}

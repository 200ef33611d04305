//! Metrics and monitoring for the host-stand waitlist service
//!
//! This module provides Prometheus metrics collection for queue activity,
//! streaming sessions, and service health.

pub mod collector;

pub use collector::{MetricsCollector, QueueMetrics, ServiceMetrics, StreamMetrics};

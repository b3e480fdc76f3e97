//! # Application State Management
//!
//! Shared state accessed by HTTP handlers and the bridge: the loaded
//! configuration, service-level metrics, and the server start time.
//!
//! ## Thread Safety Pattern:
//! All mutable data sits behind `Arc<RwLock<T>>`: many readers or one
//! writer, shared by every handler. Configuration is read-mostly (each
//! call snapshots it once at construction); metrics are updated on every
//! request and on call start/end.

use crate::config::AppConfig;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Instant;

/// The main application state shared across all request handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Application configuration, loaded once at startup
    pub config: Arc<RwLock<AppConfig>>,

    /// Service metrics, updated by middleware and the bridge
    pub metrics: Arc<RwLock<AppMetrics>>,

    /// When the server started (never changes; Instant is Copy)
    pub start_time: Instant,
}

/// Service-level metrics collected across all requests and calls.
#[derive(Debug, Default)]
pub struct AppMetrics {
    /// Total number of HTTP requests processed since server start
    pub request_count: u64,

    /// Total number of errors encountered since server start
    pub error_count: u64,

    /// Phone calls currently bridged
    pub active_calls: u32,

    /// Per-endpoint statistics, keyed by "METHOD /path"
    pub endpoint_metrics: HashMap<String, EndpointMetric>,
}

/// Performance metrics for a specific endpoint.
#[derive(Debug, Default, Clone)]
pub struct EndpointMetric {
    /// Number of requests to this endpoint
    pub request_count: u64,

    /// Total time spent processing requests to this endpoint (milliseconds)
    pub total_duration_ms: u64,

    /// Number of errors for this endpoint
    pub error_count: u64,
}

impl AppState {
    /// Create state around the loaded configuration.
    pub fn new(config: AppConfig) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            metrics: Arc::new(RwLock::new(AppMetrics::default())),
            start_time: Instant::now(),
        }
    }

    /// Snapshot the current configuration.
    ///
    /// Cloning releases the lock immediately; callers (and each new call's
    /// bridge actor) work from their own copy.
    pub fn get_config(&self) -> AppConfig {
        self.config.read().unwrap().clone()
    }

    /// Count one HTTP request (called by middleware for every request).
    pub fn increment_request_count(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.request_count += 1;
    }

    /// Count one failed request.
    pub fn increment_error_count(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.error_count += 1;
    }

    /// Record timing for a specific endpoint.
    pub fn record_endpoint_request(&self, endpoint: &str, duration_ms: u64, is_error: bool) {
        let mut metrics = self.metrics.write().unwrap();

        let endpoint_metric = metrics.endpoint_metrics.entry(endpoint.to_string()).or_default();
        endpoint_metric.request_count += 1;
        endpoint_metric.total_duration_ms += duration_ms;

        if is_error {
            endpoint_metric.error_count += 1;
        }
    }

    /// A new call was bridged.
    pub fn increment_active_calls(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.active_calls += 1;
    }

    /// A bridged call ended. Guarded against underflow so a double teardown
    /// cannot panic the metrics path.
    pub fn decrement_active_calls(&self) {
        let mut metrics = self.metrics.write().unwrap();
        if metrics.active_calls > 0 {
            metrics.active_calls -= 1;
        }
    }

    /// Consistent copy of the metrics for the HTTP surface.
    pub fn get_metrics_snapshot(&self) -> AppMetrics {
        let metrics = self.metrics.read().unwrap();
        AppMetrics {
            request_count: metrics.request_count,
            error_count: metrics.error_count,
            active_calls: metrics.active_calls,
            endpoint_metrics: metrics.endpoint_metrics.clone(),
        }
    }

    /// Server uptime in seconds.
    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl EndpointMetric {
    /// Average response time for this endpoint.
    pub fn average_duration_ms(&self) -> f64 {
        if self.request_count > 0 {
            self.total_duration_ms as f64 / self.request_count as f64
        } else {
            0.0
        }
    }

    /// Error rate for this endpoint (0.0 to 1.0).
    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_calls_never_underflow() {
        let state = AppState::new(AppConfig::default());
        state.increment_active_calls();
        state.decrement_active_calls();
        state.decrement_active_calls();
        assert_eq!(state.get_metrics_snapshot().active_calls, 0);
    }

    #[test]
    fn test_endpoint_metrics_accumulate() {
        let state = AppState::new(AppConfig::default());
        state.record_endpoint_request("GET /health", 10, false);
        state.record_endpoint_request("GET /health", 30, true);

        let snapshot = state.get_metrics_snapshot();
        let metric = &snapshot.endpoint_metrics["GET /health"];
        assert_eq!(metric.request_count, 2);
        assert_eq!(metric.error_count, 1);
        assert_eq!(metric.average_duration_ms(), 20.0);
        assert_eq!(metric.error_rate(), 0.5);
    }
}

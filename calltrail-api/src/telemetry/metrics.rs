//! Prometheus Metrics Definitions
//!
//! Defines all calltrail metrics with appropriate labels and types.
//! Exposes a /metrics endpoint for Prometheus scraping.

use axum::{http::StatusCode, response::IntoResponse};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge, register_histogram, register_histogram_vec, CounterVec,
    Encoder, Gauge, Histogram, HistogramVec, TextEncoder,
};

use crate::error::{ApiError, ApiResult};

/// HTTP request latency buckets (seconds)
const HTTP_LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0, 10.0,
];

/// Recording download buckets (seconds), up to the download timeout
const DOWNLOAD_LATENCY_BUCKETS: &[f64] = &[0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 40.0, 60.0];

/// Global metrics instance - initialized once at startup
pub static METRICS: Lazy<ApiResult<CallTrailMetrics>> = Lazy::new(CallTrailMetrics::new);

/// Registered metrics, or `None` if registration failed.
pub fn metrics() -> Option<&'static CallTrailMetrics> {
    METRICS.as_ref().ok()
}

/// Container for all calltrail metrics.
#[derive(Clone)]
pub struct CallTrailMetrics {
    /// HTTP request counter - labels: method, path, status
    pub http_requests_total: CounterVec,

    /// HTTP request duration histogram - labels: method, path
    pub http_request_duration_seconds: HistogramVec,

    /// Lifecycle events processed - labels: phase, outcome
    pub lifecycle_events_total: CounterVec,

    /// Recording jobs processed - labels: outcome
    pub recording_jobs_total: CounterVec,

    /// Broadcast attempts - labels: kind, status
    pub broadcasts_total: CounterVec,

    /// Recording download duration
    pub recording_download_seconds: Histogram,

    /// Current WebSocket observers
    pub websocket_observers: Gauge,
}

impl CallTrailMetrics {
    /// Create and register all metrics with Prometheus.
    pub fn new() -> ApiResult<Self> {
        Ok(Self {
            http_requests_total: register_counter_vec!(
                "calltrail_http_requests_total",
                "Total number of HTTP requests",
                &["method", "path", "status"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register http_requests_total: {}", e)))?,

            http_request_duration_seconds: register_histogram_vec!(
                "calltrail_http_request_duration_seconds",
                "HTTP request duration in seconds",
                &["method", "path"],
                HTTP_LATENCY_BUCKETS.to_vec()
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register http_request_duration_seconds: {}", e)))?,

            lifecycle_events_total: register_counter_vec!(
                "calltrail_lifecycle_events_total",
                "Total lifecycle events processed",
                &["phase", "outcome"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register lifecycle_events_total: {}", e)))?,

            recording_jobs_total: register_counter_vec!(
                "calltrail_recording_jobs_total",
                "Total recording jobs processed",
                &["outcome"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register recording_jobs_total: {}", e)))?,

            broadcasts_total: register_counter_vec!(
                "calltrail_broadcasts_total",
                "Total broadcast attempts per notifier",
                &["kind", "status"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register broadcasts_total: {}", e)))?,

            recording_download_seconds: register_histogram!(
                "calltrail_recording_download_seconds",
                "Recording download duration in seconds",
                DOWNLOAD_LATENCY_BUCKETS.to_vec()
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register recording_download_seconds: {}", e)))?,

            websocket_observers: register_gauge!(
                "calltrail_websocket_observers",
                "Current number of connected WebSocket observers"
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register websocket_observers: {}", e)))?,
        })
    }

    /// Record an HTTP request.
    pub fn record_http_request(&self, method: &str, path: &str, status: u16, duration_secs: f64) {
        let status_str = status.to_string();
        self.http_requests_total
            .with_label_values(&[method, path, &status_str])
            .inc();
        self.http_request_duration_seconds
            .with_label_values(&[method, path])
            .observe(duration_secs);
    }

    pub fn record_lifecycle_event(&self, phase: &str, outcome: &str) {
        self.lifecycle_events_total
            .with_label_values(&[phase, outcome])
            .inc();
    }

    pub fn record_recording_job(&self, outcome: &str) {
        self.recording_jobs_total.with_label_values(&[outcome]).inc();
    }

    /// Record a broadcast attempt. `status` is success, failure, timeout or skipped.
    pub fn record_broadcast(&self, kind: &str, status: &str) {
        self.broadcasts_total.with_label_values(&[kind, status]).inc();
    }

    pub fn observe_download(&self, duration_secs: f64) {
        self.recording_download_seconds.observe(duration_secs);
    }

    /// Increment WebSocket observer count.
    pub fn ws_connected(&self) {
        self.websocket_observers.inc();
    }

    /// Decrement WebSocket observer count.
    pub fn ws_disconnected(&self) {
        self.websocket_observers.dec();
    }
}

/// Handler for GET /metrics endpoint.
///
/// Returns Prometheus text format metrics.
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    match encoder.encode(&metric_families, &mut buffer) {
        Ok(_) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                format!("Failed to encode metrics: {}", e).into_bytes(),
            )
        }
    }
}

//! Metrics module for Prometheus
//!
//! This module provides metrics collection for the gateway service:
//! - Inbound request count by method, route, and status
//! - Inbound request latency histogram
//!
//! The `path` label holds the matched route template (`/api/:table/:id`), never
//! the raw request path, and `method` is folded to the standard verbs, so label
//! cardinality stays bounded whatever clients send.
//! - Backend call count by method and outcome

use prometheus::{CounterVec, Encoder, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Gateway metrics collector
#[derive(Clone)]
pub struct GatewayMetrics {
    registry: Registry,
    request_counter: CounterVec,
    request_latency: HistogramVec,
    backend_call_counter: CounterVec,
    // Plain counters for the shutdown summary
    total_requests: Arc<AtomicU64>,
    total_errors: Arc<AtomicU64>,
}

impl GatewayMetrics {
    /// Create a new metrics instance
    pub fn new() -> Self {
        let registry = Registry::new();

        let request_counter = CounterVec::new(
            Opts::new("gateway_requests_total", "Total number of requests"),
            &["method", "path", "status"],
        )
        .expect("Failed to create request counter");

        let request_latency = HistogramVec::new(
            HistogramOpts::new(
                "gateway_request_latency_seconds",
                "Request latency in seconds",
            )
            .buckets(vec![
                0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
            ]),
            &["method", "path"],
        )
        .expect("Failed to create latency histogram");

        let backend_call_counter = CounterVec::new(
            Opts::new(
                "gateway_backend_calls_total",
                "Total number of calls issued to the backend",
            ),
            &["method", "status"],
        )
        .expect("Failed to create backend call counter");

        registry
            .register(Box::new(request_counter.clone()))
            .expect("Failed to register request counter");
        registry
            .register(Box::new(request_latency.clone()))
            .expect("Failed to register latency histogram");
        registry
            .register(Box::new(backend_call_counter.clone()))
            .expect("Failed to register backend call counter");

        Self {
            registry,
            request_counter,
            request_latency,
            backend_call_counter,
            total_requests: Arc::new(AtomicU64::new(0)),
            total_errors: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Record a request with its status and latency. `route` is the matched
    /// route template, or [`UNMATCHED_ROUTE`].
    pub fn record_request(&self, method: &str, route: &str, status: u16, latency: Duration) {
        let status_str = status.to_string();
        let method = method_label(method);

        self.request_counter
            .with_label_values(&[method, route, &status_str])
            .inc();

        self.request_latency
            .with_label_values(&[method, route])
            .observe(latency.as_secs_f64());

        self.total_requests.fetch_add(1, Ordering::Relaxed);
        if status >= 400 {
            self.total_errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record one backend call. `None` means no response was received.
    pub fn record_backend_call(&self, method: &str, status: Option<u16>) {
        let status_str = match status {
            Some(code) => code.to_string(),
            None => "unreachable".to_string(),
        };
        self.backend_call_counter
            .with_label_values(&[method_label(method), &status_str])
            .inc();
    }

    /// Get the Prometheus metrics output
    pub fn prometheus_output(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            warn!("Failed to encode metrics: {}", e);
            return String::new();
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }

    /// Get total request count
    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    /// Get total error count
    pub fn total_errors(&self) -> u64 {
        self.total_errors.load(Ordering::Relaxed)
    }
}

/// Route label for requests no route matched
pub const UNMATCHED_ROUTE: &str = "unmatched";

fn method_label(method: &str) -> &str {
    match method {
        "GET" | "HEAD" | "POST" | "PUT" | "PATCH" | "DELETE" | "OPTIONS" => method,
        _ => "OTHER",
    }
}

impl Default for GatewayMetrics {
    fn default() -> Self {
        Self::new()
    }
}

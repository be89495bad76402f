//! Health check module
//!
//! `GET /` answers with the fixed `{"code": 0, "data": "ok"}` envelope. The
//! optional detailed endpoint reports version and uptime.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Payload of the root liveness envelope
pub const LIVENESS_DATA: &str = "ok";

/// Health status
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
}

/// Health check response
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_seconds: u64,
    pub timestamp: DateTime<Utc>,
    pub backend: String,
}

/// Health checker service
#[derive(Clone)]
pub struct HealthChecker {
    start_time: Instant,
    version: String,
    backend: String,
}

impl HealthChecker {
    pub fn new(backend: impl Into<String>) -> Self {
        Self {
            start_time: Instant::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            backend: backend.into(),
        }
    }

    /// Liveness status, healthy whenever the process is serving
    pub fn liveness(&self) -> HealthResponse {
        HealthResponse {
            status: HealthStatus::Healthy,
            version: self.version.clone(),
            uptime_seconds: self.uptime_seconds(),
            timestamp: Utc::now(),
            backend: self.backend.clone(),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_liveness() {
        let checker = HealthChecker::new("http://localhost:3001/");
        let health = checker.liveness();

        assert_eq!(health.status, HealthStatus::Healthy);
        assert!(!health.version.is_empty());
        assert_eq!(health.backend, "http://localhost:3001/");
    }

    #[test]
    fn test_liveness_serialization() {
        let checker = HealthChecker::new("http://db:3001/");
        let value = serde_json::to_value(checker.liveness()).unwrap();

        assert_eq!(value["status"], "healthy");
        assert!(value["uptime_seconds"].is_number());
        assert!(value["timestamp"].is_string());
    }
}

//! Table Gateway - a small REST gateway over a JSON backend
//!
//! This service provides:
//! - A uniform `/api/:table[/:id]` CRUD surface forwarded to one backend
//! - Id assignment on create (`max(id) + 1`)
//! - Fixed success and error envelopes
//! - Prometheus metrics
//! - Health checks

pub mod backend;
pub mod config;
pub mod envelope;
pub mod gateway;
pub mod health;
pub mod metrics;
pub mod server;

pub use config::GatewayConfig;
pub use envelope::{ApiError, Success};
pub use gateway::Gateway;

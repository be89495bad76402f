//! Configuration module for the gateway service
//!
//! Configuration is read from an optional TOML file and then overridden by
//! environment variables (`PORT`, `HOST`, `BACKEND_URL`, `BACKEND_TIMEOUT`,
//! `GATEWAY_ENV`).

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Runtime mode, controls how much fault detail is exposed to callers
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeMode {
    /// Internal fault details are hidden from responses
    #[default]
    Production,
    /// Internal fault details are included in responses
    Development,
}

impl RuntimeMode {
    pub fn is_development(self) -> bool {
        matches!(self, RuntimeMode::Development)
    }
}

impl std::str::FromStr for RuntimeMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Ok(RuntimeMode::Production),
            "development" | "dev" => Ok(RuntimeMode::Development),
            other => anyhow::bail!("Unknown runtime mode '{}'", other),
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to bind to
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Backend data store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the backend, e.g. `http://localhost:3001`
    #[serde(default = "default_backend_url")]
    pub url: String,
    /// Per-call timeout in seconds. Unset means backend calls never time out.
    #[serde(default)]
    pub timeout: Option<u64>,
}

fn default_backend_url() -> String {
    "http://localhost:3001".to_string()
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: default_backend_url(),
            timeout: None,
        }
    }
}

impl BackendConfig {
    pub fn timeout_duration(&self) -> Option<Duration> {
        self.timeout.map(Duration::from_secs)
    }
}

/// Request handling behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayBehavior {
    /// Read the record before replacing or deleting it
    #[serde(default = "default_enabled")]
    pub existence_probe: bool,
    /// Answer CORS preflight and attach permissive CORS headers
    #[serde(default = "default_enabled")]
    pub cors: bool,
}

impl Default for GatewayBehavior {
    fn default() -> Self {
        Self {
            existence_probe: true,
            cors: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub mode: RuntimeMode,
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Whether metrics are enabled
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Path to expose metrics
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

fn default_enabled() -> bool {
    true
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: default_metrics_path(),
        }
    }
}

/// Health check configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Whether the detailed health endpoint is enabled
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Path for health check endpoint
    #[serde(default = "default_health_path")]
    pub path: String,
}

fn default_health_path() -> String {
    "/health".to_string()
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: default_health_path(),
        }
    }
}

/// Main gateway configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub gateway: GatewayBehavior,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub health: HealthConfig,
}

impl GatewayConfig {
    /// Read a TOML file. Not validated: environment overrides may still fix
    /// it up, so [`GatewayConfig::load`] validates afterwards.
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read config '{}': {}", path.display(), e))?;
        Ok(toml::from_str(&contents)?)
    }

    /// Load the optional file, apply process environment overrides and validate
    pub fn load(path: Option<&str>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => GatewayConfig::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides using the given lookup
    pub fn apply_env<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("PORT") {
            self.server.port = port
                .trim()
                .parse()
                .map_err(|e| anyhow::anyhow!("Invalid PORT '{}': {}", port, e))?;
        }
        if let Some(host) = lookup("HOST") {
            self.server.host = host;
        }
        if let Some(url) = lookup("BACKEND_URL") {
            self.backend.url = url;
        }
        if let Some(timeout) = lookup("BACKEND_TIMEOUT") {
            let secs = timeout
                .trim()
                .parse()
                .map_err(|e| anyhow::anyhow!("Invalid BACKEND_TIMEOUT '{}': {}", timeout, e))?;
            self.backend.timeout = Some(secs);
        }
        if let Some(mode) = lookup("GATEWAY_ENV") {
            self.runtime.mode = mode.parse()?;
        }
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        let url = reqwest::Url::parse(&self.backend.url)
            .map_err(|e| anyhow::anyhow!("Invalid backend URL '{}': {}", self.backend.url, e))?;
        if !matches!(url.scheme(), "http" | "https") {
            anyhow::bail!(
                "Backend URL '{}' must use http or https",
                self.backend.url
            );
        }

        if self.backend.timeout == Some(0) {
            anyhow::bail!("Backend timeout must be greater than zero");
        }

        let endpoints = [
            ("Metrics", self.metrics.enabled, &self.metrics.path),
            ("Health", self.health.enabled, &self.health.path),
        ];
        for (name, enabled, path) in endpoints {
            if !enabled {
                continue;
            }
            if !path.starts_with('/') {
                anyhow::bail!("{} path '{}' must start with '/'", name, path);
            }
            if path == "/" || path == "/api" || path.starts_with("/api/") {
                anyhow::bail!("{} path '{}' collides with the table API", name, path);
            }
        }
        if self.metrics.enabled && self.health.enabled && self.metrics.path == self.health.path {
            anyhow::bail!("Metrics and health endpoints share the path '{}'", self.health.path);
        }

        Ok(())
    }

    /// Get server address
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

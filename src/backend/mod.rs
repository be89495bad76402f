//! Backend client module
//!
//! Thin JSON client for the backend data store. The backend is expected to
//! serve `GET/POST/PUT/PATCH/DELETE` on `/{table}` and `/{table}/{id}`.

use crate::config::BackendConfig;
use crate::metrics::GatewayMetrics;
use reqwest::{Client, Method, Url};
use serde_json::{Map, Value};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Failure of a single backend call
#[derive(Debug, Error)]
pub enum BackendError {
    /// The backend answered with a non-success status
    #[error("backend returned {status} {reason}")]
    Status {
        status: u16,
        reason: String,
        body: String,
    },

    /// No response was received
    #[error("backend unreachable: {0}")]
    Unreachable(String),

    /// The configured per-call timeout elapsed
    #[error("backend timed out: {0}")]
    Timeout(String),

    /// The backend answered with something other than the expected JSON
    #[error("unexpected backend response: {0}")]
    Decode(String),

    /// The table or id cannot be addressed as a single path segment
    #[error("cannot address '{0}' on the backend")]
    InvalidUrl(String),
}

impl From<reqwest::Error> for BackendError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            BackendError::Timeout(e.to_string())
        } else {
            BackendError::Unreachable(e.to_string())
        }
    }
}

/// HTTP client bound to one backend base URL
#[derive(Clone)]
pub struct BackendClient {
    client: Client,
    base: Url,
    metrics: Arc<GatewayMetrics>,
}

impl BackendClient {
    /// Create a client for the configured backend
    pub fn new(config: &BackendConfig, metrics: Arc<GatewayMetrics>) -> anyhow::Result<Self> {
        let base = Url::parse(&config.url)?;
        if base.cannot_be_a_base() {
            anyhow::bail!("Backend URL '{}' cannot be used as a base", config.url);
        }

        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout_duration() {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build()?,
            base,
            metrics,
        })
    }

    /// Base URL the client forwards to
    pub fn base_url(&self) -> &str {
        self.base.as_str()
    }

    /// Fetch the full collection
    pub async fn list(&self, table: &str) -> Result<Value, BackendError> {
        let url = self.url(table, None)?;
        self.send(Method::GET, url, None).await
    }

    /// Fetch a single record
    pub async fn get(&self, table: &str, id: &str) -> Result<Value, BackendError> {
        let url = self.url(table, Some(id))?;
        self.send(Method::GET, url, None).await
    }

    /// Submit a new record to the collection
    pub async fn create(
        &self,
        table: &str,
        record: &Map<String, Value>,
    ) -> Result<Value, BackendError> {
        let url = self.url(table, None)?;
        self.send(Method::POST, url, Some(record)).await
    }

    /// Replace a record in full
    pub async fn replace(
        &self,
        table: &str,
        id: &str,
        record: &Map<String, Value>,
    ) -> Result<Value, BackendError> {
        let url = self.url(table, Some(id))?;
        self.send(Method::PUT, url, Some(record)).await
    }

    /// Merge the given fields into a record
    pub async fn patch(
        &self,
        table: &str,
        id: &str,
        fields: &Map<String, Value>,
    ) -> Result<Value, BackendError> {
        let url = self.url(table, Some(id))?;
        self.send(Method::PATCH, url, Some(fields)).await
    }

    /// Remove a record
    pub async fn delete(&self, table: &str, id: &str) -> Result<Value, BackendError> {
        let url = self.url(table, Some(id))?;
        self.send(Method::DELETE, url, None).await
    }

    /// Build `{base}/{table}` or `{base}/{table}/{id}`, encoding each segment.
    ///
    /// `.` and `..` are refused: the URL serializer would resolve them and
    /// turn a record call into a collection call.
    fn url(&self, table: &str, id: Option<&str>) -> Result<Url, BackendError> {
        if let Some(segment) = std::iter::once(table)
            .chain(id)
            .find(|segment| !is_addressable_segment(segment))
        {
            return Err(BackendError::InvalidUrl(segment.to_string()));
        }

        let mut url = self.base.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| BackendError::InvalidUrl(self.base.to_string()))?;
            segments.pop_if_empty().push(table);
            if let Some(id) = id {
                segments.push(id);
            }
        }
        Ok(url)
    }

    async fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<&Map<String, Value>>,
    ) -> Result<Value, BackendError> {
        debug!(method = %method, url = %url, "Forwarding to backend");

        let mut request = self.client.request(method.clone(), url.clone());
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                self.metrics.record_backend_call(method.as_str(), None);
                warn!(method = %method, url = %url, "Backend call failed: {}", e);
                return Err(e.into());
            }
        };

        let status = response.status();
        self.metrics
            .record_backend_call(method.as_str(), Some(status.as_u16()));

        let bytes = response.bytes().await?;

        if !status.is_success() {
            warn!(
                method = %method,
                url = %url,
                status = status.as_u16(),
                "Backend returned an error status"
            );
            return Err(BackendError::Status {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("Unknown").to_string(),
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }

        serde_json::from_slice(&bytes).map_err(|e| BackendError::Decode(e.to_string()))
    }
}

/// Whether a table or id can stand as one literal path segment
pub fn is_addressable_segment(segment: &str) -> bool {
    !matches!(segment, "" | "." | "..")
}

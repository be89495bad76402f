//! HTTP front end
//!
//! Routes:
//! - `GET /` liveness envelope
//! - `GET|POST /api/:table`
//! - `GET|PUT|PATCH|DELETE /api/:table/:id`
//! - optional health and metrics endpoints
//!
//! The table routes also answer with a trailing slash. Anything else, including
//! an unsupported method on a known path or a `.`/`..` table or id, gets the
//! not-found envelope.

use crate::backend::{is_addressable_segment, BackendClient};
use crate::config::GatewayConfig;
use crate::envelope::{ApiError, Success};
use crate::gateway::Gateway;
use crate::health::{HealthChecker, LIVENESS_DATA};
use crate::metrics::{GatewayMetrics, UNMATCHED_ROUTE};
use axum::body::Bytes;
use axum::extract::rejection::PathRejection;
use axum::extract::{FromRequest, FromRequestParts, MatchedPath, OriginalUri, Path, Request, State};
use axum::http::request::Parts;
use axum::http::{StatusCode, Uri};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, MethodRouter};
use axum::{async_trait, Json, Router};
use serde_json::{Map, Value};
use std::any::Any;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<Gateway>,
    pub metrics: Arc<GatewayMetrics>,
    pub health: Arc<HealthChecker>,
}

impl AppState {
    pub fn from_config(config: &GatewayConfig) -> anyhow::Result<Self> {
        let metrics = Arc::new(GatewayMetrics::new());
        let backend = BackendClient::new(&config.backend, metrics.clone())?;
        let health = Arc::new(HealthChecker::new(backend.base_url()));
        let gateway = Arc::new(Gateway::new(backend, config.gateway.existence_probe));

        Ok(Self {
            gateway,
            metrics,
            health,
        })
    }
}

/// Build the application router for the given configuration
pub fn build_app(config: &GatewayConfig) -> anyhow::Result<Router> {
    let state = AppState::from_config(config)?;
    Ok(router(config, state))
}

pub fn router(config: &GatewayConfig, state: AppState) -> Router {
    let mut router = Router::new()
        .route("/", get(liveness_handler).fallback(not_found))
        .route("/api/:table", collection_routes())
        .route("/api/:table/", collection_routes())
        .route("/api/:table/:id", record_routes())
        .route("/api/:table/:id/", record_routes());

    if config.health.enabled {
        router = router.route(&config.health.path, get(health_handler));
    }
    if config.metrics.enabled {
        router = router.route(&config.metrics.path, get(metrics_handler));
    }

    let expose = config.runtime.mode.is_development();
    let router = router
        .fallback(not_found)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(middleware::from_fn_with_state(
                    state.metrics.clone(),
                    track_requests,
                ))
                .layer(CatchPanicLayer::custom(
                    move |err: Box<dyn Any + Send + 'static>| panic_response(err, expose),
                )),
        )
        .with_state(state);

    if config.gateway.cors {
        router.layer(CorsLayer::permissive())
    } else {
        router
    }
}

fn collection_routes() -> MethodRouter<AppState> {
    get(list_records).post(create_record).fallback(not_found)
}

fn record_routes() -> MethodRouter<AppState> {
    get(get_record)
        .put(replace_record)
        .patch(patch_record)
        .delete(delete_record)
        .fallback(not_found)
}

/// Bind the configured address and serve until Ctrl+C
pub async fn serve(config: GatewayConfig) -> anyhow::Result<()> {
    let state = AppState::from_config(&config)?;
    let metrics = state.metrics.clone();
    let app = router(&config, state);

    let listener = TcpListener::bind(config.server_addr()).await?;
    info!("Starting gateway server on {}", listener.local_addr()?);
    info!("Forwarding /api/:table requests to {}", config.backend.url);
    if config.health.enabled {
        info!("Health endpoint enabled at {}", config.health.path);
    }
    if config.metrics.enabled {
        info!("Metrics endpoint enabled at {}", config.metrics.path);
    }
    if config.runtime.mode.is_development() {
        info!("Development mode: internal fault details are exposed");
    }

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!(
        requests = metrics.total_requests(),
        errors = metrics.total_errors(),
        "Gateway stopped"
    );
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl+C, graceful shutdown disabled: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// A JSON object request body. An empty body reads as `{}`.
pub struct JsonObject(pub Map<String, Value>);

#[async_trait]
impl<S> FromRequest<S> for JsonObject
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|e| ApiError::InvalidBody {
                status: e.status(),
                detail: e.body_text(),
            })?;

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(JsonObject(Map::new()));
        }

        serde_json::from_slice(&bytes)
            .map(JsonObject)
            .map_err(|e| ApiError::InvalidBody {
                status: StatusCode::BAD_REQUEST,
                detail: e.to_string(),
            })
    }
}

/// The `:table` parameter of a collection route
pub struct TablePath(pub String);

/// The `:table` and `:id` parameters of a record route
pub struct RecordPath(pub String, pub String);

#[async_trait]
impl<S> FromRequestParts<S> for TablePath
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(table) = Path::<String>::from_request_parts(parts, state)
            .await
            .map_err(invalid_path)?;
        ensure_addressable(parts, &[&table])?;
        Ok(TablePath(table))
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for RecordPath
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path((table, id)) = Path::<(String, String)>::from_request_parts(parts, state)
            .await
            .map_err(invalid_path)?;
        ensure_addressable(parts, &[&table, &id])?;
        Ok(RecordPath(table, id))
    }
}

fn invalid_path(rejection: PathRejection) -> ApiError {
    ApiError::InvalidPath(rejection.body_text())
}

/// `.` and `..` (also when sent percent-encoded) name no table or record
fn ensure_addressable(parts: &Parts, segments: &[&str]) -> Result<(), ApiError> {
    if segments.iter().all(|segment| is_addressable_segment(segment)) {
        return Ok(());
    }
    let uri = parts
        .extensions
        .get::<OriginalUri>()
        .map(|OriginalUri(uri)| uri)
        .unwrap_or(&parts.uri);
    Err(ApiError::NotFound {
        path: requested_path(uri),
    })
}

/// Path and query as the client sent them
fn requested_path(uri: &Uri) -> String {
    uri.path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| uri.path().to_string())
}

async fn create_record(
    State(state): State<AppState>,
    TablePath(table): TablePath,
    JsonObject(payload): JsonObject,
) -> Result<Success<Value>, ApiError> {
    state.gateway.create(&table, payload).await.map(Success::new)
}

async fn list_records(
    State(state): State<AppState>,
    TablePath(table): TablePath,
) -> Result<Success<Value>, ApiError> {
    state.gateway.list_all(&table).await.map(Success::new)
}

async fn get_record(
    State(state): State<AppState>,
    RecordPath(table, id): RecordPath,
) -> Result<Success<Value>, ApiError> {
    state.gateway.get_one(&table, &id).await.map(Success::new)
}

async fn replace_record(
    State(state): State<AppState>,
    RecordPath(table, id): RecordPath,
    JsonObject(payload): JsonObject,
) -> Result<Success<Value>, ApiError> {
    state
        .gateway
        .replace_one(&table, &id, payload)
        .await
        .map(Success::new)
}

async fn patch_record(
    State(state): State<AppState>,
    RecordPath(table, id): RecordPath,
    JsonObject(fields): JsonObject,
) -> Result<Success<Value>, ApiError> {
    state
        .gateway
        .patch_one(&table, &id, fields)
        .await
        .map(Success::new)
}

async fn delete_record(
    State(state): State<AppState>,
    RecordPath(table, id): RecordPath,
) -> Result<Success<bool>, ApiError> {
    state.gateway.delete_one(&table, &id).await.map(Success::new)
}

async fn liveness_handler() -> Success<&'static str> {
    Success::new(LIVENESS_DATA)
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.health.liveness()))
}

async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, state.metrics.prometheus_output())
}

async fn not_found(OriginalUri(uri): OriginalUri) -> ApiError {
    ApiError::NotFound {
        path: requested_path(&uri),
    }
}

async fn track_requests(
    State(metrics): State<Arc<GatewayMetrics>>,
    req: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = req.method().to_string();
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|matched| matched.as_str().to_string())
        .unwrap_or_else(|| UNMATCHED_ROUTE.to_string());

    let response = next.run(req).await;

    metrics.record_request(&method, &route, response.status().as_u16(), start.elapsed());
    response
}

fn panic_response(err: Box<dyn Any + Send + 'static>, expose: bool) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };
    ApiError::Internal { detail, expose }.into_response()
}

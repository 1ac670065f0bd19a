//! Security Monitoring Dashboard API
//!
//! REST server over the monitor engine: alert queries, lifecycle actions,
//! and status endpoints for the dashboard.

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use monitor_scheduler::MonitorHandle;
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

mod rate_limit;
mod routes;

pub use rate_limit::{create_governor_config, RateLimitConfig};

/// Application state shared across handlers
pub struct AppState {
    /// Facade over the running monitor engine
    pub handle: MonitorHandle,
    /// Version string
    pub version: String,
    /// Start time
    pub start_time: std::time::Instant,
}

impl AppState {
    pub fn new(handle: MonitorHandle) -> Self {
        Self {
            handle,
            version: env!("CARGO_PKG_VERSION").to_string(),
            start_time: std::time::Instant::now(),
        }
    }
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: u64,
    pub version: String,
    pub uptime_seconds: u64,
    pub metrics: EngineMetrics,
}

/// Engine-level counters
#[derive(Debug, Serialize)]
pub struct EngineMetrics {
    pub active_alerts: usize,
    pub resolved_alerts: usize,
    pub patterns: usize,
}

/// Create the application router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/v1/health", get(health_handler))
        .route("/api/v1/status", get(routes::status::get_status))
        .route("/api/v1/alerts", get(routes::alerts::get_alerts))
        .route(
            "/api/v1/alerts/:pattern/:source",
            get(routes::alerts::get_alert),
        )
        .route(
            "/api/v1/alerts/:pattern/:source/acknowledge",
            post(routes::alerts::acknowledge_alert),
        )
        .route(
            "/api/v1/alerts/:pattern/:source/resolve",
            post(routes::alerts::resolve_alert),
        )
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Health check handler
async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let snapshot = state.handle.snapshot();

    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp,
        version: state.version.clone(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        metrics: EngineMetrics {
            active_alerts: snapshot.active.len(),
            resolved_alerts: snapshot.resolved.len(),
            patterns: state.handle.registry().patterns().len(),
        },
    })
}

/// Initialize logging
pub fn init_logging() {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");
}

/// Run the server until a shutdown signal arrives
pub async fn run_server(addr: &str, handle: MonitorHandle) -> std::io::Result<()> {
    let state = Arc::new(AppState::new(handle));
    let app = create_router(state);

    info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Shutdown signal received");
}

use axum::{
    Json, Router,
    extract::State,
    http::{StatusCode, header},
    response::IntoResponse,
    routing::{get, post},
};
use serde_json::json;
use std::{net::SocketAddr, sync::Arc, time::SystemTime};
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::{
    VERSION,
    metrics::ServerMetrics,
    reload::{ReloadHandle, ReloadRequest},
    zone::ZoneStore,
};

/// HTTP listener for health checks, metrics export and reload triggers
pub struct HttpServer {
    state: AppState,
    bind_addr: SocketAddr,
}

#[derive(Clone)]
struct AppState {
    store: Arc<ZoneStore>,
    metrics: Arc<ServerMetrics>,
    reload: ReloadHandle,
    startup_time: SystemTime,
}

impl HttpServer {
    pub fn new(
        store: Arc<ZoneStore>,
        metrics: Arc<ServerMetrics>,
        reload: ReloadHandle,
        bind_addr: SocketAddr,
    ) -> Self {
        Self {
            state: AppState {
                store,
                metrics,
                reload,
                startup_time: SystemTime::now(),
            },
            bind_addr,
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(health_check))
            .route("/metrics", get(prometheus_metrics))
            .route("/reload", post(trigger_reload))
            .with_state(self.state.clone())
    }

    /// Bind the configured address and serve
    pub async fn start(self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let listener = TcpListener::bind(self.bind_addr).await?;
        self.serve(listener).await
    }

    pub async fn serve(
        self,
        listener: TcpListener,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        info!("Starting HTTP server on {}", listener.local_addr()?);
        axum::serve(listener, self.router()).await?;
        Ok(())
    }
}

/// Health check with zone and reload status
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.store.snapshot();
    let uptime = state
        .startup_time
        .elapsed()
        .map(|d| d.as_secs())
        .unwrap_or_default();

    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "version": VERSION,
            "zones": snapshot.len(),
            "last_sync": snapshot.synced_at().to_rfc3339(),
            "reload_state": state.reload.state().to_string(),
            "uptime_seconds": uptime,
        })),
    )
}

/// Prometheus metrics endpoint
async fn prometheus_metrics(State(state): State<AppState>) -> impl IntoResponse {
    match state.metrics.export() {
        Ok(metrics) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
            metrics,
        ),
        Err(e) => {
            error!("Failed to export metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                "Failed to export metrics".to_string(),
            )
        }
    }
}

/// Queue a reload cycle, same path as SIGHUP
async fn trigger_reload(State(state): State<AppState>) -> impl IntoResponse {
    match state.reload.request() {
        ReloadRequest::Queued => {
            info!("Zone reload requested via HTTP endpoint");
            (
                StatusCode::ACCEPTED,
                Json(json!({"status": "queued"})),
            )
        }
        ReloadRequest::Coalesced => (
            StatusCode::ACCEPTED,
            Json(json!({"status": "coalesced"})),
        ),
        ReloadRequest::Stopped => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"status": "error", "message": "reload coordinator is not running"})),
        ),
    }
}

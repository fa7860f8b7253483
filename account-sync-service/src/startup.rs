//! Application startup and lifecycle management.

use crate::config::AccountSyncConfig;
use crate::handlers::{sync_progress, trigger_sync};
use crate::scheduler::run_schedule;
use crate::services::{
    get_metrics, init_metrics, record_http_request, HttpReconciliationBackend,
    ReconciliationBackend, SyncRegistry,
};
use axum::{
    extract::{MatchedPath, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use service_core::error::AppError;
use service_core::middleware::request_id_middleware;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub service_name: String,
    pub registry: Arc<SyncRegistry>,
}

/// Health check endpoint for Docker/K8s liveness probes.
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "service": state.service_name,
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

/// Metrics endpoint for Prometheus scraping.
async fn metrics_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        get_metrics(),
    )
}

async fn track_metrics(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().to_string();
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(req).await;

    record_http_request(
        &method,
        &path,
        response.status().as_str(),
        start.elapsed().as_secs_f64(),
    );
    response
}

/// HTTP routes of the service.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler))
        .route("/v1/tenants/:tenant_id/sync", post(trigger_sync))
        .route("/v1/tenants/:tenant_id/sync/progress", get(sync_progress))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(track_metrics))
        .layer(middleware::from_fn(request_id_middleware))
        .with_state(state)
}

/// Application container for managing server lifecycle.
pub struct Application {
    http_port: u16,
    http_listener: TcpListener,
    state: AppState,
    config: AccountSyncConfig,
    shutdown: CancellationToken,
}

impl Application {
    /// Build the application against the configured HTTP backend.
    pub async fn build(config: AccountSyncConfig) -> Result<Self, AppError> {
        let backend = HttpReconciliationBackend::new(config.backend.clone()).map_err(|e| {
            tracing::error!(error = %e, "Failed to create reconciliation backend client");
            e
        })?;
        Self::build_with_backend(config, Arc::new(backend)).await
    }

    /// Build the application with any backend. Used by tests.
    pub async fn build_with_backend(
        config: AccountSyncConfig,
        backend: Arc<dyn ReconciliationBackend>,
    ) -> Result<Self, AppError> {
        init_metrics();

        let registry = Arc::new(SyncRegistry::new(backend, config.sync.clone()));
        let state = AppState {
            service_name: config.service_name.clone(),
            registry,
        };

        let host: std::net::IpAddr = config.common.host.parse().map_err(|e| {
            AppError::ConfigError(anyhow::anyhow!("Invalid host '{}': {}", config.common.host, e))
        })?;
        let http_addr = SocketAddr::new(host, config.common.port);
        let http_listener = TcpListener::bind(http_addr).await.map_err(|e| {
            tracing::error!(error = %e, addr = %http_addr, "Failed to bind HTTP listener");
            AppError::from(e)
        })?;
        let http_port = http_listener.local_addr()?.port();

        tracing::info!(http_port = http_port, "Account sync service listener bound");

        Ok(Self {
            http_port,
            http_listener,
            state,
            config,
            shutdown: CancellationToken::new(),
        })
    }

    /// Get the HTTP port the server is listening on.
    pub fn http_port(&self) -> u16 {
        self.http_port
    }

    pub fn registry(&self) -> Arc<SyncRegistry> {
        self.state.registry.clone()
    }

    /// Token that stops background work started by `run_until_stopped`.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run the application until stopped.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let mut completed = self.state.registry.subscribe();
        let events_shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = events_shutdown.cancelled() => break,
                    event = completed.recv() => match event {
                        Ok(event) => tracing::info!(
                            tenant_id = %event.tenant_id,
                            total = event.total,
                            successes = event.successes,
                            failures = event.failures,
                            "Sync run completed"
                        ),
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "Completion listener lagged");
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
        });

        if self.config.schedule.is_enabled() {
            tokio::spawn(run_schedule(
                self.state.registry.clone(),
                self.config.schedule.clone(),
                self.shutdown.clone(),
            ));
        }

        tracing::info!(
            service = %self.state.service_name,
            version = env!("CARGO_PKG_VERSION"),
            http_port = self.http_port,
            "Service ready to accept connections"
        );

        let shutdown = self.shutdown.clone();
        let result = axum::serve(self.http_listener, router(self.state))
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await;

        if let Err(e) = result {
            tracing::error!(error = %e, "HTTP server error");
            return Err(std::io::Error::other(format!("HTTP server error: {}", e)));
        }

        Ok(())
    }
}

//! JSON over HTTP.
//!
//! Every request gets its own [`CancelToken`] armed with the configured
//! request timeout. Category failures are part of a normal 200 response;
//! only a failed capture task turns into a 500.

use crate::aggregator::{CaptureError, Category, SnapshotAggregator};
use crate::cancel::CancelToken;
use crate::config::Config;
use crate::types::{
    Captured, CpuSnapshot, DiskSnapshot, GpuSnapshot, HostInfo, MemorySnapshot, NetworkSnapshot,
    PartitionUsage, PerformanceResources, Snapshot, SystemSnapshot,
};
use crate::utils::time::iso_now;
use anyhow::Context;
use axum::{
    Json, Router,
    extract::State,
    http::{HeaderValue, StatusCode, header},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
};
use log::{info, warn};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

pub struct AppState {
    aggregator: Arc<SnapshotAggregator>,
    request_timeout: Duration,
}

impl AppState {
    pub fn new(aggregator: Arc<SnapshotAggregator>, request_timeout: Duration) -> Self {
        Self {
            aggregator,
            request_timeout,
        }
    }
}

#[derive(Debug, Serialize)]
struct DisksResponse {
    disks: Vec<PartitionUsage>,
    count: usize,
    timestamp: String,
}

impl IntoResponse for CaptureError {
    fn into_response(self) -> Response {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": self.to_string() })),
        )
            .into_response()
    }
}

type ApiResult<T> = Result<Json<T>, CaptureError>;

async fn capture<T, F>(
    state: &AppState,
    category: Category,
    capture: F,
) -> Result<Captured<T>, CaptureError>
where
    T: Send + 'static,
    F: FnOnce(&SnapshotAggregator) -> Captured<T> + Send + 'static,
{
    let cancel = CancelToken::new();
    let _timeout = cancel.cancel_after(state.request_timeout);
    state.aggregator.capture(category, &cancel, capture).await
}

async fn handle_snapshot(State(state): State<Arc<AppState>>) -> ApiResult<Snapshot> {
    let cancel = CancelToken::new();
    let _timeout = cancel.cancel_after(state.request_timeout);
    state.aggregator.capture_snapshot(&cancel).await.map(Json)
}

async fn handle_resources(State(state): State<Arc<AppState>>) -> ApiResult<PerformanceResources> {
    let cancel = CancelToken::new();
    let _timeout = cancel.cancel_after(state.request_timeout);
    state.aggregator.capture_resources(&cancel).await.map(Json)
}

async fn handle_cpu(State(state): State<Arc<AppState>>) -> ApiResult<Captured<CpuSnapshot>> {
    capture(&state, Category::Cpu, SnapshotAggregator::capture_cpu)
        .await
        .map(Json)
}

async fn handle_memory(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Captured<MemorySnapshot>> {
    capture(&state, Category::Memory, SnapshotAggregator::capture_memory)
        .await
        .map(Json)
}

async fn handle_disk(State(state): State<Arc<AppState>>) -> ApiResult<Captured<DiskSnapshot>> {
    capture(&state, Category::Disk, SnapshotAggregator::capture_disk)
        .await
        .map(Json)
}

async fn handle_network(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Captured<NetworkSnapshot>> {
    capture(&state, Category::Network, SnapshotAggregator::capture_network)
        .await
        .map(Json)
}

async fn handle_system(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Captured<SystemSnapshot>> {
    capture(&state, Category::System, SnapshotAggregator::capture_system)
        .await
        .map(Json)
}

async fn handle_gpu(State(state): State<Arc<AppState>>) -> ApiResult<Captured<GpuSnapshot>> {
    capture(&state, Category::Gpu, SnapshotAggregator::capture_gpu)
        .await
        .map(Json)
}

async fn handle_host(State(state): State<Arc<AppState>>) -> ApiResult<Captured<HostInfo>> {
    capture(&state, Category::Host, SnapshotAggregator::capture_host)
        .await
        .map(Json)
}

async fn handle_disks(State(state): State<Arc<AppState>>) -> ApiResult<Captured<DisksResponse>> {
    let partitions = capture(&state, Category::Disk, SnapshotAggregator::capture_partitions).await?;
    let body = match partitions {
        Captured::Ok(disks) => Captured::Ok(DisksResponse {
            count: disks.len(),
            disks,
            timestamp: iso_now(),
        }),
        Captured::Failed(err) => Captured::Failed(err),
    };
    Ok(Json(body))
}

async fn handle_health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "service": "sysviewd",
        "timestamp": iso_now(),
    }))
}

async fn handle_index(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({
        "name": "sysviewd",
        "version": env!("CARGO_PKG_VERSION"),
        "gpu_backend": state.aggregator.gpu_backend(),
        "endpoints": {
            "/": "This API index",
            "/health": "Liveness check",
            "/api/system-info": "Full snapshot: cpu, memory, disk, network, system, gpu",
            "/api/cpu": "CPU utilization, frequency, cores and temperature",
            "/api/memory": "Memory and swap usage",
            "/api/disk": "Partitions and disk I/O rates",
            "/api/network": "Network rates, packet totals and connection count",
            "/api/system": "Boot time, uptime and process count",
            "/api/gpu": "GPU devices",
            "/api/system/info": "Host description",
            "/api/disks/all": "Partition listing",
            "/api/performance/resources": "Core categories as one flat record",
        },
    }))
}

async fn handle_not_found() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": "not found" })),
    )
}

async fn allow_any_origin(mut response: Response) -> Response {
    response.headers_mut().insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    response
}

pub fn router(state: Arc<AppState>, cors_allow_any: bool) -> Router {
    let router = Router::new()
        .route("/", get(handle_index))
        .route("/health", get(handle_health))
        .route("/api/system-info", get(handle_snapshot))
        .route("/api/cpu", get(handle_cpu))
        .route("/api/memory", get(handle_memory))
        .route("/api/disk", get(handle_disk))
        .route("/api/network", get(handle_network))
        .route("/api/system", get(handle_system))
        .route("/api/gpu", get(handle_gpu))
        .route("/api/system/info", get(handle_host))
        .route("/api/disks/all", get(handle_disks))
        .route("/api/performance/resources", get(handle_resources))
        .fallback(handle_not_found)
        .with_state(state);

    if cors_allow_any {
        router.layer(middleware::map_response(allow_any_origin))
    } else {
        router
    }
}

/// Binds the configured address and serves until Ctrl-C or SIGTERM.
pub async fn serve(config: &Config, aggregator: Arc<SnapshotAggregator>) -> anyhow::Result<()> {
    let addr = config.server.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("[api] listening on http://{}", listener.local_addr()?);

    let state = Arc::new(AppState::new(aggregator, config.server.request_timeout()));
    let app = router(state, config.server.cors_allow_any);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("[api] shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!("[api] cannot listen for Ctrl-C: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                warn!("[api] cannot listen for SIGTERM: {err}");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("[api] Ctrl-C received, shutting down"),
        () = terminate => info!("[api] SIGTERM received, shutting down"),
    }
}

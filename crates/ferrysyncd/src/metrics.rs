//! Prometheus `/metrics` + `/healthz` endpoints: active session counts,
//! sync-lock holder, and bytes transferred.

use std::sync::{Arc, Mutex};

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};
use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;

/// Cheap-to-clone handle to the daemon's metric instruments. Safe to
/// share with the dispatcher (sole writer) and the metrics HTTP server
/// (reader) without an async lock, since the instruments are atomics.
#[derive(Clone)]
pub struct Metrics {
    registry: Arc<Mutex<Registry>>,
    active_downloads: Gauge,
    bulk_sessions: Gauge,
    sync_lock_held: Gauge,
    bytes_transferred: Counter,
    requests_total: Counter,
}

impl Metrics {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let active_downloads = Gauge::default();
        registry.register(
            "ferrysync_active_downloads",
            "Number of download workers currently serving a transfer",
            active_downloads.clone(),
        );

        let bulk_sessions = Gauge::default();
        registry.register(
            "ferrysync_bulk_sessions",
            "Number of open bulk-upload sessions",
            bulk_sessions.clone(),
        );

        let sync_lock_held = Gauge::default();
        registry.register(
            "ferrysync_sync_lock_held",
            "1 if the global sync lock is currently held, else 0",
            sync_lock_held.clone(),
        );

        let bytes_transferred = Counter::default();
        registry.register(
            "ferrysync_bytes_transferred_total",
            "Total bytes sent or received across uploads and downloads",
            bytes_transferred.clone(),
        );

        let requests_total = Counter::default();
        registry.register(
            "ferrysync_control_requests_total",
            "Total control-endpoint frames received",
            requests_total.clone(),
        );

        Self {
            registry: Arc::new(Mutex::new(registry)),
            active_downloads,
            bulk_sessions,
            sync_lock_held,
            bytes_transferred,
            requests_total,
        }
    }

    pub fn inc_active_downloads(&self) {
        self.active_downloads.inc();
    }

    pub fn dec_active_downloads(&self) {
        self.active_downloads.dec();
    }

    pub fn set_bulk_sessions(&self, n: i64) {
        self.bulk_sessions.set(n);
    }

    pub fn set_sync_lock_held(&self, held: bool) {
        self.sync_lock_held.set(if held { 1 } else { 0 });
    }

    pub fn add_bytes(&self, n: u64) {
        self.bytes_transferred.inc_by(n);
    }

    pub fn inc_requests(&self) {
        self.requests_total.inc();
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Serve Prometheus metrics and a liveness probe on `addr`.
pub async fn serve(addr: String, metrics: Metrics) -> anyhow::Result<()> {
    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz_handler))
        .with_state(metrics.registry.clone());

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| anyhow::anyhow!("metrics bind {addr}: {e}"))?;

    tracing::info!(addr = %addr, "metrics: listening on /metrics, /healthz");

    axum::serve(listener, app)
        .await
        .map_err(|e| anyhow::anyhow!("metrics server: {e}"))
}

async fn metrics_handler(State(registry): State<Arc<Mutex<Registry>>>) -> impl IntoResponse {
    let mut body = String::new();
    let registry = registry.lock().unwrap_or_else(|e| e.into_inner());
    match encode(&mut body, &registry) {
        Ok(()) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            body,
        ),
        Err(e) => {
            tracing::error!("metrics encode failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                e.to_string(),
            )
        }
    }
}

async fn healthz_handler() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

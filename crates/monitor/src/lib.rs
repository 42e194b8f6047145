//! Drowsiness Monitor
//!
//! Wires the frame source, driver monitoring, and alerting into one loop
//! and exposes its status over HTTP.

use axum::{extract::State, response::IntoResponse, routing::get, Json, Router};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

pub mod config;
pub mod pipeline;
mod routes;

pub use config::{LogConfig, MonitorConfig, NotifierConfig, NotifierKind, ServerConfig};
pub use pipeline::{FrameReport, Monitor, MonitorStatus, RunSummary, StopReason};

use alerting::{LogNotifier, Notifier};
use camera_capture::CameraError;
use cloud_sync::{CloudError, EmailNotifier, MqttNotifier};
use dms::DmsError;
use storage::{DirSnapshotStore, StorageError};

/// Monitor error types
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Configuration error: {0}")]
    Config(#[from] ::config::ConfigError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Frame acquisition failed: {0}")]
    Camera(#[from] CameraError),

    #[error("Detection setup failed: {0}")]
    Dms(#[from] DmsError),

    #[error("Snapshot storage failed: {0}")]
    Storage(#[from] StorageError),

    #[error("Notifier setup failed: {0}")]
    Cloud(#[from] CloudError),

    #[error("Server error: {0}")]
    Server(String),
}

/// Application state shared across handlers
pub struct AppState {
    /// Latest pipeline status
    pub status: watch::Receiver<MonitorStatus>,
    /// Snapshot index, when snapshots are written to disk
    pub snapshots: Option<Arc<DirSnapshotStore>>,
    /// Prometheus exposition, when a recorder is installed
    pub metrics: Option<PrometheusHandle>,
    /// Version string
    pub version: String,
    /// Start time
    pub start_time: std::time::Instant,
}

impl AppState {
    /// Create new application state
    pub fn new(status: watch::Receiver<MonitorStatus>) -> Self {
        Self {
            status,
            snapshots: None,
            metrics: None,
            version: env!("CARGO_PKG_VERSION").to_string(),
            start_time: std::time::Instant::now(),
        }
    }

    pub fn with_snapshots(mut self, store: Arc<DirSnapshotStore>) -> Self {
        self.snapshots = Some(store);
        self
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: u64,
    pub version: String,
    pub uptime_seconds: u64,
    pub pipeline_running: bool,
    pub frames_processed: u64,
}

/// Create the application router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/v1/health", get(health_handler))
        .route("/api/v1/status", get(routes::status::get_status))
        .route("/api/v1/snapshots", get(routes::snapshots::get_snapshots))
        .route("/metrics", get(routes::status::get_metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check handler
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let status = state.status.borrow().clone();
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp,
        version: state.version.clone(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        pipeline_running: status.running,
        frames_processed: status.frames_processed,
    })
}

/// Initialize logging. `RUST_LOG` takes precedence over the configured level.
pub fn init_logging(config: &LogConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let result = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    if let Err(e) = result {
        eprintln!("Logging already initialized: {}", e);
    }
}

/// Install the global Prometheus recorder
pub fn install_metrics() -> Result<PrometheusHandle, MonitorError> {
    PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| MonitorError::Server(format!("metrics recorder: {}", e)))
}

/// Build the configured notifier, connecting to the broker if needed
pub async fn build_notifier(config: &NotifierConfig) -> Result<Arc<dyn Notifier>, MonitorError> {
    match config.kind {
        NotifierKind::Log => Ok(Arc::new(LogNotifier)),
        NotifierKind::Mqtt => {
            let mut notifier = MqttNotifier::new(config.mqtt.clone());
            notifier.connect().await?;
            Ok(Arc::new(notifier))
        }
        NotifierKind::Email => Ok(Arc::new(EmailNotifier::new(config.email.clone())?)),
    }
}

/// Serve the API on an already bound listener until `shutdown` turns true
pub async fn serve(
    listener: TcpListener,
    state: Arc<AppState>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), MonitorError> {
    let app = create_router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.wait_for(|stop| *stop).await;
        })
        .await
        .map_err(|e| MonitorError::Server(e.to_string()))
}

/// Run the server
pub async fn run_server(
    addr: &str,
    state: Arc<AppState>,
    shutdown: watch::Receiver<bool>,
) -> Result<(), MonitorError> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| MonitorError::Server(format!("{}: {}", addr, e)))?;
    info!("Starting API server on {}", addr);
    serve(listener, state, shutdown).await
}

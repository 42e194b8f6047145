//! Pipeline status and metrics endpoints

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;

use crate::AppState;

/// Latest pipeline status
pub async fn get_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let status = state.status.borrow().clone();
    Json(status)
}

/// Prometheus text exposition
pub async fn get_metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        ),
        None => (
            StatusCode::NOT_FOUND,
            [(header::CONTENT_TYPE, "text/plain")],
            "metrics recorder not installed\n".to_string(),
        ),
    }
}

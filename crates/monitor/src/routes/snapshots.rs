//! Snapshot listing endpoint

use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::AppState;
use storage::SnapshotRecord;

#[derive(Debug, Deserialize)]
pub struct SnapshotQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    20
}

#[derive(Debug, Serialize)]
pub struct SnapshotsResponse {
    pub snapshots: Vec<SnapshotRecord>,
    pub count: usize,
    pub total: usize,
}

/// Most recent snapshots, newest first
pub async fn get_snapshots(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SnapshotQuery>,
) -> impl IntoResponse {
    let (snapshots, total) = match &state.snapshots {
        Some(store) => (store.recent(query.limit), store.count()),
        None => (Vec::new(), 0),
    };

    Json(SnapshotsResponse {
        count: snapshots.len(),
        snapshots,
        total,
    })
}

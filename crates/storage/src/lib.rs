//! Storage Layer
//!
//! Persists drowsy-event snapshots to a directory and keeps an in-memory
//! index of recent saves.

mod snapshots;

pub use snapshots::{DirSnapshotStore, SnapshotConfig, SnapshotRecord};

use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error on {path}: {message}")]
    Io { path: String, message: String },
    #[error("Image encoding failed: {0}")]
    Encode(String),
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),
    #[error("Lock error: {0}")]
    Lock(String),
}

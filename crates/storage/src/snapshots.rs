//! Directory-backed snapshot store

use alerting::{AlertError, SnapshotStore};
use camera_capture::VideoFrame;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};

use crate::StorageError;

/// Snapshot configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    /// Output directory (created if absent)
    pub dir: PathBuf,
    /// File extension; selects the encoder (jpg, png, bmp)
    pub extension: String,
    /// Draw eye landmarks and alert border on saved frames
    pub annotate: bool,
    /// Font for the openness and alert captions; captions are skipped when unset
    pub caption_font: Option<PathBuf>,
    /// Entries kept in the in-memory index
    pub max_records: usize,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("snapshots"),
            extension: "jpg".to_string(),
            annotate: true,
            caption_font: Some(PathBuf::from(
                "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
            )),
            max_records: 1000,
        }
    }
}

/// Saved snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotRecord {
    pub path: PathBuf,
    pub frame_sequence: u32,
    pub saved_at: DateTime<Utc>,
}

/// Writes `drowsy_<label>.<ext>` files into one directory.
///
/// Two snapshots with the same label (same second) share a file name; the
/// later one replaces the earlier.
pub struct DirSnapshotStore {
    config: SnapshotConfig,
    records: Mutex<VecDeque<SnapshotRecord>>,
}

impl DirSnapshotStore {
    /// Create the store, creating the directory if needed
    pub fn new(config: SnapshotConfig) -> Result<Self, StorageError> {
        std::fs::create_dir_all(&config.dir).map_err(|e| StorageError::Io {
            path: config.dir.display().to_string(),
            message: e.to_string(),
        })?;
        info!("Saving snapshots to {}", config.dir.display());

        Ok(Self {
            records: Mutex::new(VecDeque::with_capacity(config.max_records.min(1024))),
            config,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.config.dir
    }

    /// Path a snapshot with `label` is written to
    pub fn path_for(&self, label: &str) -> PathBuf {
        self.config
            .dir
            .join(format!("drowsy_{}.{}", label, self.config.extension))
    }

    /// Encode and write one frame
    pub fn save_frame(&self, frame: &VideoFrame, label: &str) -> Result<PathBuf, StorageError> {
        let img = frame
            .to_rgb_image()
            .map_err(|e| StorageError::InvalidFrame(e.to_string()))?;
        let path = self.path_for(label);

        img.save(&path)
            .map_err(|e| StorageError::Encode(format!("{}: {}", path.display(), e)))?;
        debug!("Wrote snapshot {}", path.display());

        let mut records = self
            .records
            .lock()
            .map_err(|e| StorageError::Lock(e.to_string()))?;
        // Same label means the file was just overwritten
        records.retain(|r| r.path != path);
        while records.len() >= self.config.max_records.max(1) {
            records.pop_front();
        }
        records.push_back(SnapshotRecord {
            path: path.clone(),
            frame_sequence: frame.sequence,
            saved_at: Utc::now(),
        });

        Ok(path)
    }

    /// Most recent saves, newest first
    pub fn recent(&self, limit: usize) -> Vec<SnapshotRecord> {
        self.records
            .lock()
            .map(|r| r.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default()
    }

    /// Number of saves in the index
    pub fn count(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }
}

impl SnapshotStore for DirSnapshotStore {
    fn save(&self, frame: &VideoFrame, label: &str) -> Result<PathBuf, AlertError> {
        self.save_frame(frame, label)
            .map_err(|e| AlertError::Snapshot(e.to_string()))
    }
}

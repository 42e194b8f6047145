//! Evidence snapshot contract and capture policy

use camera_capture::VideoFrame;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

use crate::AlertError;

/// Persists a frame as evidence, returning where it went
pub trait SnapshotStore: Send {
    fn save(&self, frame: &VideoFrame, label: &str) -> Result<PathBuf, AlertError>;
}

impl<T: SnapshotStore + Sync + ?Sized> SnapshotStore for Arc<T> {
    fn save(&self, frame: &VideoFrame, label: &str) -> Result<PathBuf, AlertError> {
        (**self).save(frame, label)
    }
}

/// Which Active frames get a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SnapshotPolicy {
    #[default]
    EveryFrame,
    OncePerEvent,
    /// First Active frame, then every `n`th
    EveryNth { n: u32 },
}

impl SnapshotPolicy {
    /// `active_index` is 0 for the frame that started the event
    pub fn should_capture(&self, active_index: u64) -> bool {
        match *self {
            SnapshotPolicy::EveryFrame => true,
            SnapshotPolicy::OncePerEvent => active_index == 0,
            SnapshotPolicy::EveryNth { n } => active_index % u64::from(n.max(1)) == 0,
        }
    }
}

/// Snapshot label, `YYYYMMDD_HHMMSS` local time
pub fn timestamp_label(at: &DateTime<Local>) -> String {
    at.format("%Y%m%d_%H%M%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_policies() {
        let every = SnapshotPolicy::EveryFrame;
        let once = SnapshotPolicy::OncePerEvent;
        let third = SnapshotPolicy::EveryNth { n: 3 };

        let captured = |p: SnapshotPolicy| (0..7).filter(|&i| p.should_capture(i)).count();
        assert_eq!(captured(every), 7);
        assert_eq!(captured(once), 1);
        assert_eq!(captured(third), 3);
    }

    #[test]
    fn test_every_nth_zero_behaves_like_every_frame() {
        assert!(SnapshotPolicy::EveryNth { n: 0 }.should_capture(5));
    }

    #[test]
    fn test_label_format() {
        let at = Local.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(timestamp_label(&at), "20240309_070501");
    }
}

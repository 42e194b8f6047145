//! Alerting System
//!
//! Turns the debounced drowsiness signal into side effects:
//! - one alarm and one notification per drowsy event
//! - evidence snapshots while the event is active
//! - notification delivery on a background worker

mod alarm;
mod manager;
mod notifier;
mod snapshot;

pub use alarm::{AlarmBackend, AlarmHandle, AlarmPlayer, WavAlarmPlayer, WavClip, WavInfo};
pub use manager::{AlertConfig, AlertPhase, AlertSequencer, AlertState, AlertStep, Transition};
pub use notifier::{
    spawn_notifier, LogNotifier, Notification, NotificationDispatcher, Notifier, NotifierStats,
};
pub use snapshot::{timestamp_label, SnapshotPolicy, SnapshotStore};

use std::path::PathBuf;
use thiserror::Error;

/// Alerting error types
///
/// None of these alter alert state; they are logged where they occur.
#[derive(Error, Debug)]
pub enum AlertError {
    #[error("Alarm sound not found: {}", .0.display())]
    AlarmNotFound(PathBuf),

    #[error("Alarm sound unreadable: {0}")]
    AlarmDecode(String),

    #[error("Playback failed: {0}")]
    Playback(String),

    #[error("Snapshot failed: {0}")]
    Snapshot(String),

    #[error("Notification failed: {0}")]
    Notify(String),

    #[error("Notification worker is not running")]
    DispatcherClosed,
}

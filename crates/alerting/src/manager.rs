//! Alert Sequencer Implementation
//!
//! Two phases, driven only by the debounced drowsiness signal:
//!
//! | phase  | signal | action                                             |
//! |--------|--------|----------------------------------------------------|
//! | Idle   | false  | nothing                                            |
//! | Idle   | true   | enter Active, alarm, snapshot, notification        |
//! | Active | true   | snapshot per policy, no second alarm/notification  |
//! | Active | false  | back to Idle, one-shot flags cleared               |
//!
//! Side-effect failures are logged and never change the phase.

use camera_capture::VideoFrame;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, error, info, warn};

use crate::alarm::{AlarmBackend, AlarmHandle, AlarmPlayer};
use crate::notifier::{Notification, NotificationDispatcher};
use crate::snapshot::{timestamp_label, SnapshotPolicy, SnapshotStore};

/// Alert configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// WAV clip played when a drowsy event starts
    pub alarm_sound_path: PathBuf,
    /// How the clip is played
    pub alarm_backend: AlarmBackend,
    /// Send at most one notification per drowsy event (default: true)
    pub send_once_per_event: bool,
    /// Which Active frames are saved as snapshots
    pub snapshot_policy: SnapshotPolicy,
    /// Notification subject
    pub subject: String,
    /// Notification recipients
    pub recipients: Vec<String>,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            alarm_sound_path: PathBuf::from("alarm.wav"),
            alarm_backend: AlarmBackend::default(),
            send_once_per_event: true,
            snapshot_policy: SnapshotPolicy::EveryFrame,
            subject: "Driver Drowsiness Alert".to_string(),
            recipients: Vec::new(),
        }
    }
}

/// Sequencer phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertPhase {
    #[default]
    Idle,
    Active,
}

/// State of the current drowsy event
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertState {
    pub phase: AlertPhase,
    /// Alarm was requested for this event (even if playback failed)
    pub alarm_started: bool,
    /// Notification was attempted for this event (even if delivery failed)
    pub notification_sent: bool,
    /// Frames seen since the event started
    pub active_frames: u64,
}

/// Phase change caused by one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    StayedIdle,
    Entered,
    Continued,
    Cleared,
}

/// What the sequencer did for one frame
#[derive(Debug, Clone, PartialEq)]
pub struct AlertStep {
    pub transition: Transition,
    pub alarm_requested: bool,
    pub snapshot: Option<PathBuf>,
    pub notification_dispatched: bool,
}

impl AlertStep {
    fn new(transition: Transition) -> Self {
        Self {
            transition,
            alarm_requested: false,
            snapshot: None,
            notification_dispatched: false,
        }
    }
}

/// Drowsy event state machine with one-shot alarm and notification
pub struct AlertSequencer {
    config: AlertConfig,
    state: AlertState,
    alarm: Box<dyn AlarmPlayer>,
    /// Playbacks that may still be running
    playing: Vec<AlarmHandle>,
    snapshots: Box<dyn SnapshotStore>,
    notifications: NotificationDispatcher,
}

impl AlertSequencer {
    /// Create a new sequencer in the Idle phase
    pub fn new(
        config: AlertConfig,
        alarm: Box<dyn AlarmPlayer>,
        snapshots: Box<dyn SnapshotStore>,
        notifications: NotificationDispatcher,
    ) -> Self {
        info!(
            "Creating alert sequencer (alarm: {}, snapshots: {:?}, once per event: {})",
            config.alarm_sound_path.display(),
            config.snapshot_policy,
            config.send_once_per_event
        );
        Self {
            config,
            state: AlertState::default(),
            alarm,
            playing: Vec::new(),
            snapshots,
            notifications,
        }
    }

    /// Advance on one observed frame's debounced signal
    pub fn update(&mut self, drowsy: bool, frame: &VideoFrame, now: DateTime<Local>) -> AlertStep {
        let transition = match (self.state.phase, drowsy) {
            (AlertPhase::Idle, false) => return AlertStep::new(Transition::StayedIdle),
            (AlertPhase::Active, false) => {
                info!(
                    "Eyes open again, drowsy event ended after {} frames",
                    self.state.active_frames
                );
                self.state = AlertState::default();
                return AlertStep::new(Transition::Cleared);
            }
            (AlertPhase::Idle, true) => {
                warn!("Drowsiness detected on frame {}", frame.sequence);
                metrics::counter!("drowsy_events_total").increment(1);
                self.state.phase = AlertPhase::Active;
                self.state.active_frames = 0;
                Transition::Entered
            }
            (AlertPhase::Active, true) => Transition::Continued,
        };

        let mut step = AlertStep::new(transition);

        if !self.state.alarm_started {
            self.state.alarm_started = true;
            step.alarm_requested = true;
            match self.alarm.play(&self.config.alarm_sound_path) {
                Ok(handle) => {
                    debug!("Alarm playback started");
                    self.playing.retain(|h| !h.is_finished());
                    self.playing.push(handle);
                }
                Err(e) => {
                    warn!("Could not start alarm: {}", e);
                    metrics::counter!("drowsy_alarm_failures_total").increment(1);
                }
            }
        }

        if self.config.snapshot_policy.should_capture(self.state.active_frames) {
            match self.snapshots.save(frame, &timestamp_label(&now)) {
                Ok(path) => {
                    debug!("Snapshot saved to {}", path.display());
                    metrics::counter!("drowsy_snapshots_total").increment(1);
                    step.snapshot = Some(path);
                }
                Err(e) => warn!("Could not save snapshot: {}", e),
            }
        }

        if !self.state.notification_sent || !self.config.send_once_per_event {
            self.state.notification_sent = true;
            step.notification_dispatched = true;
            if let Err(e) = self.notifications.dispatch(self.notification(&step, now)) {
                error!("Could not queue drowsiness alert: {}", e);
            }
        }

        self.state.active_frames += 1;
        step
    }

    fn notification(&self, step: &AlertStep, now: DateTime<Local>) -> Notification {
        Notification {
            subject: self.config.subject.clone(),
            body: format!(
                "Drowsiness detected at {}. See attached snapshot.",
                now.format("%Y-%m-%d %H:%M:%S")
            ),
            recipients: self.config.recipients.clone(),
            attachment: step.snapshot.clone(),
            detected_at: now,
        }
    }

    /// Block until every started alarm clip has finished playing
    pub fn wait_for_alarms(&mut self) {
        let pending = std::mem::take(&mut self.playing);
        if !pending.is_empty() {
            info!("Waiting for {} alarm playback(s) to finish", pending.len());
        }
        for handle in pending {
            handle.join();
        }
    }

    /// Current event state
    pub fn state(&self) -> AlertState {
        self.state
    }

    pub fn config(&self) -> &AlertConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alarm::AlarmHandle;
    use crate::AlertError;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::sync::mpsc::UnboundedReceiver;

    #[derive(Clone, Default)]
    struct Counter(Arc<AtomicUsize>);

    impl Counter {
        fn get(&self) -> usize {
            self.0.load(Ordering::SeqCst)
        }
        fn bump(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct FakeAlarm {
        plays: Counter,
        fail: bool,
    }

    impl AlarmPlayer for FakeAlarm {
        fn play(&self, _sound: &Path) -> Result<AlarmHandle, AlertError> {
            self.plays.bump();
            if self.fail {
                Err(AlertError::Playback("no device".into()))
            } else {
                Ok(AlarmHandle::detached())
            }
        }
    }

    /// Plays for `millis` on its own thread, counting finished clips
    struct SlowAlarm {
        millis: u64,
        finished: Counter,
    }

    impl AlarmPlayer for SlowAlarm {
        fn play(&self, _sound: &Path) -> Result<AlarmHandle, AlertError> {
            let millis = self.millis;
            let finished = self.finished.clone();
            Ok(AlarmHandle::spawned(std::thread::spawn(move || {
                std::thread::sleep(std::time::Duration::from_millis(millis));
                finished.bump();
            })))
        }
    }

    struct FakeSnapshots {
        saves: Counter,
        fail: bool,
    }

    impl SnapshotStore for FakeSnapshots {
        fn save(&self, _frame: &VideoFrame, label: &str) -> Result<PathBuf, AlertError> {
            self.saves.bump();
            if self.fail {
                Err(AlertError::Snapshot("disk full".into()))
            } else {
                Ok(PathBuf::from(format!("drowsy_{}.jpg", label)))
            }
        }
    }

    struct Harness {
        sequencer: AlertSequencer,
        plays: Counter,
        saves: Counter,
        rx: UnboundedReceiver<Notification>,
    }

    impl Harness {
        fn new(config: AlertConfig) -> Self {
            Self::with_failures(config, false, false)
        }

        fn with_failures(config: AlertConfig, alarm_fails: bool, snapshot_fails: bool) -> Self {
            let plays = Counter::default();
            let saves = Counter::default();
            let (dispatcher, rx) = NotificationDispatcher::channel();
            let sequencer = AlertSequencer::new(
                config,
                Box::new(FakeAlarm {
                    plays: plays.clone(),
                    fail: alarm_fails,
                }),
                Box::new(FakeSnapshots {
                    saves: saves.clone(),
                    fail: snapshot_fails,
                }),
                dispatcher,
            );
            Self {
                sequencer,
                plays,
                saves,
                rx,
            }
        }

        fn feed(&mut self, signal: &[bool]) -> Vec<AlertStep> {
            let frame = VideoFrame::blank(4, 4, 0);
            signal
                .iter()
                .map(|&d| self.sequencer.update(d, &frame, Local::now()))
                .collect()
        }

        fn notifications(&mut self) -> Vec<Notification> {
            let mut out = Vec::new();
            while let Ok(n) = self.rx.try_recv() {
                out.push(n);
            }
            out
        }
    }

    #[test]
    fn test_one_alarm_and_notification_per_event() {
        let mut h = Harness::new(AlertConfig::default());
        let steps = h.feed(&[true; 50]);

        assert_eq!(h.plays.get(), 1);
        assert_eq!(h.saves.get(), 50);
        assert_eq!(h.notifications().len(), 1);
        assert_eq!(steps[0].transition, Transition::Entered);
        assert!(steps[0].alarm_requested && steps[0].notification_dispatched);
        assert!(steps[1..]
            .iter()
            .all(|s| s.transition == Transition::Continued && !s.alarm_requested));
    }

    #[test]
    fn test_notification_carries_first_snapshot() {
        let mut h = Harness::new(AlertConfig {
            recipients: vec!["fleet@example.com".into()],
            ..Default::default()
        });
        let steps = h.feed(&[true]);

        let sent = h.notifications();
        assert_eq!(sent[0].attachment, steps[0].snapshot);
        assert!(sent[0].attachment.is_some());
        assert_eq!(sent[0].subject, "Driver Drowsiness Alert");
        assert_eq!(sent[0].recipients, vec!["fleet@example.com".to_string()]);
        assert!(sent[0].body.starts_with("Drowsiness detected at "));
    }

    #[test]
    fn test_recovery_rearms_one_shots() {
        let mut h = Harness::new(AlertConfig::default());
        h.feed(&[true, true, true, false, false, true, true]);

        assert_eq!(h.plays.get(), 2);
        assert_eq!(h.notifications().len(), 2);
        assert_eq!(h.sequencer.state().phase, AlertPhase::Active);
    }

    #[test]
    fn test_clearing_resets_state() {
        let mut h = Harness::new(AlertConfig::default());
        let steps = h.feed(&[true, true, false]);

        assert_eq!(steps[2].transition, Transition::Cleared);
        assert_eq!(steps[2].snapshot, None);
        assert_eq!(h.sequencer.state(), AlertState::default());
    }

    #[test]
    fn test_idle_is_a_noop() {
        let mut h = Harness::new(AlertConfig::default());
        let steps = h.feed(&[false; 10]);

        assert!(steps.iter().all(|s| s.transition == Transition::StayedIdle));
        assert_eq!(h.plays.get() + h.saves.get(), 0);
        assert!(h.notifications().is_empty());
    }

    #[test]
    fn test_side_effect_failures_do_not_change_phase() {
        let mut h = Harness::with_failures(AlertConfig::default(), true, true);
        let steps = h.feed(&[true, true, true]);

        assert_eq!(h.sequencer.state().phase, AlertPhase::Active);
        assert!(h.sequencer.state().alarm_started);
        // failed alarm is not retried within the event
        assert_eq!(h.plays.get(), 1);
        assert!(steps.iter().all(|s| s.snapshot.is_none()));

        let sent = h.notifications();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].attachment, None);
    }

    #[test]
    fn test_closed_notifier_still_marks_sent() {
        let (dispatcher, rx) = NotificationDispatcher::channel();
        drop(rx);
        let mut sequencer = AlertSequencer::new(
            AlertConfig::default(),
            Box::new(FakeAlarm {
                plays: Counter::default(),
                fail: false,
            }),
            Box::new(FakeSnapshots {
                saves: Counter::default(),
                fail: false,
            }),
            dispatcher,
        );

        let frame = VideoFrame::blank(4, 4, 0);
        let step = sequencer.update(true, &frame, Local::now());
        assert!(step.notification_dispatched);
        assert!(sequencer.state().notification_sent);
        assert!(!sequencer.update(true, &frame, Local::now()).notification_dispatched);
    }

    #[test]
    fn test_snapshot_policy_once_per_event() {
        let mut h = Harness::new(AlertConfig {
            snapshot_policy: SnapshotPolicy::OncePerEvent,
            ..Default::default()
        });
        h.feed(&[true; 10]);
        h.feed(&[false, true, true]);

        assert_eq!(h.saves.get(), 2);
    }

    #[test]
    fn test_repeat_notifications_when_not_once_per_event() {
        let mut h = Harness::new(AlertConfig {
            send_once_per_event: false,
            ..Default::default()
        });
        h.feed(&[true; 4]);

        assert_eq!(h.notifications().len(), 4);
        assert_eq!(h.plays.get(), 1);
    }

    #[test]
    fn test_shutdown_waits_for_alarm_playback() {
        let finished = Counter::default();
        let (dispatcher, _rx) = NotificationDispatcher::channel();
        let mut sequencer = AlertSequencer::new(
            AlertConfig::default(),
            Box::new(SlowAlarm {
                millis: 100,
                finished: finished.clone(),
            }),
            Box::new(FakeSnapshots {
                saves: Counter::default(),
                fail: false,
            }),
            dispatcher,
        );
        let frame = VideoFrame::blank(4, 4, 0);

        sequencer.update(true, &frame, Local::now());
        sequencer.update(false, &frame, Local::now());
        sequencer.update(true, &frame, Local::now());
        sequencer.wait_for_alarms();

        assert_eq!(finished.get(), 2);
    }
}

#![allow(dead_code)]

use alerting::{
    AlarmHandle, AlarmPlayer, AlertConfig, AlertError, AlertSequencer, Notification,
    NotificationDispatcher, SnapshotStore,
};
use camera_capture::{CameraError, FrameSource, VideoFrame};
use dms::landmarks::{LEFT_EYE, RIGHT_EYE};
use dms::{DmsConfig, DmsError, DmsModule, FaceLandmarks, LandmarkProvider, NormalizedLandmark};
use monitor::Monitor;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

pub const FRAME_SIZE: u32 = 256;

/// Eye openness 0.30
pub const OPEN: Option<u32> = Some(30);
/// Eye openness 0.10
pub const CLOSED: Option<u32> = Some(10);
/// No face in frame
pub const MISS: Option<u32> = None;

/// Face on a 256x256 frame whose eyes are 100px wide with lids `gap` px
/// apart, so eye openness is `gap / 100`
pub fn face(gap: u32) -> FaceLandmarks {
    let mut points = vec![NormalizedLandmark::default(); 468];
    for eye in [&LEFT_EYE, &RIGHT_EYE] {
        let px = [
            (100, 200),
            (130, 200 - gap / 2),
            (170, 200 - gap / 2),
            (200, 200),
            (170, 200 + gap / 2),
            (130, 200 + gap / 2),
        ];
        for (&idx, (x, y)) in eye.iter().zip(px) {
            points[idx] = NormalizedLandmark::new(
                x as f32 / FRAME_SIZE as f32,
                y as f32 / FRAME_SIZE as f32,
            );
        }
    }
    FaceLandmarks::new(points)
}

pub fn frame(sequence: u32) -> VideoFrame {
    VideoFrame::blank(FRAME_SIZE, FRAME_SIZE, sequence)
}

/// Replays one detection per frame; `None` entries are misses
pub struct ScriptedProvider(VecDeque<Option<u32>>);

impl LandmarkProvider for ScriptedProvider {
    fn detect(&mut self, _frame: &VideoFrame) -> Result<Option<FaceLandmarks>, DmsError> {
        Ok(self.0.pop_front().flatten().map(face))
    }
}

/// Frame source over blank frames, optionally failing after `fail_after`
pub struct BlankSource {
    remaining: u32,
    next: u32,
    fail_after: Option<u32>,
}

impl BlankSource {
    pub fn new(frames: u32) -> Self {
        Self {
            remaining: frames,
            next: 0,
            fail_after: None,
        }
    }

    pub fn failing_after(frames: u32) -> Self {
        Self {
            remaining: u32::MAX,
            next: 0,
            fail_after: Some(frames),
        }
    }
}

impl FrameSource for BlankSource {
    fn next_frame(&mut self) -> Result<Option<VideoFrame>, CameraError> {
        if self.fail_after == Some(self.next) {
            return Err(CameraError::Stream("device unplugged".into()));
        }
        if self.remaining == 0 {
            return Ok(None);
        }
        self.remaining -= 1;
        let f = frame(self.next);
        self.next += 1;
        Ok(Some(f))
    }
}

#[derive(Clone, Default)]
pub struct CountingAlarm(pub Arc<AtomicUsize>);

impl AlarmPlayer for CountingAlarm {
    fn play(&self, _sound: &Path) -> Result<AlarmHandle, AlertError> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(AlarmHandle::detached())
    }
}

/// Alarm whose playback takes `millis` on its own thread
#[derive(Clone, Default)]
pub struct SlowAlarm {
    pub millis: u64,
    pub finished: Arc<AtomicUsize>,
}

impl AlarmPlayer for SlowAlarm {
    fn play(&self, _sound: &Path) -> Result<AlarmHandle, AlertError> {
        let millis = self.millis;
        let finished = self.finished.clone();
        let thread = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(millis));
            finished.fetch_add(1, Ordering::SeqCst);
        });
        Ok(AlarmHandle::spawned(thread))
    }
}

#[derive(Clone, Default)]
pub struct RecordingSnapshots(pub Arc<Mutex<Vec<u32>>>);

impl SnapshotStore for RecordingSnapshots {
    fn save(&self, frame: &VideoFrame, label: &str) -> Result<PathBuf, AlertError> {
        self.0.lock().unwrap().push(frame.sequence);
        Ok(PathBuf::from(format!("drowsy_{}.jpg", label)))
    }
}

/// A monitor wired to fakes, plus handles to observe them
pub struct Harness {
    pub monitor: Monitor,
    pub alarms: Arc<AtomicUsize>,
    pub snapshots: Arc<Mutex<Vec<u32>>>,
    pub notifications: mpsc::UnboundedReceiver<Notification>,
}

impl Harness {
    pub fn new(script: Vec<Option<u32>>, alert: AlertConfig) -> Self {
        let alarm = CountingAlarm::default();
        let snapshots = RecordingSnapshots::default();
        let (monitor, notifications) = Self::monitor(
            script,
            alert,
            Box::new(alarm.clone()),
            Box::new(snapshots.clone()),
        );

        Self {
            monitor,
            alarms: alarm.0,
            snapshots: snapshots.0,
            notifications,
        }
    }

    /// Monitor over scripted detections with the given alarm and snapshot store
    pub fn monitor(
        script: Vec<Option<u32>>,
        alert: AlertConfig,
        alarm: Box<dyn AlarmPlayer>,
        snapshots: Box<dyn SnapshotStore>,
    ) -> (Monitor, mpsc::UnboundedReceiver<Notification>) {
        let detection = DmsConfig {
            ear_threshold: 0.25,
            consecutive_frames: 20,
            ..Default::default()
        };
        let dms = DmsModule::new(detection, Box::new(ScriptedProvider(script.into()))).unwrap();

        let (dispatcher, notifications) = NotificationDispatcher::channel();
        let sequencer = AlertSequencer::new(alert, alarm, snapshots, dispatcher);
        (Monitor::new(dms, sequencer, true), notifications)
    }

    pub fn alarm_count(&self) -> usize {
        self.alarms.load(Ordering::SeqCst)
    }

    pub fn drain_notifications(&mut self) -> Vec<Notification> {
        let mut out = Vec::new();
        while let Ok(n) = self.notifications.try_recv() {
            out.push(n);
        }
        out
    }
}

/// `n` copies of one scripted detection
pub fn repeat(entry: Option<u32>, n: usize) -> Vec<Option<u32>> {
    vec![entry; n]
}

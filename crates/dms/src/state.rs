//! Driver state tracking

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Drowsiness level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrowsinessLevel {
    #[default]
    Normal,
    /// Below threshold, run not yet long enough
    EyesClosing,
    /// Debounced drowsiness asserted
    Drowsy,
}

/// Driver state (tracked over the monitoring session)
#[derive(Debug, Clone)]
pub struct DriverState {
    /// Consecutive frames where no face was detected
    pub face_absent_frames: u32,

    /// Mean openness of the last observed frame
    pub last_openness: Option<f32>,

    /// Recent openness samples (for PERCLOS)
    openness_history: VecDeque<f32>,

    history_capacity: usize,
}

impl Default for DriverState {
    fn default() -> Self {
        Self::new(900)
    }
}

impl DriverState {
    pub fn new(history_capacity: usize) -> Self {
        Self {
            face_absent_frames: 0,
            last_openness: None,
            openness_history: VecDeque::with_capacity(history_capacity.min(4096)),
            history_capacity,
        }
    }

    /// Calculate PERCLOS (Percentage of Eye Closure) against `threshold`.
    /// Higher PERCLOS indicates drowsiness.
    pub fn perclos(&self, threshold: f32) -> f32 {
        if self.openness_history.is_empty() {
            return 0.0;
        }

        let closed_count = self
            .openness_history
            .iter()
            .filter(|&&v| v < threshold)
            .count();

        closed_count as f32 / self.openness_history.len() as f32
    }

    /// Record an observed frame
    pub fn add_eye_sample(&mut self, openness: f32) {
        self.face_absent_frames = 0;
        self.last_openness = Some(openness);

        if self.history_capacity == 0 {
            return;
        }
        if self.openness_history.len() >= self.history_capacity {
            self.openness_history.pop_front();
        }
        self.openness_history.push_back(openness);
    }

    /// Record a frame with no usable face
    pub fn add_miss(&mut self) {
        self.face_absent_frames = self.face_absent_frames.saturating_add(1);
    }

    pub fn sample_count(&self) -> usize {
        self.openness_history.len()
    }
}

//! Debounced drowsiness signal
//!
//! Slow to assert, instant to clear: the signal goes high only after
//! `min_run` consecutive scores below threshold, and drops on the first
//! score at or above threshold.

use crate::DmsConfig;

/// Consecutive-low-frame counter
#[derive(Debug, Clone)]
pub struct DebounceFilter {
    threshold: f32,
    min_run: u32,
    consecutive_low: u32,
}

impl DebounceFilter {
    pub fn new(threshold: f32, min_run: u32) -> Self {
        Self {
            threshold,
            min_run,
            consecutive_low: 0,
        }
    }

    pub fn from_config(config: &DmsConfig) -> Self {
        Self::new(config.ear_threshold, config.consecutive_frames)
    }

    /// Feed one frame's openness score; returns whether drowsiness is asserted
    pub fn observe(&mut self, score: f32) -> bool {
        if score < self.threshold {
            self.consecutive_low = self.consecutive_low.saturating_add(1);
            self.consecutive_low >= self.min_run
        } else {
            self.consecutive_low = 0;
            false
        }
    }

    /// Whether the signal is currently asserted
    pub fn is_asserted(&self) -> bool {
        self.consecutive_low > 0 && self.consecutive_low >= self.min_run
    }

    pub fn consecutive_low(&self) -> u32 {
        self.consecutive_low
    }
}

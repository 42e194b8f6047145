//! DMS analysis results and alerts

use serde::{Deserialize, Serialize};

use crate::geometry::OpennessReading;
use crate::landmarks::EyePair;
use crate::state::DrowsinessLevel;

/// DMS alert types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DmsAlert {
    /// Debounced drowsiness signal is asserted
    Drowsiness,

    /// Face not visible for too long (camera blocked?)
    FaceNotVisible,
}

/// One observed frame: eyes found and scored
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    pub eyes: EyePair,
    pub openness: OpennessReading,
    /// Debounced drowsiness signal after this frame
    pub drowsy: bool,
}

/// Complete DMS analysis result for one frame
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FrameAnalysis {
    /// Frame sequence number
    pub sequence: u32,

    /// `None` when no face/eyes were found; the debounce counter was not touched
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observation: Option<Observation>,

    /// Consecutive below-threshold frames
    pub consecutive_low: u32,

    /// Current drowsiness level
    pub drowsiness_level: DrowsinessLevel,

    /// Active alerts
    pub alerts: Vec<DmsAlert>,
}

impl FrameAnalysis {
    pub fn face_detected(&self) -> bool {
        self.observation.is_some()
    }

    /// Debounced signal, if this frame was observed
    pub fn drowsy(&self) -> Option<bool> {
        self.observation.as_ref().map(|o| o.drowsy)
    }

    /// Check if any alerts are active
    pub fn has_alerts(&self) -> bool {
        !self.alerts.is_empty()
    }
}

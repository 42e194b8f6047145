//! DMS configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// DMS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DmsConfig {
    /// Openness score below this counts as a closed-eye frame
    pub ear_threshold: f32,

    /// Consecutive closed-eye frames required before asserting drowsiness
    pub consecutive_frames: u32,

    /// Face mesh ONNX model
    pub landmark_model_path: Option<PathBuf>,

    /// Square input size expected by the face mesh model (pixels)
    pub model_input_size: u32,

    /// Face presence confidence threshold
    pub min_face_confidence: f32,

    /// Frames without a face before reporting the face as not visible
    pub face_absent_warn_frames: u32,

    /// Number of recent openness samples kept for PERCLOS
    pub perclos_window: usize,
}

impl Default for DmsConfig {
    fn default() -> Self {
        Self {
            ear_threshold: 0.25,
            consecutive_frames: 20,
            landmark_model_path: None,
            model_input_size: 192,
            min_face_confidence: 0.5,
            face_absent_warn_frames: 30,
            perclos_window: 900,
        }
    }
}

impl DmsConfig {
    /// Check threshold and run length are usable
    pub fn validate(&self) -> Result<(), crate::DmsError> {
        if !self.ear_threshold.is_finite() || self.ear_threshold <= 0.0 {
            return Err(crate::DmsError::Config(format!(
                "ear_threshold must be a positive number, got {}",
                self.ear_threshold
            )));
        }
        if self.consecutive_frames == 0 {
            return Err(crate::DmsError::Config(
                "consecutive_frames must be at least 1".into(),
            ));
        }
        if self.model_input_size == 0 {
            return Err(crate::DmsError::Config(
                "model_input_size must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_tuning() {
        let config = DmsConfig::default();
        assert_eq!(config.ear_threshold, 0.25);
        assert_eq!(config.consecutive_frames, 20);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let zero_run = DmsConfig {
            consecutive_frames: 0,
            ..Default::default()
        };
        assert!(zero_run.validate().is_err());

        let nan = DmsConfig {
            ear_threshold: f32::NAN,
            ..Default::default()
        };
        assert!(nan.validate().is_err());
    }
}

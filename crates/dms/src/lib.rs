//! Driver Monitoring System (DMS)
//!
//! Per-frame driver state analysis:
//! - Face mesh landmark detection
//! - Eye openness (eye aspect ratio)
//! - Debounced drowsiness signal
//! - Face absence and PERCLOS tracking

pub mod analysis;
pub mod config;
pub mod debounce;
pub mod detector;
pub mod geometry;
pub mod landmarks;
pub mod overlay;
pub mod state;

pub use analysis::{DmsAlert, FrameAnalysis, Observation};
pub use config::DmsConfig;
pub use debounce::DebounceFilter;
pub use detector::{LandmarkProvider, TractLandmarkProvider};
pub use geometry::{eye_openness, frame_openness, OpennessReading};
pub use landmarks::{EyeLandmarkSet, EyePair, FaceLandmarks, LandmarkPoint, NormalizedLandmark};
pub use overlay::CaptionFont;
pub use state::{DriverState, DrowsinessLevel};

use camera_capture::VideoFrame;
use thiserror::Error;
use tracing::{debug, warn};

/// DMS error types
#[derive(Error, Debug)]
pub enum DmsError {
    #[error("Model loading failed: {0}")]
    ModelLoad(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Image processing failed: {0}")]
    ImageProcessing(String),
}

/// Driver monitoring module
///
/// Owns the debounce counter for the session. Frames without a usable face
/// leave the counter untouched.
pub struct DmsModule {
    config: DmsConfig,
    provider: Box<dyn LandmarkProvider>,
    filter: DebounceFilter,
    state: DriverState,
}

impl DmsModule {
    /// Create a new DMS module with configuration
    pub fn new(config: DmsConfig, provider: Box<dyn LandmarkProvider>) -> Result<Self, DmsError> {
        config.validate()?;
        Ok(Self {
            filter: DebounceFilter::from_config(&config),
            state: DriverState::new(config.perclos_window),
            provider,
            config,
        })
    }

    /// Analyze a single frame for driver state
    pub fn analyze(&mut self, frame: &VideoFrame) -> FrameAnalysis {
        let eyes = match self.provider.detect(frame) {
            Ok(face) => face.and_then(|f| f.eyes(frame.width, frame.height)),
            Err(e) => {
                warn!("Landmark detection failed on frame {}: {}", frame.sequence, e);
                None
            }
        };

        let Some(eyes) = eyes else {
            self.state.add_miss();
            let mut alerts = Vec::new();
            if self.state.face_absent_frames > self.config.face_absent_warn_frames {
                alerts.push(DmsAlert::FaceNotVisible);
            }
            return FrameAnalysis {
                sequence: frame.sequence,
                observation: None,
                consecutive_low: self.filter.consecutive_low(),
                drowsiness_level: self.level(),
                alerts,
            };
        };

        let openness = frame_openness(&eyes);
        let drowsy = self.filter.observe(openness.mean);
        self.state.add_eye_sample(openness.mean);

        debug!(
            sequence = frame.sequence,
            ear = openness.mean,
            counter = self.filter.consecutive_low(),
            drowsy,
            "frame observed"
        );

        FrameAnalysis {
            sequence: frame.sequence,
            observation: Some(Observation {
                eyes,
                openness,
                drowsy,
            }),
            consecutive_low: self.filter.consecutive_low(),
            drowsiness_level: self.level(),
            alerts: if drowsy { vec![DmsAlert::Drowsiness] } else { vec![] },
        }
    }

    fn level(&self) -> DrowsinessLevel {
        if self.filter.is_asserted() {
            DrowsinessLevel::Drowsy
        } else if self.filter.consecutive_low() > 0 {
            DrowsinessLevel::EyesClosing
        } else {
            DrowsinessLevel::Normal
        }
    }

    /// PERCLOS over the configured window
    pub fn perclos(&self) -> f32 {
        self.state.perclos(self.config.ear_threshold)
    }

    pub fn state(&self) -> &DriverState {
        &self.state
    }

    pub fn config(&self) -> &DmsConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Replays canned detections; `None` entries are misses
    struct Scripted(VecDeque<Option<FaceLandmarks>>);

    impl LandmarkProvider for Scripted {
        fn detect(&mut self, _frame: &VideoFrame) -> Result<Option<FaceLandmarks>, DmsError> {
            Ok(self.0.pop_front().flatten())
        }
    }

    struct Failing;

    impl LandmarkProvider for Failing {
        fn detect(&mut self, _frame: &VideoFrame) -> Result<Option<FaceLandmarks>, DmsError> {
            Err(DmsError::Inference("boom".into()))
        }
    }

    /// 256x256 frame: eyes 100px wide, lids `gap` px apart
    fn face(gap: u32) -> FaceLandmarks {
        let mut points = vec![NormalizedLandmark::default(); 468];
        for eye in [&landmarks::LEFT_EYE, &landmarks::RIGHT_EYE] {
            let px = [
                (100, 200),
                (130, 200 - gap / 2),
                (170, 200 - gap / 2),
                (200, 200),
                (170, 200 + gap / 2),
                (130, 200 + gap / 2),
            ];
            for (&idx, (x, y)) in eye.iter().zip(px) {
                points[idx] = NormalizedLandmark::new(x as f32 / 256.0, y as f32 / 256.0);
            }
        }
        FaceLandmarks::new(points)
    }

    fn module(script: Vec<Option<FaceLandmarks>>, min_run: u32) -> DmsModule {
        let config = DmsConfig {
            consecutive_frames: min_run,
            face_absent_warn_frames: 2,
            ..Default::default()
        };
        DmsModule::new(config, Box::new(Scripted(script.into()))).unwrap()
    }

    #[test]
    fn test_open_eyes_score() {
        let mut dms = module(vec![Some(face(30))], 3);
        let analysis = dms.analyze(&VideoFrame::blank(256, 256, 0));

        let obs = analysis.observation.unwrap();
        assert!((obs.openness.mean - 0.3).abs() < 1e-6);
        assert!(!obs.drowsy);
        assert_eq!(analysis.drowsiness_level, DrowsinessLevel::Normal);
    }

    #[test]
    fn test_miss_does_not_touch_counter() {
        let script = vec![Some(face(10)), Some(face(10)), None, Some(face(10))];
        let mut dms = module(script, 3);
        let frame = VideoFrame::blank(256, 256, 0);

        assert_eq!(dms.analyze(&frame).drowsy(), Some(false));
        assert_eq!(dms.analyze(&frame).drowsy(), Some(false));

        let miss = dms.analyze(&frame);
        assert!(!miss.face_detected());
        assert_eq!(miss.consecutive_low, 2);
        assert_eq!(miss.drowsiness_level, DrowsinessLevel::EyesClosing);

        let third = dms.analyze(&frame);
        assert_eq!(third.drowsy(), Some(true));
        assert_eq!(third.alerts, vec![DmsAlert::Drowsiness]);
    }

    #[test]
    fn test_nan_landmarks_extend_closed_run() {
        let mut corrupt = face(30);
        for &idx in landmarks::LEFT_EYE.iter().chain(landmarks::RIGHT_EYE.iter()) {
            corrupt.points[idx] = NormalizedLandmark::new(f32::NAN, f32::NAN);
        }
        let script = vec![Some(face(10)), Some(corrupt), Some(face(10))];
        let mut dms = module(script, 3);
        let frame = VideoFrame::blank(256, 256, 0);

        dms.analyze(&frame);
        let corrupt_frame = dms.analyze(&frame);
        assert_eq!(corrupt_frame.observation.unwrap().openness.mean, 0.0);
        assert_eq!(corrupt_frame.consecutive_low, 2);
        assert_eq!(dms.analyze(&frame).drowsy(), Some(true));
    }

    #[test]
    fn test_face_absence_alert() {
        let mut dms = module(vec![None, None, None], 3);
        let frame = VideoFrame::blank(256, 256, 0);

        assert!(!dms.analyze(&frame).has_alerts());
        assert!(!dms.analyze(&frame).has_alerts());
        assert_eq!(dms.analyze(&frame).alerts, vec![DmsAlert::FaceNotVisible]);
    }

    #[test]
    fn test_inference_error_treated_as_miss() {
        let mut dms = DmsModule::new(DmsConfig::default(), Box::new(Failing)).unwrap();
        let analysis = dms.analyze(&VideoFrame::blank(64, 64, 9));
        assert!(!analysis.face_detected());
        assert_eq!(analysis.sequence, 9);
        assert_eq!(dms.state().face_absent_frames, 1);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = DmsConfig {
            consecutive_frames: 0,
            ..Default::default()
        };
        assert!(DmsModule::new(config, Box::new(Failing)).is_err());
    }
}

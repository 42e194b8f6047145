//! Eye openness metric (eye aspect ratio)
//!
//! `EAR = (|p2 - p6| + |p3 - p5|) / (2 * |p1 - p4|)`
//!
//! Lower values mean a more closed eye. A zero-width eye (p1 == p4) scores
//! 0.0, i.e. it is treated as closed rather than producing NaN/inf. Points
//! with non-finite coordinates score 0.0 as well.

use serde::{Deserialize, Serialize};

use crate::landmarks::{EyeLandmarkSet, EyePair};

/// Openness score for one eye
pub fn eye_openness(eye: &EyeLandmarkSet) -> f32 {
    let [p1, p2, p3, p4, p5, p6] = eye.points();

    let v1 = p2.distance(p6);
    let v2 = p3.distance(p5);
    let h = p1.distance(p4);

    if h == 0.0 || !(h.is_finite() && v1.is_finite() && v2.is_finite()) {
        return 0.0;
    }
    (v1 + v2) / (2.0 * h)
}

/// Per-eye and combined openness for one frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OpennessReading {
    pub left: f32,
    pub right: f32,
    /// Mean of both eyes; this is what the debounce filter sees
    pub mean: f32,
}

/// Score both eyes and average them
pub fn frame_openness(eyes: &EyePair) -> OpennessReading {
    let left = eye_openness(&eyes.left);
    let right = eye_openness(&eyes.right);
    OpennessReading {
        left,
        right,
        mean: (left + right) / 2.0,
    }
}

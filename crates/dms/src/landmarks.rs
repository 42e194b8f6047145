//! Face mesh landmarks and eye point extraction

use serde::{Deserialize, Serialize};

/// Right eye (camera view) indices in the 468-point face mesh, p1..p6
pub const RIGHT_EYE: [usize; 6] = [33, 160, 158, 133, 153, 144];

/// Left eye (camera view) indices in the 468-point face mesh, p1..p6
pub const LEFT_EYE: [usize; 6] = [362, 385, 387, 263, 373, 380];

/// Landmark as produced by the face mesh model (0..1 of frame size)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizedLandmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl NormalizedLandmark {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y, z: 0.0 }
    }
}

/// Landmark position in pixel space
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LandmarkPoint {
    pub x: f32,
    pub y: f32,
}

impl LandmarkPoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Project a normalized landmark onto a `width` x `height` frame.
    /// Coordinates are truncated to whole pixels.
    pub fn from_normalized(lm: &NormalizedLandmark, width: u32, height: u32) -> Self {
        Self {
            x: (lm.x * width as f32).trunc(),
            y: (lm.y * height as f32).trunc(),
        }
    }

    /// Euclidean distance to another point
    pub fn distance(&self, other: &LandmarkPoint) -> f32 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// Six eye points in canonical order:
/// p1/p4 horizontal corners, p2/p6 and p3/p5 vertical pairs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EyeLandmarkSet(pub [LandmarkPoint; 6]);

impl EyeLandmarkSet {
    pub fn points(&self) -> &[LandmarkPoint; 6] {
        &self.0
    }
}

/// Both eyes for one frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EyePair {
    pub left: EyeLandmarkSet,
    pub right: EyeLandmarkSet,
}

/// Full landmark set for one detected face
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FaceLandmarks {
    pub points: Vec<NormalizedLandmark>,
}

impl FaceLandmarks {
    pub fn new(points: Vec<NormalizedLandmark>) -> Self {
        Self { points }
    }

    /// Extract one eye in pixel space; `None` if an index is out of range
    pub fn eye(&self, indices: &[usize; 6], width: u32, height: u32) -> Option<EyeLandmarkSet> {
        let mut points = [LandmarkPoint::default(); 6];
        for (slot, &idx) in points.iter_mut().zip(indices.iter()) {
            *slot = LandmarkPoint::from_normalized(self.points.get(idx)?, width, height);
        }
        Some(EyeLandmarkSet(points))
    }

    /// Extract both eyes in pixel space
    pub fn eyes(&self, width: u32, height: u32) -> Option<EyePair> {
        Some(EyePair {
            left: self.eye(&LEFT_EYE, width, height)?,
            right: self.eye(&RIGHT_EYE, width, height)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_projection_truncates_to_pixels() {
        let p = LandmarkPoint::from_normalized(&NormalizedLandmark::new(0.5, 0.2519), 640, 480);
        assert_eq!(p, LandmarkPoint::new(320.0, 120.0));
    }

    #[test]
    fn test_short_landmark_set_yields_no_eyes() {
        let face = FaceLandmarks::new(vec![NormalizedLandmark::default(); 300]);
        assert!(face.eye(&RIGHT_EYE, 640, 480).is_some());
        assert!(face.eyes(640, 480).is_none());
    }

    #[test]
    fn test_eye_points_follow_index_order() {
        let mut points = vec![NormalizedLandmark::default(); 468];
        for (i, &idx) in LEFT_EYE.iter().enumerate() {
            points[idx] = NormalizedLandmark::new(i as f32 / 10.0, 0.0);
        }
        let face = FaceLandmarks::new(points);
        let eye = face.eye(&LEFT_EYE, 100, 100).unwrap();
        let xs: Vec<f32> = eye.points().iter().map(|p| p.x).collect();
        assert_eq!(xs, vec![0.0, 10.0, 20.0, 30.0, 40.0, 50.0]);
    }
}

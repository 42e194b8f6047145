//! Face mesh landmark detection

use camera_capture::VideoFrame;
use image::imageops::{self, FilterType};
use tracing::{debug, error, info};
use tract_onnx::prelude::*;

use crate::landmarks::{FaceLandmarks, NormalizedLandmark};
use crate::{DmsConfig, DmsError};

/// Produces face landmarks for a frame.
///
/// `Ok(None)` means no face in this frame. Coordinates are normalized to
/// the frame (0..1).
pub trait LandmarkProvider: Send {
    fn detect(&mut self, frame: &VideoFrame) -> Result<Option<FaceLandmarks>, DmsError>;
}

type FaceMeshPlan = TypedRunnableModel<TypedModel>;

/// Face mesh landmark model (MediaPipe-style, NHWC input) run with tract.
///
/// Output 0 holds `x, y, z` triples in model input pixels, output 1 (if
/// present) a face presence logit.
pub struct TractLandmarkProvider {
    model: FaceMeshPlan,
    input_size: u32,
    min_confidence: f32,
}

impl TractLandmarkProvider {
    /// Load the model configured in `landmark_model_path`
    pub fn load(config: &DmsConfig) -> Result<Self, DmsError> {
        let path = config
            .landmark_model_path
            .as_ref()
            .ok_or_else(|| DmsError::Config("landmark_model_path is not set".into()))?;
        let size = config.model_input_size as usize;

        info!("Loading face mesh model from {}", path.display());
        let model = tract_onnx::onnx()
            .model_for_path(path)
            .and_then(|m| m.with_input_fact(0, f32::fact([1, size, size, 3]).into()))
            .and_then(|m| m.into_optimized())
            .and_then(|m| m.into_runnable())
            .map_err(|e| {
                error!("Failed to load face mesh model: {}", e);
                DmsError::ModelLoad(e.to_string())
            })?;

        Ok(Self {
            model,
            input_size: config.model_input_size,
            min_confidence: config.min_face_confidence,
        })
    }

    fn input_tensor(&self, frame: &VideoFrame) -> Result<Tensor, DmsError> {
        let img = frame
            .to_rgb_image()
            .map_err(|e| DmsError::ImageProcessing(e.to_string()))?;
        let size = self.input_size;
        let resized = imageops::resize(&img, size, size, FilterType::Triangle);

        let s = size as usize;
        let input = tract_ndarray::Array4::from_shape_fn((1, s, s, 3), |(_, y, x, c)| {
            resized.get_pixel(x as u32, y as u32)[c] as f32 / 255.0
        });
        Ok(input.into())
    }
}

impl LandmarkProvider for TractLandmarkProvider {
    fn detect(&mut self, frame: &VideoFrame) -> Result<Option<FaceLandmarks>, DmsError> {
        let input = self.input_tensor(frame)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .map_err(|e| DmsError::Inference(e.to_string()))?;

        if let Some(score) = outputs.get(1) {
            let logit = score
                .to_array_view::<f32>()
                .map_err(|e| DmsError::Inference(e.to_string()))?
                .iter()
                .next()
                .copied()
                .unwrap_or(f32::NEG_INFINITY);
            let confidence = sigmoid(logit);
            if confidence < self.min_confidence {
                debug!("Face confidence {:.2} below threshold", confidence);
                return Ok(None);
            }
        }

        let coords = outputs
            .first()
            .ok_or_else(|| DmsError::Inference("model produced no outputs".into()))?
            .to_array_view::<f32>()
            .map_err(|e| DmsError::Inference(e.to_string()))?;
        let coords: Vec<f32> = coords.iter().copied().collect();

        Ok(Some(decode_landmarks(&coords, self.input_size as f32)))
    }
}

/// Convert flat `x, y, z` triples in model pixels to normalized landmarks
pub fn decode_landmarks(coords: &[f32], input_size: f32) -> FaceLandmarks {
    FaceLandmarks::new(
        coords
            .chunks_exact(3)
            .map(|c| NormalizedLandmark {
                x: c[0] / input_size,
                y: c[1] / input_size,
                z: c[2] / input_size,
            })
            .collect(),
    )
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

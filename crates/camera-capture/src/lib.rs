//! Camera Capture Library for the Drowsiness Monitor
//!
//! Provides the frame acquisition side of the pipeline:
//! - `VideoFrame`: decoded RGB24 frame handed to landmark detection
//! - `FrameSource`: one frame per loop iteration, or end of stream
//! - `ImageSequenceSource`: replays a directory of stills as a camera stream
//! - `V4l2Source`: live USB/V4L2 camera (feature: v4l2)

pub mod frame;
pub mod source;
#[cfg(feature = "v4l2")]
pub mod v4l2;

pub use frame::{PixelFormat, VideoFrame};
pub use source::{FrameSource, ImageSequenceSource};
#[cfg(feature = "v4l2")]
pub use v4l2::V4l2Source;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Camera error types
///
/// Any of these is an acquisition failure and ends the monitoring loop.
#[derive(Error, Debug)]
pub enum CameraError {
    #[error("Failed to open camera: {0}")]
    Open(String),

    #[error("Failed to decode frame {path}: {message}")]
    Decode { path: PathBuf, message: String },

    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    #[error("Streaming error: {0}")]
    Stream(String),
}

/// Camera configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Live camera index (`/dev/video<N>`); replay `frames_dir` when unset
    pub device: Option<u32>,
    /// Capture width
    pub width: u32,
    /// Capture height
    pub height: u32,
    /// Requested capture format
    pub pixel_format: PixelFormat,
    /// Directory of frames to replay (sorted by file name)
    pub frames_dir: PathBuf,
    /// Target FPS
    pub fps: u32,
    /// Sleep between replayed frames to emulate a live camera at `fps`
    pub pace: bool,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: None,
            width: 640,
            height: 480,
            pixel_format: PixelFormat::Yuyv,
            frames_dir: PathBuf::from("frames"),
            fps: 15,
            pace: false,
        }
    }
}

/// Open the configured source: the live camera when `device` is set,
/// otherwise the frame directory.
pub fn open_source(config: &CameraConfig) -> Result<Box<dyn FrameSource>, CameraError> {
    match config.device {
        Some(index) => open_camera(index, config),
        None => Ok(Box::new(ImageSequenceSource::from_config(config)?)),
    }
}

#[cfg(feature = "v4l2")]
fn open_camera(index: u32, config: &CameraConfig) -> Result<Box<dyn FrameSource>, CameraError> {
    Ok(Box::new(V4l2Source::open(index, config)?))
}

#[cfg(not(feature = "v4l2"))]
fn open_camera(index: u32, _config: &CameraConfig) -> Result<Box<dyn FrameSource>, CameraError> {
    Err(CameraError::Open(format!(
        "camera {} requested but live capture is not built in (enable the v4l2 feature)",
        index
    )))
}

//! Video frame types and processing

use crate::CameraError;
use image::{ImageFormat, RgbImage};
use serde::{Deserialize, Serialize};

/// Pixel format delivered by a capture device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    /// Packed YUV 4:2:2 (Y0 U Y1 V)
    #[default]
    Yuyv,
    /// Motion JPEG, one JPEG image per buffer
    Mjpeg,
}

impl PixelFormat {
    /// V4L2 FourCC code
    pub fn fourcc(&self) -> [u8; 4] {
        match self {
            PixelFormat::Yuyv => *b"YUYV",
            PixelFormat::Mjpeg => *b"MJPG",
        }
    }
}

/// Decoded RGB video frame
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// RGB pixel data (width * height * 3)
    pub data: Vec<u8>,
    /// Frame width
    pub width: u32,
    /// Frame height
    pub height: u32,
    /// Capture timestamp (nanoseconds)
    pub timestamp_ns: u64,
    /// Frame sequence number
    pub sequence: u32,
}

impl VideoFrame {
    /// Create a new video frame from raw RGB data
    pub fn new(data: Vec<u8>, width: u32, height: u32, timestamp_ns: u64, sequence: u32) -> Self {
        Self {
            data,
            width,
            height,
            timestamp_ns,
            sequence,
        }
    }

    /// Create a black frame of the given size
    pub fn blank(width: u32, height: u32, sequence: u32) -> Self {
        Self::new(vec![0; (width * height * 3) as usize], width, height, 0, sequence)
    }

    /// Wrap a decoded image
    pub fn from_rgb_image(img: RgbImage, timestamp_ns: u64, sequence: u32) -> Self {
        let (width, height) = img.dimensions();
        Self::new(img.into_raw(), width, height, timestamp_ns, sequence)
    }

    /// Convert a captured buffer in `format` to RGB
    pub fn from_raw(
        format: PixelFormat,
        raw: &[u8],
        width: u32,
        height: u32,
        timestamp_ns: u64,
        sequence: u32,
    ) -> Result<Self, CameraError> {
        match format {
            PixelFormat::Yuyv => Self::from_yuyv(raw, width, height, timestamp_ns, sequence),
            PixelFormat::Mjpeg => {
                let img = image::load_from_memory_with_format(raw, ImageFormat::Jpeg)
                    .map_err(|e| CameraError::InvalidFrame(format!("MJPG decode: {}", e)))?
                    .to_rgb8();
                Ok(Self::from_rgb_image(img, timestamp_ns, sequence))
            }
        }
    }

    /// Convert packed YUYV (BT.601, limited range) to RGB
    pub fn from_yuyv(
        raw: &[u8],
        width: u32,
        height: u32,
        timestamp_ns: u64,
        sequence: u32,
    ) -> Result<Self, CameraError> {
        let pixels = (width * height) as usize;
        if width % 2 != 0 || raw.len() < pixels * 2 {
            return Err(CameraError::InvalidFrame(format!(
                "{} bytes are not a {}x{} YUYV frame",
                raw.len(),
                width,
                height
            )));
        }

        let mut data = Vec::with_capacity(pixels * 3);
        for chunk in raw[..pixels * 2].chunks_exact(4) {
            let (u, v) = (chunk[1], chunk[3]);
            data.extend_from_slice(&yuv_to_rgb(chunk[0], u, v));
            data.extend_from_slice(&yuv_to_rgb(chunk[2], u, v));
        }
        Ok(Self::new(data, width, height, timestamp_ns, sequence))
    }

    /// Copy the frame into an `image` buffer for encoding or drawing
    pub fn to_rgb_image(&self) -> Result<RgbImage, CameraError> {
        RgbImage::from_raw(self.width, self.height, self.data.clone()).ok_or_else(|| {
            CameraError::InvalidFrame(format!(
                "{} bytes do not fill a {}x{} RGB frame",
                self.data.len(),
                self.width,
                self.height
            ))
        })
    }

    /// Get pixel at (x, y)
    pub fn get_pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = ((y * self.width + x) * 3) as usize;
        self.data
            .get(idx..idx + 3)
            .map(|p| [p[0], p[1], p[2]])
    }
}

fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let c = y as i32 - 16;
    let d = u as i32 - 128;
    let e = v as i32 - 128;
    let clamp = |x: i32| (x >> 8).clamp(0, 255) as u8;
    [
        clamp(298 * c + 409 * e + 128),
        clamp(298 * c - 100 * d - 208 * e + 128),
        clamp(298 * c + 516 * d + 128),
    ]
}

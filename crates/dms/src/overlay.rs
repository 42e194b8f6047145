//! Evidence overlay drawn onto snapshot frames
//!
//! Landmark dots, an alert border, and, when a font is available, the
//! openness reading and alert banner in the top-left corner.

use ab_glyph::{Font, FontArc, PxScale, ScaleFont};
use camera_capture::VideoFrame;
use image::Rgb;
use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use std::path::Path;

use crate::landmarks::EyePair;
use crate::DmsError;

const LANDMARK_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const ALERT_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const ALERT_BORDER_PX: u32 = 3;
const CAPTION_X: i32 = 30;
/// Baselines of the openness line and the alert banner
const CAPTION_BASELINES: [i32; 2] = [30, 70];
const CAPTION_PX: f32 = 24.0;

/// Font used for frame captions
#[derive(Clone)]
pub struct CaptionFont {
    font: FontArc,
    scale: PxScale,
}

impl CaptionFont {
    /// Load a TrueType/OpenType font file
    pub fn load(path: &Path) -> Result<Self, DmsError> {
        let bytes = std::fs::read(path)
            .map_err(|e| DmsError::ImageProcessing(format!("{}: {}", path.display(), e)))?;
        Self::from_bytes(bytes)
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, DmsError> {
        let font = FontArc::try_from_vec(bytes)
            .map_err(|e| DmsError::ImageProcessing(format!("invalid font: {}", e)))?;
        Ok(Self {
            font,
            scale: PxScale::from(CAPTION_PX),
        })
    }

    fn ascent(&self) -> i32 {
        self.font.as_scaled(self.scale).ascent().round() as i32
    }
}

impl std::fmt::Debug for CaptionFont {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptionFont").field("scale", &self.scale.y).finish()
    }
}

/// Caption text, top line first
pub fn caption_lines(openness: f32, alert: bool) -> Vec<String> {
    let mut lines = vec![format!("EAR: {:.3}", openness)];
    if alert {
        lines.push("DROWSINESS ALERT!".to_string());
    }
    lines
}

/// Draw eye landmarks onto a copy of `frame`. With `alert` the frame also
/// gets a red border; with a `font` it gets the openness and alert captions.
pub fn annotate(
    frame: &VideoFrame,
    eyes: &EyePair,
    openness: f32,
    alert: bool,
    font: Option<&CaptionFont>,
) -> Result<VideoFrame, DmsError> {
    let mut img = frame
        .to_rgb_image()
        .map_err(|e| DmsError::ImageProcessing(e.to_string()))?;

    for p in eyes.left.points().iter().chain(eyes.right.points().iter()) {
        draw_filled_circle_mut(&mut img, (p.x as i32, p.y as i32), 1, LANDMARK_COLOR);
    }

    let (w, h) = img.dimensions();
    if alert && w > 2 * ALERT_BORDER_PX && h > 2 * ALERT_BORDER_PX {
        for i in 0..ALERT_BORDER_PX {
            let rect = Rect::at(i as i32, i as i32).of_size(w - 2 * i, h - 2 * i);
            draw_hollow_rect_mut(&mut img, rect, ALERT_COLOR);
        }
    }

    if let Some(font) = font {
        let ascent = font.ascent();
        for (line, baseline) in caption_lines(openness, alert).iter().zip(CAPTION_BASELINES) {
            draw_text_mut(
                &mut img,
                ALERT_COLOR,
                CAPTION_X,
                baseline - ascent,
                font.scale,
                &font.font,
                line,
            );
        }
    }

    Ok(VideoFrame::from_rgb_image(img, frame.timestamp_ns, frame.sequence))
}

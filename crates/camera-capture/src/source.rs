//! Frame sources

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tracing::{debug, info};

use crate::{CameraConfig, CameraError, VideoFrame};

/// Image extensions accepted by `ImageSequenceSource`
const FRAME_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp"];

/// Anything that yields frames to the monitoring loop.
///
/// `Ok(None)` is end of stream. An `Err` is an acquisition failure and
/// terminates the loop.
pub trait FrameSource: Send {
    fn next_frame(&mut self) -> Result<Option<VideoFrame>, CameraError>;
}

/// Replays a directory of still images as a camera stream
pub struct ImageSequenceSource {
    paths: Vec<PathBuf>,
    position: usize,
    frame_interval: Option<Duration>,
    last_frame_at: Option<Instant>,
}

impl ImageSequenceSource {
    /// Open a frame directory. Fails when the directory is missing or holds no images.
    pub fn open(dir: &Path) -> Result<Self, CameraError> {
        let entries = std::fs::read_dir(dir)
            .map_err(|e| CameraError::Open(format!("{}: {}", dir.display(), e)))?;

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| is_frame_file(path))
            .collect();
        paths.sort();

        if paths.is_empty() {
            return Err(CameraError::Open(format!(
                "no frames found in {}",
                dir.display()
            )));
        }

        info!("Opened image sequence {} ({} frames)", dir.display(), paths.len());

        Ok(Self {
            paths,
            position: 0,
            frame_interval: None,
            last_frame_at: None,
        })
    }

    /// Open using camera configuration (directory and pacing)
    pub fn from_config(config: &CameraConfig) -> Result<Self, CameraError> {
        let source = Self::open(&config.frames_dir)?;
        Ok(if config.pace && config.fps > 0 {
            source.paced(config.fps)
        } else {
            source
        })
    }

    /// Throttle delivery to `fps` frames per second
    pub fn paced(mut self, fps: u32) -> Self {
        self.frame_interval = Some(Duration::from_secs_f64(1.0 / fps.max(1) as f64));
        self
    }

    /// Number of frames in the sequence
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    fn wait_for_slot(&mut self) {
        if let (Some(interval), Some(last)) = (self.frame_interval, self.last_frame_at) {
            let elapsed = last.elapsed();
            if elapsed < interval {
                std::thread::sleep(interval - elapsed);
            }
        }
        self.last_frame_at = Some(Instant::now());
    }
}

impl FrameSource for ImageSequenceSource {
    fn next_frame(&mut self) -> Result<Option<VideoFrame>, CameraError> {
        let Some(path) = self.paths.get(self.position).cloned() else {
            return Ok(None);
        };
        self.wait_for_slot();

        let img = image::open(&path).map_err(|e| CameraError::Decode {
            path: path.clone(),
            message: e.to_string(),
        })?;

        let sequence = self.position as u32;
        self.position += 1;
        debug!("Frame {} from {}", sequence, path.display());

        Ok(Some(VideoFrame::from_rgb_image(img.to_rgb8(), now_ns(), sequence)))
    }
}

fn is_frame_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| FRAME_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

pub(crate) fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    fn write_frame(dir: &Path, name: &str, width: u32) {
        RgbImage::new(width, 4).save(dir.join(name)).unwrap();
    }

    #[test]
    fn test_frames_replayed_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        write_frame(dir.path(), "frame_002.png", 2);
        write_frame(dir.path(), "frame_001.png", 1);
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let mut source = ImageSequenceSource::open(dir.path()).unwrap();
        assert_eq!(source.len(), 2);

        let first = source.next_frame().unwrap().unwrap();
        let second = source.next_frame().unwrap().unwrap();
        assert_eq!((first.width, first.sequence), (1, 0));
        assert_eq!((second.width, second.sequence), (2, 1));
        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_empty_directory_fails_to_open() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            ImageSequenceSource::open(dir.path()),
            Err(CameraError::Open(_))
        ));
    }

    #[test]
    fn test_corrupt_frame_is_acquisition_failure() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("frame_001.png"), b"not a png").unwrap();

        let mut source = ImageSequenceSource::open(dir.path()).unwrap();
        assert!(matches!(
            source.next_frame(),
            Err(CameraError::Decode { .. })
        ));
    }
}

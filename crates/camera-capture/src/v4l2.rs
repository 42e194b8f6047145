//! Live capture from a V4L2 device (feature: v4l2)

use tracing::{debug, info, warn};
use v4l::buffer::Type;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::video::capture::Parameters;
use v4l::video::Capture;
use v4l::{Device, FourCC};

use crate::source::now_ns;
use crate::{CameraConfig, CameraError, FrameSource, PixelFormat, VideoFrame};

const BUFFER_COUNT: u32 = 4;

/// Memory-mapped capture stream from `/dev/video<index>`
pub struct V4l2Source {
    stream: Stream<'static>,
    format: PixelFormat,
    width: u32,
    height: u32,
    sequence: u32,
}

impl V4l2Source {
    /// Open device `index` and negotiate size, pixel format, and frame rate
    pub fn open(index: u32, config: &CameraConfig) -> Result<Self, CameraError> {
        let mut dev = Device::new(index as usize)
            .map_err(|e| CameraError::Open(format!("/dev/video{}: {}", index, e)))?;

        let mut fmt = dev
            .format()
            .map_err(|e| CameraError::Open(format!("query format: {}", e)))?;
        fmt.width = config.width;
        fmt.height = config.height;
        fmt.fourcc = FourCC::new(&config.pixel_format.fourcc());
        let fmt = dev
            .set_format(&fmt)
            .map_err(|e| CameraError::Open(format!("set format: {}", e)))?;

        let format = if fmt.fourcc == FourCC::new(b"YUYV") {
            PixelFormat::Yuyv
        } else if fmt.fourcc == FourCC::new(b"MJPG") {
            PixelFormat::Mjpeg
        } else {
            return Err(CameraError::Open(format!(
                "device offers unsupported pixel format {}",
                fmt.fourcc
            )));
        };
        if format != config.pixel_format {
            warn!(
                "Requested {:?}, device delivers {:?}",
                config.pixel_format, format
            );
        }

        if config.fps > 0 {
            if let Err(e) = dev.set_params(&Parameters::with_fps(config.fps)) {
                warn!("Could not set {} fps: {}", config.fps, e);
            }
        }

        let stream = Stream::with_buffers(&mut dev, Type::VideoCapture, BUFFER_COUNT)
            .map_err(|e| CameraError::Open(format!("start streaming: {}", e)))?;

        info!(
            "Opened /dev/video{} at {}x{} {:?}",
            index, fmt.width, fmt.height, format
        );

        Ok(Self {
            stream,
            format,
            width: fmt.width,
            height: fmt.height,
            sequence: 0,
        })
    }
}

impl FrameSource for V4l2Source {
    fn next_frame(&mut self) -> Result<Option<VideoFrame>, CameraError> {
        let (buf, meta) = self
            .stream
            .next()
            .map_err(|e| CameraError::Stream(format!("dequeue buffer: {}", e)))?;

        let used = (meta.bytesused as usize).min(buf.len());
        let frame = VideoFrame::from_raw(
            self.format,
            &buf[..used],
            self.width,
            self.height,
            now_ns(),
            self.sequence,
        )?;
        debug!("Captured frame {} ({} bytes)", self.sequence, used);
        self.sequence = self.sequence.wrapping_add(1);
        Ok(Some(frame))
    }
}

//! Alarm playback
//!
//! Playback runs on its own thread and is never awaited by the frame loop.
//! The clip is expected to end on its own; handles can be joined at shutdown.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Command;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::AlertError;

/// Starts alarm playback without blocking the caller
pub trait AlarmPlayer: Send {
    fn play(&self, sound: &Path) -> Result<AlarmHandle, AlertError>;
}

/// Handle to an in-flight alarm. Dropping it detaches the playback thread.
#[derive(Debug)]
pub struct AlarmHandle {
    thread: Option<JoinHandle<()>>,
}

impl AlarmHandle {
    /// Handle with nothing to wait for
    pub fn detached() -> Self {
        Self { thread: None }
    }

    pub fn spawned(thread: JoinHandle<()>) -> Self {
        Self {
            thread: Some(thread),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, |t| t.is_finished())
    }

    /// Block until playback ends
    pub fn join(mut self) {
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// How the alarm clip reaches the speaker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AlarmBackend {
    /// Run an external player with the clip path as last argument
    Command { program: String, args: Vec<String> },
    /// Play through the default output device
    Cpal,
}

impl Default for AlarmBackend {
    fn default() -> Self {
        AlarmBackend::Command {
            program: "aplay".to_string(),
            args: vec!["-q".to_string()],
        }
    }
}

/// WAV header facts, read without decoding samples
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavInfo {
    pub channels: u16,
    pub sample_rate: u32,
    /// Samples per channel
    pub frames: u32,
}

impl WavInfo {
    pub fn read(path: &Path) -> Result<Self, AlertError> {
        let reader = hound::WavReader::open(path)
            .map_err(|e| AlertError::AlarmDecode(format!("{}: {}", path.display(), e)))?;
        let spec = reader.spec();
        Ok(Self {
            channels: spec.channels,
            sample_rate: spec.sample_rate,
            frames: reader.duration(),
        })
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.frames as f64 / self.sample_rate.max(1) as f64)
    }
}

/// Decoded WAV clip (interleaved f32 samples)
#[derive(Debug, Clone)]
pub struct WavClip {
    pub samples: Vec<f32>,
    pub channels: u16,
    pub sample_rate: u32,
}

impl WavClip {
    pub fn load(path: &Path) -> Result<Self, AlertError> {
        let mut reader = hound::WavReader::open(path)
            .map_err(|e| AlertError::AlarmDecode(format!("{}: {}", path.display(), e)))?;
        let spec = reader.spec();

        let samples: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .samples::<f32>()
                .collect::<Result<_, _>>()
                .map_err(|e| AlertError::AlarmDecode(e.to_string()))?,
            hound::SampleFormat::Int => {
                let scale = (1i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / scale))
                    .collect::<Result<_, _>>()
                    .map_err(|e| AlertError::AlarmDecode(e.to_string()))?
            }
        };

        Ok(Self {
            samples,
            channels: spec.channels,
            sample_rate: spec.sample_rate,
        })
    }

    pub fn duration(&self) -> Duration {
        let frames = self.samples.len() as f64 / self.channels.max(1) as f64;
        Duration::from_secs_f64(frames / self.sample_rate.max(1) as f64)
    }
}

/// WAV alarm player
pub struct WavAlarmPlayer {
    backend: AlarmBackend,
}

impl WavAlarmPlayer {
    pub fn new(backend: AlarmBackend) -> Self {
        Self { backend }
    }
}

impl Default for WavAlarmPlayer {
    fn default() -> Self {
        Self::new(AlarmBackend::default())
    }
}

impl AlarmPlayer for WavAlarmPlayer {
    fn play(&self, sound: &Path) -> Result<AlarmHandle, AlertError> {
        if !sound.exists() {
            return Err(AlertError::AlarmNotFound(sound.to_path_buf()));
        }
        let info = WavInfo::read(sound)?;
        info!(
            "Starting alarm {} ({:.1}s)",
            sound.display(),
            info.duration().as_secs_f32()
        );

        let backend = self.backend.clone();
        let path = sound.to_path_buf();
        let thread = std::thread::Builder::new()
            .name("alarm".into())
            .spawn(move || {
                if let Err(e) = play_clip(&backend, &path) {
                    warn!("Could not play alarm: {}", e);
                    metrics::counter!("drowsy_alarm_failures_total").increment(1);
                }
            })
            .map_err(|e| AlertError::Playback(e.to_string()))?;

        Ok(AlarmHandle::spawned(thread))
    }
}

fn play_clip(backend: &AlarmBackend, path: &Path) -> Result<(), AlertError> {
    match backend {
        AlarmBackend::Command { program, args } => {
            debug!("Running {} {:?} {}", program, args, path.display());
            let status = Command::new(program)
                .args(args)
                .arg(path)
                .status()
                .map_err(|e| AlertError::Playback(format!("{}: {}", program, e)))?;
            if status.success() {
                Ok(())
            } else {
                Err(AlertError::Playback(format!("{} exited with {}", program, status)))
            }
        }
        AlarmBackend::Cpal => play_cpal(WavClip::load(path)?),
    }
}

#[cfg(feature = "cpal-audio")]
fn play_cpal(clip: WavClip) -> Result<(), AlertError> {
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| AlertError::Playback("no output device".into()))?;

    let config = cpal::StreamConfig {
        channels: clip.channels,
        sample_rate: cpal::SampleRate(clip.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let duration = clip.duration();
    let samples = Arc::new(clip.samples);
    let position = Arc::new(AtomicUsize::new(0));

    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                for out in data.iter_mut() {
                    let i = position.fetch_add(1, Ordering::Relaxed);
                    *out = samples.get(i).copied().unwrap_or(0.0);
                }
            },
            |err| warn!("Alarm stream error: {}", err),
            None,
        )
        .map_err(|e| AlertError::Playback(e.to_string()))?;

    stream
        .play()
        .map_err(|e| AlertError::Playback(e.to_string()))?;
    std::thread::sleep(duration + Duration::from_millis(200));
    Ok(())
}

#[cfg(not(feature = "cpal-audio"))]
fn play_cpal(_clip: WavClip) -> Result<(), AlertError> {
    Err(AlertError::Playback(
        "built without the cpal-audio feature".into(),
    ))
}

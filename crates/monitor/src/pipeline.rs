//! Frame loop
//!
//! One frame at a time: detect, score, debounce, then hand the debounced
//! signal to the alert sequencer. Frames without a face skip the sequencer
//! entirely.

use alerting::{AlertPhase, AlertSequencer, AlertStep, Transition};
use camera_capture::{FrameSource, VideoFrame};
use chrono::Local;
use dms::{overlay, CaptionFont, DmsAlert, DmsModule, DrowsinessLevel, FrameAnalysis};
use serde::Serialize;
use std::borrow::Cow;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::MonitorError;

/// Snapshot of the pipeline, published after every frame
#[derive(Debug, Clone, Default, Serialize)]
pub struct MonitorStatus {
    pub running: bool,
    pub frames_processed: u64,
    pub face_misses: u64,
    pub last_sequence: Option<u32>,
    /// Mean eye openness of the last observed frame
    pub openness: Option<f32>,
    pub consecutive_low: u32,
    pub drowsiness_level: DrowsinessLevel,
    pub alert_phase: AlertPhase,
    pub drowsy_events: u64,
    pub snapshots_saved: u64,
    pub perclos: f32,
    pub alerts: Vec<DmsAlert>,
}

/// Result of processing one frame
#[derive(Debug, Clone)]
pub struct FrameReport {
    pub analysis: FrameAnalysis,
    /// `None` when the frame had no usable face
    pub step: Option<AlertStep>,
}

/// Why the loop ended without error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndOfStream,
    Shutdown,
}

/// Totals for one run of the loop
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub frames: u64,
    pub drowsy_events: u64,
    pub snapshots_saved: u64,
    pub stopped_by: StopReason,
}

/// Drowsiness monitor: DMS analysis feeding the alert sequencer
pub struct Monitor {
    dms: DmsModule,
    sequencer: AlertSequencer,
    annotate: bool,
    caption_font: Option<CaptionFont>,
    status: MonitorStatus,
    status_tx: watch::Sender<MonitorStatus>,
}

impl Monitor {
    /// `annotate` draws landmarks and an alert border on evidence frames
    pub fn new(dms: DmsModule, sequencer: AlertSequencer, annotate: bool) -> Self {
        let (status_tx, _) = watch::channel(MonitorStatus::default());
        Self {
            dms,
            sequencer,
            annotate,
            caption_font: None,
            status: MonitorStatus::default(),
            status_tx,
        }
    }

    /// Caption evidence frames with the openness reading and alert banner
    pub fn with_caption_font(mut self, font: CaptionFont) -> Self {
        self.caption_font = Some(font);
        self
    }

    /// Receiver for the per-frame status
    pub fn subscribe(&self) -> watch::Receiver<MonitorStatus> {
        self.status_tx.subscribe()
    }

    pub fn status(&self) -> &MonitorStatus {
        &self.status
    }

    /// Run one frame through detection and alerting
    pub fn process_frame(&mut self, frame: &VideoFrame) -> FrameReport {
        let analysis = self.dms.analyze(frame);
        metrics::counter!("drowsy_frames_total").increment(1);

        let step = match &analysis.observation {
            None => {
                self.status.face_misses += 1;
                metrics::counter!("drowsy_face_misses_total").increment(1);
                None
            }
            Some(observation) => {
                metrics::gauge!("drowsy_eye_openness").set(observation.openness.mean as f64);
                let evidence = if observation.drowsy && self.annotate {
                    match overlay::annotate(
                        frame,
                        &observation.eyes,
                        observation.openness.mean,
                        true,
                        self.caption_font.as_ref(),
                    ) {
                        Ok(annotated) => Cow::Owned(annotated),
                        Err(e) => {
                            warn!("Could not annotate frame {}: {}", frame.sequence, e);
                            Cow::Borrowed(frame)
                        }
                    }
                } else {
                    Cow::Borrowed(frame)
                };
                Some(self.sequencer.update(observation.drowsy, &evidence, Local::now()))
            }
        };

        self.record(&analysis, step.as_ref());
        FrameReport { analysis, step }
    }

    fn record(&mut self, analysis: &FrameAnalysis, step: Option<&AlertStep>) {
        let status = &mut self.status;
        status.running = true;
        status.frames_processed += 1;
        status.last_sequence = Some(analysis.sequence);
        status.openness = analysis.observation.as_ref().map(|o| o.openness.mean);
        status.consecutive_low = analysis.consecutive_low;
        status.drowsiness_level = analysis.drowsiness_level;
        status.alerts = analysis.alerts.clone();
        status.perclos = self.dms.perclos();
        status.alert_phase = self.sequencer.state().phase;

        if let Some(step) = step {
            if step.transition == Transition::Entered {
                status.drowsy_events += 1;
            }
            if step.snapshot.is_some() {
                status.snapshots_saved += 1;
            }
        }

        metrics::gauge!("drowsy_consecutive_low_frames").set(status.consecutive_low as f64);
        metrics::gauge!("drowsy_perclos").set(status.perclos as f64);
        self.status_tx.send_replace(status.clone());
    }

    /// Pull frames until the source ends, `shutdown` turns true, or
    /// acquisition fails. An acquisition failure is returned as an error.
    pub fn run(
        &mut self,
        source: &mut dyn FrameSource,
        shutdown: &watch::Receiver<bool>,
    ) -> Result<RunSummary, MonitorError> {
        info!("Monitoring started");
        let stopped_by = loop {
            if *shutdown.borrow() {
                info!("Shutdown requested");
                break StopReason::Shutdown;
            }
            match source.next_frame() {
                Ok(Some(frame)) => {
                    self.process_frame(&frame);
                }
                Ok(None) => {
                    info!("End of frame stream");
                    break StopReason::EndOfStream;
                }
                Err(e) => {
                    error!("Frame acquisition failed: {}", e);
                    self.mark_stopped();
                    return Err(e.into());
                }
            }
        };

        self.mark_stopped();
        let summary = RunSummary {
            frames: self.status.frames_processed,
            drowsy_events: self.status.drowsy_events,
            snapshots_saved: self.status.snapshots_saved,
            stopped_by,
        };
        info!(
            "Monitoring stopped after {} frames ({} drowsy events)",
            summary.frames, summary.drowsy_events
        );
        Ok(summary)
    }

    /// Finish the session: wait for alarm clips still playing, then drop
    /// the sequencer and with it the notification dispatcher.
    pub fn shutdown(mut self) -> MonitorStatus {
        self.sequencer.wait_for_alarms();
        self.mark_stopped();
        self.status
    }

    fn mark_stopped(&mut self) {
        self.status.running = false;
        self.status_tx.send_replace(self.status.clone());
    }
}

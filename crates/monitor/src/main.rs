//! Drowsiness Monitor - Main Entry Point

use alerting::{spawn_notifier, AlertSequencer, WavAlarmPlayer};
use camera_capture::open_source;
use clap::Parser;
use dms::{CaptionFont, DmsModule, TractLandmarkProvider};
use monitor::{
    build_notifier, init_logging, install_metrics, run_server, AppState, Monitor, MonitorConfig,
};
use std::path::PathBuf;
use std::sync::Arc;
use storage::DirSnapshotStore;
use tokio::sync::watch;
use tracing::{error, info, warn};

#[derive(Debug, Parser)]
#[command(name = "drowsy-monitor", version, about = "Eye-closure drowsiness monitor")]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory of frames to replay, overrides `source.frames_dir`
    #[arg(long, conflicts_with = "camera")]
    frames_dir: Option<PathBuf>,

    /// Capture from `/dev/video<INDEX>` instead of replaying frames
    #[arg(long, value_name = "INDEX")]
    camera: Option<u32>,

    /// Log JSON lines
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = MonitorConfig::load(cli.config.as_deref())?;
    if let Some(dir) = cli.frames_dir {
        config.source.frames_dir = dir;
        config.source.device = None;
    }
    if let Some(index) = cli.camera {
        config.source.device = Some(index);
    }
    if cli.log_json {
        config.logging.json = true;
    }
    config.validate()?;

    init_logging(&config.logging);

    info!("=== Drowsiness Monitor v{} ===", env!("CARGO_PKG_VERSION"));
    info!(
        "EAR threshold {:.2}, {} consecutive frames",
        config.detection.ear_threshold, config.detection.consecutive_frames
    );

    let metrics = install_metrics()?;

    let provider = TractLandmarkProvider::load(&config.detection)?;
    let dms = DmsModule::new(config.detection.clone(), Box::new(provider))?;
    let snapshots = Arc::new(DirSnapshotStore::new(config.snapshots.clone())?);

    let notifier = build_notifier(&config.notifier).await?;
    let (dispatcher, notifier_worker) = spawn_notifier(notifier);

    let sequencer = AlertSequencer::new(
        config.alert.clone(),
        Box::new(WavAlarmPlayer::new(config.alert.alarm_backend.clone())),
        Box::new(snapshots.clone()),
        dispatcher,
    );
    let mut monitor = Monitor::new(dms, sequencer, config.snapshots.annotate);
    if config.snapshots.annotate {
        if let Some(path) = &config.snapshots.caption_font {
            match CaptionFont::load(path) {
                Ok(font) => monitor = monitor.with_caption_font(font),
                Err(e) => warn!("Snapshot captions disabled: {}", e),
            }
        }
    }
    let mut source = open_source(&config.source)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let shutdown_tx = Arc::new(shutdown_tx);

    let ctrl_c_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, stopping");
            ctrl_c_tx.send_replace(true);
        }
    });

    let server = if config.server.enabled {
        let state = Arc::new(
            AppState::new(monitor.subscribe())
                .with_snapshots(snapshots.clone())
                .with_metrics(metrics),
        );
        let bind = config.server.bind.clone();
        let rx = shutdown_rx.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = run_server(&bind, state, rx).await {
                error!("API server stopped: {}", e);
            }
        }))
    } else {
        None
    };

    let loop_shutdown = shutdown_rx.clone();
    // Shutting the monitor down joins alarm playback and drops the last
    // dispatcher, letting the worker drain, close the notifier, and exit
    let outcome = tokio::task::spawn_blocking(move || {
        let outcome = monitor.run(source.as_mut(), &loop_shutdown);
        monitor.shutdown();
        outcome
    })
    .await?;
    shutdown_tx.send_replace(true);

    let stats = notifier_worker.await?;
    if stats.failed > 0 {
        warn!("{} notifications could not be delivered", stats.failed);
    }
    if let Some(server) = server {
        let _ = server.await;
    }

    let summary = outcome?;
    info!(
        "Processed {} frames: {} drowsy events, {} snapshots, {} notifications sent",
        summary.frames, summary.drowsy_events, summary.snapshots_saved, stats.sent
    );
    Ok(())
}

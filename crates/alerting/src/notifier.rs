//! Notification contract and background delivery
//!
//! The sequencer hands notifications to a channel; a tokio task owns the
//! `Notifier` and performs the (possibly slow) send. Failures are logged
//! and counted, never retried.

use async_trait::async_trait;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::AlertError;

/// One outbound drowsiness alert
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub subject: String,
    pub body: String,
    pub recipients: Vec<String>,
    /// Snapshot captured for the event, if the save succeeded
    pub attachment: Option<PathBuf>,
    pub detected_at: DateTime<Local>,
}

/// Outbound alert channel (MQTT, email, log)
///
/// `send` returns `Ok` only once the transport has accepted the alert.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<(), AlertError>;

    /// Flush and release the transport. Called once after the last send.
    async fn close(&self) -> Result<(), AlertError> {
        Ok(())
    }
}

/// Notifier that only writes the alert to the log
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), AlertError> {
        info!(
            recipients = ?notification.recipients,
            attachment = ?notification.attachment,
            "{}: {}",
            notification.subject,
            notification.body
        );
        Ok(())
    }
}

/// Sending half used by the sequencer
#[derive(Debug, Clone)]
pub struct NotificationDispatcher {
    tx: mpsc::UnboundedSender<Notification>,
}

impl NotificationDispatcher {
    /// Create a dispatcher and the receiving end for a worker
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queue a notification; returns immediately
    pub fn dispatch(&self, notification: Notification) -> Result<(), AlertError> {
        self.tx
            .send(notification)
            .map_err(|_| AlertError::DispatcherClosed)
    }
}

/// Delivery counters reported when the worker exits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NotifierStats {
    pub sent: u64,
    pub failed: u64,
}

/// Spawn the delivery worker on the current tokio runtime.
///
/// The worker exits once every dispatcher clone is dropped, the queue is
/// drained and the notifier is closed.
pub fn spawn_notifier(
    notifier: Arc<dyn Notifier>,
) -> (NotificationDispatcher, JoinHandle<NotifierStats>) {
    let (dispatcher, rx) = NotificationDispatcher::channel();
    let handle = tokio::spawn(run_notifier(notifier, rx));
    (dispatcher, handle)
}

async fn run_notifier(
    notifier: Arc<dyn Notifier>,
    mut rx: mpsc::UnboundedReceiver<Notification>,
) -> NotifierStats {
    let mut stats = NotifierStats::default();

    while let Some(notification) = rx.recv().await {
        debug!("Delivering notification to {:?}", notification.recipients);
        match notifier.send(&notification).await {
            Ok(()) => {
                stats.sent += 1;
                metrics::counter!("drowsy_notifications_sent_total").increment(1);
                info!("Drowsiness alert sent");
            }
            Err(e) => {
                stats.failed += 1;
                metrics::counter!("drowsy_notifications_failed_total").increment(1);
                error!("Failed to send drowsiness alert: {}", e);
            }
        }
    }

    if let Err(e) = notifier.close().await {
        error!("Failed to close notifier: {}", e);
    }

    info!(
        "Notification worker stopped ({} sent, {} failed)",
        stats.sent, stats.failed
    );
    stats
}

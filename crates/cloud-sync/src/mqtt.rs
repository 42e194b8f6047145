//! MQTT alert publisher
//!
//! `send` publishes at QoS 1 and waits for the broker's PUBACK, so a
//! returned `Ok` means the broker holds the alert. `close` disconnects and
//! waits for the event loop to finish.

use crate::CloudError;
use alerting::{AlertError, Notification, Notifier};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const RECONNECT_DELAY: Duration = Duration::from_secs(2);
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// MQTT transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    /// MQTT broker host
    pub broker_url: String,
    /// MQTT port
    pub broker_port: u16,
    /// Device (vehicle/cabin camera) ID
    pub device_id: String,
    /// Broker credentials
    pub username: Option<String>,
    pub password: Option<String>,
    /// First topic segment
    pub topic_prefix: String,
    /// MQTT keep-alive (seconds)
    pub keep_alive_secs: u64,
    /// How long `send` waits for the broker's PUBACK (seconds)
    pub ack_timeout_secs: u64,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker_url: "localhost".to_string(),
            broker_port: 1883,
            device_id: "unknown".to_string(),
            username: None,
            password: None,
            topic_prefix: "drowsiness".to_string(),
            keep_alive_secs: 30,
            ack_timeout_secs: 10,
        }
    }
}

/// Snapshot reference carried with an alert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttachmentRef {
    pub path: PathBuf,
    pub file_name: Option<String>,
    pub size_bytes: Option<u64>,
}

/// Alert message published to the broker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertMessage {
    pub message_type: String,
    pub event_id: Uuid,
    pub device_id: String,
    pub timestamp: DateTime<Utc>,
    pub subject: String,
    pub body: String,
    pub recipients: Vec<String>,
    pub attachment: Option<AttachmentRef>,
}

/// What the event loop reports back to publishers
#[derive(Debug)]
enum LinkEvent {
    Acked(u16),
    Failed(String),
}

struct Link {
    client: AsyncClient,
    events: tokio::sync::Mutex<mpsc::UnboundedReceiver<LinkEvent>>,
    eventloop: Mutex<Option<JoinHandle<()>>>,
    closing: Arc<AtomicBool>,
}

/// MQTT alert publisher
pub struct MqttNotifier {
    config: MqttConfig,
    link: Option<Link>,
}

impl MqttNotifier {
    /// Create an unconnected notifier
    pub fn new(config: MqttConfig) -> Self {
        Self { config, link: None }
    }

    /// Connect to MQTT broker
    ///
    /// The TCP session is opened lazily by the event loop task; failures
    /// surface on the first `send`.
    pub async fn connect(&mut self) -> Result<(), CloudError> {
        if self.config.broker_url.is_empty() {
            return Err(CloudError::Connection("broker_url is empty".into()));
        }

        let mut options = MqttOptions::new(
            format!("drowsy-{}", self.config.device_id),
            &self.config.broker_url,
            self.config.broker_port,
        );
        options.set_keep_alive(Duration::from_secs(self.config.keep_alive_secs.max(5)));
        if let (Some(user), Some(pass)) = (&self.config.username, &self.config.password) {
            options.set_credentials(user, pass);
        }

        let (client, eventloop) = AsyncClient::new(options, 10);
        let (tx, rx) = mpsc::unbounded_channel();
        let closing = Arc::new(AtomicBool::new(false));

        let handle = tokio::spawn(drive(eventloop, tx, closing.clone()));

        self.link = Some(Link {
            client,
            events: tokio::sync::Mutex::new(rx),
            eventloop: Mutex::new(Some(handle)),
            closing,
        });
        info!(
            "MQTT client started for {}:{}",
            self.config.broker_url, self.config.broker_port
        );
        Ok(())
    }

    /// Topic alerts are published to
    pub fn topic(&self) -> String {
        format!("{}/{}/alerts", self.config.topic_prefix, self.config.device_id)
    }

    /// Build the broker message for a notification
    pub fn build_message(&self, notification: &Notification) -> AlertMessage {
        let attachment = notification.attachment.as_ref().map(|path| AttachmentRef {
            path: path.clone(),
            file_name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned()),
            size_bytes: std::fs::metadata(path).ok().map(|m| m.len()),
        });

        AlertMessage {
            message_type: "drowsiness_alert".to_string(),
            event_id: Uuid::new_v4(),
            device_id: self.config.device_id.clone(),
            timestamp: notification.detected_at.with_timezone(&Utc),
            subject: notification.subject.clone(),
            body: notification.body.clone(),
            recipients: notification.recipients.clone(),
            attachment,
        }
    }

    /// Publish one alert (QoS 1) and wait for the broker's acknowledgement
    pub async fn publish_alert(&self, notification: &Notification) -> Result<(), CloudError> {
        let link = self
            .link
            .as_ref()
            .ok_or_else(|| CloudError::Connection("Not connected".to_string()))?;

        let message = self.build_message(notification);
        let payload =
            serde_json::to_vec(&message).map_err(|e| CloudError::Serialization(e.to_string()))?;

        // Held for the whole exchange so acks pair with this publish
        let mut events = link.events.lock().await;
        while let Ok(stale) = events.try_recv() {
            debug!("Discarding stale link event: {:?}", stale);
        }

        link.client
            .publish(self.topic(), QoS::AtLeastOnce, false, payload)
            .await
            .map_err(|e| CloudError::Publish(e.to_string()))?;

        let wait = Duration::from_secs(self.config.ack_timeout_secs.max(1));
        match tokio::time::timeout(wait, events.recv()).await {
            Ok(Some(LinkEvent::Acked(pkid))) => {
                debug!(
                    "Broker acknowledged alert {} (packet {})",
                    message.event_id, pkid
                );
                Ok(())
            }
            Ok(Some(LinkEvent::Failed(reason))) => Err(CloudError::Connection(reason)),
            Ok(None) => Err(CloudError::Connection("event loop stopped".into())),
            Err(_) => Err(CloudError::Publish(format!(
                "no acknowledgement within {}s",
                wait.as_secs()
            ))),
        }
    }

    /// Disconnect and wait for the event loop to exit
    pub async fn disconnect(&self) -> Result<(), CloudError> {
        let Some(link) = &self.link else {
            return Ok(());
        };
        link.closing.store(true, Ordering::SeqCst);

        let handle = link.eventloop.lock().ok().and_then(|mut h| h.take());
        let Some(mut handle) = handle else {
            return Ok(());
        };

        match tokio::time::timeout(CLOSE_TIMEOUT, link.client.disconnect()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("MQTT disconnect request not queued: {}", e),
            Err(_) => warn!("MQTT request queue full at disconnect"),
        }

        match tokio::time::timeout(CLOSE_TIMEOUT, &mut handle).await {
            Ok(_) => {
                info!("MQTT connection closed");
                Ok(())
            }
            Err(_) => {
                handle.abort();
                Err(CloudError::Connection(
                    "event loop did not stop after disconnect".into(),
                ))
            }
        }
    }
}

/// Poll the event loop, forwarding acks and link failures
async fn drive(
    mut eventloop: EventLoop,
    events: mpsc::UnboundedSender<LinkEvent>,
    closing: Arc<AtomicBool>,
) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::PubAck(ack))) => {
                let _ = events.send(LinkEvent::Acked(ack.pkid));
            }
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                info!("MQTT session established");
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                debug!("MQTT disconnect sent");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                if closing.load(Ordering::SeqCst) {
                    break;
                }
                error!("MQTT error: {}", e);
                let _ = events.send(LinkEvent::Failed(e.to_string()));
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    }
}

#[async_trait]
impl Notifier for MqttNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), AlertError> {
        self.publish_alert(notification).await.map_err(AlertError::from)
    }

    async fn close(&self) -> Result<(), AlertError> {
        self.disconnect().await.map_err(AlertError::from)
    }
}

//! Cloud Synchronization Module
//!
//! Delivers drowsiness alerts off the device. Two transports:
//! - MQTT: JSON alert published to `<topic_prefix>/<device_id>/alerts`,
//!   acknowledged by the broker at QoS 1
//! - Email: SMTP over implicit TLS with the evidence snapshot attached

use alerting::AlertError;
use thiserror::Error;

pub mod email;
pub mod mqtt;

pub use email::{EmailConfig, EmailNotifier};
pub use mqtt::{AlertMessage, AttachmentRef, MqttConfig, MqttNotifier};

/// Cloud sync error types
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid message: {0}")]
    Message(String),
}

impl From<CloudError> for AlertError {
    fn from(e: CloudError) -> Self {
        AlertError::Notify(e.to_string())
    }
}

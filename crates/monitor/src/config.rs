//! Layered monitor configuration
//!
//! Defaults, then a TOML file, then `DROWSY_*` environment variables
//! (`__` separates nesting: `DROWSY_DETECTION__EAR_THRESHOLD=0.22`).

use alerting::{AlertConfig, SnapshotPolicy};
use camera_capture::CameraConfig;
use cloud_sync::{EmailConfig, MqttConfig};
use dms::DmsConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use storage::SnapshotConfig;

use crate::MonitorError;

/// Config file looked up in the working directory when none is given
pub const DEFAULT_CONFIG_FILE: &str = "drowsy-monitor";

const ENV_PREFIX: &str = "DROWSY";

/// Root configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub detection: DmsConfig,
    pub alert: AlertConfig,
    pub snapshots: SnapshotConfig,
    pub source: CameraConfig,
    pub notifier: NotifierConfig,
    pub server: ServerConfig,
    pub logging: LogConfig,
}

/// Where notifications go
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifierKind {
    /// Write alerts to the log only
    #[default]
    Log,
    /// Publish alerts to an MQTT broker
    Mqtt,
    /// Mail alerts over SMTPS with the snapshot attached
    Email,
}

/// Notifier configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifierConfig {
    pub kind: NotifierKind,
    pub mqtt: MqttConfig,
    pub email: EmailConfig,
}

/// Status API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub enabled: bool,
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind: "127.0.0.1:8080".to_string(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Filter directive, overridden by `RUST_LOG`
    pub level: String,
    /// Emit JSON lines instead of text
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl MonitorConfig {
    /// Load from `path` (or the default file, if present) and the process environment
    pub fn load(path: Option<&Path>) -> Result<Self, MonitorError> {
        Self::load_with_env(path, None)
    }

    /// Like `load`, reading environment variables from `env` instead of the process
    pub fn load_with_env(
        path: Option<&Path>,
        env: Option<HashMap<String, String>>,
    ) -> Result<Self, MonitorError> {
        let file = match path {
            Some(p) => ::config::File::from(p).required(true),
            None => ::config::File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let settings = ::config::Config::builder()
            .add_source(file)
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("alert.recipients")
                    .source(env),
            )
            .build()?;

        let config: MonitorConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<(), MonitorError> {
        self.detection
            .validate()
            .map_err(|e| MonitorError::InvalidConfig(e.to_string()))?;

        if let SnapshotPolicy::EveryNth { n: 0 } = self.alert.snapshot_policy {
            return Err(MonitorError::InvalidConfig(
                "alert.snapshot_policy.n must be at least 1".into(),
            ));
        }
        if self.snapshots.extension.is_empty() {
            return Err(MonitorError::InvalidConfig(
                "snapshots.extension must not be empty".into(),
            ));
        }
        if self.notifier.kind == NotifierKind::Mqtt && self.notifier.mqtt.broker_url.is_empty() {
            return Err(MonitorError::InvalidConfig(
                "notifier.mqtt.broker_url is required for the mqtt notifier".into(),
            ));
        }
        if self.notifier.kind == NotifierKind::Email {
            let email = &self.notifier.email;
            if email.smtp_server.is_empty() || email.username.is_empty() {
                return Err(MonitorError::InvalidConfig(
                    "notifier.email needs smtp_server and username".into(),
                ));
            }
            if self.alert.recipients.is_empty() {
                return Err(MonitorError::InvalidConfig(
                    "alert.recipients must not be empty for the email notifier".into(),
                ));
            }
        }
        Ok(())
    }
}

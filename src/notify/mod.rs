// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/devicewatch

//! Notification module - alert payloads and the sinks that carry them

mod sinks;

pub use sinks::*;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::detector::DetectorInstance;
use crate::error::DispatchError;
use crate::telemetry::TelemetryEvent;
use crate::transport::MqttClient;

/// Alert produced by a `Notify` action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub target: String,
    pub detector_key: String,
    pub device_type: Option<String>,
    pub device_id: Option<String>,
    pub state: String,
    pub reading: Option<f64>,
    pub variables: BTreeMap<String, f64>,
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    pub fn from_instance(
        target: &str,
        instance: &DetectorInstance,
        input: Option<&TelemetryEvent>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            target: target.to_string(),
            detector_key: instance.key.clone(),
            device_type: input.map(|e| e.device_type.clone()),
            device_id: input.map(|e| e.device_id.clone()),
            state: instance.current_state.clone(),
            reading: input.map(|e| e.device_data),
            variables: instance.variables.clone(),
            timestamp: now,
        }
    }

    /// One-line human readable summary
    pub fn summary(&self) -> String {
        match self.reading {
            Some(reading) => format!(
                "Device {} entered {} (last reading {})",
                self.detector_key, self.state, reading
            ),
            None => format!("Device {} entered {}", self.detector_key, self.state),
        }
    }
}

/// Outbound channel for notifications
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Sink kind for logs
    fn kind(&self) -> &'static str;

    async fn deliver(&self, notification: &Notification) -> Result<()>;
}

/// Notification sink configuration, one entry per target id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SinkConfig {
    Log {
        id: String,
    },
    Mqtt {
        id: String,
        topic: String,
    },
    Webhook {
        id: String,
        url: String,
        #[serde(default = "default_webhook_timeout_ms")]
        timeout_ms: u64,
    },
}

fn default_webhook_timeout_ms() -> u64 {
    5000
}

impl SinkConfig {
    pub fn id(&self) -> &str {
        match self {
            SinkConfig::Log { id } | SinkConfig::Mqtt { id, .. } | SinkConfig::Webhook { id, .. } => id,
        }
    }
}

/// Notification configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// Configured targets
    pub targets: Vec<SinkConfig>,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            targets: vec![SinkConfig::Log {
                id: "alerts".to_string(),
            }],
        }
    }
}

/// Delivery counters
#[derive(Debug, Default)]
pub struct NotifierStats {
    pub sent: AtomicU64,
    pub failed: AtomicU64,
    pub unroutable: AtomicU64,
}

/// Routes notifications to sinks by target id, fire-and-forget
pub struct Notifier {
    sinks: HashMap<String, Arc<dyn NotificationSink>>,
    stats: Arc<NotifierStats>,
}

impl Notifier {
    pub fn new() -> Self {
        Self {
            sinks: HashMap::new(),
            stats: Arc::new(NotifierStats::default()),
        }
    }

    /// Build sinks for every configured target
    pub fn from_config(config: &NotifyConfig, mqtt: Option<Arc<MqttClient>>) -> Result<Self> {
        let mut notifier = Self::new();
        for target in &config.targets {
            let sink: Arc<dyn NotificationSink> = match target {
                SinkConfig::Log { .. } => Arc::new(LogSink),
                SinkConfig::Mqtt { topic, .. } => match &mqtt {
                    Some(client) => Arc::new(MqttSink::new(client.clone(), topic)),
                    None => {
                        warn!(
                            "Target '{}' needs MQTT but no broker is configured, skipping",
                            target.id()
                        );
                        continue;
                    }
                },
                SinkConfig::Webhook { url, timeout_ms, .. } => {
                    Arc::new(WebhookSink::new(url, *timeout_ms)?)
                }
            };
            notifier.register(target.id(), sink);
        }
        Ok(notifier)
    }

    pub fn register(&mut self, target: &str, sink: Arc<dyn NotificationSink>) {
        info!("Notification target '{}' -> {} sink", target, sink.kind());
        self.sinks.insert(target.to_string(), sink);
    }

    pub fn has_target(&self, target: &str) -> bool {
        self.sinks.contains_key(target)
    }

    pub fn targets(&self) -> Vec<String> {
        let mut targets: Vec<String> = self.sinks.keys().cloned().collect();
        targets.sort();
        targets
    }

    pub fn stats(&self) -> &NotifierStats {
        &self.stats
    }

    fn sink_for(&self, target: &str) -> Result<Arc<dyn NotificationSink>, DispatchError> {
        match self.sinks.get(target) {
            Some(sink) => Ok(sink.clone()),
            None => {
                self.stats.unroutable.fetch_add(1, Ordering::Relaxed);
                let err = DispatchError::NoSink(target.to_string());
                warn!("Dropping notification {}: {}", target, err);
                Err(err)
            }
        }
    }

    /// Hand off to the sink on a background task; must run inside a tokio runtime
    pub fn dispatch(&self, notification: Notification) -> Result<(), DispatchError> {
        let sink = self.sink_for(&notification.target)?;
        let stats = self.stats.clone();

        tokio::spawn(async move {
            if let Err(e) = deliver_with(sink.as_ref(), &notification, &stats).await {
                warn!("{}", e);
            }
        });
        Ok(())
    }

    /// Deliver and wait for the sink
    pub async fn deliver(&self, notification: &Notification) -> Result<(), DispatchError> {
        let sink = self.sink_for(&notification.target)?;
        deliver_with(sink.as_ref(), notification, &self.stats).await
    }
}

async fn deliver_with(
    sink: &dyn NotificationSink,
    notification: &Notification,
    stats: &NotifierStats,
) -> Result<(), DispatchError> {
    match sink.deliver(notification).await {
        Ok(()) => {
            stats.sent.fetch_add(1, Ordering::Relaxed);
            debug!("Delivered notification {} to {}", notification.id, notification.target);
            Ok(())
        }
        Err(e) => {
            stats.failed.fetch_add(1, Ordering::Relaxed);
            Err(DispatchError::SinkFailed {
                target: notification.target.clone(),
                reason: e.to_string(),
            })
        }
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use tokio::sync::mpsc;

    struct FailingSink;

    #[async_trait]
    impl NotificationSink for FailingSink {
        fn kind(&self) -> &'static str {
            "failing"
        }

        async fn deliver(&self, _notification: &Notification) -> Result<()> {
            Err(anyhow!("broker unreachable"))
        }
    }

    fn sample(target: &str) -> Notification {
        let instance = DetectorInstance::new("RM_Accelerator:AWS98765", "Error", Utc::now());
        let event = TelemetryEvent::new("RM_Accelerator", "AWS98765", 4100.0);
        Notification::from_instance(target, &instance, Some(&event), Utc::now())
    }

    #[test]
    fn test_notification_payload() {
        let n = sample("alerts");
        assert_eq!(n.state, "Error");
        assert_eq!(n.device_id.as_deref(), Some("AWS98765"));
        assert_eq!(n.reading, Some(4100.0));
        assert!(n.summary().contains("entered Error"));
    }

    #[tokio::test]
    async fn test_unknown_target_is_dispatch_error() {
        let notifier = Notifier::new();
        let err = notifier.dispatch(sample("pager")).unwrap_err();
        assert_eq!(err, DispatchError::NoSink("pager".to_string()));
        assert_eq!(notifier.stats().unroutable.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_dispatch_reaches_channel_sink() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut notifier = Notifier::new();
        notifier.register("alerts", Arc::new(ChannelSink::new(tx)));

        notifier.dispatch(sample("alerts")).unwrap();
        let got = rx.recv().await.unwrap();
        assert_eq!(got.target, "alerts");
    }

    #[tokio::test]
    async fn test_sink_failure_is_swallowed_and_counted() {
        let mut notifier = Notifier::new();
        notifier.register("alerts", Arc::new(FailingSink));

        let err = notifier.deliver(&sample("alerts")).await.unwrap_err();
        assert!(matches!(err, DispatchError::SinkFailed { .. }));
        assert_eq!(notifier.stats().failed.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_sink_config_toml() {
        let config: NotifyConfig = toml::from_str(
            r#"
            [[targets]]
            kind = "log"
            id = "ops"

            [[targets]]
            kind = "webhook"
            id = "pager"
            url = "http://localhost:9000/hook"
            "#,
        )
        .unwrap();
        assert_eq!(config.targets.len(), 2);
        assert_eq!(config.targets[1].id(), "pager");
        assert!(matches!(
            config.targets[1],
            SinkConfig::Webhook { timeout_ms: 5000, .. }
        ));
    }

    #[tokio::test]
    async fn test_from_config_skips_mqtt_without_client() {
        let config = NotifyConfig {
            targets: vec![
                SinkConfig::Log { id: "alerts".to_string() },
                SinkConfig::Mqtt {
                    id: "bus".to_string(),
                    topic: "devicewatch/alerts".to_string(),
                },
            ],
        };
        let notifier = Notifier::from_config(&config, None).unwrap();
        assert_eq!(notifier.targets(), vec!["alerts".to_string()]);
    }
}

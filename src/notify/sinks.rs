// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/devicewatch

//! Notification sinks

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::warn;

use super::{Notification, NotificationSink};
use crate::transport::MqttClient;

/// Writes alerts to the log
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    fn kind(&self) -> &'static str {
        "log"
    }

    async fn deliver(&self, notification: &Notification) -> Result<()> {
        warn!("🚨 [{}] {}", notification.target, notification.summary());
        Ok(())
    }
}

/// Publishes alerts as JSON on an MQTT topic
pub struct MqttSink {
    client: Arc<MqttClient>,
    topic: String,
}

impl MqttSink {
    pub fn new(client: Arc<MqttClient>, topic: &str) -> Self {
        Self {
            client,
            topic: topic.to_string(),
        }
    }
}

#[async_trait]
impl NotificationSink for MqttSink {
    fn kind(&self) -> &'static str {
        "mqtt"
    }

    async fn deliver(&self, notification: &Notification) -> Result<()> {
        self.client.publish(&self.topic, notification).await
    }
}

/// POSTs alerts as JSON to an HTTP endpoint
pub struct WebhookSink {
    client: reqwest::Client,
    url: String,
}

impl WebhookSink {
    pub fn new(url: &str, timeout_ms: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl NotificationSink for WebhookSink {
    fn kind(&self) -> &'static str {
        "webhook"
    }

    async fn deliver(&self, notification: &Notification) -> Result<()> {
        self.client
            .post(&self.url)
            .json(notification)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// Forwards alerts into an in-process channel
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::UnboundedSender<Notification>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl NotificationSink for ChannelSink {
    fn kind(&self) -> &'static str {
        "channel"
    }

    async fn deliver(&self, notification: &Notification) -> Result<()> {
        self.tx
            .send(notification.clone())
            .map_err(|_| anyhow!("notification channel closed"))
    }
}

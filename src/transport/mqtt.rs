// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/devicewatch

//! MQTT client for telemetry ingest and alert publishing

use anyhow::{anyhow, Result};
use parking_lot::Mutex;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::IngestConfig;

/// MQTT client wrapper
pub struct MqttClient {
    client: AsyncClient,
    broker: String,
    port: u16,
    topics: Arc<Mutex<Vec<String>>>,
    connected: Arc<AtomicBool>,
}

impl MqttClient {
    /// Connect in the background; incoming publishes go to `inbound` when given
    pub fn new(config: &IngestConfig, inbound: Option<mpsc::Sender<Vec<u8>>>) -> Result<Self> {
        let mut options = MqttOptions::new(&config.client_id, &config.broker, config.port);
        options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            options.set_credentials(username, password);
        }

        let (client, mut eventloop) = AsyncClient::new(options, 100);
        let topics: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let connected = Arc::new(AtomicBool::new(false));
        let reconnect = Duration::from_millis(config.reconnect_interval_ms);

        let loop_client = client.clone();
        let loop_topics = topics.clone();
        let loop_connected = connected.clone();

        // Spawn eventloop handler
        tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("MQTT connected");
                        loop_connected.store(true, Ordering::Relaxed);
                        // Clean sessions drop subscriptions on reconnect.
                        for topic in loop_topics.lock().iter() {
                            if let Err(e) = loop_client.try_subscribe(topic.as_str(), QoS::AtLeastOnce) {
                                warn!("MQTT resubscribe to {} failed: {}", topic, e);
                            }
                        }
                    }
                    Ok(Event::Incoming(Packet::Publish(msg))) => {
                        debug!("MQTT received {} bytes on {}", msg.payload.len(), msg.topic);
                        if let Some(tx) = &inbound {
                            if tx.send(msg.payload.to_vec()).await.is_err() {
                                info!("Ingest channel closed, stopping MQTT eventloop");
                                break;
                            }
                        }
                    }
                    Ok(Event::Outgoing(rumqttc::Outgoing::Disconnect)) => {
                        loop_connected.store(false, Ordering::Relaxed);
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        loop_connected.store(false, Ordering::Relaxed);
                        warn!("MQTT error: {:?}", e);
                        tokio::time::sleep(reconnect).await;
                    }
                }
            }
        });

        info!("MQTT client initialized for {}:{}", config.broker, config.port);

        Ok(Self {
            client,
            broker: config.broker.clone(),
            port: config.port,
            topics,
            connected,
        })
    }

    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.broker, self.port)
    }

    pub async fn publish<T: Serialize>(&self, topic: &str, payload: &T) -> Result<()> {
        let json = serde_json::to_vec(payload)?;
        self.publish_raw(topic, &json).await
    }

    pub async fn publish_raw(&self, topic: &str, payload: &[u8]) -> Result<()> {
        self.client
            .publish(topic, QoS::AtLeastOnce, false, payload.to_vec())
            .await
            .map_err(|e| anyhow!("MQTT publish failed: {}", e))?;

        Ok(())
    }

    pub async fn subscribe(&self, topic: &str) -> Result<()> {
        self.client
            .subscribe(topic, QoS::AtLeastOnce)
            .await
            .map_err(|e| anyhow!("MQTT subscribe failed: {}", e))?;

        let mut topics = self.topics.lock();
        if !topics.iter().any(|t| t == topic) {
            topics.push(topic.to_string());
        }
        info!("Subscribed to MQTT topic: {}", topic);
        Ok(())
    }

    pub async fn disconnect(&self) -> Result<()> {
        self.client
            .disconnect()
            .await
            .map_err(|e| anyhow!("MQTT disconnect failed: {}", e))?;

        self.connected.store(false, Ordering::Relaxed);
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }
}

// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/devicewatch

//! Transport module - MQTT ingest of raw telemetry

mod mqtt;

pub use mqtt::*;

use serde::{Deserialize, Serialize};

/// Ingest configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Subscribe to the broker for telemetry
    pub mqtt_enabled: bool,
    pub broker: String,
    pub port: u16,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,

    /// Topic telemetry is published on
    pub topic: String,

    pub keep_alive_secs: u64,
    pub reconnect_interval_ms: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            mqtt_enabled: false,
            broker: "localhost".to_string(),
            port: 1883,
            client_id: "devicewatch".to_string(),
            username: None,
            password: None,
            topic: "remote_monitoring".to_string(),
            keep_alive_secs: 30,
            reconnect_interval_ms: 5000,
        }
    }
}

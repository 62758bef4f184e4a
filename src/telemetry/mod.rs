// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/devicewatch

//! Telemetry module - inbound device events

mod normalizer;
mod simulator;

pub use normalizer::{normalize, normalize_value};
pub use simulator::DeviceSimulator;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EvaluationError;
use crate::model::KeyAttribute;

/// A validated device reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryEvent {
    #[serde(rename = "deviceType")]
    pub device_type: String,
    #[serde(rename = "deviceID")]
    pub device_id: String,
    #[serde(rename = "deviceData")]
    pub device_data: f64,
    #[serde(skip, default = "Utc::now")]
    pub received_at: DateTime<Utc>,
}

impl TelemetryEvent {
    pub fn new(device_type: &str, device_id: &str, device_data: f64) -> Self {
        Self {
            device_type: device_type.to_string(),
            device_id: device_id.to_string(),
            device_data,
            received_at: Utc::now(),
        }
    }

    /// Instance key for this event under the given partitioning
    pub fn key(&self, attribute: KeyAttribute) -> String {
        match attribute {
            KeyAttribute::DeviceId => self.device_id.clone(),
            KeyAttribute::DeviceType => self.device_type.clone(),
            KeyAttribute::Composite => format!("{}:{}", self.device_type, self.device_id),
        }
    }

    /// Numeric field lookup used by conditions
    pub fn field(&self, name: &str) -> Result<f64, EvaluationError> {
        match name {
            "deviceData" => Ok(self.device_data),
            _ => Err(EvaluationError::UnknownInputField(name.to_string())),
        }
    }
}

// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/devicewatch

//! DeviceWatch - Per-Device Anomaly Detection State Machines
//!
//! Streams device telemetry through a declarative detector model:
//! - One finite-state machine instance per device key, created on first sight
//! - Variables, named timers and first-match transitions
//! - Alert once on entering Error, recover after a cooldown
//! - MQTT ingest with log, MQTT and webhook notification sinks
//! - Local provisioning of inputs, models and routing rules
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    DeviceWatch Engine                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────┐  ┌────────────┐  ┌───────────┐  ┌──────────┐   │
//! │  │  MQTT   │→ │ Normalizer │→ │  Shard    │→ │ Detector │   │
//! │  │ Ingest  │  │            │  │  Workers  │  │  Store   │   │
//! │  └─────────┘  └────────────┘  └───────────┘  └──────────┘   │
//! │                                     ↓              ↓        │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │                     Event Bus                       │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! │       ↓               ↓                ↓                    │
//! │  ┌─────────┐  ┌──────────────┐  ┌──────────────┐            │
//! │  │ Log     │  │ MQTT sink    │  │ Webhook sink │            │
//! │  └─────────┘  └──────────────┘  └──────────────┘            │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod core;
pub mod detector;
pub mod error;
pub mod model;
pub mod notify;
pub mod provisioning;
pub mod telemetry;
pub mod transport;

// Re-exports for convenience
pub use config::Config;
pub use self::core::{Engine, EventBus, Ingress};
pub use detector::{Detector, DetectorInstance, Trigger};
pub use model::{Definition, RemoteMonitoringParams};
pub use notify::{Notification, Notifier};
pub use provisioning::Provisioner;
pub use telemetry::TelemetryEvent;

/// DeviceWatch version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// DeviceWatch name
pub const NAME: &str = "DeviceWatch";

/// Build info
pub fn build_info() -> BuildInfo {
    BuildInfo {
        version: VERSION.to_string(),
        rust_version: env!("CARGO_PKG_RUST_VERSION").to_string(),
        target: std::env::consts::ARCH.to_string(),
        os: std::env::consts::OS.to_string(),
    }
}

/// Build information
#[derive(Debug, Clone)]
pub struct BuildInfo {
    /// Version string
    pub version: String,
    /// Minimum supported Rust version
    pub rust_version: String,
    /// Target architecture
    pub target: String,
    /// Operating system
    pub os: String,
}

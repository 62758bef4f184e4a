// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/devicewatch

//! Configuration module

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::model::RemoteMonitoringParams;
use crate::notify::NotifyConfig;
use crate::transport::IngestConfig;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Application name
    pub app_name: String,

    /// Application version
    pub version: String,

    /// Log level
    pub log_level: String,

    /// Feed the engine from the built-in device simulator
    pub demo_mode: bool,

    /// Detector model configuration
    pub model: ModelConfig,

    /// Instance store configuration
    pub store: StoreConfig,

    /// Engine configuration
    pub engine: EngineConfig,

    /// Telemetry ingest configuration
    pub ingest: IngestConfig,

    /// Notification configuration
    pub notify: NotifyConfig,

    /// Provisioning configuration
    pub provisioning: ProvisioningConfig,

    /// Demo simulator configuration
    pub simulator: SimulatorConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_name: "DeviceWatch".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            log_level: "info".to_string(),
            demo_mode: false,
            model: ModelConfig::default(),
            store: StoreConfig::default(),
            engine: EngineConfig::default(),
            ingest: IngestConfig::default(),
            notify: NotifyConfig::default(),
            provisioning: ProvisioningConfig::default(),
            simulator: SimulatorConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Load or create default configuration
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            let config = Self::default();

            // Create parent directories
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            config.save(path)?;
            Ok(config)
        }
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.engine.workers == 0 {
            return Err(anyhow!("engine.workers must be at least 1"));
        }
        if self.engine.queue_capacity == 0 || self.engine.event_bus_capacity == 0 {
            return Err(anyhow!("engine queue capacities must be at least 1"));
        }
        if self.store.sweep_interval_ms == 0 {
            return Err(anyhow!("store.sweep_interval_ms must be positive"));
        }
        if self.store.idle_ttl_secs == Some(0) {
            return Err(anyhow!("store.idle_ttl_secs must be positive when set"));
        }
        if self.ingest.topic.is_empty() {
            return Err(anyhow!("ingest.topic must not be empty"));
        }
        Ok(())
    }

    /// Get configuration directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("devicewatch"))
            .unwrap_or_else(|| PathBuf::from("./config"))
    }

    /// Get default configuration path
    pub fn default_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }
}

/// Detector model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// JSON or TOML definition file; the built-in template is used when unset
    pub definition_path: Option<PathBuf>,

    /// Built-in remote monitoring template
    pub template: RemoteMonitoringParams,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            definition_path: None,
            template: RemoteMonitoringParams::default(),
        }
    }
}

/// Instance store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Evict instances without input for this long; never when unset
    pub idle_ttl_secs: Option<u64>,

    /// Proactive timer sweep period in milliseconds
    pub sweep_interval_ms: u64,

    /// Idle eviction period in seconds
    pub evict_interval_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            idle_ttl_secs: None,
            sweep_interval_ms: 1000,
            evict_interval_secs: 60,
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Shard workers; events for one key always land on the same worker
    pub workers: usize,

    /// Queued events per worker
    pub queue_capacity: usize,

    /// Event bus channel capacity
    pub event_bus_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 1024,
            event_bus_capacity: 256,
        }
    }
}

/// Local provisioning of the detector resources
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisioningConfig {
    /// Provision on startup and tear down on shutdown
    pub enabled: bool,

    pub stack_id: String,
    pub logical_resource_id: String,

    /// Role the routing rule acts as
    pub role_ref: String,

    /// Where acknowledgments are PUT; logged when unset
    pub response_url: Option<String>,
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            stack_id: "devicewatch-local".to_string(),
            logical_resource_id: "RemoteMonitoring".to_string(),
            role_ref: "devicewatch-events-role".to_string(),
            response_url: None,
        }
    }
}

/// Demo simulator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatorConfig {
    pub device_type: String,
    pub device_id: String,

    /// Seconds between readings
    pub interval_secs: u64,

    /// Inclusive reading range
    pub min_reading: u32,
    pub max_reading: u32,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            device_type: "RM_Accelerator".to_string(),
            device_id: "AWS98765".to_string(),
            interval_secs: 5,
            min_reading: 1,
            max_reading: 4098,
        }
    }
}

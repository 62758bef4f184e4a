// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/devicewatch

//! DeviceWatch - Per-Device Anomaly Detection State Machines
//!
//! Subscribes to device telemetry, runs one detector instance per device and
//! alerts when a device enters its Error state.

use anyhow::{bail, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use devicewatch::model::{loader, templates};
use devicewatch::provisioning::{
    Acknowledger, Catalog, HttpAcknowledger, LogAcknowledger, ProvisioningRequest, RequestType,
    ResourceProperties,
};
use devicewatch::telemetry::DeviceSimulator;
use devicewatch::transport::MqttClient;
use devicewatch::{Config, Engine, Notifier, Provisioner, VERSION};

/// DeviceWatch - Per-Device Anomaly Detection State Machines
#[derive(Parser, Debug)]
#[command(name = "devicewatch")]
#[command(author = "bad-antics")]
#[command(version = VERSION)]
#[command(about = "Per-device anomaly detection state machines for streaming telemetry")]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Detector model definition (JSON or TOML)
    #[arg(long)]
    definition: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Enable trace-level logging
    #[arg(long)]
    trace: bool,

    /// Demo mode with a simulated device
    #[arg(long)]
    demo: bool,

    /// MQTT broker address
    #[arg(long)]
    mqtt_broker: Option<String>,

    /// Shard worker count
    #[arg(long)]
    workers: Option<usize>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.trace {
        Level::TRACE
    } else if args.debug {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(args.debug)
        .with_line_number(args.debug)
        .with_ansi(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("🛰️ DeviceWatch v{} - Per-Device Anomaly Detection", VERSION);

    // Load or create configuration
    let config_path = args.config.unwrap_or_else(Config::default_path);
    let mut config = Config::load_or_create(&config_path)?;

    // Override with command line args
    if args.demo {
        config.demo_mode = true;
    }
    if let Some(definition) = args.definition {
        config.model.definition_path = Some(definition);
    }
    if let Some(mqtt) = args.mqtt_broker {
        config.ingest.mqtt_enabled = true;
        config.ingest.broker = mqtt;
    }
    if let Some(workers) = args.workers {
        config.engine.workers = workers;
    }
    config.validate()?;

    info!("Configuration loaded from {:?}", config_path);
    info!("Demo mode: {}", config.demo_mode);

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(config))
}

async fn run(config: Config) -> Result<()> {
    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let (raw_tx, raw_rx) = mpsc::channel::<Vec<u8>>(config.engine.queue_capacity);

    let mqtt = if config.ingest.mqtt_enabled {
        Some(Arc::new(MqttClient::new(&config.ingest, Some(raw_tx.clone()))?))
    } else {
        None
    };

    // Provision input, model and routing rule
    let catalog = Arc::new(Catalog::new());
    let acknowledger: Arc<dyn Acknowledger> = match config.provisioning.response_url {
        Some(_) => Arc::new(HttpAcknowledger::new(Duration::from_secs(10))?),
        None => Arc::new(LogAcknowledger),
    };
    let loaded = match &config.model.definition_path {
        Some(path) => Some(loader::load_file(path)?),
        None => None,
    };
    let mut provisioner = Provisioner::new(
        catalog.clone(),
        config.model.template.clone(),
        &config.ingest.topic,
        acknowledger,
    );
    if let Some(definition) = &loaded {
        provisioner = provisioner.with_definition(definition.as_ref().clone());
    }
    let properties = ResourceProperties {
        notification_target: config.model.template.notify_target.clone(),
        role_ref: config.provisioning.role_ref.clone(),
    };

    let physical_id = if config.provisioning.enabled {
        let request = ProvisioningRequest::new(
            RequestType::Create,
            &config.provisioning.stack_id,
            &config.provisioning.logical_resource_id,
            properties.clone(),
        )
        .with_response_url(config.provisioning.response_url.clone());

        let ack = provisioner.handle(&request).await;
        if !ack.is_success() {
            bail!("Provisioning failed: {}", ack.reason);
        }
        Some(ack.physical_resource_id)
    } else {
        None
    };

    let definition = match (catalog.model(provisioner.model_name()), loaded) {
        (Some(definition), _) => definition,
        (None, Some(definition)) => definition,
        (None, None) => loader::freeze(templates::remote_monitoring(&config.model.template))?,
    };
    info!("Running detector model {}", definition.name);

    let notifier = Notifier::from_config(&config.notify, mqtt.clone())?;
    let mut engine = Engine::new(config.clone(), definition, notifier).await?;
    let ingress = engine.start().await?;
    let ingest_task = tokio::spawn(ingress.run(raw_rx, shutdown_tx.subscribe()));

    if let Some(client) = &mqtt {
        let mut topics = catalog.topics();
        if topics.is_empty() {
            topics.push(config.ingest.topic.clone());
        }
        for topic in topics {
            client.subscribe(&topic).await?;
        }
    }

    let simulator = if config.demo_mode {
        let sim = &config.simulator;
        let device = DeviceSimulator::new(
            &sim.device_type,
            &sim.device_id,
            Duration::from_secs(sim.interval_secs.max(1)),
        )
        .with_range(sim.min_reading, sim.max_reading);
        Some(tokio::spawn(device.run(raw_tx.clone(), shutdown_tx.subscribe())))
    } else {
        None
    };
    drop(raw_tx);

    if mqtt.is_none() && simulator.is_none() {
        warn!("No telemetry source configured; use --mqtt-broker or --demo");
    }

    info!("🚀 DeviceWatch running");
    info!("   Press Ctrl+C to shutdown");

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;

    info!("Shutdown signal received, cleaning up...");
    let _ = shutdown_tx.send(());
    let _ = ingest_task.await;
    if let Some(simulator) = simulator {
        let _ = simulator.await;
    }

    engine.stop().await?;

    if let Some(client) = &mqtt {
        if let Err(e) = client.disconnect().await {
            warn!("{}", e);
        }
    }

    if let Some(physical_id) = physical_id {
        let request = ProvisioningRequest::new(
            RequestType::Delete,
            &config.provisioning.stack_id,
            &config.provisioning.logical_resource_id,
            properties,
        )
        .with_physical_id(&physical_id)
        .with_response_url(config.provisioning.response_url.clone());
        provisioner.handle(&request).await;
    }

    let state = engine.state();
    info!(
        "Processed {} events ({} malformed), {} transitions, {} notifications",
        state.events_processed, state.malformed_events, state.transitions, state.notifications
    );
    info!("DeviceWatch shutdown complete");

    Ok(())
}

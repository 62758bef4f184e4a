// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/devicewatch

//! Detection engine - normalizer, key-sharded workers, detector and notifier

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{EventBus, Scheduler, SystemState};
use crate::config::Config;
use crate::detector::{CycleOutcome, Detector};
use crate::model::Definition;
use crate::notify::Notifier;
use crate::telemetry::{self, TelemetryEvent};

/// Work for one shard
#[derive(Debug)]
enum Job {
    Input(TelemetryEvent),
    Sweep(String),
}

#[derive(Default)]
struct Counters {
    events_processed: AtomicU64,
    malformed_events: AtomicU64,
    sweeps: AtomicU64,
    transitions: AtomicU64,
    notifications: AtomicU64,
    evaluation_errors: AtomicU64,
    evicted: AtomicU64,
    last_transition: Mutex<Option<DateTime<Utc>>>,
}

/// State shared by workers, ingress and scheduled tasks
struct Pipeline {
    detector: Detector,
    notifier: Notifier,
    bus: EventBus,
    counters: Counters,
}

impl Pipeline {
    fn run_job(&self, job: Job) {
        let now = Utc::now();
        let (key, outcome) = match job {
            Job::Input(event) => {
                self.counters.events_processed.fetch_add(1, Ordering::Relaxed);
                let key = self.detector.key_for(&event);
                (key, Some(self.detector.process(event, now)))
            }
            Job::Sweep(key) => {
                self.counters.sweeps.fetch_add(1, Ordering::Relaxed);
                let outcome = self.detector.sweep_key(&key, now);
                (key, outcome)
            }
        };

        if let Some(outcome) = outcome {
            self.publish(&key, outcome);
        }
    }

    /// Runs after the instance lock is released
    fn publish(&self, key: &str, outcome: CycleOutcome) {
        for error in &outcome.errors {
            self.counters.evaluation_errors.fetch_add(1, Ordering::Relaxed);
            self.bus.publish_evaluation_error(key, &error.to_string());
        }

        if let Some(transition) = outcome.transition {
            self.counters.transitions.fetch_add(1, Ordering::Relaxed);
            *self.counters.last_transition.lock() = Some(Utc::now());
            self.bus.publish_transition(transition);
        }

        for notification in outcome.notifications {
            self.counters.notifications.fetch_add(1, Ordering::Relaxed);
            self.bus.publish_notification(notification.clone());
            // Unroutable targets are logged by the notifier.
            let _ = self.notifier.dispatch(notification);
        }
    }

    fn reject(&self, raw: &[u8], reason: &str) {
        self.counters.malformed_events.fetch_add(1, Ordering::Relaxed);
        warn!(
            "Dropping malformed telemetry ({}): {}",
            reason,
            String::from_utf8_lossy(&raw[..raw.len().min(256)])
        );
        self.bus.publish_malformed(reason);
    }
}

fn shard_for(key: &str, shards: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    (hasher.finish() % shards as u64) as usize
}

/// Cloneable handle for feeding telemetry into a running engine
#[derive(Clone)]
pub struct Ingress {
    pipeline: Arc<Pipeline>,
    shards: Arc<Vec<mpsc::Sender<Job>>>,
}

impl Ingress {
    /// Normalize a raw payload and queue it; malformed payloads are dropped
    pub async fn submit(&self, raw: &[u8]) -> Result<()> {
        match telemetry::normalize(raw) {
            Ok(event) => self.submit_event(event).await,
            Err(e) => {
                self.pipeline.reject(raw, &e.to_string());
                Ok(())
            }
        }
    }

    /// Queue an already normalized event on its key's shard
    pub async fn submit_event(&self, event: TelemetryEvent) -> Result<()> {
        let key = self.pipeline.detector.key_for(&event);
        let shard = &self.shards[shard_for(&key, self.shards.len())];
        shard
            .send(Job::Input(event))
            .await
            .map_err(|_| anyhow!("engine is not running"))
    }

    /// Forward raw payloads from `rx` until it closes or shutdown fires
    pub async fn run(self, mut rx: mpsc::Receiver<Vec<u8>>, mut shutdown: broadcast::Receiver<()>) {
        loop {
            tokio::select! {
                payload = rx.recv() => match payload {
                    Some(raw) => {
                        if let Err(e) = self.submit(&raw).await {
                            warn!("Ingest stopped: {}", e);
                            break;
                        }
                    }
                    None => break,
                },
                _ = shutdown.recv() => break,
            }
        }
        debug!("Ingest loop finished");
    }
}

async fn run_shard(
    index: usize,
    pipeline: Arc<Pipeline>,
    mut rx: mpsc::Receiver<Job>,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut closing = false;
    loop {
        tokio::select! {
            job = rx.recv() => match job {
                Some(job) => pipeline.run_job(job),
                None => break,
            },
            // Close the queue and drain what is already in it.
            _ = shutdown.recv(), if !closing => {
                closing = true;
                rx.close();
            }
        }
    }
    debug!("Shard worker {} stopped", index);
}

/// Main DeviceWatch engine
pub struct Engine {
    pub config: Arc<Config>,
    pipeline: Arc<Pipeline>,
    ingress: Option<Ingress>,
    scheduler: Scheduler,
    shutdown_tx: broadcast::Sender<()>,
    handles: Vec<JoinHandle<()>>,
    running: AtomicBool,
    start_time: Option<Instant>,
}

impl Engine {
    pub async fn new(config: Config, definition: Arc<Definition>, notifier: Notifier) -> Result<Self> {
        config.validate()?;

        for target in definition.notify_targets() {
            if !notifier.has_target(&target) {
                warn!(
                    "Model '{}' notifies '{}' but no sink is configured for it",
                    definition.name, target
                );
            }
        }

        let idle_ttl = config
            .store
            .idle_ttl_secs
            .map(|secs| chrono::Duration::seconds(secs.min(i64::MAX as u64) as i64));
        let detector = Detector::new(definition).with_idle_ttl(idle_ttl);
        let (shutdown_tx, _) = broadcast::channel(1);

        let pipeline = Arc::new(Pipeline {
            detector,
            notifier,
            bus: EventBus::new(config.engine.event_bus_capacity),
            counters: Counters::default(),
        });

        Ok(Self {
            config: Arc::new(config),
            pipeline,
            ingress: None,
            scheduler: Scheduler::new(),
            shutdown_tx,
            handles: Vec::new(),
            running: AtomicBool::new(false),
            start_time: None,
        })
    }

    pub async fn start(&mut self) -> Result<Ingress> {
        if let Some(ingress) = &self.ingress {
            return Ok(ingress.clone());
        }

        let definition = self.pipeline.detector.definition();
        info!(
            "Starting DeviceWatch engine with model '{}' ({} states)...",
            definition.name,
            definition.states.len()
        );

        let workers = self.config.engine.workers.max(1);
        let mut shards = Vec::with_capacity(workers);
        for index in 0..workers {
            let (tx, rx) = mpsc::channel(self.config.engine.queue_capacity.max(1));
            shards.push(tx);
            self.handles.push(tokio::spawn(run_shard(
                index,
                self.pipeline.clone(),
                rx,
                self.shutdown_tx.subscribe(),
            )));
        }
        let shards = Arc::new(shards);

        self.schedule_sweep(shards.clone()).await;
        self.schedule_eviction().await;
        self.handles.extend(self.scheduler.start(&self.shutdown_tx).await);

        let ingress = Ingress {
            pipeline: self.pipeline.clone(),
            shards,
        };
        self.ingress = Some(ingress.clone());
        self.start_time = Some(Instant::now());
        self.running.store(true, Ordering::Relaxed);

        info!("DeviceWatch engine started with {} workers", workers);
        Ok(ingress)
    }

    async fn schedule_sweep(&self, shards: Arc<Vec<mpsc::Sender<Job>>>) {
        let pipeline = self.pipeline.clone();
        let interval = Duration::from_millis(self.config.store.sweep_interval_ms.max(1));

        self.scheduler
            .add_task("timer-sweep", interval, move || {
                for key in pipeline.detector.store().due_keys(Utc::now()) {
                    let shard = &shards[shard_for(&key, shards.len())];
                    // A full queue retries on the next tick; the expiry stays due.
                    if shard.try_send(Job::Sweep(key)).is_err() {
                        debug!("Shard busy, deferring timer sweep");
                    }
                }
            })
            .await;
    }

    async fn schedule_eviction(&self) {
        if self.config.store.idle_ttl_secs.is_none() {
            return;
        }
        let pipeline = self.pipeline.clone();
        let interval = Duration::from_secs(self.config.store.evict_interval_secs.max(1));

        self.scheduler
            .add_task("idle-eviction", interval, move || {
                let evicted = pipeline.detector.store().evict_idle(Utc::now());
                if !evicted.is_empty() {
                    pipeline
                        .counters
                        .evicted
                        .fetch_add(evicted.len() as u64, Ordering::Relaxed);
                    pipeline.bus.publish_evicted(evicted);
                }
            })
            .await;
    }

    /// Stop accepting input, drain queued events and wait for the workers
    pub async fn stop(&mut self) -> Result<()> {
        if self.ingress.take().is_none() {
            return Ok(());
        }
        info!("Stopping DeviceWatch engine...");

        let _ = self.shutdown_tx.send(());
        for result in futures::future::join_all(self.handles.drain(..)).await {
            if let Err(e) = result {
                warn!("Engine task failed: {}", e);
            }
        }
        self.running.store(false, Ordering::Relaxed);

        info!("DeviceWatch engine stopped");
        Ok(())
    }

    pub fn ingress(&self) -> Option<Ingress> {
        self.ingress.clone()
    }

    /// Convenience for `ingress().submit(raw)`
    pub async fn submit(&self, raw: &[u8]) -> Result<()> {
        match &self.ingress {
            Some(ingress) => ingress.submit(raw).await,
            None => Err(anyhow!("engine is not running")),
        }
    }

    pub fn detector(&self) -> &Detector {
        &self.pipeline.detector
    }

    pub fn bus(&self) -> &EventBus {
        &self.pipeline.bus
    }

    pub fn notifier(&self) -> &Notifier {
        &self.pipeline.notifier
    }

    /// Subscribe for shutdown alongside the engine's own tasks
    pub fn shutdown_receiver(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    pub fn state(&self) -> SystemState {
        let counters = &self.pipeline.counters;
        SystemState {
            running: self.running.load(Ordering::Relaxed),
            workers: if self.ingress.is_some() {
                self.config.engine.workers.max(1)
            } else {
                0
            },
            instances: self.pipeline.detector.store().len(),
            events_processed: counters.events_processed.load(Ordering::Relaxed),
            malformed_events: counters.malformed_events.load(Ordering::Relaxed),
            sweeps: counters.sweeps.load(Ordering::Relaxed),
            transitions: counters.transitions.load(Ordering::Relaxed),
            notifications: counters.notifications.load(Ordering::Relaxed),
            evaluation_errors: counters.evaluation_errors.load(Ordering::Relaxed),
            evicted: counters.evicted.load(Ordering::Relaxed),
            uptime_seconds: self.uptime(),
            last_transition: *counters.last_transition.lock(),
        }
    }

    pub fn uptime(&self) -> u64 {
        self.start_time.map(|t| t.elapsed().as_secs()).unwrap_or(0)
    }
}

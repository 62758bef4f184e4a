// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/devicewatch

//! Detector module - instances, timers, evaluation and the per-key store

mod evaluator;
mod instance;
mod store;
mod timer;

pub use evaluator::{evaluate, CycleOutcome, Transition, Trigger};
pub use instance::DetectorInstance;
pub use store::{DetectorStore, InstanceHandle};
pub use timer::{Timer, Timers, MAX_TIMER_SECS};

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::trace;

use crate::model::Definition;
use crate::telemetry::TelemetryEvent;

/// A frozen definition plus the instances it drives
pub struct Detector {
    definition: Arc<Definition>,
    store: DetectorStore,
}

impl Detector {
    pub fn new(definition: Arc<Definition>) -> Self {
        let store = DetectorStore::new(&definition.initial_state);
        Self { definition, store }
    }

    pub fn with_idle_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.store = self.store.with_idle_ttl(ttl);
        self
    }

    pub fn definition(&self) -> &Arc<Definition> {
        &self.definition
    }

    pub fn store(&self) -> &DetectorStore {
        &self.store
    }

    pub fn key_for(&self, event: &TelemetryEvent) -> String {
        event.key(self.definition.key)
    }

    /// Run one input cycle for the event's key
    pub fn process(&self, event: TelemetryEvent, now: DateTime<Utc>) -> CycleOutcome {
        let key = self.key_for(&event);
        let handle = self.store.get_or_create(&key, now);
        let mut instance = handle.lock();
        trace!("Evaluating {} in state {}", key, instance.current_state);
        evaluate(&self.definition, &mut instance, &Trigger::Input(event), now)
    }

    /// Timer-only cycle for an existing key
    pub fn sweep_key(&self, key: &str, now: DateTime<Utc>) -> Option<CycleOutcome> {
        let handle = self.store.get(key)?;
        let mut instance = handle.lock();
        Some(evaluate(&self.definition, &mut instance, &Trigger::Sweep, now))
    }

    /// Sweep every key with a newly expired timer
    pub fn sweep(&self, now: DateTime<Utc>) -> Vec<CycleOutcome> {
        self.store
            .due_keys(now)
            .iter()
            .filter_map(|key| self.sweep_key(key, now))
            .collect()
    }

    pub fn snapshot(&self, key: &str) -> Option<DetectorInstance> {
        self.store.snapshot(key)
    }
}

// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/devicewatch

//! Core engine module - wires ingest, detection and notification

mod engine;
mod event_bus;
mod scheduler;

pub use engine::{Engine, Ingress};
pub use event_bus::{Event, EventBus, EventPayload, EventType};
pub use scheduler::Scheduler;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Engine-wide counters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SystemState {
    pub running: bool,
    pub workers: usize,
    pub instances: usize,
    pub events_processed: u64,
    pub malformed_events: u64,
    pub sweeps: u64,
    pub transitions: u64,
    pub notifications: u64,
    pub evaluation_errors: u64,
    pub evicted: u64,
    pub uptime_seconds: u64,
    pub last_transition: Option<DateTime<Utc>>,
}

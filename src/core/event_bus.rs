// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/devicewatch

//! Event bus for observing the detection pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;

use crate::detector::Transition;
use crate::notify::Notification;

/// Event types in the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    Transition,
    Notification,
    MalformedInput,
    EvaluationError,
    Eviction,
}

/// Generic event wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: u64,
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub payload: EventPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    Transition(Transition),
    Notification(Notification),
    MalformedInput { reason: String },
    EvaluationError { key: String, message: String },
    Evicted { keys: Vec<String> },
}

/// Central event bus for pub/sub communication
pub struct EventBus {
    transition_tx: broadcast::Sender<Transition>,
    notification_tx: broadcast::Sender<Notification>,
    event_tx: broadcast::Sender<Event>,
    event_counter: AtomicU64,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (transition_tx, _) = broadcast::channel(capacity);
        let (notification_tx, _) = broadcast::channel(capacity);
        let (event_tx, _) = broadcast::channel(capacity);

        Self {
            transition_tx,
            notification_tx,
            event_tx,
            event_counter: AtomicU64::new(0),
        }
    }

    pub fn publish_transition(&self, transition: Transition) {
        let _ = self.transition_tx.send(transition.clone());
        self.publish_event(EventType::Transition, EventPayload::Transition(transition));
    }

    pub fn publish_notification(&self, notification: Notification) {
        let _ = self.notification_tx.send(notification.clone());
        self.publish_event(
            EventType::Notification,
            EventPayload::Notification(notification),
        );
    }

    pub fn publish_malformed(&self, reason: &str) {
        self.publish_event(
            EventType::MalformedInput,
            EventPayload::MalformedInput {
                reason: reason.to_string(),
            },
        );
    }

    pub fn publish_evaluation_error(&self, key: &str, message: &str) {
        self.publish_event(
            EventType::EvaluationError,
            EventPayload::EvaluationError {
                key: key.to_string(),
                message: message.to_string(),
            },
        );
    }

    pub fn publish_evicted(&self, keys: Vec<String>) {
        self.publish_event(EventType::Eviction, EventPayload::Evicted { keys });
    }

    fn publish_event(&self, event_type: EventType, payload: EventPayload) {
        let id = self.event_counter.fetch_add(1, Ordering::Relaxed);
        let event = Event {
            id,
            event_type,
            timestamp: Utc::now(),
            payload,
        };
        let _ = self.event_tx.send(event);
    }

    /// Number of events published so far
    pub fn published(&self) -> u64 {
        self.event_counter.load(Ordering::Relaxed)
    }

    pub fn subscribe_transitions(&self) -> broadcast::Receiver<Transition> {
        self.transition_tx.subscribe()
    }

    pub fn subscribe_notifications(&self) -> broadcast::Receiver<Notification> {
        self.notification_tx.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }
}

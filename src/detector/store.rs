// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/devicewatch

//! Detector instance store
//!
//! The map lock is only held to find or insert a handle. Each instance has
//! its own mutex, so evaluation of one key never waits on another key.

use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use super::DetectorInstance;

/// Shared, individually locked instance
pub type InstanceHandle = Arc<Mutex<DetectorInstance>>;

pub struct DetectorStore {
    initial_state: String,
    instances: RwLock<HashMap<String, InstanceHandle>>,
    idle_ttl: Option<Duration>,
}

impl DetectorStore {
    pub fn new(initial_state: &str) -> Self {
        Self {
            initial_state: initial_state.to_string(),
            instances: RwLock::new(HashMap::new()),
            idle_ttl: None,
        }
    }

    /// Evict instances not heard from for `ttl`
    pub fn with_idle_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.idle_ttl = ttl;
        self
    }

    /// Existing instance for `key`, or a fresh one in the initial state
    pub fn get_or_create(&self, key: &str, now: DateTime<Utc>) -> InstanceHandle {
        if let Some(handle) = self.instances.read().get(key) {
            return handle.clone();
        }

        let mut instances = self.instances.write();
        instances
            .entry(key.to_string())
            .or_insert_with(|| {
                debug!("Creating detector instance for {}", key);
                Arc::new(Mutex::new(DetectorInstance::new(key, &self.initial_state, now)))
            })
            .clone()
    }

    pub fn get(&self, key: &str) -> Option<InstanceHandle> {
        self.instances.read().get(key).cloned()
    }

    /// Store a snapshot as the current instance for its key
    pub fn put(&self, instance: DetectorInstance) {
        match self.get(&instance.key) {
            Some(handle) => *handle.lock() = instance,
            None => {
                let key = instance.key.clone();
                self.instances
                    .write()
                    .insert(key, Arc::new(Mutex::new(instance)));
            }
        }
    }

    /// Clone of the instance, waiting for any running cycle on it
    pub fn snapshot(&self, key: &str) -> Option<DetectorInstance> {
        let handle = self.get(key)?;
        let instance = handle.lock().clone();
        Some(instance)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.instances.read().contains_key(key)
    }

    pub fn remove(&self, key: &str) -> bool {
        self.instances.write().remove(key).is_some()
    }

    pub fn keys(&self) -> Vec<String> {
        self.instances.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.instances.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.read().is_empty()
    }

    /// Keys with a timer that expired since their last evaluation.
    ///
    /// Instances busy in a cycle are skipped, that cycle already sees the expiry.
    pub fn due_keys(&self, now: DateTime<Utc>) -> Vec<String> {
        let instances = self.instances.read();
        let mut due: Vec<String> = instances
            .iter()
            .filter_map(|(key, handle)| {
                let instance = handle.try_lock()?;
                instance
                    .timers
                    .expired_between(instance.last_evaluated, now)
                    .then(|| key.clone())
            })
            .collect();
        due.sort();
        due
    }

    /// Drop idle instances nobody else holds, returning their keys
    pub fn evict_idle(&self, now: DateTime<Utc>) -> Vec<String> {
        let Some(ttl) = self.idle_ttl else {
            return Vec::new();
        };

        let mut evicted = Vec::new();
        let mut instances = self.instances.write();
        instances.retain(|key, handle| {
            // With the map write-locked, a count of one means no caller has a clone.
            if Arc::strong_count(handle) > 1 {
                return true;
            }
            let idle = match handle.try_lock() {
                Some(instance) => instance.last_seen() + ttl <= now,
                None => false,
            };
            if idle {
                evicted.push(key.clone());
            }
            !idle
        });

        if !evicted.is_empty() {
            info!("Evicted {} idle detector instances", evicted.len());
        }
        evicted.sort();
        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 1, 8, 0, 0).unwrap()
    }

    #[test]
    fn test_get_or_create_is_lazy_and_stable() {
        let store = DetectorStore::new("Normal");
        assert!(store.is_empty());

        let a = store.get_or_create("t:1", t0());
        let b = store.get_or_create("t:1", t0() + Duration::seconds(5));
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(store.len(), 1);

        let instance = a.lock();
        assert_eq!(instance.current_state, "Normal");
        assert!(instance.fresh);
        assert_eq!(instance.created_at, t0());
    }

    #[test]
    fn test_put_and_snapshot() {
        let store = DetectorStore::new("Normal");
        let mut instance = DetectorInstance::new("t:2", "Normal", t0());
        instance.set_variable("errorEvent", 3.0);
        store.put(instance.clone());

        assert_eq!(store.snapshot("t:2"), Some(instance.clone()));

        instance.current_state = "Error".to_string();
        store.put(instance);
        assert_eq!(store.snapshot("t:2").unwrap().current_state, "Error");
        assert!(store.snapshot("t:3").is_none());
    }

    #[test]
    fn test_due_keys_only_after_new_expiry() {
        let store = DetectorStore::new("Normal");
        {
            let handle = store.get_or_create("t:1", t0());
            let mut instance = handle.lock();
            instance.timers.set("cooldown", 60, t0());
        }
        store.get_or_create("t:2", t0());

        assert!(store.due_keys(t0() + Duration::seconds(30)).is_empty());
        assert_eq!(store.due_keys(t0() + Duration::seconds(61)), vec!["t:1".to_string()]);

        // Evaluated after the deadline: no longer due.
        store.get_or_create("t:1", t0()).lock().last_evaluated = t0() + Duration::seconds(61);
        assert!(store.due_keys(t0() + Duration::seconds(90)).is_empty());
    }

    #[test]
    fn test_evict_idle_respects_ttl_and_holders() {
        let store = DetectorStore::new("Normal").with_idle_ttl(Some(Duration::seconds(600)));
        store.get_or_create("old", t0());
        let held = store.get_or_create("held", t0());
        store.get_or_create("recent", t0()).lock().last_input = Some(t0() + Duration::seconds(500));

        let evicted = store.evict_idle(t0() + Duration::seconds(700));
        assert_eq!(evicted, vec!["old".to_string()]);
        assert!(store.contains("held"));
        assert!(store.contains("recent"));

        drop(held);
        let evicted = store.evict_idle(t0() + Duration::seconds(1200));
        assert_eq!(evicted, vec!["held".to_string(), "recent".to_string()]);
        assert!(store.is_empty());
    }

    #[test]
    fn test_no_ttl_never_evicts() {
        let store = DetectorStore::new("Normal");
        store.get_or_create("a", t0());
        assert!(store.evict_idle(t0() + Duration::days(3650)).is_empty());
        assert_eq!(store.len(), 1);
    }
}

// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/devicewatch

//! Detector instance - one per device key

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::Timers;

/// Live state machine for a single key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorInstance {
    pub key: String,
    pub current_state: String,
    pub variables: BTreeMap<String, f64>,
    pub timers: Timers,

    /// Set until the initial state's enter events have run
    pub fresh: bool,

    pub created_at: DateTime<Utc>,
    pub last_evaluated: DateTime<Utc>,
    pub last_input: Option<DateTime<Utc>>,
    pub cycles: u64,
}

impl DetectorInstance {
    pub fn new(key: &str, initial_state: &str, now: DateTime<Utc>) -> Self {
        Self {
            key: key.to_string(),
            current_state: initial_state.to_string(),
            variables: BTreeMap::new(),
            timers: Timers::new(),
            fresh: true,
            created_at: now,
            last_evaluated: now,
            last_input: None,
            cycles: 0,
        }
    }

    /// Variable value, 0 when never assigned
    pub fn variable(&self, name: &str) -> f64 {
        self.variables.get(name).copied().unwrap_or(0.0)
    }

    pub fn set_variable(&mut self, name: &str, value: f64) {
        self.variables.insert(name.to_string(), value);
    }

    /// Most recent time the device was heard from or, failing that, created
    pub fn last_seen(&self) -> DateTime<Utc> {
        self.last_input.unwrap_or(self.created_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unset_variable_reads_zero() {
        let instance = DetectorInstance::new("t:d", "Normal", Utc::now());
        assert_eq!(instance.variable("errorEvent"), 0.0);
        assert!(instance.fresh);
    }

    #[test]
    fn test_set_variable() {
        let mut instance = DetectorInstance::new("t:d", "Normal", Utc::now());
        instance.set_variable("errorEvent", 3.0);
        assert_eq!(instance.variable("errorEvent"), 3.0);
    }
}

// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/devicewatch

//! Detector model definition types

use serde::{Deserialize, Serialize};

use super::{Condition, Expr};

/// Which input attribute(s) partition detector instances
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyAttribute {
    DeviceId,
    DeviceType,
    /// `deviceType:deviceID`
    #[default]
    Composite,
}

/// Side effect applied when a rule's condition holds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    SetVariable { name: String, value: Expr },
    SetTimer { name: String, seconds: u64 },
    ResetTimer { name: String },
    Notify { target: String },
}

impl Action {
    pub fn set_variable(name: &str, value: Expr) -> Self {
        Action::SetVariable {
            name: name.to_string(),
            value,
        }
    }

    pub fn set_timer(name: &str, seconds: u64) -> Self {
        Action::SetTimer {
            name: name.to_string(),
            seconds,
        }
    }

    pub fn reset_timer(name: &str) -> Self {
        Action::ResetTimer {
            name: name.to_string(),
        }
    }

    pub fn notify(target: &str) -> Self {
        Action::Notify {
            target: target.to_string(),
        }
    }
}

/// Named, condition-gated list of actions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRule {
    pub name: String,
    #[serde(default)]
    pub condition: Condition,
    #[serde(default)]
    pub actions: Vec<Action>,
}

impl EventRule {
    pub fn new(name: &str, condition: Condition) -> Self {
        Self {
            name: name.to_string(),
            condition,
            actions: Vec::new(),
        }
    }

    pub fn action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }
}

/// Event rule that moves the instance to `next_state` when it matches
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionRule {
    pub name: String,
    #[serde(default)]
    pub condition: Condition,
    #[serde(default)]
    pub actions: Vec<Action>,
    pub next_state: String,
}

impl TransitionRule {
    pub fn new(name: &str, condition: Condition, next_state: &str) -> Self {
        Self {
            name: name.to_string(),
            condition,
            actions: Vec::new(),
            next_state: next_state.to_string(),
        }
    }

    pub fn action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }
}

/// One operating state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateDef {
    pub name: String,
    #[serde(default)]
    pub on_enter: Vec<EventRule>,
    #[serde(default)]
    pub on_input: Vec<EventRule>,
    #[serde(default)]
    pub on_exit: Vec<EventRule>,
    /// Checked after `on_input`, first match wins
    #[serde(default)]
    pub transitions: Vec<TransitionRule>,
}

impl StateDef {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            on_enter: Vec::new(),
            on_input: Vec::new(),
            on_exit: Vec::new(),
            transitions: Vec::new(),
        }
    }

    pub fn on_enter(mut self, rule: EventRule) -> Self {
        self.on_enter.push(rule);
        self
    }

    pub fn on_input(mut self, rule: EventRule) -> Self {
        self.on_input.push(rule);
        self
    }

    pub fn on_exit(mut self, rule: EventRule) -> Self {
        self.on_exit.push(rule);
        self
    }

    pub fn transition(mut self, rule: TransitionRule) -> Self {
        self.transitions.push(rule);
        self
    }
}

/// Immutable detector model shared by every instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Definition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub key: KeyAttribute,
    pub initial_state: String,
    pub states: Vec<StateDef>,
}

impl Definition {
    pub fn new(name: &str, initial_state: &str) -> Self {
        Self {
            name: name.to_string(),
            description: String::new(),
            key: KeyAttribute::default(),
            initial_state: initial_state.to_string(),
            states: Vec::new(),
        }
    }

    pub fn with_key(mut self, key: KeyAttribute) -> Self {
        self.key = key;
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn state(mut self, state: StateDef) -> Self {
        self.states.push(state);
        self
    }

    pub fn get_state(&self, name: &str) -> Option<&StateDef> {
        self.states.iter().find(|s| s.name == name)
    }

    pub fn is_valid_state(&self, name: &str) -> bool {
        self.get_state(name).is_some()
    }

    /// Every action in the model, with the name of the rule that owns it
    pub fn actions(&self) -> impl Iterator<Item = (&str, &Action)> {
        self.states.iter().flat_map(|state| {
            let events = state
                .on_enter
                .iter()
                .chain(&state.on_input)
                .chain(&state.on_exit)
                .flat_map(|rule| rule.actions.iter().map(move |a| (rule.name.as_str(), a)));
            let transitions = state
                .transitions
                .iter()
                .flat_map(|rule| rule.actions.iter().map(move |a| (rule.name.as_str(), a)));
            events.chain(transitions)
        })
    }

    /// Notification targets referenced by `Notify` actions
    pub fn notify_targets(&self) -> Vec<String> {
        let mut targets: Vec<String> = self
            .actions()
            .filter_map(|(_, action)| match action {
                Action::Notify { target } => Some(target.clone()),
                _ => None,
            })
            .collect();
        targets.sort();
        targets.dedup();
        targets
    }
}

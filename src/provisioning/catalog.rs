// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/devicewatch

//! In-process registry of inputs, detector models and routing rules

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

use crate::error::ProvisioningError;
use crate::model::{loader, Definition};

/// Named input and the attributes its payloads carry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputSchema {
    pub name: String,
    pub description: String,
    pub attributes: Vec<String>,
}

/// Routes messages on a topic into an input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingRule {
    pub name: String,
    pub description: String,
    pub topic: String,
    pub input: String,
    pub role_ref: String,
    pub enabled: bool,
}

impl RoutingRule {
    pub fn matches(&self, topic: &str) -> bool {
        self.enabled && self.topic == topic
    }
}

#[derive(Debug, Clone)]
pub struct ModelRecord {
    pub definition: Arc<Definition>,
    pub role_ref: String,
}

#[derive(Default)]
pub struct Catalog {
    inputs: RwLock<BTreeMap<String, InputSchema>>,
    models: RwLock<BTreeMap<String, ModelRecord>>,
    rules: RwLock<BTreeMap<String, RoutingRule>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_input(&self, input: InputSchema) -> Result<(), ProvisioningError> {
        let mut inputs = self.inputs.write();
        if inputs.contains_key(&input.name) {
            return Err(ProvisioningError::AlreadyExists {
                kind: "input",
                name: input.name,
            });
        }
        info!("Registered input {}", input.name);
        inputs.insert(input.name.clone(), input);
        Ok(())
    }

    pub fn delete_input(&self, name: &str) -> Result<InputSchema, ProvisioningError> {
        self.inputs
            .write()
            .remove(name)
            .ok_or_else(|| not_found("input", name))
    }

    pub fn input(&self, name: &str) -> Option<InputSchema> {
        self.inputs.read().get(name).cloned()
    }

    /// Validate and register a detector model under its own name
    pub fn create_model(
        &self,
        definition: Definition,
        role_ref: &str,
    ) -> Result<Arc<Definition>, ProvisioningError> {
        let mut models = self.models.write();
        if models.contains_key(&definition.name) {
            return Err(ProvisioningError::AlreadyExists {
                kind: "detector model",
                name: definition.name,
            });
        }
        let definition = loader::freeze(definition)?;
        info!("Registered detector model {}", definition.name);
        models.insert(
            definition.name.clone(),
            ModelRecord {
                definition: definition.clone(),
                role_ref: role_ref.to_string(),
            },
        );
        Ok(definition)
    }

    pub fn delete_model(&self, name: &str) -> Result<ModelRecord, ProvisioningError> {
        self.models
            .write()
            .remove(name)
            .ok_or_else(|| not_found("detector model", name))
    }

    pub fn model(&self, name: &str) -> Option<Arc<Definition>> {
        self.models.read().get(name).map(|m| m.definition.clone())
    }

    /// The rule's input must already exist
    pub fn create_rule(&self, rule: RoutingRule) -> Result<(), ProvisioningError> {
        if !self.inputs.read().contains_key(&rule.input) {
            return Err(not_found("input", &rule.input));
        }
        let mut rules = self.rules.write();
        if rules.contains_key(&rule.name) {
            return Err(ProvisioningError::AlreadyExists {
                kind: "routing rule",
                name: rule.name,
            });
        }
        info!("Registered routing rule {}: '{}' -> {}", rule.name, rule.topic, rule.input);
        rules.insert(rule.name.clone(), rule);
        Ok(())
    }

    pub fn delete_rule(&self, name: &str) -> Result<RoutingRule, ProvisioningError> {
        self.rules
            .write()
            .remove(name)
            .ok_or_else(|| not_found("routing rule", name))
    }

    pub fn rule(&self, name: &str) -> Option<RoutingRule> {
        self.rules.read().get(name).cloned()
    }

    /// Enabled rules consuming `topic`
    pub fn rules_for_topic(&self, topic: &str) -> Vec<RoutingRule> {
        self.rules
            .read()
            .values()
            .filter(|r| r.matches(topic))
            .cloned()
            .collect()
    }

    /// Distinct topics of all enabled rules
    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self
            .rules
            .read()
            .values()
            .filter(|r| r.enabled)
            .map(|r| r.topic.clone())
            .collect();
        topics.sort();
        topics.dedup();
        topics
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.read().is_empty() && self.models.read().is_empty() && self.rules.read().is_empty()
    }
}

fn not_found(kind: &'static str, name: &str) -> ProvisioningError {
    ProvisioningError::NotFound {
        kind,
        name: name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::templates::{remote_monitoring, RemoteMonitoringParams};

    fn input() -> InputSchema {
        InputSchema {
            name: "DeviceTelemetryInput".to_string(),
            description: String::new(),
            attributes: vec!["deviceType".to_string(), "deviceID".to_string(), "deviceData".to_string()],
        }
    }

    fn rule(input: &str) -> RoutingRule {
        RoutingRule {
            name: "DeviceTelemetryRule".to_string(),
            description: String::new(),
            topic: "remote_monitoring".to_string(),
            input: input.to_string(),
            role_ref: "role".to_string(),
            enabled: true,
        }
    }

    #[test]
    fn test_duplicate_input_rejected() {
        let catalog = Catalog::new();
        catalog.create_input(input()).unwrap();
        assert!(matches!(
            catalog.create_input(input()),
            Err(ProvisioningError::AlreadyExists { kind: "input", .. })
        ));
    }

    #[test]
    fn test_rule_requires_input() {
        let catalog = Catalog::new();
        assert!(matches!(
            catalog.create_rule(rule("DeviceTelemetryInput")),
            Err(ProvisioningError::NotFound { kind: "input", .. })
        ));

        catalog.create_input(input()).unwrap();
        catalog.create_rule(rule("DeviceTelemetryInput")).unwrap();
        assert_eq!(catalog.rules_for_topic("remote_monitoring").len(), 1);
        assert!(catalog.rules_for_topic("other").is_empty());
        assert_eq!(catalog.topics(), vec!["remote_monitoring".to_string()]);
    }

    #[test]
    fn test_invalid_model_rejected() {
        let catalog = Catalog::new();
        let broken = Definition::new("Broken", "Missing");
        assert!(matches!(
            catalog.create_model(broken, "role"),
            Err(ProvisioningError::Definition(_))
        ));
        assert!(catalog.is_empty());
    }

    #[test]
    fn test_model_lifecycle() {
        let catalog = Catalog::new();
        let definition = remote_monitoring(&RemoteMonitoringParams::default());
        let name = definition.name.clone();

        catalog.create_model(definition, "role").unwrap();
        assert!(catalog.model(&name).is_some());
        assert_eq!(catalog.delete_model(&name).unwrap().role_ref, "role");
        assert!(catalog.delete_model(&name).is_err());
    }
}

// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/devicewatch

//! Provisioning module - one-time setup and teardown of the detector resources
//!
//! Requests follow the custom-resource protocol: every Create, Update or
//! Delete is answered with exactly one SUCCESS or FAILED acknowledgment.

mod ack;
mod catalog;

pub use ack::*;
pub use catalog::*;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::error::ProvisioningError;
use crate::model::templates::{self, RemoteMonitoringParams};
use crate::model::Definition;

pub const INPUT_NAME: &str = "DeviceTelemetryInput";
pub const RULE_NAME: &str = "DeviceTelemetryRule";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestType {
    Create,
    Update,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ResourceProperties {
    /// Notification target the detector alerts
    pub notification_target: String,
    /// Role the routing rule and detector act as
    pub role_ref: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProvisioningRequest {
    pub request_type: RequestType,
    pub request_id: String,
    pub stack_id: String,
    pub logical_resource_id: String,
    #[serde(default)]
    pub physical_resource_id: Option<String>,
    #[serde(default, rename = "ResponseURL")]
    pub response_url: Option<String>,
    pub resource_properties: ResourceProperties,
}

impl ProvisioningRequest {
    pub fn new(
        request_type: RequestType,
        stack_id: &str,
        logical_resource_id: &str,
        properties: ResourceProperties,
    ) -> Self {
        Self {
            request_type,
            request_id: uuid::Uuid::new_v4().to_string(),
            stack_id: stack_id.to_string(),
            logical_resource_id: logical_resource_id.to_string(),
            physical_resource_id: None,
            response_url: None,
            resource_properties: properties,
        }
    }

    pub fn with_physical_id(mut self, id: &str) -> Self {
        self.physical_resource_id = Some(id.to_string());
        self
    }

    pub fn with_response_url(mut self, url: Option<String>) -> Self {
        self.response_url = url;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AckStatus {
    Success,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Acknowledgment {
    pub status: AckStatus,
    pub reason: String,
    pub physical_resource_id: String,
    pub stack_id: String,
    pub request_id: String,
    pub logical_resource_id: String,
    pub data: BTreeMap<String, String>,
}

impl Acknowledgment {
    pub fn is_success(&self) -> bool {
        self.status == AckStatus::Success
    }
}

/// A resource created during a Create, for rollback
enum Created {
    Input,
    Model(String),
    Rule,
}

/// Handles provisioning requests against a catalog
pub struct Provisioner {
    catalog: Arc<Catalog>,
    template: RemoteMonitoringParams,
    /// Registered as-is instead of the template when set
    definition: Option<Definition>,
    topic: String,
    acknowledger: Arc<dyn Acknowledger>,
}

impl Provisioner {
    pub fn new(
        catalog: Arc<Catalog>,
        template: RemoteMonitoringParams,
        topic: &str,
        acknowledger: Arc<dyn Acknowledger>,
    ) -> Self {
        Self {
            catalog,
            template,
            definition: None,
            topic: topic.to_string(),
            acknowledger,
        }
    }

    /// Provision a loaded definition instead of the built-in template
    pub fn with_definition(mut self, definition: Definition) -> Self {
        self.definition = Some(definition);
        self
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn model_name(&self) -> &str {
        match &self.definition {
            Some(definition) => &definition.name,
            None => &self.template.name,
        }
    }

    /// Apply the request and send its acknowledgment
    pub async fn handle(&self, request: &ProvisioningRequest) -> Acknowledgment {
        info!(
            "Provisioning {:?} request {} for {}",
            request.request_type, request.request_id, request.logical_resource_id
        );

        let physical_id = request
            .physical_resource_id
            .clone()
            .unwrap_or_else(|| format!("{}-{}", request.logical_resource_id, uuid::Uuid::new_v4()));

        let (status, reason, data) = match self.apply(request) {
            Ok(data) => (AckStatus::Success, String::new(), data),
            Err(e) => {
                error!("Provisioning {:?} failed: {}", request.request_type, e);
                (AckStatus::Failed, e.to_string(), BTreeMap::new())
            }
        };

        let ack = Acknowledgment {
            status,
            reason,
            physical_resource_id: physical_id,
            stack_id: request.stack_id.clone(),
            request_id: request.request_id.clone(),
            logical_resource_id: request.logical_resource_id.clone(),
            data,
        };

        if let Err(e) = self.acknowledger.acknowledge(request, &ack).await {
            error!("Failed to acknowledge request {}: {}", request.request_id, e);
        }
        ack
    }

    fn apply(&self, request: &ProvisioningRequest) -> Result<BTreeMap<String, String>, ProvisioningError> {
        match request.request_type {
            RequestType::Create => self.create(&request.resource_properties),
            RequestType::Update => Ok(BTreeMap::new()),
            RequestType::Delete => {
                self.delete();
                Ok(BTreeMap::new())
            }
        }
    }

    fn create(&self, properties: &ResourceProperties) -> Result<BTreeMap<String, String>, ProvisioningError> {
        if properties.notification_target.is_empty() {
            return Err(ProvisioningError::MissingProperty("NotificationTarget"));
        }
        if properties.role_ref.is_empty() {
            return Err(ProvisioningError::MissingProperty("RoleRef"));
        }

        let mut created = Vec::new();
        match self.create_all(properties, &mut created) {
            Ok(data) => Ok(data),
            Err(e) => {
                self.rollback(created);
                Err(e)
            }
        }
    }

    fn create_all(
        &self,
        properties: &ResourceProperties,
        created: &mut Vec<Created>,
    ) -> Result<BTreeMap<String, String>, ProvisioningError> {
        self.catalog.create_input(InputSchema {
            name: INPUT_NAME.to_string(),
            description: "Device telemetry readings".to_string(),
            attributes: vec![
                "deviceType".to_string(),
                "deviceID".to_string(),
                templates::READING_FIELD.to_string(),
            ],
        })?;
        created.push(Created::Input);

        let model = match &self.definition {
            Some(definition) => definition.clone(),
            None => {
                let mut params = self.template.clone();
                params.notify_target = properties.notification_target.clone();
                templates::remote_monitoring(&params)
            }
        };
        let definition = self.catalog.create_model(model, &properties.role_ref)?;
        created.push(Created::Model(definition.name.clone()));

        self.catalog.create_rule(RoutingRule {
            name: RULE_NAME.to_string(),
            description: "Routes device telemetry to the detector input".to_string(),
            topic: self.topic.clone(),
            input: INPUT_NAME.to_string(),
            role_ref: properties.role_ref.clone(),
            enabled: true,
        })?;
        created.push(Created::Rule);

        let mut data = BTreeMap::new();
        data.insert("InputName".to_string(), INPUT_NAME.to_string());
        data.insert("DetectorModelName".to_string(), definition.name.clone());
        data.insert("RuleName".to_string(), RULE_NAME.to_string());
        Ok(data)
    }

    fn rollback(&self, created: Vec<Created>) {
        for resource in created.into_iter().rev() {
            let result = match resource {
                Created::Rule => self.catalog.delete_rule(RULE_NAME).map(|_| ()),
                Created::Model(name) => self.catalog.delete_model(&name).map(|_| ()),
                Created::Input => self.catalog.delete_input(INPUT_NAME).map(|_| ()),
            };
            if let Err(e) = result {
                warn!("Rollback: {}", e);
            }
        }
    }

    /// Remove rule, model and input; missing ones count as already deleted
    fn delete(&self) {
        if let Err(e) = self.catalog.delete_rule(RULE_NAME) {
            warn!("Delete: {}", e);
        }
        if let Err(e) = self.catalog.delete_model(self.model_name()) {
            warn!("Delete: {}", e);
        }
        if let Err(e) = self.catalog.delete_input(INPUT_NAME) {
            warn!("Delete: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingAcknowledger {
        acks: Mutex<Vec<Acknowledgment>>,
    }

    #[async_trait::async_trait]
    impl Acknowledger for RecordingAcknowledger {
        async fn acknowledge(
            &self,
            _request: &ProvisioningRequest,
            ack: &Acknowledgment,
        ) -> Result<(), ProvisioningError> {
            self.acks.lock().push(ack.clone());
            Ok(())
        }
    }

    fn provisioner() -> (Provisioner, Arc<RecordingAcknowledger>) {
        let acks = Arc::new(RecordingAcknowledger::default());
        let provisioner = Provisioner::new(
            Arc::new(Catalog::new()),
            RemoteMonitoringParams::default(),
            "remote_monitoring",
            acks.clone(),
        );
        (provisioner, acks)
    }

    fn request(request_type: RequestType) -> ProvisioningRequest {
        ProvisioningRequest::new(
            request_type,
            "stack-1",
            "RemoteMonitoring",
            ResourceProperties {
                notification_target: "ops".to_string(),
                role_ref: "role".to_string(),
            },
        )
    }

    #[tokio::test]
    async fn test_create_registers_everything() {
        let (provisioner, acks) = provisioner();
        let ack = provisioner.handle(&request(RequestType::Create)).await;

        assert!(ack.is_success());
        assert_eq!(ack.data["RuleName"], RULE_NAME);
        let catalog = provisioner.catalog();
        assert!(catalog.input(INPUT_NAME).is_some());
        let model = catalog.model("RemoteMonitoringDetector").unwrap();
        assert_eq!(model.notify_targets(), vec!["ops".to_string()]);
        assert_eq!(catalog.rules_for_topic("remote_monitoring")[0].input, INPUT_NAME);
        assert_eq!(acks.acks.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_create_registers_supplied_definition() {
        let (provisioner, _acks) = provisioner();
        let custom = templates::remote_monitoring(&RemoteMonitoringParams {
            name: "PumpDetector".to_string(),
            notify_target: "pager".to_string(),
            ..RemoteMonitoringParams::default()
        })
        .with_description("Pump pressure detector");
        let provisioner = provisioner.with_definition(custom.clone());
        assert_eq!(provisioner.model_name(), "PumpDetector");

        let ack = provisioner.handle(&request(RequestType::Create)).await;
        assert!(ack.is_success());
        assert_eq!(ack.data["DetectorModelName"], "PumpDetector");
        let model = provisioner.catalog().model("PumpDetector").unwrap();
        assert_eq!(*model, custom);
        assert!(provisioner.catalog().model("RemoteMonitoringDetector").is_none());

        assert!(provisioner.handle(&request(RequestType::Delete)).await.is_success());
        assert!(provisioner.catalog().is_empty());
    }

    #[tokio::test]
    async fn test_failed_create_rolls_back() {
        let (provisioner, _acks) = provisioner();
        // Pre-existing rule makes the last step fail.
        provisioner
            .catalog()
            .create_input(InputSchema {
                name: "Other".to_string(),
                description: String::new(),
                attributes: Vec::new(),
            })
            .unwrap();
        provisioner
            .catalog()
            .create_rule(RoutingRule {
                name: RULE_NAME.to_string(),
                description: String::new(),
                topic: "x".to_string(),
                input: "Other".to_string(),
                role_ref: "role".to_string(),
                enabled: true,
            })
            .unwrap();

        let ack = provisioner.handle(&request(RequestType::Create)).await;
        assert_eq!(ack.status, AckStatus::Failed);
        assert!(ack.reason.contains("already exists"));
        assert!(provisioner.catalog().input(INPUT_NAME).is_none());
        assert!(provisioner.catalog().model("RemoteMonitoringDetector").is_none());
        assert_eq!(provisioner.catalog().rule(RULE_NAME).unwrap().input, "Other");
    }

    #[tokio::test]
    async fn test_missing_property_fails() {
        let (provisioner, _acks) = provisioner();
        let mut req = request(RequestType::Create);
        req.resource_properties.role_ref.clear();

        let ack = provisioner.handle(&req).await;
        assert_eq!(ack.status, AckStatus::Failed);
        assert!(provisioner.catalog().is_empty());
    }

    #[tokio::test]
    async fn test_update_is_noop_and_delete_is_idempotent() {
        let (provisioner, acks) = provisioner();
        let created = provisioner.handle(&request(RequestType::Create)).await;

        let update = request(RequestType::Update).with_physical_id(&created.physical_resource_id);
        let ack = provisioner.handle(&update).await;
        assert!(ack.is_success());
        assert_eq!(ack.physical_resource_id, created.physical_resource_id);

        assert!(provisioner.handle(&request(RequestType::Delete)).await.is_success());
        assert!(provisioner.catalog().is_empty());
        assert!(provisioner.handle(&request(RequestType::Delete)).await.is_success());
        assert_eq!(acks.acks.lock().len(), 4);
    }

    #[test]
    fn test_request_wire_format() {
        let request: ProvisioningRequest = serde_json::from_str(
            r#"{
                "RequestType": "Create",
                "RequestId": "r-1",
                "StackId": "s-1",
                "LogicalResourceId": "Detector",
                "ResponseURL": "https://example.invalid/ack",
                "ResourceProperties": {"NotificationTarget": "ops", "RoleRef": "role"}
            }"#,
        )
        .unwrap();
        assert_eq!(request.request_type, RequestType::Create);
        assert!(request.physical_resource_id.is_none());
        assert_eq!(request.response_url.as_deref(), Some("https://example.invalid/ack"));

        let ack = Acknowledgment {
            status: AckStatus::Success,
            reason: String::new(),
            physical_resource_id: "p".to_string(),
            stack_id: "s-1".to_string(),
            request_id: "r-1".to_string(),
            logical_resource_id: "Detector".to_string(),
            data: BTreeMap::new(),
        };
        let json = serde_json::to_value(&ack).unwrap();
        assert_eq!(json["Status"], "SUCCESS");
        assert_eq!(json["PhysicalResourceId"], "p");
    }
}

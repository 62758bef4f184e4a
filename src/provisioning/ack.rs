// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/devicewatch

//! Acknowledgment delivery

use async_trait::async_trait;
use std::time::Duration;
use tracing::info;

use super::{Acknowledgment, ProvisioningRequest};
use crate::error::ProvisioningError;

/// Reports the outcome of a provisioning request to its caller
#[async_trait]
pub trait Acknowledger: Send + Sync {
    async fn acknowledge(
        &self,
        request: &ProvisioningRequest,
        ack: &Acknowledgment,
    ) -> Result<(), ProvisioningError>;
}

/// PUTs the acknowledgment JSON to the request's response URL
pub struct HttpAcknowledger {
    client: reqwest::Client,
}

impl HttpAcknowledger {
    pub fn new(timeout: Duration) -> Result<Self, ProvisioningError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProvisioningError::Acknowledgment(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Acknowledger for HttpAcknowledger {
    async fn acknowledge(
        &self,
        request: &ProvisioningRequest,
        ack: &Acknowledgment,
    ) -> Result<(), ProvisioningError> {
        let url = request
            .response_url
            .as_deref()
            .ok_or(ProvisioningError::MissingProperty("ResponseURL"))?;

        let body =
            serde_json::to_vec(ack).map_err(|e| ProvisioningError::Acknowledgment(e.to_string()))?;

        // Presigned URLs reject a content type they were not signed with.
        let response = self
            .client
            .put(url)
            .header(reqwest::header::CONTENT_TYPE, "")
            .body(body)
            .send()
            .await
            .map_err(|e| ProvisioningError::Acknowledgment(e.to_string()))?;

        info!("Acknowledgment status code: {}", response.status());
        response
            .error_for_status()
            .map_err(|e| ProvisioningError::Acknowledgment(e.to_string()))?;
        Ok(())
    }
}

/// Logs the acknowledgment instead of sending it
pub struct LogAcknowledger;

#[async_trait]
impl Acknowledger for LogAcknowledger {
    async fn acknowledge(
        &self,
        request: &ProvisioningRequest,
        ack: &Acknowledgment,
    ) -> Result<(), ProvisioningError> {
        info!(
            "{:?} {} for {}: {:?} {}",
            request.request_type, request.request_id, ack.logical_resource_id, ack.status, ack.reason
        );
        Ok(())
    }
}

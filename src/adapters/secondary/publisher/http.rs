/*
Copyright 2025 San Francisco Compute Company

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

    http://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

//! HTTP publisher for sending reports to remote endpoints

use crate::domain::{PublishConfig, PublishError, TargetReport};
use crate::ports::DataPublisher;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;

/// Publishes reports to an HTTP endpoint as JSON
pub struct HttpDataPublisher {
    client: Client,
}

impl HttpDataPublisher {
    /// Create a new HTTP publisher
    ///
    /// # Arguments
    /// * `timeout` - HTTP request timeout
    /// * `skip_tls_verify` - Whether to skip TLS certificate verification
    pub fn new(timeout: Duration, skip_tls_verify: bool) -> Result<Self, PublishError> {
        let client = Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(skip_tls_verify)
            .build()
            .map_err(|e| {
                PublishError::NetworkFailed(format!("failed to create HTTP client: {e}"))
            })?;
        Ok(Self { client })
    }

    /// Create with default settings
    pub fn with_defaults() -> Result<Self, PublishError> {
        Self::new(Duration::from_secs(30), false)
    }

    /// The report as a JSON payload with any configured labels merged in
    fn create_payload(
        &self,
        report: &TargetReport,
        config: &PublishConfig,
    ) -> Result<serde_json::Value, PublishError> {
        let mut payload = serde_json::to_value(report)
            .map_err(|e| PublishError::SerializationFailed(e.to_string()))?;
        if !config.labels.is_empty() {
            if let Some(obj) = payload.as_object_mut() {
                obj.insert(
                    "labels".to_string(),
                    serde_json::to_value(&config.labels).unwrap_or(json!({})),
                );
            }
        }
        Ok(payload)
    }
}

#[async_trait]
impl DataPublisher for HttpDataPublisher {
    async fn publish(
        &self,
        report: &TargetReport,
        config: &PublishConfig,
    ) -> Result<(), PublishError> {
        if config.endpoint.is_empty() {
            return Err(PublishError::NetworkFailed(
                "no endpoint URL provided".to_string(),
            ));
        }
        let payload = self.create_payload(report, config)?;
        let mut request = self.client.post(&config.endpoint).json(&payload);
        if let Some(ref token) = config.auth_token {
            request = request.header("Authorization", format!("Bearer {token}"));
        }
        let response = request
            .send()
            .await
            .map_err(|e| PublishError::NetworkFailed(format!("failed to send request: {e}")))?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "unknown error".to_string());
        if status.as_u16() == 401 || status.as_u16() == 403 {
            Err(PublishError::AuthenticationFailed(format!(
                "HTTP {status}: {error_text}"
            )))
        } else {
            Err(PublishError::NetworkFailed(format!(
                "HTTP {status}: {error_text}"
            )))
        }
    }

    async fn test_connectivity(&self, config: &PublishConfig) -> Result<bool, PublishError> {
        if config.endpoint.is_empty() {
            return Ok(false);
        }
        let mut request = self.client.head(&config.endpoint);
        if let Some(ref token) = config.auth_token {
            request = request.header("Authorization", format!("Bearer {token}"));
        }
        match request.send().await {
            Ok(response) => Ok(response.status().as_u16() < 500),
            Err(_) => Ok(false),
        }
    }
}

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

use crate::domain::{PublishConfig, PublishError, TargetReport};
use async_trait::async_trait;

/// Secondary port - Report publishing abstraction
///
/// This interface abstracts how collected reports are shipped off-box,
/// allowing for different implementations (HTTP endpoints, queues, etc.)
#[async_trait]
pub trait DataPublisher: Send + Sync {
    /// Publish a report to a remote endpoint
    ///
    /// # Arguments
    /// * `report` - The report to publish
    /// * `config` - Publishing configuration (endpoint, auth, labels)
    ///
    /// # Returns
    /// * `Ok(())` - Report successfully published
    /// * `Err(PublishError)` - Error occurred during publishing
    async fn publish(
        &self,
        report: &TargetReport,
        config: &PublishConfig,
    ) -> Result<(), PublishError>;

    /// Test connectivity to the publishing endpoint
    ///
    /// # Arguments
    /// * `config` - Publishing configuration
    ///
    /// # Returns
    /// * `Ok(bool)` - true if the endpoint is reachable
    /// * `Err(PublishError)` - Error testing connectivity
    async fn test_connectivity(&self, config: &PublishConfig) -> Result<bool, PublishError>;
}

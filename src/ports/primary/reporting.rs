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

use crate::domain::{ReportError, TargetReport};
use crate::ports::secondary::Target;
use async_trait::async_trait;
use std::sync::Arc;

/// Primary port - Main interface offered by the server reporting domain
///
/// This is what external systems (CLI, library consumers) use to collect
/// inventory and characterization reports from one or more targets.
#[async_trait]
pub trait ReportingService: Send + Sync {
    /// Collect a complete report from a single target
    ///
    /// # Arguments
    /// * `target` - The target to collect from
    ///
    /// # Returns
    /// * `Ok(TargetReport)` - Complete report for the target
    /// * `Err(ReportError)` - Error occurred during collection
    async fn collect(&self, target: Arc<dyn Target>) -> Result<TargetReport, ReportError>;

    /// Collect reports from multiple targets concurrently
    ///
    /// Targets that fail to produce a report are logged and omitted from the
    /// result. Reports are returned in the same order as the input targets.
    ///
    /// # Arguments
    /// * `targets` - The targets to collect from
    ///
    /// # Returns
    /// * `Vec<TargetReport>` - Reports for the targets that succeeded
    async fn collect_all(&self, targets: Vec<Arc<dyn Target>>) -> Vec<TargetReport>;
}

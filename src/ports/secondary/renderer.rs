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

use crate::domain::{ReportError, ReportFormat, TargetReport};

/// Secondary port - Report output rendering
///
/// One implementation exists per output format. Renderers produce the raw
/// file bytes; callers decide where the bytes go.
pub trait ReportRenderer: Send + Sync {
    /// The format this renderer produces
    fn format(&self) -> ReportFormat;

    /// Render a report to its output bytes
    ///
    /// # Arguments
    /// * `report` - The report to render
    ///
    /// # Returns
    /// * `Ok(Vec<u8>)` - Rendered file contents
    /// * `Err(ReportError)` - Error occurred during rendering
    fn render(&self, report: &TargetReport) -> Result<Vec<u8>, ReportError>;
}

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

//! JSON report rendering

use crate::domain::{ReportError, ReportFormat, TargetReport};
use crate::ports::ReportRenderer;

pub struct JsonRenderer;

impl ReportRenderer for JsonRenderer {
    fn format(&self) -> ReportFormat {
        ReportFormat::Json
    }

    fn render(&self, report: &TargetReport) -> Result<Vec<u8>, ReportError> {
        serde_json::to_vec_pretty(report)
            .map_err(|err| ReportError::RenderFailed(format!("JSON serialization: {err}")))
    }
}

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

use crate::domain::ReportFormat;
use crate::ports::ReportRenderer;

pub mod html;
pub mod json;
pub mod text;
pub mod xlsx;

pub use html::HtmlRenderer;
pub use json::JsonRenderer;
pub use text::TextRenderer;
pub use xlsx::XlsxRenderer;

/// The renderer for a given output format
pub fn renderer_for(format: ReportFormat) -> Box<dyn ReportRenderer> {
    match format {
        ReportFormat::Txt => Box::new(TextRenderer),
        ReportFormat::Json => Box::new(JsonRenderer),
        ReportFormat::Html => Box::new(HtmlRenderer),
        ReportFormat::Xlsx => Box::new(XlsxRenderer),
    }
}

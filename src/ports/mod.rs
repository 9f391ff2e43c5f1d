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

//! Ports - interfaces between the domain and the outside world
//!
//! Primary ports are what callers (CLI, library consumers) use to drive the
//! domain. Secondary ports are what the domain uses to reach targets,
//! renderers, and publishing endpoints.

pub mod primary;
pub mod secondary;

pub use primary::ReportingService;
pub use secondary::{DataPublisher, ReportRenderer, Target};

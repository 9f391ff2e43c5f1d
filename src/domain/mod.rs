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

//! Domain layer - collection scripts, parsers, and report assembly
//!
//! The domain is organized around raw script output: the script library
//! describes what to run and where, the parsers turn captured output into
//! typed facts, and the report module arranges those facts into tables.

pub mod cpudb;
pub mod entities;
pub mod errors;
pub mod parsers;
pub mod report;
pub mod scripts;
pub mod services;

pub use entities::{
    stdout_of, PublishConfig, ReportFormat, ScriptOutput, ScriptOutputs, Table, TargetReport,
};
pub use errors::{CommandError, DomainError, PublishError, ReportError};
pub use services::CollectionService;

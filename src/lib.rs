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

//! Server Report Library
//!
//! Collects hardware and software inventory plus performance
//! characterization facts (frequencies, cache topology, memory geometry)
//! from x86 and ARM Linux servers, using a Ports and Adapters (Hexagonal)
//! architecture.
//!
//! # Architecture
//!
//! - **Domain**: script library, output parsers, and report assembly
//! - **Ports**: interfaces for targets, renderers, and publishers
//! - **Adapters**: local/SSH targets, format renderers, HTTP publisher
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use server_report::{CollectionService, LocalTarget, ReportingService};
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let service = CollectionService::new(Duration::from_secs(30));
//!     let target = Arc::new(LocalTarget::new("localhost", true));
//!     let report = service.collect(target).await?;
//!     println!("collected {} tables", report.tables.len());
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod config;
pub mod domain;
pub mod ports;

pub use adapters::{
    renderer_for, HtmlRenderer, HttpDataPublisher, JsonRenderer, LocalTarget, RemoteTarget,
    TextRenderer, XlsxRenderer,
};
pub use config::FileConfig;
pub use domain::{
    CollectionService, CommandError, DomainError, PublishConfig, PublishError, ReportError,
    ReportFormat, ScriptOutput, ScriptOutputs, Table, TargetReport,
};
pub use ports::{DataPublisher, ReportRenderer, ReportingService, Target};

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

//! Collection orchestration
//!
//! The collection service probes a target's identity, selects the scripts
//! that apply to it, runs them, and assembles the report tables from the
//! captured outputs. Individual script failures are recorded in the report
//! rather than aborting the collection.

use crate::domain::parsers::common::val_from_regex;
use crate::domain::scripts::{self, ScriptDefinition, TargetIdentity};
use crate::domain::{report, ReportError, ScriptOutputs, TargetReport};
use crate::ports::{ReportingService, Target};
use async_trait::async_trait;
use lazy_static::lazy_static;
use log::{debug, error, info, warn};
use regex::Regex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;

lazy_static! {
    static ref LSCPU_ARCHITECTURE: Regex = Regex::new(r"^Architecture:\s*(.+)$").unwrap();
    static ref LSCPU_FAMILY: Regex = Regex::new(r"^CPU family:\s*(.+)$").unwrap();
    static ref LSCPU_MODEL: Regex = Regex::new(r"^Model:\s*(.+)$").unwrap();
}

/// Domain service that drives collection against one or more targets
pub struct CollectionService {
    /// Per-script execution timeout
    command_timeout: Duration,
}

impl CollectionService {
    pub fn new(command_timeout: Duration) -> Self {
        Self { command_timeout }
    }

    /// Runs the identity scripts and derives the target identity used to
    /// filter the script library
    async fn probe_identity(
        &self,
        target: &Arc<dyn Target>,
    ) -> Result<(ScriptOutputs, TargetIdentity), ReportError> {
        let mut outputs = ScriptOutputs::new();
        for script in scripts::identity_scripts() {
            let output = target
                .run_script(script.script, script.superuser, self.command_timeout)
                .await
                .map_err(crate::domain::DomainError::from)?;
            outputs.insert(script.name.to_string(), output);
        }
        let lscpu = crate::domain::stdout_of(&outputs, scripts::LSCPU);
        let identity = TargetIdentity {
            architecture: val_from_regex(lscpu, &LSCPU_ARCHITECTURE),
            vendor: crate::domain::parsers::cpu::vendor_from_output(&outputs),
            family: val_from_regex(lscpu, &LSCPU_FAMILY),
            model: val_from_regex(lscpu, &LSCPU_MODEL),
        };
        if identity.architecture.is_empty() {
            return Err(crate::domain::DomainError::CollectionFailed(format!(
                "could not determine architecture of target {}",
                target.name()
            ))
            .into());
        }
        Ok((outputs, identity))
    }
}

/// Prepends dependency and kernel module checks so a script fails fast with
/// a diagnostic instead of producing partial output
fn wrap_script(script: &ScriptDefinition) -> String {
    let mut wrapped = String::new();
    for dep in script.depends {
        wrapped.push_str(&format!(
            "command -v {dep} >/dev/null 2>&1 || {{ echo 'missing dependency: {dep}' >&2; exit 127; }}\n"
        ));
    }
    for lkm in script.lkms {
        wrapped.push_str(&format!(
            "modprobe {lkm} >/dev/null 2>&1 || {{ echo 'failed to load kernel module: {lkm}' >&2; exit 127; }}\n"
        ));
    }
    wrapped.push_str(script.script);
    wrapped
}

#[async_trait]
impl ReportingService for CollectionService {
    async fn collect(&self, target: Arc<dyn Target>) -> Result<TargetReport, ReportError> {
        let (mut outputs, identity) = self.probe_identity(&target).await?;
        debug!(
            "target {} identity: arch={} vendor={} family={} model={}",
            target.name(),
            identity.architecture,
            identity.vendor,
            identity.family,
            identity.model
        );
        let elevated = target.can_elevate().await;
        if !elevated {
            warn!(
                "target {} cannot elevate privileges, skipping scripts that require root",
                target.name()
            );
        }
        let mut failed_scripts = Vec::new();
        for script in collection_plan(&identity) {
            if outputs.contains_key(script.name) {
                continue;
            }
            if script.superuser && !elevated {
                failed_scripts.push(script.name.to_string());
                continue;
            }
            let wrapped = wrap_script(&script);
            match target
                .run_script(&wrapped, script.superuser, self.command_timeout)
                .await
            {
                Ok(output) => {
                    if !output.success() {
                        debug!(
                            "script '{}' failed on {}: {}",
                            script.name,
                            target.name(),
                            output.stderr.trim()
                        );
                        failed_scripts.push(script.name.to_string());
                    }
                    outputs.insert(script.name.to_string(), output);
                }
                Err(err) => {
                    warn!(
                        "script '{}' could not run on {}: {}",
                        script.name,
                        target.name(),
                        err
                    );
                    failed_scripts.push(script.name.to_string());
                }
            }
        }
        let tables = report::build_tables(&outputs);
        Ok(TargetReport {
            target: target.name(),
            collected_at: chrono::Utc::now().to_rfc3339(),
            tables,
            failed_scripts,
        })
    }

    async fn collect_all(&self, targets: Vec<Arc<dyn Target>>) -> Vec<TargetReport> {
        let mut set = JoinSet::new();
        for (index, target) in targets.into_iter().enumerate() {
            let service = CollectionService::new(self.command_timeout);
            set.spawn(async move {
                let name = target.name();
                info!("collecting from target {name}");
                (index, name, service.collect(target).await)
            });
        }
        let mut reports: Vec<(usize, TargetReport)> = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((index, _, Ok(report))) => reports.push((index, report)),
                Ok((_, name, Err(err))) => {
                    error!("collection failed for target {name}: {err}");
                }
                Err(err) => {
                    error!("collection task panicked: {err}");
                }
            }
        }
        // restore input order
        reports.sort_by_key(|(index, _)| *index);
        reports.into_iter().map(|(_, report)| report).collect()
    }
}

/// The scripts that apply to a target with the given identity, in library
/// order
fn collection_plan(identity: &TargetIdentity) -> Vec<ScriptDefinition> {
    scripts::collection_scripts()
        .into_iter()
        .filter(|script| script.applies_to(identity))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CommandError, ScriptOutput};
    use std::collections::HashMap;

    struct FakeTarget {
        name: String,
        elevated: bool,
        run_delay: Duration,
        // keyed on a substring of the script body
        responses: HashMap<&'static str, ScriptOutput>,
    }

    #[async_trait]
    impl Target for FakeTarget {
        fn name(&self) -> String {
            self.name.clone()
        }

        async fn can_elevate(&self) -> bool {
            self.elevated
        }

        async fn run_script(
            &self,
            script: &str,
            _superuser: bool,
            _timeout: Duration,
        ) -> Result<ScriptOutput, CommandError> {
            if !self.run_delay.is_zero() {
                tokio::time::sleep(self.run_delay).await;
            }
            for (needle, output) in &self.responses {
                if script.contains(needle) {
                    return Ok(output.clone());
                }
            }
            Ok(ScriptOutput {
                stdout: String::new(),
                stderr: "not found".to_string(),
                exit_code: Some(1),
            })
        }
    }

    fn ok(stdout: &str) -> ScriptOutput {
        ScriptOutput {
            stdout: stdout.to_string(),
            stderr: String::new(),
            exit_code: Some(0),
        }
    }

    const LSCPU_SAMPLE: &str = "Architecture:        x86_64\n\
Vendor ID:           GenuineIntel\n\
CPU family:          6\n\
Model:               106\n\
Model name:          Intel(R) Xeon(R) Platinum 8380 CPU @ 2.30GHz\n\
Socket(s):           2\n\
Core(s) per socket:  40\n";

    fn fake_target_named(name: &str, elevated: bool, run_delay: Duration) -> Arc<dyn Target> {
        let mut responses = HashMap::new();
        responses.insert("lscpu", ok(LSCPU_SAMPLE));
        responses.insert("uname", ok("Linux node1 5.15.0 x86_64 GNU/Linux\n"));
        responses.insert("hostname", ok("node1\n"));
        Arc::new(FakeTarget {
            name: name.to_string(),
            elevated,
            run_delay,
            responses,
        })
    }

    fn fake_target(elevated: bool) -> Arc<dyn Target> {
        fake_target_named("node1", elevated, Duration::ZERO)
    }

    #[tokio::test]
    async fn test_collect_builds_report() {
        let service = CollectionService::new(Duration::from_secs(10));
        let report = service.collect(fake_target(true)).await.unwrap();
        assert_eq!(report.target, "node1");
        assert!(report.tables.iter().any(|t| t.name == "CPU"));
        // scripts answering with exit code 1 are recorded as failed
        assert!(!report.failed_scripts.is_empty());
    }

    #[tokio::test]
    async fn test_superuser_scripts_skipped_without_elevation() {
        let service = CollectionService::new(Duration::from_secs(10));
        let report = service.collect(fake_target(false)).await.unwrap();
        assert!(report
            .failed_scripts
            .iter()
            .any(|name| name == scripts::DMIDECODE));
    }

    #[tokio::test]
    async fn test_collect_all_preserves_input_order() {
        let service = CollectionService::new(Duration::from_secs(10));
        // the first target answers slowest, so it finishes last
        let reports = service
            .collect_all(vec![
                fake_target_named("node1", true, Duration::from_millis(10)),
                fake_target_named("node2", true, Duration::ZERO),
            ])
            .await;
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].target, "node1");
        assert_eq!(reports[1].target, "node2");
    }

    #[test]
    fn test_wrap_script_prepends_dependency_checks() {
        let script = scripts::script_by_name(scripts::DMIDECODE).unwrap();
        let wrapped = wrap_script(&script);
        assert!(wrapped.starts_with("command -v dmidecode"));
        assert!(wrapped.ends_with("dmidecode"));
    }

    #[test]
    fn test_collection_plan_filters_by_architecture() {
        let identity = TargetIdentity {
            architecture: "aarch64".to_string(),
            vendor: "ARM".to_string(),
            family: String::new(),
            model: String::new(),
        };
        let plan = collection_plan(&identity);
        assert!(plan.iter().all(|s| s.name != scripts::SPEC_CORE_FREQUENCIES));
        assert!(plan.iter().any(|s| s.name == scripts::LSCPU));
    }
}

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

use crate::domain::{CommandError, ScriptOutput};
use async_trait::async_trait;
use std::time::Duration;

/// Secondary port - A machine that collection scripts run on
///
/// Implementations abstract where the script executes: the local host, a
/// remote host over SSH, or a fake target in tests.
#[async_trait]
pub trait Target: Send + Sync {
    /// Human-readable name for the target, used in log messages and report
    /// file names
    fn name(&self) -> String;

    /// Whether commands on this target can run with root privileges, either
    /// directly or through passwordless sudo
    async fn can_elevate(&self) -> bool;

    /// Run a shell script on the target
    ///
    /// # Arguments
    /// * `script` - The script body, executed with `bash -c` semantics
    /// * `superuser` - Whether the script requires root privileges
    /// * `timeout` - Maximum time the script may run
    ///
    /// # Returns
    /// * `Ok(ScriptOutput)` - Captured stdout, stderr, and exit code
    /// * `Err(CommandError)` - The script could not be started or timed out
    async fn run_script(
        &self,
        script: &str,
        superuser: bool,
        timeout: Duration,
    ) -> Result<ScriptOutput, CommandError>;
}

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

//! Local target adapter - runs collection scripts on this host

use crate::domain::{CommandError, ScriptOutput};
use crate::ports::Target;
use async_trait::async_trait;
use log::debug;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

/// Target implementation for the host the tool runs on
pub struct LocalTarget {
    name: String,
    /// Use sudo for scripts that require root when not already root
    use_sudo: bool,
}

impl LocalTarget {
    pub fn new(name: &str, use_sudo: bool) -> Self {
        Self {
            name: name.to_string(),
            use_sudo,
        }
    }

    fn is_root() -> bool {
        // effective uid, getuid would miss setuid invocations
        unsafe { libc::geteuid() == 0 }
    }

    /// Whether passwordless sudo is available
    async fn sudo_works(&self) -> bool {
        let result = Command::new("sudo")
            .args(["-n", "true"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .stdin(Stdio::null())
            .status()
            .await;
        matches!(result, Ok(status) if status.success())
    }
}

#[async_trait]
impl Target for LocalTarget {
    fn name(&self) -> String {
        self.name.clone()
    }

    async fn can_elevate(&self) -> bool {
        Self::is_root() || (self.use_sudo && self.sudo_works().await)
    }

    async fn run_script(
        &self,
        script: &str,
        superuser: bool,
        script_timeout: Duration,
    ) -> Result<ScriptOutput, CommandError> {
        let elevate = superuser && !Self::is_root();
        let mut cmd = if elevate {
            let mut sudo = Command::new("sudo");
            sudo.args(["-n", "bash", "-c", script]);
            sudo
        } else {
            let mut bash = Command::new("bash");
            bash.args(["-c", script]);
            bash
        };
        cmd.stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(Stdio::null());
        debug!("running local script on {}", self.name);
        let result = timeout(script_timeout, cmd.output()).await;
        match result {
            Ok(Ok(output)) => Ok(ScriptOutput {
                stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
                exit_code: output.status.code(),
            }),
            Ok(Err(err)) => Err(CommandError::Spawn {
                command: "bash".to_string(),
                source: err,
            }),
            Err(_) => Err(CommandError::Timeout(
                script.to_string(),
                script_timeout,
            )),
        }
    }
}

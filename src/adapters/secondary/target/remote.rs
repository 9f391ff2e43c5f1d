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

//! Remote target adapter - runs collection scripts over SSH
//!
//! Uses the system ssh client in batch mode so the user's existing
//! ~/.ssh/config, agent, and known_hosts handling all apply. Scripts are
//! piped to `bash -s` on the remote side to avoid quoting issues.

use crate::domain::{CommandError, ScriptOutput};
use crate::ports::Target;
use async_trait::async_trait;
use log::debug;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;

/// Target implementation for a host reached over SSH
pub struct RemoteTarget {
    /// Display name for the target
    name: String,
    /// ssh destination, `host` or `user@host`
    destination: String,
    /// ssh port
    port: Option<u16>,
    /// Identity file path
    key_file: Option<String>,
}

impl RemoteTarget {
    pub fn new(
        name: &str,
        destination: &str,
        port: Option<u16>,
        key_file: Option<String>,
    ) -> Self {
        Self {
            name: name.to_string(),
            destination: destination.to_string(),
            port,
            key_file,
        }
    }

    /// Whether the ssh destination logs in as root. Root sessions run
    /// superuser scripts directly; sudo may not even be installed there.
    fn destination_is_root(&self) -> bool {
        self.destination
            .split_once('@')
            .map(|(user, _)| user == "root")
            .unwrap_or(false)
    }

    /// The remote shell invocation a script is piped into
    fn remote_shell(&self, superuser: bool) -> &'static str {
        if superuser && !self.destination_is_root() {
            "sudo -n bash -s"
        } else {
            "bash -s"
        }
    }

    fn ssh_command(&self) -> Command {
        let mut cmd = Command::new("ssh");
        cmd.args(["-o", "BatchMode=yes", "-o", "ConnectTimeout=10"]);
        if let Some(port) = self.port {
            cmd.args(["-p", &port.to_string()]);
        }
        if let Some(ref key_file) = self.key_file {
            cmd.args(["-i", key_file]);
        }
        cmd.arg(&self.destination);
        cmd
    }

    async fn run_remote(
        &self,
        remote_command: &str,
        stdin_payload: Option<&str>,
        command_timeout: Duration,
    ) -> Result<ScriptOutput, CommandError> {
        let mut cmd = self.ssh_command();
        cmd.arg(remote_command);
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        cmd.stdin(if stdin_payload.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });
        let mut child = cmd.spawn().map_err(|err| CommandError::Spawn {
            command: "ssh".to_string(),
            source: err,
        })?;
        if let Some(payload) = stdin_payload {
            if let Some(mut stdin) = child.stdin.take() {
                stdin
                    .write_all(payload.as_bytes())
                    .await
                    .map_err(|err| CommandError::Spawn {
                        command: "ssh".to_string(),
                        source: err,
                    })?;
                // close stdin so bash -s sees EOF
                drop(stdin);
            }
        }
        let result = timeout(command_timeout, child.wait_with_output()).await;
        match result {
            Ok(Ok(output)) => {
                // exit code 255 is ssh itself failing, not the script
                if output.status.code() == Some(255) {
                    return Err(CommandError::Connection(
                        self.destination.clone(),
                        String::from_utf8_lossy(&output.stderr).trim().to_string(),
                    ));
                }
                Ok(ScriptOutput {
                    stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                    stderr: String::from_utf8_lossy(&output.stderr).to_string(),
                    exit_code: output.status.code(),
                })
            }
            Ok(Err(err)) => Err(CommandError::Spawn {
                command: "ssh".to_string(),
                source: err,
            }),
            Err(_) => Err(CommandError::Timeout(
                remote_command.to_string(),
                command_timeout,
            )),
        }
    }
}

#[async_trait]
impl Target for RemoteTarget {
    fn name(&self) -> String {
        self.name.clone()
    }

    async fn can_elevate(&self) -> bool {
        let result = self
            .run_remote(
                "[ \"$(id -u)\" -eq 0 ] || sudo -n true",
                None,
                Duration::from_secs(10),
            )
            .await;
        matches!(result, Ok(output) if output.success())
    }

    async fn run_script(
        &self,
        script: &str,
        superuser: bool,
        script_timeout: Duration,
    ) -> Result<ScriptOutput, CommandError> {
        debug!("running remote script on {}", self.name);
        self.run_remote(self.remote_shell(superuser), Some(script), script_timeout)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_target_name() {
        let target = RemoteTarget::new("db1", "admin@db1.example.com", Some(2222), None);
        assert_eq!(target.name(), "db1");
    }

    #[test]
    fn test_remote_shell_skips_sudo_for_root_login() {
        // minimal images often lack sudo entirely, root must not use it
        let root = RemoteTarget::new("db1", "root@db1.example.com", None, None);
        assert_eq!(root.remote_shell(true), "bash -s");
        assert_eq!(root.remote_shell(false), "bash -s");

        let admin = RemoteTarget::new("db1", "admin@db1.example.com", None, None);
        assert_eq!(admin.remote_shell(true), "sudo -n bash -s");
        assert_eq!(admin.remote_shell(false), "bash -s");

        // no explicit user means the local user, not root
        let bare = RemoteTarget::new("db1", "db1.example.com", None, None);
        assert_eq!(bare.remote_shell(true), "sudo -n bash -s");
    }
}

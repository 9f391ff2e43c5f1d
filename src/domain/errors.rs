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

use std::time::Duration;
use thiserror::Error;

/// Errors raised while executing a command on a target
#[derive(Debug, Error)]
pub enum CommandError {
    /// Command binary is not present on the target
    #[error("command not found: {0}")]
    NotFound(String),

    /// Command ran but exited unsuccessfully
    #[error("command '{command}' failed (exit code {exit_code:?}): {stderr}")]
    Failed {
        command: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    /// Command did not complete within the allotted time
    #[error("command '{0}' timed out after {1:?}")]
    Timeout(String, Duration),

    /// Command could not be started at all
    #[error("failed to execute command '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// Connection to a remote target could not be established
    #[error("cannot connect to target '{0}': {1}")]
    Connection(String, String),
}

/// Domain-level errors that don't expose infrastructure details
#[derive(Debug, Error)]
pub enum DomainError {
    /// Collection of target facts failed
    #[error("collection failed: {0}")]
    CollectionFailed(String),

    /// Data parsing failed
    #[error("data parsing failed: {0}")]
    ParsingFailed(String),

    /// Required binaries missing on the target
    #[error("missing required dependencies: {}", .0.join(", "))]
    MissingDependencies(Vec<String>),

    /// Insufficient privileges to collect information
    #[error("insufficient privileges: {0}")]
    InsufficientPrivileges(String),

    /// Invalid configuration provided
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}

impl From<CommandError> for DomainError {
    fn from(err: CommandError) -> Self {
        match err {
            CommandError::NotFound(cmd) => DomainError::MissingDependencies(vec![cmd]),
            other => DomainError::CollectionFailed(other.to_string()),
        }
    }
}

/// Errors raised while building or rendering a report
#[derive(Debug, Error)]
pub enum ReportError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Report rendering failed
    #[error("report rendering failed: {0}")]
    RenderFailed(String),

    /// Writing report output to disk failed
    #[error("report output failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while publishing a report to a remote endpoint
#[derive(Debug, Error)]
pub enum PublishError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Network/HTTP operation failed
    #[error("network operation failed: {0}")]
    NetworkFailed(String),

    /// Remote endpoint rejected the credentials
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Serialization failed
    #[error("serialization failed: {0}")]
    SerializationFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_error_to_domain_error() {
        let err: DomainError = CommandError::NotFound("rdmsr".to_string()).into();
        match err {
            DomainError::MissingDependencies(deps) => assert_eq!(deps, vec!["rdmsr"]),
            other => panic!("unexpected conversion: {other}"),
        }
    }

    #[test]
    fn test_timeout_display() {
        let err = CommandError::Timeout("dmidecode".to_string(), Duration::from_secs(30));
        assert!(err.to_string().contains("timed out"));
    }
}

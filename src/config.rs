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

//! Optional TOML configuration file
//!
//! Command-line flags always win; the file supplies defaults for settings
//! that rarely change between runs (publish endpoint, labels, timeouts).

use crate::domain::{DomainError, PublishConfig};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// Contents of the configuration file. Every section is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileConfig {
    /// Per-script timeout in seconds
    pub command_timeout_secs: Option<u64>,
    /// Directory reports are written under
    pub output_dir: Option<String>,
    /// Output formats to render ("txt", "json", "html", "xlsx")
    pub formats: Option<Vec<String>>,
    /// Publishing configuration
    pub publish: Option<PublishSection>,
}

/// The `[publish]` section
#[derive(Debug, Clone, Deserialize)]
pub struct PublishSection {
    pub endpoint: String,
    pub auth_token: Option<String>,
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

impl From<PublishSection> for PublishConfig {
    fn from(section: PublishSection) -> Self {
        PublishConfig {
            endpoint: section.endpoint,
            auth_token: section.auth_token,
            labels: section.labels,
        }
    }
}

impl FileConfig {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    /// * `Ok(FileConfig)` - Parsed configuration
    /// * `Err(DomainError)` - File could not be read or parsed
    pub fn load(path: &Path) -> Result<Self, DomainError> {
        let contents = std::fs::read_to_string(path).map_err(|err| {
            DomainError::InvalidConfiguration(format!(
                "cannot read config file {}: {err}",
                path.display()
            ))
        })?;
        toml::from_str(&contents).map_err(|err| {
            DomainError::InvalidConfiguration(format!(
                "cannot parse config file {}: {err}",
                path.display()
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_full_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
command_timeout_secs = 60
output_dir = "/var/reports"
formats = ["txt", "json"]

[publish]
endpoint = "https://inventory.example.com/reports"
auth_token = "secret"

[publish.labels]
rack = "r12"
"#
        )
        .unwrap();
        let config = FileConfig::load(file.path()).unwrap();
        assert_eq!(config.command_timeout_secs, Some(60));
        assert_eq!(config.output_dir.as_deref(), Some("/var/reports"));
        assert_eq!(config.formats.as_deref(), Some(&["txt".to_string(), "json".to_string()][..]));
        let publish: PublishConfig = config.publish.unwrap().into();
        assert_eq!(publish.endpoint, "https://inventory.example.com/reports");
        assert_eq!(publish.labels["rack"], "r12");
    }

    #[test]
    fn test_load_empty_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "").unwrap();
        let config = FileConfig::load(file.path()).unwrap();
        assert!(config.command_timeout_secs.is_none());
        assert!(config.publish.is_none());
    }

    #[test]
    fn test_load_missing_file() {
        let result = FileConfig::load(Path::new("/nonexistent/config.toml"));
        assert!(matches!(
            result,
            Err(DomainError::InvalidConfiguration(_))
        ));
    }
}

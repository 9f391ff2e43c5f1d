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

//! Core domain entities for collection and reporting

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Captured result of one diagnostic script run on a target
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScriptOutput {
    /// Standard output
    pub stdout: String,
    /// Standard error
    pub stderr: String,
    /// Exit status code (None when the process was killed)
    pub exit_code: Option<i32>,
}

impl ScriptOutput {
    /// Whether the script completed with exit code zero
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Map from script name to captured output for one target
pub type ScriptOutputs = HashMap<String, ScriptOutput>;

/// Looks up a script's stdout, returning an empty string when the script
/// was skipped or failed. Parsers are total over missing output.
pub fn stdout_of<'a>(outputs: &'a ScriptOutputs, script_name: &str) -> &'a str {
    outputs
        .get(script_name)
        .map(|o| o.stdout.as_str())
        .unwrap_or("")
}

/// One table of the rendered report
///
/// Single-valued fact tables use two columns ("Field", "Value") with one row
/// per fact; inventory tables (DIMMs, NICs, disks) use real columns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Table {
    /// Display name, e.g., "CPU" or "DIMM Population"
    pub name: String,
    /// Column headers
    pub columns: Vec<String>,
    /// Data rows; each row has one cell per column
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Create an empty table with the given name and columns
    pub fn new(name: &str, columns: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    /// Create a two-column Field/Value table from (name, value) pairs
    pub fn from_fields(name: &str, fields: Vec<(&str, String)>) -> Self {
        Self {
            name: name.to_string(),
            columns: vec!["Field".to_string(), "Value".to_string()],
            rows: fields
                .into_iter()
                .map(|(k, v)| vec![k.to_string(), v])
                .collect(),
        }
    }

    /// Add a data row
    pub fn push_row(&mut self, row: Vec<String>) {
        self.rows.push(row);
    }

    /// Whether the table carries any data at all
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() || self.rows.iter().all(|r| r.iter().all(|c| c.is_empty()))
    }
}

/// Complete report for one target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetReport {
    /// Target label (hostname or user-supplied name)
    pub target: String,
    /// Collection timestamp (RFC 3339)
    pub collected_at: String,
    /// Report tables in display order
    pub tables: Vec<Table>,
    /// Names of scripts that failed or were skipped on this target
    pub failed_scripts: Vec<String>,
}

/// Output format for rendered reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    Txt,
    Json,
    Html,
    Xlsx,
}

impl ReportFormat {
    /// File extension for this format
    pub fn extension(&self) -> &'static str {
        match self {
            ReportFormat::Txt => "txt",
            ReportFormat::Json => "json",
            ReportFormat::Html => "html",
            ReportFormat::Xlsx => "xlsx",
        }
    }

    /// All supported formats
    pub fn all() -> Vec<ReportFormat> {
        vec![
            ReportFormat::Txt,
            ReportFormat::Json,
            ReportFormat::Html,
            ReportFormat::Xlsx,
        ]
    }
}

impl std::str::FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "txt" | "text" => Ok(ReportFormat::Txt),
            "json" => Ok(ReportFormat::Json),
            "html" => Ok(ReportFormat::Html),
            "xlsx" | "excel" => Ok(ReportFormat::Xlsx),
            other => Err(format!("unknown report format: {other}")),
        }
    }
}

/// Publishing configuration for remote endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishConfig {
    /// Endpoint URL
    pub endpoint: String,
    /// Optional bearer token
    pub auth_token: Option<String>,
    /// Labels attached to the published payload
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_from_fields() {
        let table = Table::from_fields(
            "Host",
            vec![
                ("Name", "server1".to_string()),
                ("Time", "Mon Jan 1".to_string()),
            ],
        );
        assert_eq!(table.columns, vec!["Field", "Value"]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0], vec!["Name", "server1"]);
    }

    #[test]
    fn test_table_is_empty() {
        let mut table = Table::new("NICs", &["Name", "Model"]);
        assert!(table.is_empty());
        table.push_row(vec!["".to_string(), "".to_string()]);
        assert!(table.is_empty());
        table.push_row(vec!["eth0".to_string(), "X710".to_string()]);
        assert!(!table.is_empty());
    }

    #[test]
    fn test_report_format_parse() {
        assert_eq!("txt".parse::<ReportFormat>().unwrap(), ReportFormat::Txt);
        assert_eq!(
            "EXCEL".parse::<ReportFormat>().unwrap(),
            ReportFormat::Xlsx
        );
        assert!("yaml".parse::<ReportFormat>().is_err());
    }

    #[test]
    fn test_stdout_of_missing_script() {
        let outputs = ScriptOutputs::new();
        assert_eq!(stdout_of(&outputs, "lscpu"), "");
    }
}

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

//! Plain text report rendering

use crate::domain::{ReportError, ReportFormat, Table, TargetReport};
use crate::ports::ReportRenderer;
use std::fmt::Write;

pub struct TextRenderer;

impl TextRenderer {
    fn render_field_table(out: &mut String, table: &Table) {
        let width = table
            .rows
            .iter()
            .filter_map(|row| row.first().map(String::len))
            .max()
            .unwrap_or(0);
        for row in &table.rows {
            let field = row.first().map(String::as_str).unwrap_or("");
            let value = row.get(1).map(String::as_str).unwrap_or("");
            let _ = writeln!(out, "{field:width$}  {value}");
        }
    }

    fn render_column_table(out: &mut String, table: &Table) {
        let mut widths: Vec<usize> = table.columns.iter().map(String::len).collect();
        for row in &table.rows {
            for (i, cell) in row.iter().enumerate() {
                if i < widths.len() && cell.len() > widths[i] {
                    widths[i] = cell.len();
                }
            }
        }
        let mut header = String::new();
        for (column, width) in table.columns.iter().zip(widths.iter().copied()) {
            let _ = write!(header, "{column:width$}  ");
        }
        let _ = writeln!(out, "{}", header.trim_end());
        for row in &table.rows {
            let mut line = String::new();
            for (cell, width) in row.iter().zip(widths.iter().copied()) {
                let _ = write!(line, "{cell:width$}  ");
            }
            let _ = writeln!(out, "{}", line.trim_end());
        }
    }

    fn is_field_table(table: &Table) -> bool {
        table.columns.len() == 2 && table.columns[0] == "Field" && table.columns[1] == "Value"
    }
}

impl ReportRenderer for TextRenderer {
    fn format(&self) -> ReportFormat {
        ReportFormat::Txt
    }

    fn render(&self, report: &TargetReport) -> Result<Vec<u8>, ReportError> {
        let mut out = String::new();
        let _ = writeln!(out, "Target: {}", report.target);
        let _ = writeln!(out, "Collected: {}", report.collected_at);
        for table in &report.tables {
            let _ = writeln!(out);
            let _ = writeln!(out, "{}", table.name);
            let _ = writeln!(out, "{}", "=".repeat(table.name.len()));
            if Self::is_field_table(table) {
                Self::render_field_table(&mut out, table);
            } else {
                Self::render_column_table(&mut out, table);
            }
        }
        if !report.failed_scripts.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(
                out,
                "Scripts with no data: {}",
                report.failed_scripts.join(", ")
            );
        }
        Ok(out.into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_report() -> TargetReport {
        let mut nics = Table::new("NIC", &["Name", "Model"]);
        nics.push_row(vec!["eth0".to_string(), "X710".to_string()]);
        TargetReport {
            target: "node1".to_string(),
            collected_at: "2025-06-10T17:02:01Z".to_string(),
            tables: vec![
                Table::from_fields("Host", vec![("Host Name", "node1".to_string())]),
                nics,
            ],
            failed_scripts: vec!["dmidecode".to_string()],
        }
    }

    #[test]
    fn test_text_render() {
        let bytes = TextRenderer.render(&sample_report()).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("Target: node1"));
        assert!(text.contains("Host\n===="));
        assert!(text.contains("Host Name  node1"));
        assert!(text.contains("Name  Model"));
        assert!(text.contains("eth0  X710"));
        assert!(text.contains("Scripts with no data: dmidecode"));
    }

    #[test]
    fn test_text_render_short_rows() {
        // field tables from external JSON may carry rows with missing cells
        let mut table = Table::new("Host", &["Field", "Value"]);
        table.push_row(vec!["Host Name".to_string()]);
        table.push_row(vec![]);
        let report = TargetReport {
            target: "node1".to_string(),
            collected_at: "2025-06-10T17:02:01Z".to_string(),
            tables: vec![table],
            failed_scripts: Vec::new(),
        };
        let bytes = TextRenderer.render(&report).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("Host Name"));
    }
}

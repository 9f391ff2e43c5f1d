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

//! Excel workbook rendering, one worksheet per table

use crate::domain::{ReportError, ReportFormat, TargetReport};
use crate::ports::ReportRenderer;
use rust_xlsxwriter::{Format, Workbook};

pub struct XlsxRenderer;

/// Worksheet names are limited to 31 characters and may not contain
/// []:*?/\ characters
fn worksheet_name(table_name: &str) -> String {
    let cleaned: String = table_name
        .chars()
        .map(|c| match c {
            '[' | ']' | ':' | '*' | '?' | '/' | '\\' => ' ',
            other => other,
        })
        .collect();
    cleaned.chars().take(31).collect()
}

impl ReportRenderer for XlsxRenderer {
    fn format(&self) -> ReportFormat {
        ReportFormat::Xlsx
    }

    fn render(&self, report: &TargetReport) -> Result<Vec<u8>, ReportError> {
        let mut workbook = Workbook::new();
        let bold = Format::new().set_bold();
        for table in &report.tables {
            let worksheet = workbook.add_worksheet();
            worksheet
                .set_name(worksheet_name(&table.name))
                .map_err(|err| ReportError::RenderFailed(err.to_string()))?;
            for (col, column) in table.columns.iter().enumerate() {
                worksheet
                    .write_string_with_format(0, col as u16, column, &bold)
                    .map_err(|err| ReportError::RenderFailed(err.to_string()))?;
            }
            for (row_index, row) in table.rows.iter().enumerate() {
                for (col, cell) in row.iter().enumerate() {
                    worksheet
                        .write_string((row_index + 1) as u32, col as u16, cell)
                        .map_err(|err| ReportError::RenderFailed(err.to_string()))?;
                }
            }
            worksheet.autofit();
        }
        workbook
            .save_to_buffer()
            .map_err(|err| ReportError::RenderFailed(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Table;

    #[test]
    fn test_worksheet_name_sanitized() {
        assert_eq!(worksheet_name("Package Power / TDP"), "Package Power   TDP");
        assert_eq!(
            worksheet_name("A very long table name that exceeds the limit"),
            "A very long table name that exc"
        );
    }

    #[test]
    fn test_xlsx_render_produces_workbook() {
        let report = TargetReport {
            target: "node1".to_string(),
            collected_at: "2025-06-10T17:02:01Z".to_string(),
            tables: vec![Table::from_fields(
                "Host",
                vec![("Host Name", "node1".to_string())],
            )],
            failed_scripts: Vec::new(),
        };
        let bytes = XlsxRenderer.render(&report).unwrap();
        // xlsx files are zip archives
        assert_eq!(&bytes[0..2], b"PK");
    }
}

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

//! Self-contained HTML report rendering

use crate::domain::{ReportError, ReportFormat, TargetReport};
use crate::ports::ReportRenderer;
use std::fmt::Write;

const STYLE: &str = "\
body { font-family: sans-serif; margin: 2em; color: #222; }
h1 { font-size: 1.4em; }
h2 { font-size: 1.1em; margin-top: 1.5em; }
table { border-collapse: collapse; margin-top: 0.5em; }
th, td { border: 1px solid #ccc; padding: 4px 10px; text-align: left; }
th { background: #f0f0f0; }
.meta { color: #666; font-size: 0.9em; }";

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

pub struct HtmlRenderer;

impl ReportRenderer for HtmlRenderer {
    fn format(&self) -> ReportFormat {
        ReportFormat::Html
    }

    fn render(&self, report: &TargetReport) -> Result<Vec<u8>, ReportError> {
        let mut out = String::new();
        let _ = writeln!(out, "<!DOCTYPE html>");
        let _ = writeln!(out, "<html><head><meta charset=\"utf-8\">");
        let _ = writeln!(out, "<title>{}</title>", escape(&report.target));
        let _ = writeln!(out, "<style>{STYLE}</style></head><body>");
        let _ = writeln!(out, "<h1>{}</h1>", escape(&report.target));
        let _ = writeln!(
            out,
            "<p class=\"meta\">Collected {}</p>",
            escape(&report.collected_at)
        );
        for table in &report.tables {
            let _ = writeln!(out, "<h2>{}</h2>", escape(&table.name));
            let _ = writeln!(out, "<table><thead><tr>");
            for column in &table.columns {
                let _ = writeln!(out, "<th>{}</th>", escape(column));
            }
            let _ = writeln!(out, "</tr></thead><tbody>");
            for row in &table.rows {
                let _ = write!(out, "<tr>");
                for cell in row {
                    let _ = write!(out, "<td>{}</td>", escape(cell));
                }
                let _ = writeln!(out, "</tr>");
            }
            let _ = writeln!(out, "</tbody></table>");
        }
        if !report.failed_scripts.is_empty() {
            let _ = writeln!(
                out,
                "<p class=\"meta\">Scripts with no data: {}</p>",
                escape(&report.failed_scripts.join(", "))
            );
        }
        let _ = writeln!(out, "</body></html>");
        Ok(out.into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Table;

    #[test]
    fn test_html_render_escapes_cells() {
        let report = TargetReport {
            target: "node1".to_string(),
            collected_at: "2025-06-10T17:02:01Z".to_string(),
            tables: vec![Table::from_fields(
                "CPU",
                vec![("CPU Model", "Xeon <Gold>".to_string())],
            )],
            failed_scripts: Vec::new(),
        };
        let html = String::from_utf8(HtmlRenderer.render(&report).unwrap()).unwrap();
        assert!(html.contains("<h2>CPU</h2>"));
        assert!(html.contains("Xeon &lt;Gold&gt;"));
        assert!(!html.contains("<Gold>"));
    }
}

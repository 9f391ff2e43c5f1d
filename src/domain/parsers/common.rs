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

//! Shared extraction helpers for script output
//!
//! Line-oriented regex capture, dmidecode record walking, and the hex/range
//! decoding used by the MSR-based parsers. All helpers are total: missing or
//! malformed input yields empty results, never a panic.

use crate::domain::DomainError;
use regex::Regex;

/// First capture group of the first line matching `re`, lines trimmed.
/// Empty string when no line matches.
pub fn val_from_regex(output: &str, re: &Regex) -> String {
    for line in output.lines() {
        if let Some(caps) = re.captures(line.trim()) {
            if let Some(m) = caps.get(1) {
                return m.as_str().to_string();
            }
        }
    }
    String::new()
}

/// Lines of dmidecode output belonging to records of the given DMI type.
/// Records start at their "Handle ..., DMI type N, ..." line and run until
/// the next "Handle " line.
pub fn dmidecode_type(output: &str, dmi_type: &str) -> String {
    let marker = format!("DMI type {dmi_type},");
    let mut lines = Vec::new();
    let mut in_record = false;
    for line in output.lines() {
        if in_record && line.starts_with("Handle ") {
            in_record = false;
        }
        if line.contains(&marker) {
            in_record = true;
        }
        if in_record {
            lines.push(line);
        }
    }
    lines.join("\n")
}

/// dmidecode records of the given DMI type, one entry per record, each entry
/// a list of its non-empty lines
pub fn dmidecode_entries(output: &str, dmi_type: &str) -> Vec<Vec<String>> {
    let marker = format!("DMI type {dmi_type},");
    let mut entries = Vec::new();
    let mut entry: Vec<String> = Vec::new();
    let mut type_match = false;
    for line in output.lines() {
        if line.starts_with("Handle ") {
            if line.contains(&marker) {
                type_match = true;
                entry = Vec::new();
            } else {
                type_match = false;
            }
        }
        if !type_match {
            continue;
        }
        if line.is_empty() {
            entries.push(std::mem::take(&mut entry));
            type_match = false;
        } else {
            entry.push(line.to_string());
        }
    }
    entries
}

/// First capture of `re` within records of the given DMI type
pub fn val_from_dmidecode(output: &str, dmi_type: &str, re: &Regex) -> String {
    val_from_regex(&dmidecode_type(output, dmi_type), re)
}

/// One row per DMI record of the given type, one column per regex. A column
/// holds the first capture of its regex within the record, empty when the
/// record has no matching line.
pub fn vals_array_from_dmidecode(
    output: &str,
    dmi_type: &str,
    regexes: &[&Regex],
) -> Vec<Vec<String>> {
    dmidecode_entries(output, dmi_type)
        .iter()
        .map(|entry| {
            let mut row = vec![String::new(); regexes.len()];
            for line in entry {
                for (i, re) in regexes.iter().enumerate() {
                    if let Some(caps) = re.captures(line.trim()) {
                        if let Some(m) = caps.get(1) {
                            row[i] = m.as_str().to_string();
                        }
                    }
                }
            }
            row
        })
        .collect()
}

/// Decodes a hex string into its byte values, most significant byte first.
/// Odd-length input is left-padded with a zero nibble.
pub fn hex_to_int_list(hex: &str) -> Result<Vec<u64>, DomainError> {
    let hex = hex.trim().trim_start_matches("0x");
    if hex.is_empty() {
        return Err(DomainError::ParsingFailed("empty hex string".to_string()));
    }
    let padded = if hex.len() % 2 == 1 {
        format!("0{hex}")
    } else {
        hex.to_string()
    };
    let bytes: Result<Vec<u64>, _> = (0..padded.len())
        .step_by(2)
        .map(|i| u64::from_str_radix(&padded[i..i + 2], 16))
        .collect();
    bytes.map_err(|e| DomainError::ParsingFailed(format!("invalid hex string '{hex}': {e}")))
}

/// Expands "1-44" to the list 1..=44
pub fn int_range_to_list(range: &str) -> Result<Vec<u64>, DomainError> {
    let bad = || DomainError::ParsingFailed(format!("invalid integer range '{range}'"));
    match range.split_once('-') {
        Some((start, end)) => {
            let start: u64 = start.trim().parse().map_err(|_| bad())?;
            let end: u64 = end.trim().parse().map_err(|_| bad())?;
            if end < start {
                return Err(bad());
            }
            Ok((start..=end).collect())
        }
        None => {
            let single: u64 = range.trim().parse().map_err(|_| bad())?;
            Ok(vec![single])
        }
    }
}

/// Expands a selective range like "0-3,5,7-8" to the full list of integers
pub fn selective_int_range_to_list(ranges: &str) -> Result<Vec<u64>, DomainError> {
    let mut out = Vec::new();
    for part in ranges.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        out.extend(int_range_to_list(part)?);
    }
    if out.is_empty() {
        return Err(DomainError::ParsingFailed(format!(
            "invalid integer range list '{ranges}'"
        )));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DMIDECODE_SAMPLE: &str = "\
# dmidecode 3.3
Handle 0x0001, DMI type 1, 27 bytes
System Information
\tManufacturer: Dell Inc.
\tProduct Name: PowerEdge R750

Handle 0x1100, DMI type 17, 40 bytes
Memory Device
\tSize: 32 GB
\tLocator: A1
\tSpeed: 3200 MT/s

Handle 0x1101, DMI type 17, 40 bytes
Memory Device
\tSize: 32 GB
\tLocator: A2
\tSpeed: 3200 MT/s
";

    #[test]
    fn test_val_from_regex_trims_lines() {
        let re = Regex::new(r"^Product Name:\s*(.+)$").unwrap();
        assert_eq!(val_from_regex(DMIDECODE_SAMPLE, &re), "PowerEdge R750");
    }

    #[test]
    fn test_val_from_regex_no_match() {
        let re = Regex::new(r"^Serial Number:\s*(.+)$").unwrap();
        assert_eq!(val_from_regex(DMIDECODE_SAMPLE, &re), "");
    }

    #[test]
    fn test_dmidecode_type_extracts_only_requested_records() {
        let section = dmidecode_type(DMIDECODE_SAMPLE, "1");
        assert!(section.contains("Dell Inc."));
        assert!(!section.contains("Memory Device"));
    }

    #[test]
    fn test_dmidecode_entries() {
        let entries = dmidecode_entries(DMIDECODE_SAMPLE, "17");
        assert_eq!(entries.len(), 2);
        assert!(entries[0].iter().any(|l| l.contains("A1")));
        assert!(entries[1].iter().any(|l| l.contains("A2")));
    }

    #[test]
    fn test_vals_array_from_dmidecode() {
        let size = Regex::new(r"^Size:\s*(.+)$").unwrap();
        let locator = Regex::new(r"^Locator:\s*(.+)$").unwrap();
        let rows = vals_array_from_dmidecode(DMIDECODE_SAMPLE, "17", &[&size, &locator]);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], vec!["32 GB", "A1"]);
        assert_eq!(rows[1], vec!["32 GB", "A2"]);
    }

    #[test]
    fn test_hex_to_int_list() {
        assert_eq!(
            hex_to_int_list("2d2d2c2b").unwrap(),
            vec![0x2d, 0x2d, 0x2c, 0x2b]
        );
        // odd length is left-padded
        assert_eq!(hex_to_int_list("12c").unwrap(), vec![0x01, 0x2c]);
        assert!(hex_to_int_list("").is_err());
        assert!(hex_to_int_list("zz").is_err());
    }

    #[test]
    fn test_int_range_to_list() {
        assert_eq!(int_range_to_list("1-4").unwrap(), vec![1, 2, 3, 4]);
        assert_eq!(int_range_to_list("7").unwrap(), vec![7]);
        assert!(int_range_to_list("4-1").is_err());
        assert!(int_range_to_list("a-b").is_err());
    }

    #[test]
    fn test_selective_int_range_to_list() {
        assert_eq!(
            selective_int_range_to_list("0-3,5,7-8").unwrap(),
            vec![0, 1, 2, 3, 5, 7, 8]
        );
        assert!(selective_int_range_to_list("").is_err());
    }
}

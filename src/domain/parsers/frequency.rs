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

//! Turbo frequency bucket decoding and uncore frequency extraction
//!
//! The spec-core-frequencies script emits a header line naming the ISAs and
//! one line of hex register values. Each byte of a value is one bucket,
//! least significant byte first after reversal: the active-core-count bound
//! for the bucket (first column) or the frequency ratio for the ISA. Ratios
//! are in units of 100 MHz.

use crate::domain::cpudb::{UARCH_CWF, UARCH_GNR_X2, UARCH_GNR_X3, UARCH_SRF};
use crate::domain::parsers::common::hex_to_int_list;
use crate::domain::parsers::cpu::uarch_from_output;
use crate::domain::{scripts, stdout_of, DomainError, ScriptOutputs};
use lazy_static::lazy_static;
use log::{error, warn};
use regex::Regex;

lazy_static! {
    static ref TPMI_READ: Regex =
        Regex::new(r"Read bits \d+:\d+ value (\d+) from TPMI ID .* for entry (\d+) in instance (\d+)")
            .unwrap();
}

fn frequencies_from_hex(hex: &str) -> Result<Vec<u64>, DomainError> {
    let mut freqs = hex_to_int_list(hex)?;
    freqs.reverse();
    Ok(freqs)
}

fn bucket_sizes_from_hex(hex: &str) -> Result<Vec<u64>, DomainError> {
    let mut sizes = hex_to_int_list(hex)?;
    if sizes.len() != 8 {
        return Err(DomainError::ParsingFailed(format!(
            "expected 8 bucket sizes, got {}",
            sizes.len()
        )));
    }
    sizes.reverse();
    Ok(sizes)
}

// Registers for unsupported bucket counts repeat the last defined ratio.
fn pad_frequencies(mut freqs: Vec<u64>, desired_len: usize) -> Result<Vec<u64>, DomainError> {
    let last = *freqs
        .last()
        .ok_or_else(|| DomainError::ParsingFailed("cannot pad empty frequency list".to_string()))?;
    while freqs.len() < desired_len {
        freqs.push(last);
    }
    Ok(freqs)
}

/// Decodes the spec-core-frequencies script output into display rows. The
/// first row is the header: "Cores", then "Cores per Die" on multi-die parts,
/// then one column per ISA that reports frequencies. Each following row is
/// one active-core bucket with per-ISA GHz values.
pub fn spec_frequency_buckets(outputs: &ScriptOutputs) -> Result<Vec<Vec<String>>, DomainError> {
    let uarch = uarch_from_output(outputs);
    if uarch.is_empty() {
        return Err(DomainError::ParsingFailed(
            "microarchitecture is required to decode frequency buckets".to_string(),
        ));
    }
    let out = stdout_of(outputs, scripts::SPEC_CORE_FREQUENCIES);
    if out.is_empty() {
        return Err(DomainError::ParsingFailed(
            "no core frequencies found".to_string(),
        ));
    }
    let mut lines = out.lines();
    let field_names: Vec<&str> = lines.next().unwrap_or("").split_whitespace().collect();
    let values: Vec<&str> = lines.next().unwrap_or("").split_whitespace().collect();
    if field_names.len() < 2 || values.len() != field_names.len() {
        return Err(DomainError::ParsingFailed(
            "unexpected core frequencies output format".to_string(),
        ));
    }
    let bucket_core_counts = bucket_sizes_from_hex(values[0])?;
    // compute dies per package; bucket bounds are per die
    let arch_multiplier: u64 = if uarch.contains(UARCH_SRF) || uarch.contains(UARCH_CWF) {
        4
    } else if uarch.contains(UARCH_GNR_X3) {
        3
    } else if uarch.contains(UARCH_GNR_X2) {
        2
    } else {
        1
    };
    let mut total_core_buckets = Vec::new();
    let mut die_core_buckets = Vec::new();
    let mut total_core_start = 1u64;
    let mut start = 1u64;
    for &count in &bucket_core_counts {
        if start > count {
            break;
        }
        if arch_multiplier > 1 {
            let total = count * arch_multiplier;
            if total_core_start > total {
                break;
            }
            total_core_buckets.push(format!("{total_core_start}-{total}"));
            total_core_start = total + 1;
        }
        die_core_buckets.push(format!("{start}-{count}"));
        start = count + 1;
    }
    // frequencies per ISA; a literal "0" marks an unsupported ISA
    let mut all_isa_freqs: Vec<Vec<String>> = Vec::new();
    for isa_hex in &values[1..] {
        let freqs = if *isa_hex != "0" {
            let freqs = frequencies_from_hex(isa_hex)?;
            if freqs.len() != bucket_core_counts.len() {
                pad_frequencies(freqs, bucket_core_counts.len())?
            } else {
                freqs
            }
        } else {
            vec![0; bucket_core_counts.len()]
        };
        all_isa_freqs.push(
            freqs
                .iter()
                .map(|&f| format!("{:.1}", f as f64 / 10.0))
                .collect(),
        );
    }
    // header row, skipping unsupported ISAs
    let mut rows: Vec<Vec<String>> = Vec::with_capacity(die_core_buckets.len() + 1);
    let mut header = vec!["Cores".to_string()];
    if arch_multiplier > 1 {
        header.push("Cores per Die".to_string());
    }
    for (i, isa_freqs) in all_isa_freqs.iter().enumerate() {
        if isa_freqs[0] == "0.0" {
            continue;
        }
        header.push(field_names[i + 1].to_uppercase());
    }
    rows.push(header);
    for (i, bucket) in die_core_buckets.iter().enumerate() {
        let mut row = Vec::with_capacity(all_isa_freqs.len() + 2);
        if arch_multiplier > 1 {
            row.push(total_core_buckets[i].clone());
        }
        row.push(bucket.clone());
        for isa_freqs in &all_isa_freqs {
            if isa_freqs[0] == "0.0" {
                continue;
            }
            let freq = isa_freqs.get(i).ok_or_else(|| {
                DomainError::ParsingFailed("frequency bucket index out of range".to_string())
            })?;
            row.push(freq.clone());
        }
        rows.push(row);
    }
    Ok(rows)
}

fn sse_freqs_from_buckets(buckets: &[Vec<String>]) -> Vec<String> {
    if buckets.len() < 2 {
        return Vec::new();
    }
    let sse_column = match buckets[0].iter().position(|col| col.to_uppercase() == "SSE") {
        Some(i) => i,
        None => return Vec::new(),
    };
    buckets[1..]
        .iter()
        .filter_map(|row| row.get(sse_column).cloned())
        .collect()
}

/// Maximum single-core frequency: the first SSE bucket, falling back to
/// the cpufreq sysfs limit on parts without readable bucket MSRs
pub fn max_frequency_from_output(outputs: &ScriptOutputs) -> String {
    if let Ok(buckets) = spec_frequency_buckets(outputs) {
        let sse = sse_freqs_from_buckets(&buckets);
        if let Some(first) = sse.first() {
            return format!("{first}GHz");
        }
    }
    sysfs_max_frequency_from_output(outputs)
}

/// All-core maximum frequency: the last SSE bucket
pub fn all_core_max_frequency_from_output(outputs: &ScriptOutputs) -> String {
    if let Ok(buckets) = spec_frequency_buckets(outputs) {
        let sse = sse_freqs_from_buckets(&buckets);
        if let Some(last) = sse.last() {
            return format!("{last}GHz");
        }
    }
    String::new()
}

/// Maximum frequency from the cpufreq sysfs limit (kHz)
pub fn sysfs_max_frequency_from_output(outputs: &ScriptOutputs) -> String {
    let khz = stdout_of(outputs, scripts::MAXIMUM_FREQUENCY).trim();
    match khz.parse::<f64>() {
        Ok(khz) if khz > 0.0 => format!("{:.1}GHz", khz / 1_000_000.0),
        _ => String::new(),
    }
}

fn uncore_msr_frequency(outputs: &ScriptOutputs, script_name: &str) -> String {
    let hex = stdout_of(outputs, script_name).trim();
    if hex.is_empty() || hex == "0" {
        warn!("no uncore frequency in MSR output");
        return String::new();
    }
    match i64::from_str_radix(hex, 16) {
        Ok(ratio) => format!("{:.1}GHz", ratio as f64 / 10.0),
        Err(err) => {
            error!("failed to parse uncore frequency '{hex}': {err}");
            String::new()
        }
    }
}

/// Maximum uncore frequency from the uncore ratio limit MSR
pub fn uncore_max_frequency_from_output(outputs: &ScriptOutputs) -> String {
    uncore_msr_frequency(outputs, scripts::UNCORE_MAX_FROM_MSR)
}

/// Minimum uncore frequency from the uncore ratio limit MSR
pub fn uncore_min_frequency_from_output(outputs: &ScriptOutputs) -> String {
    uncore_msr_frequency(outputs, scripts::UNCORE_MIN_FROM_MSR)
}

/// Uncore min/max frequency for the first compute or I/O die found in the
/// TPMI die-type listing (die type value 0 is compute, 1 is I/O)
pub fn uncore_die_frequency_from_output(
    max_freq: bool,
    compute_die: bool,
    outputs: &ScriptOutputs,
) -> String {
    let want = if compute_die { "0" } else { "1" };
    let die_types = stdout_of(outputs, scripts::UNCORE_DIE_TYPES_FROM_TPMI);
    let (entry, instance) = match die_types.lines().find_map(|line| {
        TPMI_READ.captures(line).and_then(|caps| {
            if &caps[1] == want {
                Some((caps[2].to_string(), caps[3].to_string()))
            } else {
                None
            }
        })
    }) {
        Some(found) => found,
        None => {
            warn!("failed to find uncore die type in TPMI output");
            return String::new();
        }
    };
    let script_name = if max_freq {
        scripts::UNCORE_MAX_FROM_TPMI
    } else {
        scripts::UNCORE_MIN_FROM_TPMI
    };
    for line in stdout_of(outputs, script_name).lines() {
        if let Some(caps) = TPMI_READ.captures(line) {
            if caps[2] == entry && caps[3] == instance {
                return match caps[1].parse::<i64>() {
                    Ok(ratio) => format!("{:.1}GHz", ratio as f64 / 10.0),
                    Err(err) => {
                        error!("failed to parse uncore frequency: {err}");
                        String::new()
                    }
                };
            }
        }
    }
    error!("failed to find uncore frequency in TPMI output");
    String::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ScriptOutput;

    fn outputs_with(pairs: &[(&str, &str)]) -> ScriptOutputs {
        pairs
            .iter()
            .map(|(name, stdout)| {
                (
                    name.to_string(),
                    ScriptOutput {
                        stdout: stdout.to_string(),
                        stderr: String::new(),
                        exit_code: Some(0),
                    },
                )
            })
            .collect()
    }

    const LSCPU_ICX: &str = "\
Architecture:            x86_64
Vendor ID:               GenuineIntel
CPU family:              6
Model:                   106
Stepping:                6
";

    #[test]
    fn test_spec_frequency_buckets_icx() {
        // buckets of 4/8/12/16/20/24/28/32 cores; SSE ratios 35/34/33/32/31/30/29/28
        let freqs = "cores sse avx2 avx512 avx512h amx\n\
                     201c1814100c0804 1c1d1e1f20212223 0 0 0 0\n";
        let outputs = outputs_with(&[
            (scripts::LSCPU, LSCPU_ICX),
            (scripts::SPEC_CORE_FREQUENCIES, freqs),
        ]);
        let buckets = spec_frequency_buckets(&outputs).unwrap();
        assert_eq!(buckets[0], vec!["Cores", "SSE"]);
        assert_eq!(buckets[1], vec!["1-4", "3.5"]);
        assert_eq!(buckets[2], vec!["5-8", "3.4"]);
        assert_eq!(buckets.last().unwrap(), &vec!["29-32", "2.8"]);
    }

    #[test]
    fn test_spec_frequency_buckets_skips_unsupported_isas() {
        let freqs = "cores sse avx2 avx512 avx512h amx\n\
                     2010 20212223 1e1f2021 0 0 0\n";
        let outputs = outputs_with(&[
            (scripts::LSCPU, LSCPU_ICX),
            (scripts::SPEC_CORE_FREQUENCIES, freqs),
        ]);
        // bucket sizes must decode to exactly 8 bytes
        assert!(spec_frequency_buckets(&outputs).is_err());
    }

    #[test]
    fn test_spec_frequency_buckets_multi_die() {
        // SRF: 4 compute dies, per-die buckets are scaled to total cores
        let lscpu_srf = "\
Architecture:            x86_64
Vendor ID:               GenuineIntel
CPU family:              6
Model:                   175
Stepping:                0
";
        let freqs = "cores sse avx2 avx512 avx512h amx\n\
                     3024181614121008 1c1c1d1d1e1e1f20 0 0 0 0\n";
        let outputs = outputs_with(&[
            (scripts::LSCPU, lscpu_srf),
            (scripts::SPEC_CORE_FREQUENCIES, freqs),
        ]);
        let buckets = spec_frequency_buckets(&outputs).unwrap();
        assert_eq!(buckets[0], vec!["Cores", "Cores per Die", "SSE"]);
        // first bucket covers 8 cores per die, 32 total across 4 dies
        assert_eq!(buckets[1][0], "1-32");
        assert_eq!(buckets[1][1], "1-8");
        assert_eq!(buckets[1][2], "3.2");
    }

    #[test]
    fn test_max_and_all_core_frequency() {
        let freqs = "cores sse avx2 avx512 avx512h amx\n\
                     201c1814100c0804 1c1d1e1f20212223 0 0 0 0\n";
        let outputs = outputs_with(&[
            (scripts::LSCPU, LSCPU_ICX),
            (scripts::SPEC_CORE_FREQUENCIES, freqs),
        ]);
        assert_eq!(max_frequency_from_output(&outputs), "3.5GHz");
        assert_eq!(all_core_max_frequency_from_output(&outputs), "2.8GHz");
    }

    #[test]
    fn test_max_frequency_sysfs_fallback() {
        // no bucket MSR output, cpufreq sysfs limit in kHz
        let outputs = outputs_with(&[(scripts::MAXIMUM_FREQUENCY, "3500000\n")]);
        assert_eq!(max_frequency_from_output(&outputs), "3.5GHz");
        assert_eq!(sysfs_max_frequency_from_output(&ScriptOutputs::new()), "");
    }

    #[test]
    fn test_uncore_msr_frequency() {
        let outputs = outputs_with(&[
            (scripts::UNCORE_MAX_FROM_MSR, "18\n"),
            (scripts::UNCORE_MIN_FROM_MSR, "8\n"),
        ]);
        assert_eq!(uncore_max_frequency_from_output(&outputs), "2.4GHz");
        assert_eq!(uncore_min_frequency_from_output(&outputs), "0.8GHz");
    }

    #[test]
    fn test_uncore_msr_frequency_missing() {
        let outputs = ScriptOutputs::new();
        assert_eq!(uncore_max_frequency_from_output(&outputs), "");
    }

    #[test]
    fn test_uncore_die_frequency_from_tpmi() {
        let die_types = "\
Read bits 26:26 value 0 from TPMI ID 2 at offset 0x10 for entry 0 in instance 0
Read bits 26:26 value 1 from TPMI ID 2 at offset 0x10 for entry 1 in instance 0
";
        let max = "\
Read bits 8:14 value 25 from TPMI ID 2 at offset 0x18 for entry 0 in instance 0
Read bits 8:14 value 11 from TPMI ID 2 at offset 0x18 for entry 1 in instance 0
";
        let outputs = outputs_with(&[
            (scripts::UNCORE_DIE_TYPES_FROM_TPMI, die_types),
            (scripts::UNCORE_MAX_FROM_TPMI, max),
        ]);
        assert_eq!(uncore_die_frequency_from_output(true, true, &outputs), "2.5GHz");
        assert_eq!(uncore_die_frequency_from_output(true, false, &outputs), "1.1GHz");
    }
}

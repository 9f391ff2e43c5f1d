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

//! L3 cache size accounting
//!
//! lscpu always reports the maximum possible cache size. The L3 way-enable
//! MSR shows how many ways are actually enabled, so the effective size is
//! derived from the enabled-way count times the per-way size when the MSR is
//! readable, falling back to lscpu.

use crate::domain::parsers::cpu::{
    cores_per_socket_from_output, cpu_characteristics, sockets_from_output,
    virtualization_from_output,
};
use crate::domain::{scripts, stdout_of, DomainError, ScriptOutputs};
use lazy_static::lazy_static;
use log::{debug, error, info};
use regex::Regex;
use std::collections::HashMap;

lazy_static! {
    static ref CACHE_SIZE: Regex = Regex::new(r"^([0-9.]+)([KMG])B?$").unwrap();
}

/// One row of `lscpu -C` output
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LscpuCacheEntry {
    pub name: String,
    pub one_size: String,
    pub all_size: String,
    pub ways: String,
    pub cache_type: String,
    pub level: String,
}

/// Parses the tabular `lscpu -C` output into a map keyed by cache name
/// (L1d, L1i, L2, L3). Column positions come from the header line.
pub fn parse_lscpu_cache(output: &str) -> Result<HashMap<String, LscpuCacheEntry>, DomainError> {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        return Err(DomainError::ParsingFailed(
            "lscpu cache output is empty".to_string(),
        ));
    }
    let mut lines = trimmed.lines();
    let header: Vec<String> = lines
        .next()
        .unwrap_or("")
        .split_whitespace()
        .map(|h| h.to_lowercase())
        .collect();
    if header.first().map(String::as_str) != Some("name") {
        return Err(DomainError::ParsingFailed(
            "invalid lscpu cache header".to_string(),
        ));
    }
    let idx: HashMap<&str, usize> = header
        .iter()
        .enumerate()
        .map(|(i, h)| (h.as_str(), i))
        .collect();
    let col = |cols: &[&str], name: &str| -> String {
        idx.get(name)
            .and_then(|&i| cols.get(i))
            .map(|c| c.to_string())
            .unwrap_or_default()
    };
    let mut entries = HashMap::new();
    for line in lines {
        let cols: Vec<&str> = line.split_whitespace().collect();
        if cols.len() < 4 {
            continue;
        }
        let entry = LscpuCacheEntry {
            name: col(&cols, "name"),
            one_size: col(&cols, "one-size"),
            all_size: col(&cols, "all-size"),
            ways: col(&cols, "ways"),
            cache_type: col(&cols, "type"),
            level: col(&cols, "level"),
        };
        if entry.name.is_empty() {
            continue;
        }
        entries.insert(entry.name.clone(), entry);
    }
    if entries.is_empty() {
        return Err(DomainError::ParsingFailed(
            "no cache entries in lscpu cache output".to_string(),
        ));
    }
    Ok(entries)
}

/// Converts a cache size string like "32K", "2M", or "1.5G" to megabytes
pub fn cache_size_to_mb(size: &str) -> Result<f64, DomainError> {
    let normalized = size.trim().to_uppercase();
    let caps = CACHE_SIZE
        .captures(normalized.as_str())
        .ok_or_else(|| DomainError::ParsingFailed(format!("invalid cache size '{size}'")))?;
    let value: f64 = caps[1]
        .parse()
        .map_err(|_| DomainError::ParsingFailed(format!("invalid cache size '{size}'")))?;
    let multiplier = match &caps[2] {
        "K" => 1.0 / 1024.0,
        "M" => 1.0,
        _ => 1024.0,
    };
    Ok(value * multiplier)
}

/// (per-instance, total) L3 size in MB as reported by lscpu
pub fn l3_lscpu_mb(outputs: &ScriptOutputs) -> Result<(f64, f64), DomainError> {
    let caches = parse_lscpu_cache(stdout_of(outputs, scripts::LSCPU_CACHE))?;
    let l3 = caches
        .get("L3")
        .ok_or_else(|| DomainError::ParsingFailed("L3 entry not found in lscpu cache".to_string()))?;
    Ok((cache_size_to_mb(&l3.one_size)?, cache_size_to_mb(&l3.all_size)?))
}

/// (per-instance, total) effective L3 size in MB from the way-enable MSR.
/// Each set bit in the MSR is one enabled way; the per-way size is the lscpu
/// maximum divided by the part's way count.
pub fn l3_msr_mb(outputs: &ScriptOutputs) -> Result<(f64, f64), DomainError> {
    let cpu = cpu_characteristics(outputs).ok_or_else(|| {
        DomainError::ParsingFailed("CPU characteristics unavailable".to_string())
    })?;
    if cpu.cache_ways == 0 {
        return Err(DomainError::ParsingFailed(
            "L3 cache way count is zero".to_string(),
        ));
    }
    let num_sockets: u64 = sockets_from_output(outputs)
        .parse()
        .map_err(|_| DomainError::ParsingFailed("failed to parse sockets from lscpu".to_string()))?;
    if num_sockets == 0 {
        return Err(DomainError::ParsingFailed("socket count is zero".to_string()));
    }
    let (l3_maximum_mb, _) = l3_lscpu_mb(outputs)?;
    let msr_hex = stdout_of(outputs, scripts::L3_WAY_SIZE).trim();
    if msr_hex.is_empty() {
        return Err(DomainError::ParsingFailed(
            "L3 way enable MSR value is empty".to_string(),
        ));
    }
    let way_mask = u64::from_str_radix(msr_hex, 16).map_err(|e| {
        DomainError::ParsingFailed(format!("failed to parse L3 way enable MSR '{msr_hex}': {e}"))
    })?;
    let ways_enabled = way_mask.count_ones() as f64;
    if ways_enabled == 0.0 {
        return Err(DomainError::ParsingFailed(format!(
            "zero cache ways enabled: {msr_hex}"
        )));
    }
    let gb_per_way = (l3_maximum_mb / 1024.0) / f64::from(cpu.cache_ways);
    let instance_mb = ways_enabled * gb_per_way * 1024.0;
    Ok((instance_mb, instance_mb * num_sockets as f64))
}

/// L3 size rendered as "instance/total", preferring the MSR-derived value
pub fn l3_from_output(outputs: &ScriptOutputs) -> String {
    let (instance_mb, total_mb) = match l3_msr_mb(outputs) {
        Ok(sizes) => sizes,
        Err(err) => {
            info!("could not get L3 size from MSR, falling back to lscpu: {err}");
            match l3_lscpu_mb(outputs) {
                Ok(sizes) => sizes,
                Err(err) => {
                    error!("could not get L3 size from lscpu: {err}");
                    return String::new();
                }
            }
        }
    };
    format!(
        "{}/{}",
        format_cache_size_mb(instance_mb),
        format_cache_size_mb(total_mb)
    )
}

/// L3 cache per physical core; not meaningful on fully virtualized hosts
pub fn l3_per_core_from_output(outputs: &ScriptOutputs) -> String {
    if virtualization_from_output(outputs) == "full" {
        info!("cannot calculate L3 per core on virtualized host");
        return String::new();
    }
    let cores_per_socket: u64 = match cores_per_socket_from_output(outputs).parse() {
        Ok(n) if n > 0 => n,
        _ => {
            error!("failed to parse cores per socket from lscpu");
            return String::new();
        }
    };
    let sockets: u64 = match sockets_from_output(outputs).parse() {
        Ok(n) if n > 0 => n,
        _ => {
            error!("failed to parse sockets from lscpu");
            return String::new();
        }
    };
    let total_mb = match l3_msr_mb(outputs) {
        Ok((_, total)) => total,
        Err(err) => {
            debug!("could not get L3 size from MSR, falling back to lscpu: {err}");
            match l3_lscpu_mb(outputs) {
                Ok((_, total)) => total,
                Err(err) => {
                    error!("could not get L3 size from lscpu: {err}");
                    return String::new();
                }
            }
        }
    };
    format_cache_size_mb(total_mb / (cores_per_socket as f64 * sockets as f64))
}

/// L1/L2 per-instance size straight from the lscpu cache table
pub fn cache_one_size_from_output(outputs: &ScriptOutputs, name: &str) -> String {
    match parse_lscpu_cache(stdout_of(outputs, scripts::LSCPU_CACHE)) {
        Ok(caches) => caches
            .get(name)
            .map(|c| c.one_size.clone())
            .unwrap_or_default(),
        Err(_) => String::new(),
    }
}

/// Formats a size in MB as a compact string with an "M" suffix, e.g.,
/// 105.0 -> "105M", 1.875 -> "1.875M"
pub fn format_cache_size_mb(size_mb: f64) -> String {
    let mut val = format!("{size_mb:.3}");
    while val.ends_with('0') {
        val.pop();
    }
    if val.ends_with('.') {
        val.pop();
    }
    format!("{val}M")
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

    const LSCPU_CACHE_SAMPLE: &str = "\
NAME ONE-SIZE ALL-SIZE WAYS TYPE        LEVEL   SETS PHY-LINE COHERENCY-SIZE
L1d       48K     3M     12 Data            1     64        1             64
L1i       32K     2M      8 Instruction     1     64        1             64
L2      1.25M    80M     20 Unified         2   2048        1             64
L3        48M    96M     12 Unified         3  49152        1             64
";

    const LSCPU_ICX_2S: &str = "\
Architecture:            x86_64
Core(s) per socket:      32
Socket(s):               2
Vendor ID:               GenuineIntel
CPU family:              6
Model:                   106
Stepping:                6
";

    #[test]
    fn test_parse_lscpu_cache() {
        let caches = parse_lscpu_cache(LSCPU_CACHE_SAMPLE).unwrap();
        assert_eq!(caches.len(), 4);
        assert_eq!(caches["L3"].one_size, "48M");
        assert_eq!(caches["L3"].all_size, "96M");
        assert_eq!(caches["L1d"].cache_type, "Data");
        assert_eq!(caches["L2"].ways, "20");
    }

    #[test]
    fn test_parse_lscpu_cache_rejects_garbage() {
        assert!(parse_lscpu_cache("").is_err());
        assert!(parse_lscpu_cache("not a header\nL3 1M").is_err());
    }

    #[test]
    fn test_cache_size_to_mb() {
        assert_eq!(cache_size_to_mb("48M").unwrap(), 48.0);
        assert_eq!(cache_size_to_mb("512K").unwrap(), 0.5);
        assert_eq!(cache_size_to_mb("2G").unwrap(), 2048.0);
        assert!(cache_size_to_mb("fast").is_err());
    }

    #[test]
    fn test_l3_from_lscpu_fallback() {
        // no MSR output present, falls back to the lscpu cache table
        let outputs = outputs_with(&[
            (scripts::LSCPU, LSCPU_ICX_2S),
            (scripts::LSCPU_CACHE, LSCPU_CACHE_SAMPLE),
        ]);
        assert_eq!(l3_from_output(&outputs), "48M/96M");
    }

    #[test]
    fn test_l3_from_msr_with_disabled_ways() {
        // ICX has 12 ways; 0x3f = 6 enabled -> half of the 48M instance size
        let outputs = outputs_with(&[
            (scripts::LSCPU, LSCPU_ICX_2S),
            (scripts::LSCPU_CACHE, LSCPU_CACHE_SAMPLE),
            (scripts::L3_WAY_SIZE, "3f\n"),
        ]);
        assert_eq!(l3_from_output(&outputs), "24M/48M");
    }

    #[test]
    fn test_l3_per_core() {
        let outputs = outputs_with(&[
            (scripts::LSCPU, LSCPU_ICX_2S),
            (scripts::LSCPU_CACHE, LSCPU_CACHE_SAMPLE),
        ]);
        // 96M total over 64 cores
        assert_eq!(l3_per_core_from_output(&outputs), "1.5M");
    }

    #[test]
    fn test_l3_per_core_virtualized() {
        let lscpu = format!("{LSCPU_ICX_2S}Virtualization type:     full\n");
        let outputs = outputs_with(&[
            (scripts::LSCPU, &lscpu),
            (scripts::LSCPU_CACHE, LSCPU_CACHE_SAMPLE),
        ]);
        assert_eq!(l3_per_core_from_output(&outputs), "");
    }

    #[test]
    fn test_format_cache_size_mb() {
        assert_eq!(format_cache_size_mb(105.0), "105M");
        assert_eq!(format_cache_size_mb(1.875), "1.875M");
        assert_eq!(format_cache_size_mb(0.5), "0.5M");
    }
}

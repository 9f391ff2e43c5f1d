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

//! CPU microarchitecture identification tables
//!
//! Maps (family, model, stepping) plus auxiliary PCI data to a
//! microarchitecture name, and microarchitecture names to per-part
//! characteristics (memory channels, SMT width, L3 way count). Supports
//! x86 (lscpu identification) and ARM (/proc/cpuinfo implementer/part).

use crate::domain::DomainError;
use regex::Regex;

pub const INTEL_VENDOR: &str = "GenuineIntel";
pub const AMD_VENDOR: &str = "AuthenticAMD";

pub const X86_ARCHITECTURE: &str = "x86_64";
pub const ARM_ARCHITECTURE: &str = "aarch64";

const INTEL_FAMILIES: &[&str] = &["6", "19"];

// Intel Xeon microarchitectures
pub const UARCH_HSX: &str = "HSX";
pub const UARCH_BDX: &str = "BDX";
pub const UARCH_SKX: &str = "SKX";
pub const UARCH_CLX: &str = "CLX";
pub const UARCH_CPX: &str = "CPX";
pub const UARCH_ICX: &str = "ICX";
pub const UARCH_SPR: &str = "SPR";
pub const UARCH_SPR_MCC: &str = "SPR_MCC";
pub const UARCH_SPR_XCC: &str = "SPR_XCC";
pub const UARCH_EMR: &str = "EMR";
pub const UARCH_EMR_MCC: &str = "EMR_MCC";
pub const UARCH_EMR_XCC: &str = "EMR_XCC";
pub const UARCH_SRF: &str = "SRF";
pub const UARCH_SRF_SP: &str = "SRF_SP";
pub const UARCH_SRF_AP: &str = "SRF_AP";
pub const UARCH_GNR: &str = "GNR";
pub const UARCH_GNR_X1: &str = "GNR_X1";
pub const UARCH_GNR_X2: &str = "GNR_X2";
pub const UARCH_GNR_X3: &str = "GNR_X3";
pub const UARCH_GNR_D: &str = "GNR-D";
pub const UARCH_CWF: &str = "CWF";
pub const UARCH_DMR: &str = "DMR";
// AMD microarchitectures
pub const UARCH_NAPLES: &str = "Naples";
pub const UARCH_ROME: &str = "Rome";
pub const UARCH_MILAN: &str = "Milan";
pub const UARCH_GENOA: &str = "Genoa";
pub const UARCH_BERGAMO: &str = "Bergamo";
pub const UARCH_TURIN_ZEN5: &str = "Turin (Zen 5)";
pub const UARCH_TURIN_ZEN5C: &str = "Turin (Zen 5c)";
// ARM microarchitectures
pub const UARCH_GRAVITON2: &str = "Graviton2";
pub const UARCH_GRAVITON3: &str = "Graviton3";
pub const UARCH_GRAVITON4: &str = "Graviton4";
pub const UARCH_AXION: &str = "Axion";
pub const UARCH_ALTRA: &str = "Altra Family";
pub const UARCH_AMPEREONE_AC03: &str = "AmpereOne AC03";
pub const UARCH_AMPEREONE_AC04: &str = "AmpereOne AC04";
pub const UARCH_AMPEREONE_AC04_1: &str = "AmpereOne AC04_1";

/// Per-microarchitecture characteristics used by derivations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuCharacteristics {
    pub uarch: &'static str,
    /// Memory channels per socket (0 when variant-dependent)
    pub memory_channels: u32,
    /// Logical threads per core the part supports
    pub logical_threads_per_core: u32,
    /// L3 cache way count (0 when unknown/not applicable)
    pub cache_ways: u32,
}

/// x86 identification gathered from lscpu and lspci
#[derive(Debug, Clone, Default)]
pub struct X86Identifier {
    pub family: String,
    pub model: String,
    pub stepping: String,
    /// capid4 register bytes from lspci, used to differentiate SPR/EMR die variants
    pub capid4: String,
    /// Matching PCI device count, used to differentiate GNR/SRF die variants
    pub devices: String,
}

/// ARM identification gathered from /proc/cpuinfo and dmidecode
#[derive(Debug, Clone, Default)]
pub struct ArmIdentifier {
    pub implementer: String,
    pub part: String,
    /// Processor part number from dmidecode
    pub dmidecode_part: String,
}

const CHARACTERISTICS: &[CpuCharacteristics] = &[
    // Intel Xeon
    CpuCharacteristics { uarch: UARCH_HSX, memory_channels: 4, logical_threads_per_core: 2, cache_ways: 20 },
    CpuCharacteristics { uarch: UARCH_BDX, memory_channels: 4, logical_threads_per_core: 2, cache_ways: 20 },
    CpuCharacteristics { uarch: UARCH_SKX, memory_channels: 6, logical_threads_per_core: 2, cache_ways: 11 },
    CpuCharacteristics { uarch: UARCH_CLX, memory_channels: 6, logical_threads_per_core: 2, cache_ways: 11 },
    CpuCharacteristics { uarch: UARCH_CPX, memory_channels: 6, logical_threads_per_core: 2, cache_ways: 11 },
    CpuCharacteristics { uarch: UARCH_ICX, memory_channels: 8, logical_threads_per_core: 2, cache_ways: 12 },
    CpuCharacteristics { uarch: UARCH_SPR, memory_channels: 8, logical_threads_per_core: 2, cache_ways: 15 },
    CpuCharacteristics { uarch: UARCH_SPR_MCC, memory_channels: 8, logical_threads_per_core: 2, cache_ways: 15 },
    CpuCharacteristics { uarch: UARCH_SPR_XCC, memory_channels: 8, logical_threads_per_core: 2, cache_ways: 15 },
    CpuCharacteristics { uarch: UARCH_EMR, memory_channels: 8, logical_threads_per_core: 2, cache_ways: 15 },
    CpuCharacteristics { uarch: UARCH_EMR_MCC, memory_channels: 8, logical_threads_per_core: 2, cache_ways: 15 },
    CpuCharacteristics { uarch: UARCH_EMR_XCC, memory_channels: 8, logical_threads_per_core: 2, cache_ways: 20 },
    CpuCharacteristics { uarch: UARCH_SRF, memory_channels: 0, logical_threads_per_core: 1, cache_ways: 12 },
    CpuCharacteristics { uarch: UARCH_SRF_SP, memory_channels: 8, logical_threads_per_core: 1, cache_ways: 12 },
    CpuCharacteristics { uarch: UARCH_SRF_AP, memory_channels: 12, logical_threads_per_core: 1, cache_ways: 12 },
    CpuCharacteristics { uarch: UARCH_GNR, memory_channels: 0, logical_threads_per_core: 2, cache_ways: 16 },
    CpuCharacteristics { uarch: UARCH_GNR_X1, memory_channels: 8, logical_threads_per_core: 2, cache_ways: 16 },
    CpuCharacteristics { uarch: UARCH_GNR_X2, memory_channels: 8, logical_threads_per_core: 2, cache_ways: 16 },
    CpuCharacteristics { uarch: UARCH_GNR_X3, memory_channels: 12, logical_threads_per_core: 2, cache_ways: 16 },
    CpuCharacteristics { uarch: UARCH_GNR_D, memory_channels: 8, logical_threads_per_core: 2, cache_ways: 16 },
    CpuCharacteristics { uarch: UARCH_CWF, memory_channels: 12, logical_threads_per_core: 1, cache_ways: 0 },
    CpuCharacteristics { uarch: UARCH_DMR, memory_channels: 16, logical_threads_per_core: 1, cache_ways: 0 },
    // AMD
    CpuCharacteristics { uarch: UARCH_NAPLES, memory_channels: 8, logical_threads_per_core: 2, cache_ways: 0 },
    CpuCharacteristics { uarch: UARCH_ROME, memory_channels: 8, logical_threads_per_core: 2, cache_ways: 0 },
    CpuCharacteristics { uarch: UARCH_MILAN, memory_channels: 8, logical_threads_per_core: 2, cache_ways: 0 },
    CpuCharacteristics { uarch: UARCH_GENOA, memory_channels: 12, logical_threads_per_core: 2, cache_ways: 0 },
    CpuCharacteristics { uarch: UARCH_BERGAMO, memory_channels: 12, logical_threads_per_core: 2, cache_ways: 0 },
    CpuCharacteristics { uarch: UARCH_TURIN_ZEN5, memory_channels: 12, logical_threads_per_core: 2, cache_ways: 0 },
    CpuCharacteristics { uarch: UARCH_TURIN_ZEN5C, memory_channels: 12, logical_threads_per_core: 2, cache_ways: 0 },
    // ARM
    CpuCharacteristics { uarch: UARCH_GRAVITON2, memory_channels: 8, logical_threads_per_core: 1, cache_ways: 0 },
    CpuCharacteristics { uarch: UARCH_GRAVITON3, memory_channels: 8, logical_threads_per_core: 1, cache_ways: 0 },
    CpuCharacteristics { uarch: UARCH_GRAVITON4, memory_channels: 12, logical_threads_per_core: 1, cache_ways: 0 },
    CpuCharacteristics { uarch: UARCH_AXION, memory_channels: 12, logical_threads_per_core: 1, cache_ways: 0 },
    CpuCharacteristics { uarch: UARCH_ALTRA, memory_channels: 8, logical_threads_per_core: 1, cache_ways: 0 },
    CpuCharacteristics { uarch: UARCH_AMPEREONE_AC03, memory_channels: 8, logical_threads_per_core: 1, cache_ways: 0 },
    CpuCharacteristics { uarch: UARCH_AMPEREONE_AC04, memory_channels: 8, logical_threads_per_core: 1, cache_ways: 0 },
    CpuCharacteristics { uarch: UARCH_AMPEREONE_AC04_1, memory_channels: 12, logical_threads_per_core: 1, cache_ways: 0 },
];

/// x86 identification rows: family, model regex, stepping regex (empty = any)
const X86_IDENTIFIERS: &[(&str, &str, &str, &str)] = &[
    // Intel Xeon
    ("6", "63", "", UARCH_HSX),
    ("6", "(79|86)", "", UARCH_BDX),
    ("6", "85", "(0|1|2|3|4)", UARCH_SKX),
    ("6", "85", "(5|6|7)", UARCH_CLX),
    ("6", "85", "11", UARCH_CPX),
    ("6", "(106|108)", "", UARCH_ICX),
    ("6", "143", "", UARCH_SPR),
    ("6", "207", "", UARCH_EMR),
    ("6", "175", "", UARCH_SRF),
    ("6", "173", "", UARCH_GNR),
    ("6", "174", "", UARCH_GNR_D),
    ("6", "221", "", UARCH_CWF),
    ("19", "1", "", UARCH_DMR),
    // AMD
    ("23", "1", "", UARCH_NAPLES),
    ("23", "49", "", UARCH_ROME),
    ("25", "1", "", UARCH_MILAN),
    ("25", "(1[6-9]|2[0-9]|3[01])", "", UARCH_GENOA),
    ("25", "(16[0-9]|17[0-5])", "", UARCH_BERGAMO),
    ("26", "2", "", UARCH_TURIN_ZEN5),
    ("26", "17", "", UARCH_TURIN_ZEN5C),
];

/// ARM identification rows: implementer, part, dmidecode part (empty = any)
const ARM_IDENTIFIERS: &[(&str, &str, &str, &str)] = &[
    ("0x41", "0xd0c", "AWS Graviton2", UARCH_GRAVITON2),
    ("0x41", "0xd40", "AWS Graviton3", UARCH_GRAVITON3),
    ("0x41", "0xd4f", "AWS Graviton4", UARCH_GRAVITON4),
    ("0x41", "0xd4f", "Not Specified", UARCH_AXION),
    ("0x41", "0xd0c", "Not Specified", UARCH_ALTRA),
    ("0xc0", "0xac3", "", UARCH_AMPEREONE_AC03),
    ("0xc0", "0xac4", "X", UARCH_AMPEREONE_AC04),
    ("0xc0", "0xac4", "M", UARCH_AMPEREONE_AC04_1),
];

/// Look up CPU characteristics by microarchitecture name (case-insensitive)
pub fn cpu_by_uarch(uarch: &str) -> Result<CpuCharacteristics, DomainError> {
    CHARACTERISTICS
        .iter()
        .find(|c| c.uarch.eq_ignore_ascii_case(uarch))
        .copied()
        .ok_or_else(|| DomainError::ParsingFailed(format!("CPU match not found for uarch {uarch}")))
}

/// Whether the lscpu CPU family string corresponds to Intel CPUs
pub fn is_intel_family(family: &str) -> bool {
    INTEL_FAMILIES.contains(&family)
}

/// Identify an x86 CPU from lscpu family/model/stepping plus auxiliary PCI
/// data. capid4 differentiates SPR/EMR MCC from XCC; the PCI device count
/// differentiates GNR and SRF die variants.
pub fn cpu_from_x86(id: &X86Identifier) -> Result<CpuCharacteristics, DomainError> {
    for (family, model_pat, stepping_pat, uarch) in X86_IDENTIFIERS {
        if *family != id.family {
            continue;
        }
        let model_re = Regex::new(&format!("^(?:{model_pat})$"))
            .map_err(|e| DomainError::ParsingFailed(format!("bad model pattern: {e}")))?;
        if !model_re.is_match(&id.model) {
            continue;
        }
        if !stepping_pat.is_empty() {
            let stepping_re = Regex::new(stepping_pat)
                .map_err(|e| DomainError::ParsingFailed(format!("bad stepping pattern: {e}")))?;
            if !stepping_re.is_match(&id.stepping) {
                continue;
            }
        }
        let uarch = refine_uarch(&id.family, &id.model, &id.capid4, &id.devices, uarch)?;
        return cpu_by_uarch(&uarch);
    }
    Err(DomainError::ParsingFailed(format!(
        "CPU match not found for family {}, model {}, stepping {}",
        id.family, id.model, id.stepping
    )))
}

/// Identify an ARM CPU from /proc/cpuinfo implementer/part and the
/// dmidecode processor part number. Empty fields in the table match anything.
pub fn cpu_from_arm(id: &ArmIdentifier) -> Result<CpuCharacteristics, DomainError> {
    for (implementer, part, dmi_part, uarch) in ARM_IDENTIFIERS {
        if !implementer.is_empty() && *implementer != id.implementer {
            continue;
        }
        if !part.is_empty() && *part != id.part {
            continue;
        }
        if !dmi_part.is_empty() && *dmi_part != id.dmidecode_part {
            continue;
        }
        return cpu_by_uarch(uarch);
    }
    Err(DomainError::ParsingFailed(format!(
        "CPU match not found for implementer {}, part {}, dmidecode part {}",
        id.implementer, id.part, id.dmidecode_part
    )))
}

fn refine_uarch(
    family: &str,
    model: &str,
    capid4: &str,
    devices: &str,
    base: &str,
) -> Result<String, DomainError> {
    if family != "6" {
        return Ok(base.to_string());
    }
    match model {
        "143" => spr_variant(capid4, UARCH_SPR, UARCH_SPR_MCC, UARCH_SPR_XCC),
        "207" => spr_variant(capid4, UARCH_EMR, UARCH_EMR_MCC, UARCH_EMR_XCC),
        "173" => Ok(gnr_variant(devices)),
        "175" => Ok(srf_variant(devices)),
        _ => Ok(base.to_string()),
    }
}

// SPR/EMR die variant is encoded in capid4 bits 7:6 (3 = XCC, 1 = MCC)
fn spr_variant(capid4: &str, base: &str, mcc: &str, xcc: &str) -> Result<String, DomainError> {
    if capid4.is_empty() {
        return Ok(base.to_string());
    }
    let capid4 = i64::from_str_radix(capid4, 16)
        .map_err(|e| DomainError::ParsingFailed(format!("invalid capid4 value: {e}")))?;
    Ok(match (capid4 >> 6) & 0b11 {
        3 => xcc.to_string(),
        1 => mcc.to_string(),
        _ => base.to_string(),
    })
}

// GNR die variant is inferred from the matching PCI device count
fn gnr_variant(devices: &str) -> String {
    if let Ok(d) = devices.parse::<u32>() {
        if d != 0 {
            if d % 5 == 0 {
                return UARCH_GNR_X3.to_string();
            } else if d % 4 == 0 {
                return UARCH_GNR_X2.to_string();
            } else if d % 3 == 0 {
                return UARCH_GNR_X1.to_string();
            }
        }
    }
    UARCH_GNR.to_string()
}

fn srf_variant(devices: &str) -> String {
    if let Ok(d) = devices.parse::<u32>() {
        if d != 0 {
            if d % 3 == 0 {
                return UARCH_SRF_SP.to_string();
            } else if d % 4 == 0 {
                return UARCH_SRF_AP.to_string();
            }
        }
    }
    UARCH_SRF.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn x86(family: &str, model: &str, stepping: &str) -> X86Identifier {
        X86Identifier {
            family: family.to_string(),
            model: model.to_string(),
            stepping: stepping.to_string(),
            capid4: String::new(),
            devices: String::new(),
        }
    }

    #[test]
    fn test_skylake_vs_cascadelake_stepping() {
        assert_eq!(cpu_from_x86(&x86("6", "85", "4")).unwrap().uarch, UARCH_SKX);
        assert_eq!(cpu_from_x86(&x86("6", "85", "7")).unwrap().uarch, UARCH_CLX);
        assert_eq!(cpu_from_x86(&x86("6", "85", "11")).unwrap().uarch, UARCH_CPX);
    }

    #[test]
    fn test_icelake() {
        let cpu = cpu_from_x86(&x86("6", "106", "6")).unwrap();
        assert_eq!(cpu.uarch, UARCH_ICX);
        assert_eq!(cpu.memory_channels, 8);
        assert_eq!(cpu.cache_ways, 12);
    }

    #[test]
    fn test_spr_capid4_refinement() {
        let mut id = x86("6", "143", "8");
        // bits 7:6 == 3 -> XCC
        id.capid4 = "c0".to_string();
        assert_eq!(cpu_from_x86(&id).unwrap().uarch, UARCH_SPR_XCC);
        // bits 7:6 == 1 -> MCC
        id.capid4 = "40".to_string();
        assert_eq!(cpu_from_x86(&id).unwrap().uarch, UARCH_SPR_MCC);
        // no capid4 -> generic SPR
        id.capid4 = String::new();
        assert_eq!(cpu_from_x86(&id).unwrap().uarch, UARCH_SPR);
    }

    #[test]
    fn test_gnr_device_count_refinement() {
        let mut id = x86("6", "173", "0");
        id.devices = "5".to_string();
        assert_eq!(cpu_from_x86(&id).unwrap().uarch, UARCH_GNR_X3);
        id.devices = "4".to_string();
        assert_eq!(cpu_from_x86(&id).unwrap().uarch, UARCH_GNR_X2);
        id.devices = "3".to_string();
        assert_eq!(cpu_from_x86(&id).unwrap().uarch, UARCH_GNR_X1);
        id.devices = String::new();
        assert_eq!(cpu_from_x86(&id).unwrap().uarch, UARCH_GNR);
    }

    #[test]
    fn test_amd_genoa_model_range() {
        assert_eq!(cpu_from_x86(&x86("25", "17", "1")).unwrap().uarch, UARCH_GENOA);
        assert_eq!(cpu_from_x86(&x86("25", "31", "0")).unwrap().uarch, UARCH_GENOA);
        assert_eq!(cpu_from_x86(&x86("25", "160", "0")).unwrap().uarch, UARCH_BERGAMO);
    }

    #[test]
    fn test_unknown_cpu_is_error() {
        assert!(cpu_from_x86(&x86("6", "999", "0")).is_err());
    }

    #[test]
    fn test_arm_graviton() {
        let id = ArmIdentifier {
            implementer: "0x41".to_string(),
            part: "0xd40".to_string(),
            dmidecode_part: "AWS Graviton3".to_string(),
        };
        let cpu = cpu_from_arm(&id).unwrap();
        assert_eq!(cpu.uarch, UARCH_GRAVITON3);
        assert_eq!(cpu.logical_threads_per_core, 1);
    }

    #[test]
    fn test_arm_altra_vs_axion() {
        let altra = ArmIdentifier {
            implementer: "0x41".to_string(),
            part: "0xd0c".to_string(),
            dmidecode_part: "Not Specified".to_string(),
        };
        assert_eq!(cpu_from_arm(&altra).unwrap().uarch, UARCH_ALTRA);
        let axion = ArmIdentifier {
            implementer: "0x41".to_string(),
            part: "0xd4f".to_string(),
            dmidecode_part: "Not Specified".to_string(),
        };
        assert_eq!(cpu_from_arm(&axion).unwrap().uarch, UARCH_AXION);
    }

    #[test]
    fn test_cpu_by_uarch_case_insensitive() {
        assert_eq!(cpu_by_uarch("icx").unwrap().uarch, UARCH_ICX);
        assert!(cpu_by_uarch("unobtainium").is_err());
    }

    #[test]
    fn test_is_intel_family() {
        assert!(is_intel_family("6"));
        assert!(is_intel_family("19"));
        assert!(!is_intel_family("25"));
    }
}

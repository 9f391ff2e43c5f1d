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

//! CPU fact derivation from lscpu, /proc/cpuinfo, dmidecode, and MSR output

use crate::domain::cpudb::{self, ArmIdentifier, CpuCharacteristics, X86Identifier, ARM_ARCHITECTURE};
use crate::domain::parsers::common::{
    selective_int_range_to_list, val_from_dmidecode, val_from_regex,
};
use crate::domain::{scripts, stdout_of, ScriptOutputs};
use lazy_static::lazy_static;
use log::{debug, warn};
use regex::Regex;

lazy_static! {
    static ref LSCPU_ARCHITECTURE: Regex = Regex::new(r"^Architecture:\s*(.+)$").unwrap();
    static ref LSCPU_FAMILY: Regex = Regex::new(r"^CPU family:\s*(.+)$").unwrap();
    static ref LSCPU_MODEL: Regex = Regex::new(r"^Model:\s*(.+)$").unwrap();
    static ref LSCPU_MODEL_NAME: Regex = Regex::new(r"^[Mm]odel name.*:\s*(.+?)$").unwrap();
    static ref LSCPU_STEPPING: Regex = Regex::new(r"^Stepping:\s*(.+)$").unwrap();
    static ref LSCPU_VENDOR: Regex = Regex::new(r"^Vendor ID:\s*(.+)$").unwrap();
    static ref LSCPU_SOCKETS: Regex = Regex::new(r"^Socket\(s\):\s*(.+)$").unwrap();
    static ref LSCPU_CORES_PER_SOCKET: Regex = Regex::new(r"^Core\(s\) per socket:\s*(.+)$").unwrap();
    static ref LSCPU_CPU_COUNT: Regex = Regex::new(r"^CPU\(.*:\s*(.+?)$").unwrap();
    static ref LSCPU_ONLINE_CPUS: Regex = Regex::new(r"^On-line CPU\(s\) list:\s*(.+)$").unwrap();
    static ref LSCPU_THREADS_PER_CORE: Regex = Regex::new(r"^Thread\(s\) per core:\s*(.+)$").unwrap();
    static ref LSCPU_NUMA_NODES: Regex = Regex::new(r"^NUMA node\(s\):\s*(.+)$").unwrap();
    static ref LSCPU_VIRTUALIZATION: Regex = Regex::new(r"^Virtualization.*:\s*(.+)$").unwrap();
    static ref HEX_PREFIX: Regex = Regex::new(r"^([0-9a-fA-F]+)").unwrap();
    static ref DEC_PREFIX: Regex = Regex::new(r"^([0-9]+)").unwrap();
    static ref DMI_CURRENT_SPEED: Regex = Regex::new(r"Current Speed:\s(.*)$").unwrap();
    static ref OS_PRETTY_NAME: Regex = Regex::new(r#"^PRETTY_NAME="(.+?)""#).unwrap();
    static ref OS_CENTOS: Regex = Regex::new(r"^(CentOS Linux release .*)").unwrap();
}

/// A single lscpu field value, lines trimmed
pub fn lscpu_field(outputs: &ScriptOutputs, re: &Regex) -> String {
    val_from_regex(stdout_of(outputs, scripts::LSCPU), re)
}

/// Whether the target reports an ARM architecture in lscpu
pub fn is_arm(outputs: &ScriptOutputs) -> bool {
    lscpu_field(outputs, &LSCPU_ARCHITECTURE) == ARM_ARCHITECTURE
}

/// CPU characteristics for the target, resolved through the part tables.
/// x86 parts are identified from lscpu family/model/stepping refined by the
/// capid4 register and PCI device count; ARM parts from /proc/cpuinfo
/// implementer/part and the dmidecode part number.
pub fn cpu_characteristics(outputs: &ScriptOutputs) -> Option<CpuCharacteristics> {
    let result = if is_arm(outputs) {
        cpudb::cpu_from_arm(&ArmIdentifier {
            implementer: stdout_of(outputs, scripts::ARM_IMPLEMENTER).trim().to_string(),
            part: stdout_of(outputs, scripts::ARM_PART).trim().to_string(),
            dmidecode_part: stdout_of(outputs, scripts::ARM_DMIDECODE_PART)
                .trim()
                .to_string(),
        })
    } else {
        cpudb::cpu_from_x86(&X86Identifier {
            family: lscpu_field(outputs, &LSCPU_FAMILY),
            model: lscpu_field(outputs, &LSCPU_MODEL),
            stepping: lscpu_field(outputs, &LSCPU_STEPPING),
            capid4: val_from_regex(stdout_of(outputs, scripts::LSPCI_BITS), &HEX_PREFIX),
            devices: val_from_regex(stdout_of(outputs, scripts::LSPCI_DEVICES), &DEC_PREFIX),
        })
    };
    match result {
        Ok(cpu) => Some(cpu),
        Err(err) => {
            debug!("CPU identification failed: {err}");
            None
        }
    }
}

/// Microarchitecture name, empty when the part is not in the tables
pub fn uarch_from_output(outputs: &ScriptOutputs) -> String {
    cpu_characteristics(outputs)
        .map(|cpu| cpu.uarch.to_string())
        .unwrap_or_default()
}

/// CPU vendor string from lscpu
pub fn vendor_from_output(outputs: &ScriptOutputs) -> String {
    lscpu_field(outputs, &LSCPU_VENDOR)
}

/// CPU model name from lscpu
pub fn model_name_from_output(outputs: &ScriptOutputs) -> String {
    lscpu_field(outputs, &LSCPU_MODEL_NAME)
}

/// Socket count from lscpu
pub fn sockets_from_output(outputs: &ScriptOutputs) -> String {
    lscpu_field(outputs, &LSCPU_SOCKETS)
}

/// Cores per socket from lscpu
pub fn cores_per_socket_from_output(outputs: &ScriptOutputs) -> String {
    lscpu_field(outputs, &LSCPU_CORES_PER_SOCKET)
}

/// NUMA node count from lscpu
pub fn numa_nodes_from_output(outputs: &ScriptOutputs) -> String {
    lscpu_field(outputs, &LSCPU_NUMA_NODES)
}

/// Virtualization mode from lscpu ("full" under a hypervisor)
pub fn virtualization_from_output(outputs: &ScriptOutputs) -> String {
    lscpu_field(outputs, &LSCPU_VIRTUALIZATION)
}

/// Hyperthreading state: "N/A" when the part has no SMT, otherwise
/// Enabled/Disabled from threads-per-core, falling back to comparing the
/// online logical CPU count against physical cores.
pub fn hyperthreading_from_output(outputs: &ScriptOutputs) -> String {
    let mut num_cpus: u64 = match lscpu_field(outputs, &LSCPU_CPU_COUNT).parse() {
        Ok(n) => n,
        Err(_) => {
            warn!("failed to parse CPU count from lscpu");
            return String::new();
        }
    };
    let num_sockets: u64 = match sockets_from_output(outputs).parse() {
        Ok(n) => n,
        Err(_) => {
            warn!("failed to parse socket count from lscpu");
            return String::new();
        }
    };
    let num_cores_per_socket: u64 = match cores_per_socket_from_output(outputs).parse() {
        Ok(n) => n,
        Err(_) => {
            warn!("failed to parse cores per socket from lscpu");
            return String::new();
        }
    };
    let threads_per_core: u64 = lscpu_field(outputs, &LSCPU_THREADS_PER_CORE)
        .parse()
        .unwrap_or(0);
    // the on-line list supersedes the total CPU count when some are offline
    if let Ok(online) = selective_int_range_to_list(&lscpu_field(outputs, &LSCPU_ONLINE_CPUS)) {
        if !online.is_empty() && (online.len() as u64) < num_cpus {
            num_cpus = online.len() as u64;
        }
    }
    let cpu = match cpu_characteristics(outputs) {
        Some(cpu) => cpu,
        None => return String::new(),
    };
    if cpu.logical_threads_per_core < 2 {
        "N/A".to_string()
    } else if threads_per_core == 1 {
        "Disabled".to_string()
    } else if threads_per_core >= 2 {
        "Enabled".to_string()
    } else if num_cpus > num_cores_per_socket * num_sockets {
        "Enabled".to_string()
    } else {
        "Disabled".to_string()
    }
}

/// Base core frequency, from sysfs when exposed, else the dmidecode current
/// speed, else the tail of the lscpu model name.
pub fn base_frequency_from_output(outputs: &ScriptOutputs) -> String {
    let sysfs = stdout_of(outputs, scripts::BASE_FREQUENCY).trim();
    if let Ok(hz) = sysfs.parse::<f64>() {
        return format!("{:.1}GHz", hz / 1_000_000.0);
    }
    let current_speed = val_from_dmidecode(
        stdout_of(outputs, scripts::DMIDECODE),
        "4",
        &DMI_CURRENT_SPEED,
    );
    let tokens: Vec<&str> = current_speed.split(' ').collect();
    if tokens.len() == 2 {
        if let Ok(num) = tokens[0].parse::<f64>() {
            return if tokens[1] == "MHz" {
                format!("{:.1}GHz", num / 1000.0)
            } else {
                format!("{:.1}{}", num, tokens[1])
            };
        }
    }
    // the frequency (if included) is at the end of the model name
    if let Some(last) = model_name_from_output(outputs).split(' ').next_back() {
        if last.ends_with('z') {
            return last.to_string();
        }
    }
    String::new()
}

/// TDP from the package power limit MSR (units of 1/8 W)
pub fn tdp_from_output(outputs: &ScriptOutputs) -> String {
    let msr_hex = stdout_of(outputs, scripts::PACKAGE_POWER_LIMIT).trim();
    match i64::from_str_radix(msr_hex, 16) {
        Ok(msr) if msr != 0 => format!("{}W", msr / 8),
        _ => String::new(),
    }
}

/// Operating system pretty name, with the CentOS release line preferred
/// when present
pub fn operating_system_from_output(outputs: &ScriptOutputs) -> String {
    let release = stdout_of(outputs, scripts::ETC_RELEASE);
    let centos = val_from_regex(release, &OS_CENTOS);
    if !centos.is_empty() {
        return centos;
    }
    val_from_regex(release, &OS_PRETTY_NAME)
}

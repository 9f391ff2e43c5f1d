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

//! Report table construction
//!
//! Each builder takes the collected script outputs and produces one table.
//! Field-oriented tables (host, CPU, memory) use Field/Value columns;
//! inventory tables (DIMMs, NICs, disks) have one row per device. Builders
//! never fail: missing script output yields empty values so a report can
//! still be rendered from a partial collection.

use crate::domain::parsers::{cache, common, cpu, frequency, memory, network, storage};
use crate::domain::{scripts, stdout_of, ScriptOutputs, Table};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref DMI_MANUFACTURER: Regex = Regex::new(r"^Manufacturer:\s*(.+?)$").unwrap();
    static ref DMI_PRODUCT_NAME: Regex = Regex::new(r"^Product Name:\s*(.+?)$").unwrap();
    static ref DMI_CHASSIS_TYPE: Regex = Regex::new(r"^Type:\s*(.+?)$").unwrap();
    static ref DMI_BIOS_VERSION: Regex = Regex::new(r"^Version:\s*(.+?)$").unwrap();
    static ref LSCPU_ARCHITECTURE: Regex = Regex::new(r"^Architecture:\s*(.+)$").unwrap();
    static ref LSCPU_FAMILY: Regex = Regex::new(r"^CPU family:\s*(.+)$").unwrap();
    static ref LSCPU_MODEL: Regex = Regex::new(r"^Model:\s*(.+)$").unwrap();
    static ref LSCPU_STEPPING: Regex = Regex::new(r"^Stepping:\s*(.+)$").unwrap();
    static ref LSCPU_CPUS: Regex = Regex::new(r"^CPU\(s\):\s*(.+)$").unwrap();
    static ref LSCPU_ONLINE: Regex = Regex::new(r"^On-line CPU\(s\) list:\s*(.+)$").unwrap();
    static ref UNAME_KERNEL: Regex = Regex::new(r"^Linux \S+ (\S+)").unwrap();
    static ref MICROCODE: Regex = Regex::new(r"^microcode.*:\s*(.+?)$").unwrap();
    static ref THP_ACTIVE: Regex = Regex::new(r".*\[(.*)\].*").unwrap();
    static ref MEMINFO_TOTAL: Regex = Regex::new(r"^MemTotal:\s*(.+?)$").unwrap();
    static ref MEMINFO_FREE: Regex = Regex::new(r"^MemFree:\s*(.+?)$").unwrap();
    static ref MEMINFO_AVAILABLE: Regex = Regex::new(r"^MemAvailable:\s*(.+?)$").unwrap();
    static ref MEMINFO_HUGEPAGESIZE: Regex = Regex::new(r"^Hugepagesize:\s*(.+?)$").unwrap();
    static ref MEMINFO_HUGEPAGES_TOTAL: Regex = Regex::new(r"^HugePages_Total:\s*(.+?)$").unwrap();
}

fn dmi_val(outputs: &ScriptOutputs, dmi_type: &str, re: &Regex) -> String {
    common::val_from_dmidecode(stdout_of(outputs, scripts::DMIDECODE), dmi_type, re)
}

fn lscpu_val(outputs: &ScriptOutputs, re: &Regex) -> String {
    common::val_from_regex(stdout_of(outputs, scripts::LSCPU), re)
}

fn numa_balancing(outputs: &ScriptOutputs) -> String {
    let out = stdout_of(outputs, scripts::NUMA_BALANCING);
    if out.contains('1') {
        "Enabled".to_string()
    } else if out.contains('0') {
        "Disabled".to_string()
    } else {
        String::new()
    }
}

fn kernel_version(outputs: &ScriptOutputs) -> String {
    common::val_from_regex(stdout_of(outputs, scripts::UNAME), &UNAME_KERNEL)
}

fn microcode(outputs: &ScriptOutputs) -> String {
    common::val_from_regex(stdout_of(outputs, scripts::PROC_CPUINFO), &MICROCODE)
}

pub fn host_table(outputs: &ScriptOutputs) -> Table {
    Table::from_fields(
        "Host",
        vec![
            (
                "Host Name",
                stdout_of(outputs, scripts::HOSTNAME).trim().to_string(),
            ),
            ("Time", stdout_of(outputs, scripts::DATE).trim().to_string()),
            (
                "System",
                format!(
                    "{} {}",
                    dmi_val(outputs, "1", &DMI_MANUFACTURER),
                    dmi_val(outputs, "1", &DMI_PRODUCT_NAME)
                )
                .trim()
                .to_string(),
            ),
            (
                "Baseboard",
                format!(
                    "{} {}",
                    dmi_val(outputs, "2", &DMI_MANUFACTURER),
                    dmi_val(outputs, "2", &DMI_PRODUCT_NAME)
                )
                .trim()
                .to_string(),
            ),
            (
                "Chassis",
                format!(
                    "{} {}",
                    dmi_val(outputs, "3", &DMI_MANUFACTURER),
                    dmi_val(outputs, "3", &DMI_CHASSIS_TYPE)
                )
                .trim()
                .to_string(),
            ),
            ("BIOS Version", dmi_val(outputs, "0", &DMI_BIOS_VERSION)),
        ],
    )
}

pub fn operating_system_table(outputs: &ScriptOutputs) -> Table {
    Table::from_fields(
        "Operating System",
        vec![
            ("OS", cpu::operating_system_from_output(outputs)),
            ("Kernel", kernel_version(outputs)),
            (
                "Boot Parameters",
                stdout_of(outputs, scripts::PROC_CMDLINE).trim().to_string(),
            ),
            ("Microcode", microcode(outputs)),
        ],
    )
}

pub fn cpu_table(outputs: &ScriptOutputs) -> Table {
    let channels = cpu::cpu_characteristics(outputs)
        .filter(|c| c.memory_channels > 0)
        .map(|c| c.memory_channels.to_string())
        .unwrap_or_default();
    let mut fields = vec![
        ("CPU Model", cpu::model_name_from_output(outputs)),
        ("Architecture", lscpu_val(outputs, &LSCPU_ARCHITECTURE)),
        ("Microarchitecture", cpu::uarch_from_output(outputs)),
        ("Family", lscpu_val(outputs, &LSCPU_FAMILY)),
        ("Model", lscpu_val(outputs, &LSCPU_MODEL)),
        ("Stepping", lscpu_val(outputs, &LSCPU_STEPPING)),
        ("Base Frequency", cpu::base_frequency_from_output(outputs)),
        (
            "Maximum Frequency",
            frequency::max_frequency_from_output(outputs),
        ),
        (
            "All-core Maximum Frequency",
            frequency::all_core_max_frequency_from_output(outputs),
        ),
        ("CPUs", lscpu_val(outputs, &LSCPU_CPUS)),
        ("On-line CPU List", lscpu_val(outputs, &LSCPU_ONLINE)),
        (
            "Hyperthreading",
            cpu::hyperthreading_from_output(outputs),
        ),
        (
            "Cores per Socket",
            cpu::cores_per_socket_from_output(outputs),
        ),
        ("Sockets", cpu::sockets_from_output(outputs)),
        ("NUMA Nodes", cpu::numa_nodes_from_output(outputs)),
        ("L1d Cache", cache::cache_one_size_from_output(outputs, "L1d")),
        ("L1i Cache", cache::cache_one_size_from_output(outputs, "L1i")),
        ("L2 Cache", cache::cache_one_size_from_output(outputs, "L2")),
        ("L3 Cache", cache::l3_from_output(outputs)),
        ("L3 per Core", cache::l3_per_core_from_output(outputs)),
        ("Memory Channels", channels),
        ("Package Power / TDP", cpu::tdp_from_output(outputs)),
        (
            "Virtualization",
            cpu::virtualization_from_output(outputs),
        ),
    ];
    // SRF and GNR report uncore limits per die over TPMI, earlier servers
    // expose a single pair of MSR ratio limits
    let uarch = cpu::uarch_from_output(outputs);
    if uarch.contains("SRF") || uarch.contains("GNR") {
        fields.extend([
            (
                "Uncore Min Frequency (Compute)",
                frequency::uncore_die_frequency_from_output(false, true, outputs),
            ),
            (
                "Uncore Min Frequency (I/O)",
                frequency::uncore_die_frequency_from_output(false, false, outputs),
            ),
            (
                "Uncore Max Frequency (Compute)",
                frequency::uncore_die_frequency_from_output(true, true, outputs),
            ),
            (
                "Uncore Max Frequency (I/O)",
                frequency::uncore_die_frequency_from_output(true, false, outputs),
            ),
        ]);
    } else {
        fields.extend([
            (
                "Uncore Max Frequency",
                frequency::uncore_max_frequency_from_output(outputs),
            ),
            (
                "Uncore Min Frequency",
                frequency::uncore_min_frequency_from_output(outputs),
            ),
        ]);
    }
    fields.extend([
        (
            "Scaling Driver",
            stdout_of(outputs, scripts::SCALING_DRIVER).trim().to_string(),
        ),
        (
            "Scaling Governor",
            stdout_of(outputs, scripts::SCALING_GOVERNOR)
                .trim()
                .to_string(),
        ),
    ]);
    Table::from_fields("CPU", fields)
}

/// Turbo frequency limits per active-core-count bucket. Absent on targets
/// where the bucket MSRs could not be read.
pub fn turbo_frequencies_table(outputs: &ScriptOutputs) -> Option<Table> {
    let buckets = frequency::spec_frequency_buckets(outputs).ok()?;
    let (header, rows) = buckets.split_first()?;
    let columns: Vec<&str> = header.iter().map(String::as_str).collect();
    let mut table = Table::new("Turbo Frequencies", &columns);
    for row in rows {
        table.push_row(row.clone());
    }
    if table.is_empty() {
        None
    } else {
        Some(table)
    }
}

pub fn memory_table(outputs: &ScriptOutputs) -> Table {
    let meminfo = stdout_of(outputs, scripts::MEMINFO);
    Table::from_fields(
        "Memory",
        vec![
            (
                "Installed Memory",
                memory::installed_memory_from_output(outputs),
            ),
            ("MemTotal", common::val_from_regex(meminfo, &MEMINFO_TOTAL)),
            ("MemFree", common::val_from_regex(meminfo, &MEMINFO_FREE)),
            (
                "MemAvailable",
                common::val_from_regex(meminfo, &MEMINFO_AVAILABLE),
            ),
            (
                "HugePages_Total",
                common::val_from_regex(meminfo, &MEMINFO_HUGEPAGES_TOTAL),
            ),
            (
                "Hugepagesize",
                common::val_from_regex(meminfo, &MEMINFO_HUGEPAGESIZE),
            ),
            (
                "Transparent Huge Pages",
                common::val_from_regex(
                    stdout_of(outputs, scripts::TRANSPARENT_HUGE_PAGES),
                    &THP_ACTIVE,
                ),
            ),
            ("Automatic NUMA Balancing", numa_balancing(outputs)),
            (
                "Populated Memory Channels",
                memory::populated_channels_from_output(outputs),
            ),
        ],
    )
}

pub fn dimm_table(outputs: &ScriptOutputs) -> Table {
    let mut table = Table::new(
        "DIMM",
        &[
            "Bank Locator",
            "Locator",
            "Manufacturer",
            "Part",
            "Serial",
            "Size",
            "Type",
            "Detail",
            "Speed",
            "Rank",
            "Configured Speed",
            "Socket",
            "Channel",
            "Slot",
        ],
    );
    let modules = memory::dimm_modules_from_dmidecode(stdout_of(outputs, scripts::DMIDECODE));
    let mut positions = memory::dimm_positions_from_output(outputs);
    if positions.len() != modules.len() {
        // position derivation failed, leave those columns blank
        positions = vec![Default::default(); modules.len()];
    }
    for (module, position) in modules.iter().zip(&positions) {
        table.push_row(vec![
            module.bank_locator.clone(),
            module.locator.clone(),
            module.manufacturer.clone(),
            module.part_number.clone(),
            module.serial_number.clone(),
            module.size.clone(),
            module.dimm_type.clone(),
            module.type_detail.clone(),
            module.speed.clone(),
            module.rank.clone(),
            module.configured_speed.clone(),
            position.socket.clone(),
            position.channel.clone(),
            position.slot.clone(),
        ]);
    }
    table
}

pub fn nic_table(outputs: &ScriptOutputs) -> Table {
    let mut table = Table::new(
        "NIC",
        &[
            "Name",
            "Model",
            "Speed",
            "Link",
            "Bus",
            "Driver",
            "Driver Version",
            "Firmware Version",
            "MAC Address",
            "NUMA Node",
            "Card",
            "Port",
            "MTU",
            "TX Queues",
            "RX Queues",
        ],
    );
    for nic in network::parse_nic_info(stdout_of(outputs, scripts::NIC_INFO)) {
        table.push_row(vec![
            nic.name,
            nic.model,
            nic.speed,
            nic.link,
            nic.bus,
            nic.driver,
            nic.driver_version,
            nic.firmware_version,
            nic.mac_address,
            nic.numa_node,
            nic.card,
            nic.port,
            nic.mtu,
            nic.tx_queues,
            nic.rx_queues,
        ]);
    }
    table
}

pub fn network_irq_table(outputs: &ScriptOutputs) -> Table {
    let mut table = Table::new("Network IRQ Mapping", &["Interface", "IRQ:CPU Mappings"]);
    for mapping in network::nic_irq_mappings_from_output(outputs) {
        table.push_row(mapping);
    }
    table
}

pub fn disk_table(outputs: &ScriptOutputs) -> Table {
    let mut table = Table::new(
        "Disk",
        &[
            "Name",
            "Model",
            "Size",
            "Mount Point",
            "Type",
            "Request Queue Size",
            "Minimum I/O Size",
            "Firmware Version",
            "PCIe Address",
            "NUMA Node",
            "Link Speed",
            "Link Width",
            "Max Link Speed",
            "Max Link Width",
        ],
    );
    for disk in storage::disk_info_from_output(outputs) {
        table.push_row(vec![
            disk.name,
            disk.model,
            disk.size,
            disk.mount_point,
            disk.fs_type,
            disk.request_queue_size,
            disk.min_io_size,
            disk.firmware_version,
            disk.pcie_address,
            disk.numa_node,
            disk.link_speed,
            disk.link_width,
            disk.max_link_speed,
            disk.max_link_width,
        ]);
    }
    table
}

pub fn filesystem_table(outputs: &ScriptOutputs) -> Table {
    let (columns, rows) = storage::filesystems_from_output(outputs);
    let column_refs: Vec<&str> = columns.iter().map(String::as_str).collect();
    let mut table = Table::new("Filesystem", &column_refs);
    for row in rows {
        table.push_row(row);
    }
    table
}

/// One-value-per-fact rollup of the most requested facts
pub fn summary_table(outputs: &ScriptOutputs) -> Table {
    Table::from_fields(
        "System Summary",
        vec![
            (
                "Host Name",
                stdout_of(outputs, scripts::HOSTNAME).trim().to_string(),
            ),
            ("Time", stdout_of(outputs, scripts::DATE).trim().to_string()),
            (
                "System",
                format!(
                    "{} {}",
                    dmi_val(outputs, "1", &DMI_MANUFACTURER),
                    dmi_val(outputs, "1", &DMI_PRODUCT_NAME)
                )
                .trim()
                .to_string(),
            ),
            ("CPU Model", cpu::model_name_from_output(outputs)),
            ("Microarchitecture", cpu::uarch_from_output(outputs)),
            ("Sockets", cpu::sockets_from_output(outputs)),
            (
                "Cores per Socket",
                cpu::cores_per_socket_from_output(outputs),
            ),
            ("CPUs", lscpu_val(outputs, &LSCPU_CPUS)),
            ("Hyperthreading", cpu::hyperthreading_from_output(outputs)),
            ("Base Frequency", cpu::base_frequency_from_output(outputs)),
            (
                "All-core Maximum Frequency",
                frequency::all_core_max_frequency_from_output(outputs),
            ),
            (
                "Maximum Frequency",
                frequency::max_frequency_from_output(outputs),
            ),
            ("L3 Cache", cache::l3_from_output(outputs)),
            (
                "Installed Memory",
                memory::installed_memory_from_output(outputs),
            ),
            ("NIC", network::nic_summary_from_output(outputs)),
            ("Disk", storage::disk_summary_from_output(outputs)),
            ("BIOS", dmi_val(outputs, "0", &DMI_BIOS_VERSION)),
            ("Microcode", microcode(outputs)),
            ("OS", cpu::operating_system_from_output(outputs)),
            ("Kernel", kernel_version(outputs)),
            ("TDP", cpu::tdp_from_output(outputs)),
        ],
    )
}

/// Builds every report table from the collected outputs, skipping inventory
/// tables with no rows
pub fn build_tables(outputs: &ScriptOutputs) -> Vec<Table> {
    let mut tables = vec![
        summary_table(outputs),
        host_table(outputs),
        operating_system_table(outputs),
        cpu_table(outputs),
    ];
    if let Some(turbo) = turbo_frequencies_table(outputs) {
        tables.push(turbo);
    }
    tables.push(memory_table(outputs));
    for table in [
        dimm_table(outputs),
        nic_table(outputs),
        network_irq_table(outputs),
        disk_table(outputs),
        filesystem_table(outputs),
    ] {
        if !table.is_empty() {
            tables.push(table);
        }
    }
    tables
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ScriptOutput;

    fn output(stdout: &str) -> ScriptOutput {
        ScriptOutput {
            stdout: stdout.to_string(),
            stderr: String::new(),
            exit_code: Some(0),
        }
    }

    #[test]
    fn test_host_table() {
        let outputs: ScriptOutputs = [
            (scripts::HOSTNAME.to_string(), output("node42\n")),
            (
                scripts::DATE.to_string(),
                output("Tue Jun 10 17:02:01 UTC 2025\n"),
            ),
            (
                scripts::DMIDECODE.to_string(),
                output(
                    "Handle 0x0001, DMI type 1, 27 bytes\nSystem Information\n\tManufacturer: Supermicro\n\tProduct Name: SYS-621C-TN12R\n\n",
                ),
            ),
        ]
        .into_iter()
        .collect();
        let table = host_table(&outputs);
        assert_eq!(table.columns, vec!["Field", "Value"]);
        assert_eq!(table.rows[0], vec!["Host Name", "node42"]);
        assert_eq!(table.rows[2], vec!["System", "Supermicro SYS-621C-TN12R"]);
    }

    #[test]
    fn test_numa_balancing() {
        let outputs: ScriptOutputs = [(scripts::NUMA_BALANCING.to_string(), output("1\n"))]
            .into_iter()
            .collect();
        assert_eq!(numa_balancing(&outputs), "Enabled");
    }

    #[test]
    fn test_kernel_version() {
        let outputs: ScriptOutputs = [(
            scripts::UNAME.to_string(),
            output("Linux node42 5.15.0-119-generic #129-Ubuntu SMP x86_64 GNU/Linux\n"),
        )]
        .into_iter()
        .collect();
        assert_eq!(kernel_version(&outputs), "5.15.0-119-generic");
    }

    #[test]
    fn test_empty_inventory_tables_skipped() {
        let outputs = ScriptOutputs::new();
        let tables = build_tables(&outputs);
        assert!(tables.iter().all(|t| t.name != "DIMM"));
        assert!(tables.iter().all(|t| t.name != "NIC"));
        // field tables are always present
        assert!(tables.iter().any(|t| t.name == "CPU"));
        assert!(tables.iter().any(|t| t.name == "System Summary"));
    }

    #[test]
    fn test_filesystem_table() {
        let outputs: ScriptOutputs = [(
            scripts::DF.to_string(),
            output(
                "Filesystem      Size  Used Avail Use% Mounted on\n/dev/nvme0n1p2  1.7T  312G  1.4T  19% /\n",
            ),
        )]
        .into_iter()
        .collect();
        let table = filesystem_table(&outputs);
        assert_eq!(table.columns.last().map(String::as_str), Some("Mounted on"));
        assert_eq!(table.rows.len(), 1);
    }
}

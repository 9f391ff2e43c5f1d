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

//! Declarative library of the diagnostic scripts run on each target
//!
//! Every fact in the report comes from the captured output of one of these
//! scripts. Each definition carries the filters (architecture, CPU family,
//! model, vendor) that decide whether it applies to a given target, plus the
//! binaries and kernel modules it needs.

use crate::domain::cpudb::{ARM_ARCHITECTURE, INTEL_VENDOR, X86_ARCHITECTURE};

pub const HOSTNAME: &str = "hostname";
pub const DATE: &str = "date";
pub const DMIDECODE: &str = "dmidecode";
pub const LSCPU: &str = "lscpu";
pub const LSCPU_CACHE: &str = "lscpu cache";
pub const LSPCI_BITS: &str = "lspci bits";
pub const LSPCI_DEVICES: &str = "lspci devices";
pub const UNAME: &str = "uname";
pub const PROC_CMDLINE: &str = "proc cmdline";
pub const PROC_CPUINFO: &str = "proc cpuinfo";
pub const ETC_RELEASE: &str = "etc release";
pub const BASE_FREQUENCY: &str = "base frequency";
pub const MAXIMUM_FREQUENCY: &str = "maximum frequency";
pub const SCALING_DRIVER: &str = "scaling driver";
pub const SCALING_GOVERNOR: &str = "scaling governor";
pub const SPEC_CORE_FREQUENCIES: &str = "spec core frequencies";
pub const L3_WAY_SIZE: &str = "l3 way size";
pub const PACKAGE_POWER_LIMIT: &str = "package power limit";
pub const UNCORE_MAX_FROM_MSR: &str = "uncore max from msr";
pub const UNCORE_MIN_FROM_MSR: &str = "uncore min from msr";
pub const UNCORE_MAX_FROM_TPMI: &str = "uncore max from tpmi";
pub const UNCORE_MIN_FROM_TPMI: &str = "uncore min from tpmi";
pub const UNCORE_DIE_TYPES_FROM_TPMI: &str = "uncore die types from tpmi";
pub const ARM_IMPLEMENTER: &str = "arm implementer";
pub const ARM_PART: &str = "arm part";
pub const ARM_DMIDECODE_PART: &str = "arm dmidecode part";
pub const MEMINFO: &str = "meminfo";
pub const TRANSPARENT_HUGE_PAGES: &str = "transparent huge pages";
pub const NUMA_BALANCING: &str = "numa balancing";
pub const NIC_INFO: &str = "nic info";
pub const DISK_INFO: &str = "disk info";
pub const DF: &str = "df";

/// One diagnostic script and the conditions under which it runs
#[derive(Debug, Clone)]
pub struct ScriptDefinition {
    /// Unique name, also the key in [`ScriptOutputs`](crate::domain::ScriptOutputs)
    pub name: &'static str,
    /// Bash script body, run with `bash -s` on the target
    pub script: &'static str,
    /// Architectures the script applies to; empty means all
    pub architectures: &'static [&'static str],
    /// CPU families (lscpu numeric) the script applies to; empty means all
    pub families: &'static [&'static str],
    /// CPU models (lscpu numeric) the script applies to; empty means all
    pub models: &'static [&'static str],
    /// CPU vendor strings the script applies to; empty means all
    pub vendors: &'static [&'static str],
    /// Kernel modules that must be loaded before the script runs
    pub lkms: &'static [&'static str],
    /// Binaries that must be present on the target
    pub depends: &'static [&'static str],
    /// Whether the script needs root
    pub superuser: bool,
}

/// The identity facts used to filter the script library for one target
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetIdentity {
    /// `uname -m`, e.g., x86_64 or aarch64
    pub architecture: String,
    /// lscpu vendor ID, e.g., GenuineIntel
    pub vendor: String,
    /// lscpu CPU family, e.g., 6
    pub family: String,
    /// lscpu model, e.g., 143
    pub model: String,
}

impl ScriptDefinition {
    /// Whether this script should run on a target with the given identity
    pub fn applies_to(&self, identity: &TargetIdentity) -> bool {
        let matches = |allowed: &[&str], value: &str| allowed.is_empty() || allowed.contains(&value);
        matches(self.architectures, &identity.architecture)
            && matches(self.families, &identity.family)
            && matches(self.models, &identity.model)
            && matches(self.vendors, &identity.vendor)
    }
}

const DEFAULT_SCRIPT: ScriptDefinition = ScriptDefinition {
    name: "",
    script: "",
    architectures: &[],
    families: &[],
    models: &[],
    vendors: &[],
    lkms: &[],
    depends: &[],
    superuser: false,
};

macro_rules! script {
    ($name:expr, $script:expr $(, $field:ident : $value:expr)* $(,)?) => {
        ScriptDefinition {
            name: $name,
            script: $script,
            $($field: $value,)*
            ..DEFAULT_SCRIPT
        }
    };
}

/// The full script library, in collection order
pub fn collection_scripts() -> Vec<ScriptDefinition> {
    vec![
        script!(HOSTNAME, "hostname"),
        script!(DATE, "date"),
        script!(
            DMIDECODE,
            "dmidecode",
            depends: &["dmidecode"],
            superuser: true,
        ),
        script!(LSCPU, "lscpu"),
        script!(LSCPU_CACHE, "lscpu -C"),
        // capid4 register, used to differentiate SPR/EMR die variants
        script!(
            LSPCI_BITS,
            "lspci -s $(lspci | grep 325b | awk 'NR==1{print $1}') -xxx | awk '$1 ~ /^90/{print $9 $8 $7 $6; exit}'",
            architectures: &[X86_ARCHITECTURE],
            families: &["6"],
            models: &["143", "207"],
            depends: &["lspci"],
            superuser: true,
        ),
        // device count, used to differentiate GNR/SRF die variants
        script!(
            LSPCI_DEVICES,
            "lspci -d 8086:3258 | wc -l",
            architectures: &[X86_ARCHITECTURE],
            families: &["6"],
            models: &["173", "174", "175", "221"],
            depends: &["lspci"],
        ),
        script!(UNAME, "uname -a"),
        script!(PROC_CMDLINE, "cat /proc/cmdline"),
        script!(PROC_CPUINFO, "cat /proc/cpuinfo"),
        script!(ETC_RELEASE, "cat /etc/*-release"),
        script!(
            BASE_FREQUENCY,
            "cat /sys/devices/system/cpu/cpu0/cpufreq/base_frequency"
        ),
        script!(
            MAXIMUM_FREQUENCY,
            "cat /sys/devices/system/cpu/cpu0/cpufreq/cpuinfo_max_freq"
        ),
        script!(
            SCALING_DRIVER,
            "cat /sys/devices/system/cpu/cpu0/cpufreq/scaling_driver"
        ),
        script!(
            SCALING_GOVERNOR,
            "cat /sys/devices/system/cpu/cpu0/cpufreq/scaling_governor"
        ),
        script!(
            SPEC_CORE_FREQUENCIES,
            SPEC_CORE_FREQUENCIES_SCRIPT,
            architectures: &[X86_ARCHITECTURE],
            vendors: &[INTEL_VENDOR],
            lkms: &["msr"],
            depends: &["rdmsr", "pcm-tpmi"],
            superuser: true,
        ),
        script!(
            L3_WAY_SIZE,
            "rdmsr 0xc90", // L3 way enable mask
            architectures: &[X86_ARCHITECTURE],
            vendors: &[INTEL_VENDOR],
            lkms: &["msr"],
            depends: &["rdmsr"],
            superuser: true,
        ),
        script!(
            PACKAGE_POWER_LIMIT,
            "rdmsr -f 14:0 0x610", // MSR_PKG_POWER_LIMIT: package limit in bits 14:0
            architectures: &[X86_ARCHITECTURE],
            vendors: &[INTEL_VENDOR],
            lkms: &["msr"],
            depends: &["rdmsr"],
            superuser: true,
        ),
        script!(
            UNCORE_MAX_FROM_MSR,
            "rdmsr -f 6:0 0x620", // MSR_UNCORE_RATIO_LIMIT: MAX_RATIO in bits 6:0
            architectures: &[X86_ARCHITECTURE],
            vendors: &[INTEL_VENDOR],
            lkms: &["msr"],
            depends: &["rdmsr"],
            superuser: true,
        ),
        script!(
            UNCORE_MIN_FROM_MSR,
            "rdmsr -f 14:8 0x620", // MSR_UNCORE_RATIO_LIMIT: MIN_RATIO in bits 14:8
            architectures: &[X86_ARCHITECTURE],
            vendors: &[INTEL_VENDOR],
            lkms: &["msr"],
            depends: &["rdmsr"],
            superuser: true,
        ),
        script!(
            UNCORE_MAX_FROM_TPMI,
            "pcm-tpmi 2 0x18 -d -b 8:14",
            architectures: &[X86_ARCHITECTURE],
            vendors: &[INTEL_VENDOR],
            depends: &["pcm-tpmi"],
            superuser: true,
        ),
        script!(
            UNCORE_MIN_FROM_TPMI,
            "pcm-tpmi 2 0x18 -d -b 15:21",
            architectures: &[X86_ARCHITECTURE],
            vendors: &[INTEL_VENDOR],
            depends: &["pcm-tpmi"],
            superuser: true,
        ),
        script!(
            UNCORE_DIE_TYPES_FROM_TPMI,
            "pcm-tpmi 2 0x10 -d -b 26:26",
            architectures: &[X86_ARCHITECTURE],
            vendors: &[INTEL_VENDOR],
            depends: &["pcm-tpmi"],
            superuser: true,
        ),
        script!(
            ARM_IMPLEMENTER,
            "grep -i \"^CPU implementer\" /proc/cpuinfo | head -1 | awk '{print $NF}'",
            architectures: &[ARM_ARCHITECTURE],
        ),
        script!(
            ARM_PART,
            "grep -i \"^CPU part\" /proc/cpuinfo | head -1 | awk '{print $NF}'",
            architectures: &[ARM_ARCHITECTURE],
        ),
        script!(
            ARM_DMIDECODE_PART,
            "dmidecode -t processor | grep -m 1 \"Part Number\" | awk -F': ' '{print $2}'",
            architectures: &[ARM_ARCHITECTURE],
            depends: &["dmidecode"],
            superuser: true,
        ),
        script!(MEMINFO, "cat /proc/meminfo"),
        script!(
            TRANSPARENT_HUGE_PAGES,
            "cat /sys/kernel/mm/transparent_hugepage/enabled"
        ),
        script!(NUMA_BALANCING, "cat /proc/sys/kernel/numa_balancing"),
        script!(
            NIC_INFO,
            NIC_INFO_SCRIPT,
            depends: &["ethtool"],
            superuser: true,
        ),
        script!(DISK_INFO, DISK_INFO_SCRIPT),
        script!(DF, "df -h"),
    ]
}

/// Probe scripts run before the library is filtered; they establish the
/// target identity (see [`TargetIdentity`]) and always apply.
pub fn identity_scripts() -> Vec<ScriptDefinition> {
    vec![script!(UNAME, "uname -a"), script!(LSCPU, "lscpu")]
}

/// Look up a script definition by name
pub fn script_by_name(name: &str) -> Option<ScriptDefinition> {
    collection_scripts().into_iter().find(|s| s.name == name)
}

// Reads the turbo frequency tables for every supported ISA. GNR/DMR carry
// them in TPMI registers, SRF/CWF have a single table derived from HWP or
// PERF_CTL, older parts use the classic turbo ratio limit MSRs.
const SPEC_CORE_FREQUENCIES_SCRIPT: &str = r#"lscpu=$(lscpu)
family=$(echo "$lscpu" | grep -E "^CPU family:" | awk '{print $3}')
model=$(echo "$lscpu" | grep -E "^Model:" | awk '{print $2}')
if ( [ "$family" -eq 6 ] && [ "$model" -eq 173 ] ) || ( [ "$family" -eq 6 ] && [ "$model" -eq 174 ] ) || ( [ "$family" -eq 19 ] && [ "$model" -eq 1 ] ); then  # GNR, GNR-D, DMR
	cores=$(pcm-tpmi 0x5 0xD8 -i 0 -e 0 | tail -n 2 | head -n 1 | awk '{print $3}') # SST_PP_INFO_10
	sse=$(rdmsr 0x1ad) # MSR_TURBO_RATIO_LIMIT: Maximum Ratio Limit of Turbo Mode
	avx2=$(pcm-tpmi 0x5 0xB0 -i 0 -e 0 | tail -n 2 | head -n 1 | awk '{print $3}') # SST_PP_INFO_5
	avx512=$(pcm-tpmi 0x5 0xB8 -i 0 -e 0 | tail -n 2 | head -n 1 | awk '{print $3}') # SST_PP_INFO_6
	avx512h=$(pcm-tpmi 0x5 0xC0 -i 0 -e 0 | tail -n 2 | head -n 1 | awk '{print $3}') # SST_PP_INFO_7
	amx=$(pcm-tpmi 0x5 0xC8 -i 0 -e 0 | tail -n 2 | head -n 1 | awk '{print $3}') # SST_PP_INFO_8
elif [ "$family" -eq 6 ] && ( [ "$model" -eq 175 ] || [ "$model" -eq 221 ] ); then  # SRF, CWF
	cores=$(rdmsr 0x1ae) # MSR_TURBO_GROUP_CORE_CNT: Group Size of Active Cores for Turbo Mode Operation
	# if pstate driver is intel_pstate use 0x774 else use 0x199
	driver=$(cat /sys/devices/system/cpu/cpu0/cpufreq/scaling_driver)
	if [ "$driver" = "intel_pstate" ]; then
		sse=$(rdmsr 0x774 -f 15:8) # IA32_HWP_REQUEST
	else
		sse=$(rdmsr 0x199 -f 15:8) # IA32_PERF_CTL
	fi
	avx2=0
	avx512=0
	avx512h=0
	amx=0
else
	cores=$(rdmsr 0x1ae) # MSR_TURBO_GROUP_CORE_CNT: Group Size of Active Cores for Turbo Mode Operation
	sse=$(rdmsr 0x1ad) # MSR_TURBO_RATIO_LIMIT: Maximum Ratio Limit of Turbo Mode
	avx2=0
	avx512=0
	avx512h=0
	amx=0
fi
echo "cores sse avx2 avx512 avx512h amx"
echo "$cores" "$sse" "$avx2" "$avx512" "$avx512h" "$amx""#;

// One block per network interface, blocks separated by the 40-dash line the
// NIC parser splits on.
const NIC_INFO_SCRIPT: &str = r#"for ifc_path in /sys/class/net/*; do
	ifc=$(basename "$ifc_path")
	if [ "$ifc" = "lo" ]; then
		continue
	fi
	if ! ethtool_out=$(ethtool "$ifc" 2>/dev/null); then
		continue
	fi
	if ! ethtool_i_out=$(ethtool -i "$ifc" 2>/dev/null); then
		continue
	fi
	echo "Interface: $ifc"
	udevadm_out=$(udevadm info --query=all --path=/sys/class/net/"$ifc")
	echo "Vendor ID: $(echo "$udevadm_out" | grep ID_VENDOR_ID= | cut -d'=' -f2)"
	echo "Model ID: $(echo "$udevadm_out" | grep ID_MODEL_ID= | cut -d'=' -f2)"
	echo "Vendor: $(echo "$udevadm_out" | grep ID_VENDOR_FROM_DATABASE= | cut -d'=' -f2)"
	echo "Model: $(echo "$udevadm_out" | grep ID_MODEL_FROM_DATABASE= | cut -d'=' -f2)"
	echo "MTU: $(cat /sys/class/net/"$ifc"/mtu 2>/dev/null)"
	echo "$ethtool_out"
	echo "$ethtool_i_out"
	if ethtool_c_out=$(ethtool -c "$ifc" 2>/dev/null); then
		echo "$ethtool_c_out"
	fi
	echo "MAC Address: $(cat /sys/class/net/"$ifc"/address 2>/dev/null)"
	echo "NUMA Node: $(cat /sys/class/net/"$ifc"/device/numa_node 2>/dev/null)"
	# Check if this is a virtual function
	if [ -L /sys/class/net/"$ifc"/device/physfn ]; then
		echo "Virtual Function: yes"
	else
		echo "Virtual Function: no"
	fi
	echo -n "CPU Affinity: "
	intlist=$( grep -e "$ifc" /proc/interrupts | cut -d':' -f1 | sed -e 's/^[[:space:]]*//' )
	for int in $intlist; do
		cpu=$( cat /proc/irq/"$int"/smp_affinity_list 2>/dev/null)
		printf "%s:%s;" "$int" "$cpu"
	done
	printf "\n"
	echo "TX Queues: $(ls -d /sys/class/net/"$ifc"/queues/tx-* | wc -l)"
	echo "RX Queues: $(ls -d /sys/class/net/"$ifc"/queues/rx-* | wc -l)"
	for q in /sys/class/net/"$ifc"/queues/tx-*; do
		if [ -f "$q/xps_cpus" ]; then
			echo "xps_cpus $(basename "$q"): $(cat "$q/xps_cpus")"
		fi
	done
	for q in /sys/class/net/"$ifc"/queues/rx-*; do
		if [ -f "$q/rps_cpus" ]; then
			echo "rps_cpus $(basename "$q"): $(cat "$q/rps_cpus")"
		fi
	done
	echo "----------------------------------------"
done"#;

// Pipe-separated block device inventory, with NVMe link details from sysfs.
const DISK_INFO_SCRIPT: &str = r#"echo "NAME|MODEL|SIZE|MOUNTPOINT|FSTYPE|RQ-SIZE|MIN-IO|FIRMWARE|ADDR|NUMA|LINKSPEED|LINKWIDTH|MAXLINKSPEED|MAXLINKWIDTH"
lsblk -r -o NAME,MODEL,SIZE,MOUNTPOINT,FSTYPE,RQ-SIZE,MIN-IO -e7 -e1 \
| cut -d' ' -f1,2,3,4,5,6,7 --output-delimiter='|' \
| while IFS='|' read -r name model size mountpoint fstype rqsize minio ;
do
	# skip the lsblk output header
	if [ "$name" = "NAME" ] ; then
		continue
	fi
	fw=""
	addr=""
	numa=""
	curlinkspeed=""
	curlinkwidth=""
	maxlinkspeed=""
	maxlinkwidth=""
	# replace \x20 with space in model
	model=${model//\\x20/ }
	# if name refers to an NVMe device e.g, nvme0n1 - nvme99n99
	if [[ $name =~ ^(nvme[0-9]+)n[0-9]+$ ]]; then
		# get the name without the namespace
		nvme=${BASH_REMATCH[1]}
		if [ -f /sys/block/"$name"/device/firmware_rev ] ; then
			fw=$( cat /sys/block/"$name"/device/firmware_rev )
		fi
		if [ -f /sys/block/"$name"/device/address ] ; then
			addr=$( cat /sys/block/"$name"/device/address )
		fi
		if [ -d "/sys/block/$name/device/${nvme}" ]; then
			numa=$( cat /sys/block/"$name"/device/"${nvme}"/numa_node )
			curlinkspeed=$( cat /sys/block/"$name"/device/"${nvme}"/device/current_link_speed )
			curlinkwidth=$( cat /sys/block/"$name"/device/"${nvme}"/device/current_link_width )
			maxlinkspeed=$( cat /sys/block/"$name"/device/"${nvme}"/device/max_link_speed )
			maxlinkwidth=$( cat /sys/block/"$name"/device/"${nvme}"/device/max_link_width )
		elif [ -d "/sys/block/$name/device/device" ]; then
			numa=$( cat /sys/block/"$name"/device/device/numa_node )
			curlinkspeed=$( cat /sys/block/"$name"/device/device/current_link_speed )
			curlinkwidth=$( cat /sys/block/"$name"/device/device/current_link_width )
			maxlinkspeed=$( cat /sys/block/"$name"/device/device/max_link_speed )
			maxlinkwidth=$( cat /sys/block/"$name"/device/device/max_link_width )
		fi
	fi
	echo "$name|$model|$size|$mountpoint|$fstype|$rqsize|$minio|$fw|$addr|$numa|$curlinkspeed|$curlinkwidth|$maxlinkspeed|$maxlinkwidth"
done"#;

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn intel_spr() -> TargetIdentity {
        TargetIdentity {
            architecture: X86_ARCHITECTURE.to_string(),
            vendor: INTEL_VENDOR.to_string(),
            family: "6".to_string(),
            model: "143".to_string(),
        }
    }

    fn graviton() -> TargetIdentity {
        TargetIdentity {
            architecture: ARM_ARCHITECTURE.to_string(),
            vendor: String::new(),
            family: String::new(),
            model: String::new(),
        }
    }

    #[test]
    fn test_script_names_are_unique() {
        let scripts = collection_scripts();
        let names: HashSet<&str> = scripts.iter().map(|s| s.name).collect();
        assert_eq!(names.len(), scripts.len());
    }

    #[test]
    fn test_msr_scripts_skipped_on_arm() {
        let arm = graviton();
        let applicable: Vec<&'static str> = collection_scripts()
            .iter()
            .filter(|s| s.applies_to(&arm))
            .map(|s| s.name)
            .collect();
        assert!(applicable.contains(&LSCPU));
        assert!(applicable.contains(&NIC_INFO));
        assert!(!applicable.contains(&SPEC_CORE_FREQUENCIES));
        assert!(!applicable.contains(&UNCORE_MAX_FROM_MSR));
    }

    #[test]
    fn test_capid4_script_limited_to_spr_emr() {
        let script = script_by_name(LSPCI_BITS).unwrap();
        assert!(script.applies_to(&intel_spr()));
        let mut icx = intel_spr();
        icx.model = "106".to_string();
        assert!(!script.applies_to(&icx));
    }

    #[test]
    fn test_superuser_scripts_declare_dependencies() {
        // every rdmsr/pcm-tpmi script must declare the binary it needs
        for script in collection_scripts() {
            if script.script.contains("rdmsr ") {
                assert!(script.depends.contains(&"rdmsr"), "{}", script.name);
            }
            if script.script.contains("pcm-tpmi ") {
                assert!(script.depends.contains(&"pcm-tpmi"), "{}", script.name);
            }
        }
    }

    #[test]
    fn test_script_by_name() {
        assert!(script_by_name(DMIDECODE).is_some());
        assert!(script_by_name("no such script").is_none());
    }
}

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

//! Block device and filesystem parsing

use crate::domain::{scripts, stdout_of, ScriptOutputs};
use log::error;

/// One block device row from the disk-info script. NVMe link fields are
/// empty for non-PCIe devices.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiskInfo {
    pub name: String,
    pub model: String,
    pub size: String,
    pub mount_point: String,
    pub fs_type: String,
    pub request_queue_size: String,
    pub min_io_size: String,
    pub firmware_version: String,
    pub pcie_address: String,
    pub numa_node: String,
    pub link_speed: String,
    pub link_width: String,
    pub max_link_speed: String,
    pub max_link_width: String,
}

const DISK_INFO_FIELD_COUNT: usize = 14;

/// Parses the pipe-delimited disk-info script output. The first line is the
/// header and is skipped.
pub fn disk_info_from_output(outputs: &ScriptOutputs) -> Vec<DiskInfo> {
    let mut disks = Vec::new();
    for (i, line) in stdout_of(outputs, scripts::DISK_INFO).lines().enumerate() {
        if i == 0 || line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split('|').collect();
        if fields.len() != DISK_INFO_FIELD_COUNT {
            error!("unexpected number of fields in disk info output: {line}");
            return Vec::new();
        }
        disks.push(DiskInfo {
            name: fields[0].to_string(),
            model: fields[1].trim().to_string(),
            size: fields[2].to_string(),
            mount_point: fields[3].to_string(),
            fs_type: fields[4].to_string(),
            request_queue_size: fields[5].to_string(),
            min_io_size: fields[6].to_string(),
            firmware_version: fields[7].to_string(),
            pcie_address: fields[8].to_string(),
            numa_node: fields[9].to_string(),
            link_speed: fields[10].to_string(),
            link_width: fields[11].to_string(),
            max_link_speed: fields[12].to_string(),
            max_link_width: fields[13].to_string(),
        });
    }
    disks
}

/// Count-by-model-and-size summary, e.g., "2x 1.7T SAMSUNG MZQL21T9HCJR"
pub fn disk_summary_from_output(outputs: &ScriptOutputs) -> String {
    let disks = disk_info_from_output(outputs);
    if disks.is_empty() {
        return "N/A".to_string();
    }
    let mut counts: Vec<(String, String, usize)> = Vec::new();
    for disk in &disks {
        if disk.model.is_empty() {
            continue;
        }
        match counts
            .iter_mut()
            .find(|(model, size, _)| *model == disk.model && *size == disk.size)
        {
            Some((_, _, count)) => *count += 1,
            None => counts.push((disk.model.clone(), disk.size.clone(), 1)),
        }
    }
    counts
        .iter()
        .map(|(model, size, count)| format!("{count}x {size} {model}"))
        .collect::<Vec<String>>()
        .join(", ")
}

/// Parses `df -h` output into header columns and value rows. The trailing
/// "Mounted on" header spans two whitespace-separated words and is rejoined.
pub fn filesystems_from_output(outputs: &ScriptOutputs) -> (Vec<String>, Vec<Vec<String>>) {
    let mut columns: Vec<String> = Vec::new();
    let mut rows: Vec<Vec<String>> = Vec::new();
    for (i, line) in stdout_of(outputs, scripts::DF).lines().enumerate() {
        if line.is_empty() {
            continue;
        }
        let mut fields: Vec<String> = line.split_whitespace().map(str::to_string).collect();
        if i == 0 {
            if fields.len() >= 2
                && fields[fields.len() - 2] == "Mounted"
                && fields[fields.len() - 1] == "on"
            {
                fields.pop();
                let last = fields.len() - 1;
                fields[last] = "Mounted on".to_string();
            }
            columns = fields;
            continue;
        }
        if fields.len() != columns.len() {
            error!("unexpected number of fields in df output: {line}");
            return (Vec::new(), Vec::new());
        }
        rows.push(fields);
    }
    (columns, rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ScriptOutput;

    fn outputs_with(name: &str, stdout: &str) -> ScriptOutputs {
        [(
            name.to_string(),
            ScriptOutput {
                stdout: stdout.to_string(),
                stderr: String::new(),
                exit_code: Some(0),
            },
        )]
        .into_iter()
        .collect()
    }

    const DISK_SAMPLE: &str = "\
NAME|MODEL|SIZE|MOUNTPOINT|FSTYPE|RQ-SIZE|MIN-IO|FIRMWARE|ADDR|NUMA|LINKSPEED|LINKWIDTH|MAXLINKSPEED|MAXLINKWIDTH
nvme0n1|SAMSUNG MZQL21T9HCJR-00A07 |1.7T||  |1023|512|GDC5902Q|0000:64:00.0|0|16 GT/s|x4|16 GT/s|x4
nvme1n1|SAMSUNG MZQL21T9HCJR-00A07 |1.7T|/|ext4|1023|512|GDC5902Q|0000:65:00.0|0|16 GT/s|x4|16 GT/s|x4
sda|Micron_5300_MTFD|447.1G|||64|4096|||||||
";

    #[test]
    fn test_parse_disk_info() {
        let outputs = outputs_with(scripts::DISK_INFO, DISK_SAMPLE);
        let disks = disk_info_from_output(&outputs);
        assert_eq!(disks.len(), 3);
        assert_eq!(disks[0].name, "nvme0n1");
        assert_eq!(disks[0].model, "SAMSUNG MZQL21T9HCJR-00A07");
        assert_eq!(disks[0].size, "1.7T");
        assert_eq!(disks[1].mount_point, "/");
        assert_eq!(disks[1].fs_type, "ext4");
        assert_eq!(disks[0].pcie_address, "0000:64:00.0");
        assert_eq!(disks[2].link_speed, "");
    }

    #[test]
    fn test_disk_info_bad_row() {
        let outputs = outputs_with(scripts::DISK_INFO, "HEADER\nname|too|few|fields\n");
        assert!(disk_info_from_output(&outputs).is_empty());
    }

    #[test]
    fn test_disk_summary() {
        let outputs = outputs_with(scripts::DISK_INFO, DISK_SAMPLE);
        assert_eq!(
            disk_summary_from_output(&outputs),
            "2x 1.7T SAMSUNG MZQL21T9HCJR-00A07, 1x 447.1G Micron_5300_MTFD"
        );
    }

    #[test]
    fn test_disk_summary_empty() {
        let outputs = ScriptOutputs::new();
        assert_eq!(disk_summary_from_output(&outputs), "N/A");
    }

    const DF_SAMPLE: &str = "\
Filesystem      Size  Used Avail Use% Mounted on
/dev/nvme1n1p2  1.7T  312G  1.4T  19% /
tmpfs           126G     0  126G   0% /dev/shm
";

    #[test]
    fn test_parse_df() {
        let outputs = outputs_with(scripts::DF, DF_SAMPLE);
        let (columns, rows) = filesystems_from_output(&outputs);
        assert_eq!(
            columns,
            vec!["Filesystem", "Size", "Used", "Avail", "Use%", "Mounted on"]
        );
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][0], "/dev/nvme1n1p2");
        assert_eq!(rows[0][5], "/");
        assert_eq!(rows[1][4], "0%");
    }
}

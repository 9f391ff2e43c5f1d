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

//! Network interface inventory parsing
//!
//! The nic-info script emits one block per interface, blocks separated by a
//! 40-dash line. Most lines are "Prefix: value"; queue steering masks and
//! the adaptive coalescing line need special handling. Physical cards are
//! reconstructed from PCI addresses: interfaces sharing domain:bus:device
//! are ports of one card.

use crate::domain::{scripts, stdout_of, ScriptOutputs};
use std::collections::HashMap;

const BLOCK_SEPARATOR: &str = "----------------------------------------";

/// Facts for one network interface
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NicInfo {
    pub name: String,
    pub vendor: String,
    pub vendor_id: String,
    pub model: String,
    pub model_id: String,
    pub speed: String,
    pub link: String,
    pub bus: String,
    pub driver: String,
    pub driver_version: String,
    pub firmware_version: String,
    pub mac_address: String,
    pub numa_node: String,
    pub cpu_affinity: String,
    pub adaptive_rx: String,
    pub adaptive_tx: String,
    pub rx_usecs: String,
    pub tx_usecs: String,
    /// Card number among physical cards, assigned in first-seen order from 1
    pub card: String,
    /// Port number within the card, ordered by PCI function from 1
    pub port: String,
    pub mtu: String,
    pub is_virtual: bool,
    pub tx_queues: String,
    pub rx_queues: String,
    /// Transmit queue name -> CPU list from the xps_cpus bitmap
    pub xps_cpus: Vec<(String, String)>,
    /// Receive queue name -> CPU list from the rps_cpus bitmap
    pub rps_cpus: Vec<(String, String)>,
}

/// Parses the nic-info script output into per-interface records
pub fn parse_nic_info(script_output: &str) -> Vec<NicInfo> {
    let mut nics = Vec::new();
    for block in script_output.split(BLOCK_SEPARATOR) {
        if block.trim().is_empty() {
            continue;
        }
        let mut nic = NicInfo::default();
        for line in block.lines() {
            let line = line.trim();
            // "Adaptive RX: off  TX: off"
            if let Some(rest) = line.strip_prefix("Adaptive RX: ") {
                if let Some((rx, tx)) = rest.split_once("TX: ") {
                    nic.adaptive_rx = rx.trim().to_string();
                    nic.adaptive_tx = tx.trim().to_string();
                }
                continue;
            }
            if let Some(value) = line.strip_prefix("Virtual Function: ") {
                nic.is_virtual = value.trim() == "yes";
                continue;
            }
            if let Some(rest) = line.strip_prefix("xps_cpus ") {
                if let Some((queue, bitmap)) = rest.split_once(": ") {
                    nic.xps_cpus
                        .push((queue.to_string(), hex_bitmap_to_cpu_list(bitmap)));
                }
                continue;
            }
            if let Some(rest) = line.strip_prefix("rps_cpus ") {
                if let Some((queue, bitmap)) = rest.split_once(": ") {
                    nic.rps_cpus
                        .push((queue.to_string(), hex_bitmap_to_cpu_list(bitmap)));
                }
                continue;
            }
            let fields: [(&str, &mut String); 19] = [
                ("Interface: ", &mut nic.name),
                ("Vendor: ", &mut nic.vendor),
                ("Vendor ID: ", &mut nic.vendor_id),
                ("Model: ", &mut nic.model),
                ("Model ID: ", &mut nic.model_id),
                ("Speed: ", &mut nic.speed),
                ("Link detected: ", &mut nic.link),
                ("bus-info: ", &mut nic.bus),
                ("driver: ", &mut nic.driver),
                ("version: ", &mut nic.driver_version),
                ("firmware-version: ", &mut nic.firmware_version),
                ("MAC Address: ", &mut nic.mac_address),
                ("NUMA Node: ", &mut nic.numa_node),
                ("CPU Affinity: ", &mut nic.cpu_affinity),
                ("rx-usecs: ", &mut nic.rx_usecs),
                ("tx-usecs: ", &mut nic.tx_usecs),
                ("MTU: ", &mut nic.mtu),
                ("TX Queues: ", &mut nic.tx_queues),
                ("RX Queues: ", &mut nic.rx_queues),
            ];
            for (prefix, field) in fields {
                if let Some(value) = line.strip_prefix(prefix) {
                    *field = value.to_string();
                    break;
                }
            }
        }
        // the model sometimes carries extra detail in parentheses
        if let Some((model, _)) = nic.model.split_once('(') {
            nic.model = model.trim().to_string();
        }
        nics.push(nic);
    }
    assign_card_and_port(&mut nics);
    nics
}

/// Converts a sysfs CPU bitmap like "00000000,00008888" to the list of set
/// bit positions, e.g., "3,7,11,15". Comma-separated parts are big-endian.
/// Non-hex input is returned unchanged.
pub fn hex_bitmap_to_cpu_list(hex_bitmap: &str) -> String {
    if hex_bitmap.is_empty() {
        return String::new();
    }
    let full = hex_bitmap.replace(',', "");
    let mut bits: Vec<u8> = Vec::with_capacity(full.len() * 4);
    // decode nibble-wise to support bitmaps wider than 128 CPUs
    for c in full.chars().rev() {
        let nibble = match c.to_digit(16) {
            Some(n) => n as u8,
            None => return hex_bitmap.to_string(),
        };
        for bit in 0..4 {
            bits.push((nibble >> bit) & 1);
        }
    }
    let cpus: Vec<String> = bits
        .iter()
        .enumerate()
        .filter(|(_, &bit)| bit == 1)
        .map(|(i, _)| i.to_string())
        .collect();
    cpus.join(",")
}

// Card/port assignment: group interfaces by PCI domain:bus:device, number
// the cards in first-seen order, and number ports within a card by PCI
// function.
fn assign_card_and_port(nics: &mut [NicInfo]) {
    let mut card_numbers: HashMap<String, usize> = HashMap::new();
    let mut card_members: Vec<(String, Vec<usize>)> = Vec::new();
    let mut card_counter = 1;
    for (i, nic) in nics.iter().enumerate() {
        if nic.bus.is_empty() {
            continue;
        }
        // PCI address format: domain:bus:device.function, e.g., 0000:32:00.0
        let parts: Vec<&str> = nic.bus.split(':').collect();
        if parts.len() != 3 {
            continue;
        }
        let device = parts[2].split('.').next().unwrap_or("");
        let card_id = format!("{}:{}:{}", parts[0], parts[1], device);
        if !card_numbers.contains_key(&card_id) {
            card_numbers.insert(card_id.clone(), card_counter);
            card_counter += 1;
            card_members.push((card_id.clone(), Vec::new()));
        }
        if let Some((_, members)) = card_members.iter_mut().find(|(id, _)| *id == card_id) {
            members.push(i);
        }
    }
    for (card_id, mut members) in card_members {
        let card_num = card_numbers[&card_id];
        members.sort_by_key(|&i| pci_function(&nics[i].bus));
        for (port, &i) in members.iter().enumerate() {
            nics[i].card = card_num.to_string();
            nics[i].port = (port + 1).to_string();
        }
    }
}

fn pci_function(bus_addr: &str) -> u32 {
    bus_addr
        .split_once('.')
        .and_then(|(_, f)| f.parse().ok())
        .unwrap_or(0)
}

/// Interface -> IRQ:CPU mappings, one row per interface with affinity data
pub fn nic_irq_mappings_from_output(outputs: &ScriptOutputs) -> Vec<Vec<String>> {
    parse_nic_info(stdout_of(outputs, scripts::NIC_INFO))
        .iter()
        .filter(|nic| !nic.cpu_affinity.is_empty())
        .map(|nic| {
            let affinities: Vec<&str> = nic
                .cpu_affinity
                .trim_end_matches(';')
                .split(';')
                .collect();
            vec![nic.name.clone(), affinities.join(" | ")]
        })
        .collect()
}

/// Count-by-model summary, e.g., "2x ConnectX-6, 1x I210"
pub fn nic_summary_from_output(outputs: &ScriptOutputs) -> String {
    let nics = parse_nic_info(stdout_of(outputs, scripts::NIC_INFO));
    if nics.is_empty() {
        return "N/A".to_string();
    }
    let mut model_counts: Vec<(String, usize)> = Vec::new();
    for nic in &nics {
        let model = if nic.model.is_empty() {
            "Unknown NIC".to_string()
        } else {
            nic.model.clone()
        };
        match model_counts.iter_mut().find(|(m, _)| *m == model) {
            Some((_, count)) => *count += 1,
            None => model_counts.push((model, 1)),
        }
    }
    model_counts
        .iter()
        .map(|(model, count)| format!("{count}x {model}"))
        .collect::<Vec<String>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ScriptOutput;

    const NIC_SAMPLE: &str = "\
Interface: eth0
Vendor ID: 15b3
Model ID: 101d
Vendor: Mellanox Technologies
Model: MT2892 Family (ConnectX-6 Dx)
MTU: 1500
Settings for eth0:
	Speed: 100000Mb/s
	Link detected: yes
driver: mlx5_core
version: 5.15.0-119-generic
firmware-version: 22.36.1010
bus-info: 0000:32:00.0
Adaptive RX: on  TX: on
rx-usecs: 8
tx-usecs: 8
MAC Address: b8:3f:d2:11:22:33
NUMA Node: 0
Virtual Function: no
CPU Affinity: 152:0;153:1;154:2;
TX Queues: 16
RX Queues: 16
xps_cpus tx-0: 00000000,00008888
----------------------------------------
Interface: eth1
Model: MT2892 Family (ConnectX-6 Dx)
bus-info: 0000:32:00.1
Virtual Function: no
CPU Affinity:
----------------------------------------
Interface: eth2
Model: I210 Gigabit Network Connection
bus-info: 0000:05:00.0
Virtual Function: yes
----------------------------------------
";

    #[test]
    fn test_parse_nic_fields() {
        let nics = parse_nic_info(NIC_SAMPLE);
        assert_eq!(nics.len(), 3);
        let eth0 = &nics[0];
        assert_eq!(eth0.name, "eth0");
        assert_eq!(eth0.speed, "100000Mb/s");
        assert_eq!(eth0.link, "yes");
        assert_eq!(eth0.driver, "mlx5_core");
        assert_eq!(eth0.adaptive_rx, "on");
        assert_eq!(eth0.adaptive_tx, "on");
        assert_eq!(eth0.mtu, "1500");
        assert!(!eth0.is_virtual);
        assert!(nics[2].is_virtual);
        // model detail in parentheses is dropped
        assert_eq!(eth0.model, "MT2892 Family");
    }

    #[test]
    fn test_card_and_port_assignment() {
        let nics = parse_nic_info(NIC_SAMPLE);
        // eth0/eth1 share domain:bus:device -> one card, two ports
        assert_eq!(nics[0].card, "1");
        assert_eq!(nics[0].port, "1");
        assert_eq!(nics[1].card, "1");
        assert_eq!(nics[1].port, "2");
        assert_eq!(nics[2].card, "2");
        assert_eq!(nics[2].port, "1");
    }

    #[test]
    fn test_xps_bitmap_decoded() {
        let nics = parse_nic_info(NIC_SAMPLE);
        assert_eq!(nics[0].xps_cpus.len(), 1);
        assert_eq!(nics[0].xps_cpus[0].0, "tx-0");
        assert_eq!(nics[0].xps_cpus[0].1, "3,7,11,15");
    }

    #[test]
    fn test_hex_bitmap_to_cpu_list() {
        assert_eq!(hex_bitmap_to_cpu_list("5"), "0,2");
        assert_eq!(hex_bitmap_to_cpu_list("00000000,00008888"), "3,7,11,15");
        assert_eq!(hex_bitmap_to_cpu_list(""), "");
        // non-hex input passes through
        assert_eq!(hex_bitmap_to_cpu_list("n/a"), "n/a");
    }

    #[test]
    fn test_nic_summary() {
        let outputs: ScriptOutputs = [(
            scripts::NIC_INFO.to_string(),
            ScriptOutput {
                stdout: NIC_SAMPLE.to_string(),
                stderr: String::new(),
                exit_code: Some(0),
            },
        )]
        .into_iter()
        .collect();
        assert_eq!(
            nic_summary_from_output(&outputs),
            "2x MT2892 Family, 1x I210 Gigabit Network Connection"
        );
    }

    #[test]
    fn test_nic_summary_empty() {
        let outputs = ScriptOutputs::new();
        assert_eq!(nic_summary_from_output(&outputs), "N/A");
    }

    #[test]
    fn test_irq_mappings() {
        let outputs: ScriptOutputs = [(
            scripts::NIC_INFO.to_string(),
            ScriptOutput {
                stdout: NIC_SAMPLE.to_string(),
                stderr: String::new(),
                exit_code: Some(0),
            },
        )]
        .into_iter()
        .collect();
        let mappings = nic_irq_mappings_from_output(&outputs);
        assert_eq!(mappings.len(), 1);
        assert_eq!(mappings[0][0], "eth0");
        assert_eq!(mappings[0][1], "152:0 | 153:1 | 154:2");
    }
}

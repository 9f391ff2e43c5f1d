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

//! DIMM population extraction from dmidecode memory device records
//!
//! The physical socket/channel/slot of each DIMM is encoded in the Locator
//! and Bank Locator strings, whose format every OEM chooses freely. Dell,
//! HPE, and Amazon EC2 bare-metal have dedicated derivations; everything
//! else goes through a dialect table probed against the first DIMM, with
//! channel indices reconstructed while walking the DIMMs in DMI order.

use crate::domain::parsers::common::{val_from_dmidecode, vals_array_from_dmidecode};
use crate::domain::parsers::cpu::{cpu_characteristics, sockets_from_output};
use crate::domain::{scripts, stdout_of, DomainError, ScriptOutputs};
use lazy_static::lazy_static;
use log::{info, warn};
use regex::Regex;

/// One DMI type 17 memory device record
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DimmModule {
    pub bank_locator: String,
    pub locator: String,
    pub manufacturer: String,
    pub part_number: String,
    pub serial_number: String,
    pub size: String,
    pub dimm_type: String,
    pub type_detail: String,
    pub speed: String,
    pub rank: String,
    pub configured_speed: String,
}

impl DimmModule {
    /// Whether a module is actually present in the slot
    pub fn is_populated(&self) -> bool {
        !self.size.contains("No")
    }
}

/// Physical position of a DIMM derived from its locator strings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DimmPosition {
    pub socket: String,
    pub channel: String,
    pub slot: String,
}

lazy_static! {
    static ref DMI_BANK_LOCATOR: Regex = Regex::new(r"^Bank Locator:\s*(.+?)$").unwrap();
    static ref DMI_LOCATOR: Regex = Regex::new(r"^Locator:\s*(.+?)$").unwrap();
    static ref DMI_MANUFACTURER: Regex = Regex::new(r"^Manufacturer:\s*(.+?)$").unwrap();
    static ref DMI_PART_NUMBER: Regex = Regex::new(r"^Part Number:\s*(.+?)\s*$").unwrap();
    static ref DMI_SERIAL_NUMBER: Regex = Regex::new(r"^Serial Number:\s*(.+?)\s*$").unwrap();
    static ref DMI_SIZE: Regex = Regex::new(r"^Size:\s*(.+?)$").unwrap();
    static ref DMI_TYPE: Regex = Regex::new(r"^Type:\s*(.+?)$").unwrap();
    static ref DMI_TYPE_DETAIL: Regex = Regex::new(r"^Type Detail:\s*(.+?)$").unwrap();
    static ref DMI_SPEED: Regex = Regex::new(r"^Speed:\s*(.+?)$").unwrap();
    static ref DMI_RANK: Regex = Regex::new(r"^Rank:\s*(.+?)$").unwrap();
    static ref DMI_CONFIGURED_SPEED: Regex = Regex::new(r"^Configured.*Speed:\s*(.+?)$").unwrap();
    static ref DMI_VENDOR: Regex = Regex::new(r"Vendor:\s*(.*)").unwrap();
    static ref DIMM_SIZE_VALUE: Regex = Regex::new(r"(\d+)\s*(\w*)").unwrap();
    static ref DELL_LOCATOR: Regex = Regex::new(r"([ABCD])([1-9]\d*)").unwrap();
    static ref HPE_LOCATOR: Regex = Regex::new(r"PROC ([1-9]\d*) DIMM ([1-9]\d*)").unwrap();
    static ref EC2_C5_BANK: Regex = Regex::new(r"NODE\s+([1-9])").unwrap();
    static ref EC2_C5_LOCATOR: Regex = Regex::new(r"DIMM_(.)(.)").unwrap();
    static ref EC2_C6I_BANK: Regex = Regex::new(r"NODE\s+(\d+)").unwrap();
    static ref EC2_C6I_LOCATOR: Regex = Regex::new(r"CPU(\d+)\s+Channel(\d+)\s+DIMM(\d+)").unwrap();
}

/// Parses all DMI type 17 records into DIMM modules
pub fn dimm_modules_from_dmidecode(dmidecode_output: &str) -> Vec<DimmModule> {
    vals_array_from_dmidecode(
        dmidecode_output,
        "17",
        &[
            &DMI_BANK_LOCATOR,
            &DMI_LOCATOR,
            &DMI_MANUFACTURER,
            &DMI_PART_NUMBER,
            &DMI_SERIAL_NUMBER,
            &DMI_SIZE,
            &DMI_TYPE,
            &DMI_TYPE_DETAIL,
            &DMI_SPEED,
            &DMI_RANK,
            &DMI_CONFIGURED_SPEED,
        ],
    )
    .into_iter()
    .map(|mut row| {
        let mut take = |i: usize| std::mem::take(&mut row[i]);
        DimmModule {
            bank_locator: take(0),
            locator: take(1),
            manufacturer: take(2),
            part_number: take(3),
            serial_number: take(4),
            size: take(5),
            dimm_type: take(6),
            type_detail: take(7),
            speed: take(8),
            rank: take(9),
            configured_speed: take(10),
        }
    })
    .collect()
}

/// Summary of installed memory grouped by type/size/speed, e.g.,
/// "1024GB (16x64GB DDR5 4800MT/s [4400MT/s])"
pub fn installed_memory_from_output(outputs: &ScriptOutputs) -> String {
    let dimms = dimm_modules_from_dmidecode(stdout_of(outputs, scripts::DMIDECODE));
    // count DIMMs per type/size/speed/configured-speed group, first-seen order
    let mut groups: Vec<(&DimmModule, usize)> = Vec::new();
    for dimm in &dimms {
        match groups.iter_mut().find(|(d, _)| {
            d.dimm_type == dimm.dimm_type
                && d.size == dimm.size
                && d.speed == dimm.speed
                && d.configured_speed == dimm.configured_speed
        }) {
            Some((_, count)) => *count += 1,
            None => groups.push((dimm, 1)),
        }
    }
    let mut summaries = Vec::new();
    for (dimm, count) in groups {
        let caps = match DIMM_SIZE_VALUE.captures(&dimm.size) {
            Some(caps) => caps,
            None => continue,
        };
        let size: usize = match caps[1].parse() {
            Ok(size) => size,
            Err(_) => {
                warn!("unrecognized DIMM size format: {}", dimm.size);
                return String::new();
            }
        };
        let unit = &caps[2];
        let speed = dimm.speed.replace(' ', "");
        let configured_speed = dimm.configured_speed.replace(' ', "");
        summaries.push(format!(
            "{}{unit} ({count}x{size}{unit} {} {speed} [{configured_speed}])",
            count * size,
            dimm.dimm_type,
        ));
    }
    summaries.join("; ")
}

/// Count of memory channels with at least one populated DIMM
pub fn populated_channels_from_output(outputs: &ScriptOutputs) -> String {
    let dimms = dimm_modules_from_dmidecode(stdout_of(outputs, scripts::DMIDECODE));
    let positions = dimm_positions_from_output(outputs);
    if positions.len() != dimms.len() {
        warn!(
            "derived DIMM positions ({}) do not match DIMM count ({})",
            positions.len(),
            dimms.len()
        );
        return String::new();
    }
    let mut channels: Vec<(&str, &str)> = Vec::new();
    for (dimm, pos) in dimms.iter().zip(&positions) {
        if dimm.is_populated() {
            let key = (pos.socket.as_str(), pos.channel.as_str());
            if !channels.contains(&key) {
                channels.push(key);
            }
        }
    }
    if channels.is_empty() {
        String::new()
    } else {
        channels.len().to_string()
    }
}

/// Derives socket/channel/slot for every DIMM. The platform vendor from DMI
/// type 0 selects the derivation; unknown vendors (and vendor derivations
/// that fail) go through the generic dialect table.
pub fn dimm_positions_from_output(outputs: &ScriptOutputs) -> Vec<DimmPosition> {
    let dmidecode = stdout_of(outputs, scripts::DMIDECODE);
    let dimms = dimm_modules_from_dmidecode(dmidecode);
    let channels_per_socket = match cpu_characteristics(outputs) {
        Some(cpu) if cpu.memory_channels > 0 => cpu.memory_channels as i64,
        _ => return Vec::new(),
    };
    let num_sockets: i64 = match sockets_from_output(outputs).parse() {
        Ok(n) if n > 0 => n,
        _ => return Vec::new(),
    };
    let platform_vendor = val_from_dmidecode(dmidecode, "0", &DMI_VENDOR);
    let vendor_result = if platform_vendor.contains("Dell") {
        derive_positions_dell(&dimms, channels_per_socket)
    } else if platform_vendor == "HPE" {
        derive_positions_hpe(&dimms, num_sockets, channels_per_socket)
    } else if platform_vendor == "Amazon EC2" {
        derive_positions_ec2(&dimms, channels_per_socket)
    } else {
        Err(DomainError::ParsingFailed(format!(
            "no dedicated DIMM derivation for vendor '{platform_vendor}'"
        )))
    };
    match vendor_result {
        Ok(positions) => positions,
        Err(err) => {
            info!("vendor DIMM derivation not used: {err}");
            match derive_positions_generic(&dimms, channels_per_socket) {
                Ok(positions) => positions,
                Err(err) => {
                    warn!("failed to derive DIMM positions: {err}");
                    Vec::new()
                }
            }
        }
    }
}

// Dell: Bank Locator is "Not Specified", Locator is A1-A12/B1-B12, where
// A1 and A7 share channel 0, A2 and A8 share channel 1, and so on.
fn derive_positions_dell(
    dimms: &[DimmModule],
    channels_per_socket: i64,
) -> Result<Vec<DimmPosition>, DomainError> {
    let mut positions = Vec::with_capacity(dimms.len());
    for dimm in dimms {
        if !dimm.bank_locator.contains("Not Specified") {
            return Err(DomainError::ParsingFailed(
                "doesn't conform to expected Dell Bank Locator format".to_string(),
            ));
        }
        let caps = DELL_LOCATOR.captures(&dimm.locator).ok_or_else(|| {
            DomainError::ParsingFailed("doesn't conform to expected Dell Locator format".to_string())
        })?;
        let alpha = caps[1].as_bytes()[0];
        let numeric: i64 = caps[2].parse().map_err(|_| {
            DomainError::ParsingFailed(
                "doesn't conform to expected Dell Locator numeric format".to_string(),
            )
        })?;
        let socket = i64::from(alpha - b'A');
        let (channel, slot) = if numeric <= channels_per_socket {
            (numeric - 1, 0)
        } else {
            (numeric - (channels_per_socket + 1), 1)
        };
        positions.push(DimmPosition {
            socket: socket.to_string(),
            channel: channel.to_string(),
            slot: slot.to_string(),
        });
    }
    Ok(positions)
}

// HPE: Bank Locator "Not Specified", Locator "PROC n DIMM m" with two slots
// per channel and a board numbering that alternates slot parity at the
// channel midpoint.
fn derive_positions_hpe(
    dimms: &[DimmModule],
    num_sockets: i64,
    channels_per_socket: i64,
) -> Result<Vec<DimmPosition>, DomainError> {
    let slots_per_channel = dimms.len() as i64 / (num_sockets * channels_per_socket);
    if slots_per_channel == 0 {
        return Err(DomainError::ParsingFailed(
            "fewer DIMM slots than channels".to_string(),
        ));
    }
    let mut positions = Vec::with_capacity(dimms.len());
    for dimm in dimms {
        if !dimm.bank_locator.contains("Not Specified") {
            return Err(DomainError::ParsingFailed(format!(
                "doesn't conform to expected HPE Bank Locator format: {}",
                dimm.bank_locator
            )));
        }
        let caps = HPE_LOCATOR.captures(&dimm.locator).ok_or_else(|| {
            DomainError::ParsingFailed(format!(
                "doesn't conform to expected HPE Locator format: {}",
                dimm.locator
            ))
        })?;
        let socket: i64 = caps[1]
            .parse::<i64>()
            .map_err(|_| DomainError::ParsingFailed("failed to parse socket number".to_string()))?
            - 1;
        let dimm_num: i64 = caps[2]
            .parse()
            .map_err(|_| DomainError::ParsingFailed("failed to parse DIMM number".to_string()))?;
        let channel = (dimm_num - 1) / slots_per_channel;
        let slot = if (dimm_num < channels_per_socket && dimm_num % 2 != 0)
            || (dimm_num > channels_per_socket && dimm_num % 2 == 0)
        {
            0
        } else {
            1
        };
        positions.push(DimmPosition {
            socket: socket.to_string(),
            channel: channel.to_string(),
            slot: slot.to_string(),
        });
    }
    Ok(positions)
}

// Amazon EC2 bare-metal: c5.metal uses "NODE n" + "DIMM_Xy" where the
// channel letters skip 'I'; c6i.metal spells everything out as
// "CPUn Channeln DIMMn".
fn derive_positions_ec2(
    dimms: &[DimmModule],
    channels_per_socket: i64,
) -> Result<Vec<DimmPosition>, DomainError> {
    let mut positions = Vec::with_capacity(dimms.len());
    for dimm in dimms {
        if let (Some(bank), Some(loc)) = (
            EC2_C5_BANK.captures(&dimm.bank_locator),
            EC2_C5_LOCATOR.captures(&dimm.locator),
        ) {
            let socket = bank[1].parse::<i64>().unwrap_or(0) - 1;
            let letter = loc[1].as_bytes()[0];
            let channel = match letter.cmp(&b'I') {
                std::cmp::Ordering::Less => i64::from(letter - b'A') % channels_per_socket,
                std::cmp::Ordering::Greater => i64::from(letter - b'B') % channels_per_socket,
                std::cmp::Ordering::Equal => {
                    return Err(DomainError::ParsingFailed(
                        "doesn't conform to expected EC2 format".to_string(),
                    ))
                }
            };
            let slot: i64 = loc[2].parse().unwrap_or(0);
            positions.push(DimmPosition {
                socket: socket.to_string(),
                channel: channel.to_string(),
                slot: slot.to_string(),
            });
            continue;
        }
        if let (Some(_), Some(loc)) = (
            EC2_C6I_BANK.captures(&dimm.bank_locator),
            EC2_C6I_LOCATOR.captures(&dimm.locator),
        ) {
            positions.push(DimmPosition {
                socket: loc[1].to_string(),
                channel: loc[2].to_string(),
                slot: loc[3].to_string(),
            });
            continue;
        }
        return Err(DomainError::ParsingFailed(
            "doesn't conform to expected EC2 format".to_string(),
        ));
    }
    Ok(positions)
}

/// Locator string dialects seen across OEM platforms. Each variant knows how
/// to pull (socket, slot) out of the Bank Locator and Locator strings; the
/// channel is reconstructed afterwards by walking the DIMMs in DMI order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LocatorDialect {
    InspurChannelDimm,  // CPU0_C0D0
    CpuAlphaNum,        // CPU0_A0
    CpuMcDimm,          // CPU0_MC0_DIMM_A0
    NodeChannelDimm,    // bank: NODE 0 CHANNEL 0 DIMM 0
    SuperMicroPDimm,    // P1-DIMMA1
    PNodeChannelDimm,   // bank: P0_Node0_Channel0_Dimm0
    NodeChannelDimmUnderscore, // bank: _Node0_Channel0_Dimm0
    SkxSdp,             // CPU1_DIMM_A1 + bank NODE 1
    IcxSdp,             // CPU0_DIMM_A1 + bank NODE 0
    NodeBankDimm,       // bank: NODE 1, loc: DIMM_A1
    GigabyteMilan,      // DIMM_P0_A0
    NucChannelDimm,     // bank: CHANNEL A DIMM0
    AlderLakeClient,    // Controller0-ChannelA-DIMM0
    Birchstream,        // CPU0_DIMM_A1
    BirchstreamAp,      // CPU0_DIMM_A
    ForestCity,         // CPU0 CH0/D0
}

lazy_static! {
    static ref LOC_INSPUR: Regex = Regex::new(r"CPU([0-9])_C([0-9])D([0-9])").unwrap();
    static ref LOC_CPU_ALPHA_NUM: Regex = Regex::new(r"CPU([0-9])_([A-Z])([0-9])").unwrap();
    static ref LOC_CPU_MC_DIMM: Regex = Regex::new(r"CPU([0-9])_MC._DIMM_([A-Z])([0-9])").unwrap();
    static ref BANK_NODE_CHANNEL_DIMM: Regex =
        Regex::new(r"NODE ([0-9]) CHANNEL ([0-9]) DIMM ([0-9])").unwrap();
    static ref LOC_SUPERMICRO: Regex = Regex::new(r"P([1,2])-DIMM([A-L])([1,2])").unwrap();
    static ref BANK_P_NODE_CHANNEL_DIMM: Regex =
        Regex::new(r"P([0-9])_Node([0-9])_Channel([0-9])_Dimm([0-9])").unwrap();
    static ref BANK_NODE_CHANNEL_DIMM_UNDERSCORE: Regex =
        Regex::new(r"_Node([0-9])_Channel([0-9])_Dimm([0-9])").unwrap();
    static ref LOC_SKX_SDP: Regex = Regex::new(r"CPU([1-4])_DIMM_([A-Z])([1-2])").unwrap();
    static ref BANK_NODE_1_8: Regex = Regex::new(r"NODE ([1-8])").unwrap();
    static ref LOC_ICX_SDP: Regex = Regex::new(r"CPU([0-7])_DIMM_([A-Z])([1-2])").unwrap();
    static ref BANK_NODE_ANY: Regex = Regex::new(r"NODE ([0-9]+)").unwrap();
    static ref BANK_NODE_POSITIVE: Regex = Regex::new(r"NODE ([1-9]\d*)").unwrap();
    static ref LOC_DIMM_ALPHA_NUM: Regex = Regex::new(r"DIMM_([A-Z])([1-9]\d*)").unwrap();
    static ref LOC_GIGABYTE_MILAN: Regex = Regex::new(r"DIMM_P([0-1])_[A-Z]([0-1])").unwrap();
    static ref BANK_NUC: Regex = Regex::new(r"CHANNEL ([A-D]) DIMM([0-9])").unwrap();
    static ref LOC_ALDER_LAKE: Regex = Regex::new(r"Controller([0-1]).*DIMM([0-1])").unwrap();
    static ref LOC_BIRCHSTREAM: Regex = Regex::new(r"CPU([\d])_DIMM_([A-H])([1-2])").unwrap();
    static ref LOC_BIRCHSTREAM_AP: Regex = Regex::new(r"CPU([\d])_DIMM_([A-L])").unwrap();
    static ref LOC_FOREST_CITY: Regex = Regex::new(r"CPU([\d]) CH([0-7])/D([0-1])").unwrap();
}

impl LocatorDialect {
    /// Probes the dialect table against one DIMM's locator strings. Order
    /// matters: more specific patterns come before patterns they would
    /// also match.
    fn detect(bank_locator: &str, locator: &str) -> Option<Self> {
        use LocatorDialect::*;
        if LOC_INSPUR.is_match(locator) {
            return Some(InspurChannelDimm);
        }
        if LOC_CPU_ALPHA_NUM.is_match(locator) {
            return Some(CpuAlphaNum);
        }
        if LOC_CPU_MC_DIMM.is_match(locator) {
            return Some(CpuMcDimm);
        }
        if BANK_NODE_CHANNEL_DIMM.is_match(bank_locator) {
            return Some(NodeChannelDimm);
        }
        // SuperMicro boards match the P_Node pattern too, but carry invalid
        // bank locator data, so the locator dialect is probed first
        if LOC_SUPERMICRO.is_match(locator) {
            return Some(SuperMicroPDimm);
        }
        if BANK_P_NODE_CHANNEL_DIMM.is_match(bank_locator) {
            return Some(PNodeChannelDimm);
        }
        if BANK_NODE_CHANNEL_DIMM_UNDERSCORE.is_match(bank_locator) {
            return Some(NodeChannelDimmUnderscore);
        }
        if LOC_SKX_SDP.is_match(locator) && BANK_NODE_1_8.is_match(bank_locator) {
            return Some(SkxSdp);
        }
        if LOC_ICX_SDP.is_match(locator) && BANK_NODE_ANY.is_match(bank_locator) {
            return Some(IcxSdp);
        }
        if BANK_NODE_POSITIVE.is_match(bank_locator) && LOC_DIMM_ALPHA_NUM.is_match(locator) {
            return Some(NodeBankDimm);
        }
        if LOC_GIGABYTE_MILAN.is_match(locator) {
            return Some(GigabyteMilan);
        }
        if BANK_NUC.is_match(bank_locator) {
            return Some(NucChannelDimm);
        }
        if LOC_ALDER_LAKE.is_match(locator) {
            return Some(AlderLakeClient);
        }
        if LOC_BIRCHSTREAM.is_match(locator) {
            return Some(Birchstream);
        }
        if LOC_BIRCHSTREAM_AP.is_match(locator) {
            return Some(BirchstreamAp);
        }
        if LOC_FOREST_CITY.is_match(locator) {
            return Some(ForestCity);
        }
        None
    }

    /// Extracts (socket, slot) from one DIMM's locator strings
    fn socket_slot(&self, bank_locator: &str, locator: &str) -> Option<(i64, i64)> {
        use LocatorDialect::*;
        let num = |caps: &regex::Captures, i: usize| caps[i].parse::<i64>().unwrap_or(0);
        match self {
            InspurChannelDimm => LOC_INSPUR
                .captures(locator)
                .map(|c| (num(&c, 1), num(&c, 3))),
            CpuAlphaNum => LOC_CPU_ALPHA_NUM
                .captures(locator)
                .map(|c| (num(&c, 1), num(&c, 3))),
            CpuMcDimm => LOC_CPU_MC_DIMM
                .captures(locator)
                .map(|c| (num(&c, 1), num(&c, 3))),
            NodeChannelDimm => BANK_NODE_CHANNEL_DIMM
                .captures(bank_locator)
                .map(|c| (num(&c, 1), num(&c, 3))),
            SuperMicroPDimm => LOC_SUPERMICRO
                .captures(locator)
                .map(|c| (num(&c, 1) - 1, num(&c, 3) - 1)),
            PNodeChannelDimm => BANK_P_NODE_CHANNEL_DIMM
                .captures(bank_locator)
                .map(|c| (num(&c, 1), num(&c, 4))),
            NodeChannelDimmUnderscore => BANK_NODE_CHANNEL_DIMM_UNDERSCORE
                .captures(bank_locator)
                .map(|c| (num(&c, 1), num(&c, 3))),
            SkxSdp => LOC_SKX_SDP
                .captures(locator)
                .map(|c| (num(&c, 1) - 1, num(&c, 3) - 1)),
            IcxSdp => LOC_ICX_SDP
                .captures(locator)
                .map(|c| (num(&c, 1), num(&c, 3) - 1)),
            NodeBankDimm => {
                let bank = BANK_NODE_POSITIVE.captures(bank_locator)?;
                let loc = LOC_DIMM_ALPHA_NUM.captures(locator)?;
                Some((num(&bank, 1) - 1, num(&loc, 2) - 1))
            }
            GigabyteMilan => LOC_GIGABYTE_MILAN
                .captures(locator)
                .map(|c| (num(&c, 1), num(&c, 2))),
            NucChannelDimm => BANK_NUC.captures(bank_locator).map(|c| (0, num(&c, 2))),
            AlderLakeClient => LOC_ALDER_LAKE.captures(locator).map(|c| (0, num(&c, 2))),
            Birchstream => LOC_BIRCHSTREAM
                .captures(locator)
                .map(|c| (num(&c, 1), num(&c, 3) - 1)),
            BirchstreamAp => LOC_BIRCHSTREAM_AP.captures(locator).map(|c| (num(&c, 1), 0)),
            ForestCity => LOC_FOREST_CITY
                .captures(locator)
                .map(|c| (num(&c, 1), num(&c, 3))),
        }
    }
}

// Generic derivation: pick a dialect from the first DIMM, then walk all
// DIMMs in DMI order reconstructing the channel index. The channel resets
// when the socket changes and advances on each slot-0 DIMM; exceeding the
// part's channels-per-socket means the dialect was misapplied.
fn derive_positions_generic(
    dimms: &[DimmModule],
    channels_per_socket: i64,
) -> Result<Vec<DimmPosition>, DomainError> {
    let first = dimms.first().ok_or_else(|| {
        DomainError::ParsingFailed("no DIMMs".to_string())
    })?;
    let dialect = LocatorDialect::detect(&first.bank_locator, &first.locator).ok_or_else(|| {
        DomainError::ParsingFailed("unknown DIMM identification format".to_string())
    })?;
    let mut positions = Vec::with_capacity(dimms.len());
    let mut previous_socket = -1i64;
    let mut channel = 0i64;
    for dimm in dimms {
        let (socket, slot) = dialect
            .socket_slot(&dimm.bank_locator, &dimm.locator)
            .ok_or_else(|| {
                DomainError::ParsingFailed(format!(
                    "unrecognized bank locator and/or locator in DIMM info: {} {}",
                    dimm.bank_locator, dimm.locator
                ))
            })?;
        if socket > previous_socket {
            channel = 0;
        } else if socket == previous_socket && slot == 0 {
            channel += 1;
        }
        if channel >= channels_per_socket {
            return Err(DomainError::ParsingFailed(
                "invalid interpretation of DIMM data".to_string(),
            ));
        }
        previous_socket = socket;
        positions.push(DimmPosition {
            socket: socket.to_string(),
            channel: channel.to_string(),
            slot: slot.to_string(),
        });
    }
    Ok(positions)
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

    fn dmi_type17(entries: &[(&str, &str, &str)]) -> String {
        // (bank locator, locator, size)
        let mut out = String::new();
        for (i, (bank, locator, size)) in entries.iter().enumerate() {
            out.push_str(&format!(
                "Handle 0x{:04X}, DMI type 17, 40 bytes\nMemory Device\n\
                 \tSize: {size}\n\tLocator: {locator}\n\tBank Locator: {bank}\n\
                 \tType: DDR5\n\tSpeed: 4800 MT/s\n\
                 \tConfigured Memory Speed: 4400 MT/s\n\tRank: 2\n\n",
                0x1100 + i
            ));
        }
        out
    }

    const LSCPU_ICX_2S: &str = "\
Architecture:            x86_64
Socket(s):               2
Vendor ID:               GenuineIntel
CPU family:              6
Model:                   106
Stepping:                6
";

    #[test]
    fn test_dimm_modules_from_dmidecode() {
        let dmi = dmi_type17(&[("NODE 1", "DIMM_A1", "64 GB")]);
        let dimms = dimm_modules_from_dmidecode(&dmi);
        assert_eq!(dimms.len(), 1);
        assert_eq!(dimms[0].locator, "DIMM_A1");
        assert_eq!(dimms[0].size, "64 GB");
        assert_eq!(dimms[0].configured_speed, "4400 MT/s");
        assert!(dimms[0].is_populated());
    }

    #[test]
    fn test_installed_memory_summary() {
        let dmi = format!(
            "{}Handle 0x0000, DMI type 0, 26 bytes\nBIOS Information\n\tVendor: Other\n\n",
            dmi_type17(&[
                ("NODE 1", "DIMM_A1", "64 GB"),
                ("NODE 1", "DIMM_B1", "64 GB"),
            ])
        );
        let outputs = outputs_with(&[(scripts::DMIDECODE, &dmi)]);
        assert_eq!(
            installed_memory_from_output(&outputs),
            "128GB (2x64GB DDR5 4800MT/s [4400MT/s])"
        );
    }

    #[test]
    fn test_dell_positions() {
        // 8 channels per socket on ICX: A1/A9 share channel 0
        let dmi = format!(
            "{}Handle 0x0000, DMI type 0, 26 bytes\nBIOS Information\n\tVendor: Dell Inc.\n\n",
            dmi_type17(&[
                ("Not Specified", "A1", "32 GB"),
                ("Not Specified", "A9", "32 GB"),
                ("Not Specified", "B2", "32 GB"),
            ])
        );
        let outputs = outputs_with(&[
            (scripts::DMIDECODE, &dmi),
            (scripts::LSCPU, LSCPU_ICX_2S),
        ]);
        let positions = dimm_positions_from_output(&outputs);
        assert_eq!(positions.len(), 3);
        assert_eq!(positions[0], DimmPosition { socket: "0".into(), channel: "0".into(), slot: "0".into() });
        assert_eq!(positions[1], DimmPosition { socket: "0".into(), channel: "0".into(), slot: "1".into() });
        assert_eq!(positions[2], DimmPosition { socket: "1".into(), channel: "1".into(), slot: "0".into() });
    }

    #[test]
    fn test_hpe_positions() {
        // 2 sockets x 8 channels x 2 slots = 32 DIMMs; spot-check the first
        let mut entries = Vec::new();
        for proc in 1..=2 {
            for dimm in 1..=16 {
                entries.push(("Not Specified".to_string(), format!("PROC {proc} DIMM {dimm}")));
            }
        }
        let refs: Vec<(&str, &str, &str)> = entries
            .iter()
            .map(|(b, l)| (b.as_str(), l.as_str(), "32 GB"))
            .collect();
        let dmi = format!(
            "{}Handle 0x0000, DMI type 0, 26 bytes\nBIOS Information\n\tVendor: HPE\n\n",
            dmi_type17(&refs)
        );
        let outputs = outputs_with(&[
            (scripts::DMIDECODE, &dmi),
            (scripts::LSCPU, LSCPU_ICX_2S),
        ]);
        let positions = dimm_positions_from_output(&outputs);
        assert_eq!(positions.len(), 32);
        // PROC 1 DIMM 1: socket 0, channel 0, odd DIMM below channel count -> slot 0
        assert_eq!(positions[0], DimmPosition { socket: "0".into(), channel: "0".into(), slot: "0".into() });
        // PROC 1 DIMM 2: channel 0, even DIMM below channel count -> slot 1
        assert_eq!(positions[1], DimmPosition { socket: "0".into(), channel: "0".into(), slot: "1".into() });
        // PROC 2 DIMM 16: socket 1, channel 7, even DIMM above channel count -> slot 0
        assert_eq!(positions[31], DimmPosition { socket: "1".into(), channel: "7".into(), slot: "0".into() });
    }

    #[test]
    fn test_ec2_c5_positions_skip_letter_i() {
        let dmi = format!(
            "{}Handle 0x0000, DMI type 0, 26 bytes\nBIOS Information\n\tVendor: Amazon EC2\n\n",
            dmi_type17(&[
                ("NODE 1", "DIMM_A0", "32 GB"),
                ("NODE 2", "DIMM_M0", "32 GB"),
            ])
        );
        let outputs = outputs_with(&[
            (scripts::DMIDECODE, &dmi),
            (scripts::LSCPU, LSCPU_ICX_2S),
        ]);
        let positions = dimm_positions_from_output(&outputs);
        assert_eq!(positions[0], DimmPosition { socket: "0".into(), channel: "0".into(), slot: "0".into() });
        // 'M' > 'I', so the channel index is relative to 'B': (M-B) % 8 = 3
        assert_eq!(positions[1], DimmPosition { socket: "1".into(), channel: "3".into(), slot: "0".into() });
    }

    #[test]
    fn test_generic_positions_icx_sdp() {
        let dmi = format!(
            "{}Handle 0x0000, DMI type 0, 26 bytes\nBIOS Information\n\tVendor: Intel Corporation\n\n",
            dmi_type17(&[
                ("NODE 0", "CPU0_DIMM_A1", "64 GB"),
                ("NODE 0", "CPU0_DIMM_B1", "64 GB"),
                ("NODE 1", "CPU1_DIMM_A1", "64 GB"),
            ])
        );
        let outputs = outputs_with(&[
            (scripts::DMIDECODE, &dmi),
            (scripts::LSCPU, LSCPU_ICX_2S),
        ]);
        let positions = dimm_positions_from_output(&outputs);
        assert_eq!(positions.len(), 3);
        assert_eq!(positions[0], DimmPosition { socket: "0".into(), channel: "0".into(), slot: "0".into() });
        assert_eq!(positions[1], DimmPosition { socket: "0".into(), channel: "1".into(), slot: "0".into() });
        assert_eq!(positions[2], DimmPosition { socket: "1".into(), channel: "0".into(), slot: "0".into() });
    }

    #[test]
    fn test_generic_positions_channel_overflow_rejected() {
        // 9 slot-0 DIMMs on one socket exceeds ICX's 8 channels
        let entries: Vec<(String, String)> = (0..9)
            .map(|i| {
                (
                    "NODE 0".to_string(),
                    format!("CPU0_DIMM_{}1", (b'A' + i) as char),
                )
            })
            .collect();
        let refs: Vec<(&str, &str, &str)> = entries
            .iter()
            .map(|(b, l)| (b.as_str(), l.as_str(), "64 GB"))
            .collect();
        let dmi = format!(
            "{}Handle 0x0000, DMI type 0, 26 bytes\nBIOS Information\n\tVendor: Intel Corporation\n\n",
            dmi_type17(&refs)
        );
        let outputs = outputs_with(&[
            (scripts::DMIDECODE, &dmi),
            (scripts::LSCPU, LSCPU_ICX_2S),
        ]);
        assert!(dimm_positions_from_output(&outputs).is_empty());
    }

    #[test]
    fn test_populated_channels() {
        let dmi = format!(
            "{}Handle 0x0000, DMI type 0, 26 bytes\nBIOS Information\n\tVendor: Intel Corporation\n\n",
            dmi_type17(&[
                ("NODE 0", "CPU0_DIMM_A1", "64 GB"),
                ("NODE 0", "CPU0_DIMM_B1", "No Module Installed"),
                ("NODE 1", "CPU1_DIMM_A1", "64 GB"),
            ])
        );
        let outputs = outputs_with(&[
            (scripts::DMIDECODE, &dmi),
            (scripts::LSCPU, LSCPU_ICX_2S),
        ]);
        assert_eq!(populated_channels_from_output(&outputs), "2");
    }

    #[test]
    fn test_dialect_detection_order() {
        // the Inspur pattern must win over the generic CPU/alpha pattern
        assert_eq!(
            LocatorDialect::detect("BANK 0", "CPU0_C0D0"),
            Some(LocatorDialect::InspurChannelDimm)
        );
        // SuperMicro locator wins over its (invalid) bank locator data
        assert_eq!(
            LocatorDialect::detect("P0_Node0_Channel0_Dimm0", "P1-DIMMA1"),
            Some(LocatorDialect::SuperMicroPDimm)
        );
        assert_eq!(LocatorDialect::detect("BANK 0", "SLOT 4"), None);
    }
}

// AvrSim - AVR Instruction-Set Simulator
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DeviceSnapshot {
    pub cpu: CpuSnapshot,
    pub registers: Vec<u8>,
    pub ports: Vec<PortSnapshot>,
    pub peripherals: BTreeMap<String, serde_json::Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CpuSnapshot {
    pub pc: u32,
    pub cycles: i32,
    pub total_cycles: u64,
    pub sreg: u8,
    pub sp: u16,
    /// Vector latched for entry, if any.
    pub pending_vector: Option<usize>,
    pub defer_irq: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PortSnapshot {
    pub name: String,
    pub port: u8,
    pub ddr: u8,
    pub pin: u8,
    /// Drive states, bit 7 first.
    pub drive: String,
}

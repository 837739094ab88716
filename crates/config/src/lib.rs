// AvrSim - AVR Instruction-Set Simulator
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

/// Default schema version for YAML configs
fn default_schema_version() -> String {
    "1.0".to_string()
}

fn default_clock_hz() -> u64 {
    4_000_000
}

fn default_zero_size() -> String {
    "0B".to_string()
}

/// Data-space address of a single I/O register.
pub type IoAddress = u16;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O address {addr:#06x} of '{owner}' is outside the I/O window {start:#06x}..{end:#06x}")]
    AddressOutsideIo {
        owner: String,
        addr: IoAddress,
        start: IoAddress,
        end: IoAddress,
    },
    #[error("I/O address {addr:#06x} is claimed twice ('{first}' and '{second}')")]
    DuplicateAddress {
        addr: IoAddress,
        first: String,
        second: String,
    },
    #[error("interrupt vector {vector} of '{owner}' is outside the {count}-entry table")]
    VectorOutOfRange {
        owner: String,
        vector: usize,
        count: usize,
    },
    #[error("interrupt table entry width must be 2 or 4 bytes, got {0}")]
    BadEntryWidth(u32),
    #[error("I/O window of {0} registers does not fit the 16-bit data space")]
    IoWindowTooLarge(usize),
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct InterruptTable {
    /// Number of vectors, including the reset vector.
    pub vectors: usize,
    /// Bytes per vector table entry (2 for RJMP tables, 4 for JMP tables).
    pub entry_bytes: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct StackPointerConfig {
    pub low: IoAddress,
    pub high: IoAddress,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct PortConfig {
    pub name: String,
    pub port: IoAddress,
    pub ddr: IoAddress,
    pub pin: IoAddress,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct AdcConfig {
    pub admux: IoAddress,
    pub adcsr: IoAddress,
    pub adch: IoAddress,
    pub adcl: IoAddress,
    pub vector: usize,
    /// Pin names for multiplexer inputs 0..7.
    pub channels: Vec<String>,
    /// Pin name of the analog reference.
    pub aref: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChipDescriptor {
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    pub name: String,
    #[serde(default = "default_clock_hz")]
    pub clock_hz: u64,
    pub flash: String, // e.g. "16KiB"
    pub ram: String,
    #[serde(default = "default_zero_size")]
    pub external_ram: String,
    #[serde(default = "default_zero_size")]
    pub eeprom: String,
    /// Number of I/O registers following the 32-byte register file.
    pub io_size: usize,
    pub interrupts: InterruptTable,
    pub status_register: IoAddress,
    pub stack_pointer: StackPointerConfig,
    #[serde(default)]
    pub ports: Vec<PortConfig>,
    /// Stand-alone pins that do not belong to a port, e.g. "AREF".
    #[serde(default)]
    pub pins: Vec<String>,
    #[serde(default)]
    pub adc: Option<AdcConfig>,
    #[serde(default)]
    pub abort_on_invalid_access: bool,
}

impl ChipDescriptor {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read chip descriptor {:?}", path))?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let chip: Self =
            serde_yaml::from_str(yaml).context("Failed to parse Chip Descriptor YAML")?;
        chip.validate()?;
        Ok(chip)
    }

    /// First data-space address past the I/O window.
    pub fn io_end(&self) -> std::result::Result<IoAddress, ConfigError> {
        self.io_size
            .checked_add(0x20)
            .and_then(|end| IoAddress::try_from(end).ok())
            .ok_or(ConfigError::IoWindowTooLarge(self.io_size))
    }

    /// Stand-alone pins whose name collides with a port pin (`<port><bit>`).
    /// The later registration replaces the port pin in name lookups.
    pub fn shadowed_pins(&self) -> Vec<&str> {
        let port_pins: HashSet<String> = self
            .ports
            .iter()
            .flat_map(|p| (0..8).map(move |bit| format!("{}{}", p.name, bit)))
            .collect();
        self.pins
            .iter()
            .filter(|name| port_pins.contains(name.as_str()))
            .map(String::as_str)
            .collect()
    }

    /// Every register address the descriptor claims, with its owner.
    pub fn claimed_addresses(&self) -> Vec<(String, IoAddress)> {
        let mut claimed = vec![
            ("SREG".to_string(), self.status_register),
            ("SPL".to_string(), self.stack_pointer.low),
            ("SPH".to_string(), self.stack_pointer.high),
        ];
        for port in &self.ports {
            claimed.push((format!("PORT{}", port.name), port.port));
            claimed.push((format!("DDR{}", port.name), port.ddr));
            claimed.push((format!("PIN{}", port.name), port.pin));
        }
        if let Some(adc) = &self.adc {
            claimed.push(("ADMUX".to_string(), adc.admux));
            claimed.push(("ADCSR".to_string(), adc.adcsr));
            claimed.push(("ADCH".to_string(), adc.adch));
            claimed.push(("ADCL".to_string(), adc.adcl));
        }
        claimed
    }

    pub fn validate(&self) -> Result<()> {
        if !matches!(self.interrupts.entry_bytes, 2 | 4) {
            return Err(ConfigError::BadEntryWidth(self.interrupts.entry_bytes).into());
        }

        let start: IoAddress = 0x20;
        let end = self.io_end()?;
        let mut seen: BTreeMap<IoAddress, String> = BTreeMap::new();
        for (owner, addr) in self.claimed_addresses() {
            if addr < start || addr >= end {
                return Err(ConfigError::AddressOutsideIo {
                    owner,
                    addr,
                    start,
                    end,
                }
                .into());
            }
            if let Some(first) = seen.get(&addr) {
                return Err(ConfigError::DuplicateAddress {
                    addr,
                    first: first.clone(),
                    second: owner,
                }
                .into());
            }
            seen.insert(addr, owner);
        }

        if let Some(adc) = &self.adc {
            if adc.vector >= self.interrupts.vectors {
                return Err(ConfigError::VectorOutOfRange {
                    owner: "adc".to_string(),
                    vector: adc.vector,
                    count: self.interrupts.vectors,
                }
                .into());
            }
            if adc.channels.len() != 8 {
                anyhow::bail!(
                    "ADC needs exactly 8 multiplexer channels, got {}",
                    adc.channels.len()
                );
            }
        }

        let mut names = HashSet::new();
        for port in &self.ports {
            if !names.insert(port.name.clone()) {
                anyhow::bail!("Port '{}' is declared twice", port.name);
            }
        }

        for pin in self.shadowed_pins() {
            tracing::warn!(
                "Pin '{}' of chip '{}' shadows the port pin of the same name",
                pin,
                self.name
            );
        }
        let mut extra = HashSet::new();
        for pin in &self.pins {
            if !extra.insert(pin.as_str()) {
                tracing::warn!("Pin '{}' of chip '{}' is declared twice", pin, self.name);
            }
        }

        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct PinConnection {
    pub a: String,
    pub b: String,
}

/// Per-run settings: which chip, where to stop, and what the outside world
/// drives onto the pins.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RunManifest {
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    pub chip: String, // Path to the chip descriptor, relative to the manifest
    #[serde(default)]
    pub breakpoints: Vec<u32>,
    #[serde(default)]
    pub termination_addresses: Vec<u32>,
    #[serde(default)]
    pub analog_inputs: BTreeMap<String, u32>,
    #[serde(default)]
    pub connections: Vec<PinConnection>,
    #[serde(default)]
    pub max_steps: Option<u64>,
}

impl RunManifest {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let f = std::fs::File::open(path.as_ref())
            .with_context(|| format!("Failed to open run manifest {:?}", path.as_ref()))?;
        serde_yaml::from_reader(f).context("Failed to parse Run Manifest")
    }
}

pub fn parse_size(size_str: &str) -> Result<u64> {
    use human_size::{Byte, Size, SpecificSize};
    let s: Size = size_str
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid size format '{}': {}", size_str, e))?;
    let bytes: SpecificSize<Byte> = s.into();
    Ok(bytes.value() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
name: "tiny"
flash: "8KiB"
ram: "512B"
io_size: 64
interrupts:
  vectors: 4
  entry_bytes: 2
status_register: 0x5f
stack_pointer:
  low: 0x5d
  high: 0x5e
"#;

    #[test]
    fn test_minimal_chip_parses_with_defaults() {
        let chip = ChipDescriptor::from_yaml(MINIMAL).unwrap();
        assert_eq!(chip.clock_hz, 4_000_000);
        assert_eq!(chip.external_ram, "0B");
        assert!(chip.ports.is_empty());
        assert!(chip.adc.is_none());
        assert!(!chip.abort_on_invalid_access);
        assert_eq!(chip.io_end(), Ok(0x60));
    }

    #[test]
    fn test_parse_size_binary_units() {
        assert_eq!(parse_size("16KiB").unwrap(), 16 * 1024);
        assert_eq!(parse_size("512B").unwrap(), 512);
        assert!(parse_size("lots").is_err());
    }

    #[test]
    fn test_register_outside_io_window_rejected() {
        let yaml = MINIMAL.replace("low: 0x5d", "low: 0x60");
        let err = ChipDescriptor::from_yaml(&yaml).unwrap_err();
        let cfg = err.downcast_ref::<ConfigError>().unwrap();
        assert!(matches!(cfg, ConfigError::AddressOutsideIo { addr: 0x60, .. }));
    }

    #[test]
    fn test_duplicate_register_rejected() {
        let yaml = MINIMAL.replace("high: 0x5e", "high: 0x5f");
        let err = ChipDescriptor::from_yaml(&yaml).unwrap_err();
        let cfg = err.downcast_ref::<ConfigError>().unwrap();
        assert!(matches!(cfg, ConfigError::DuplicateAddress { addr: 0x5f, .. }));
    }

    #[test]
    fn test_bad_entry_width_rejected() {
        let yaml = MINIMAL.replace("entry_bytes: 2", "entry_bytes: 3");
        let err = ChipDescriptor::from_yaml(&yaml).unwrap_err();
        assert_eq!(
            err.downcast_ref::<ConfigError>(),
            Some(&ConfigError::BadEntryWidth(3))
        );
    }

    #[test]
    fn test_oversized_io_window_rejected() {
        let yaml = MINIMAL.replace("io_size: 64", "io_size: 65536");
        let err = ChipDescriptor::from_yaml(&yaml).unwrap_err();
        assert_eq!(
            err.downcast_ref::<ConfigError>(),
            Some(&ConfigError::IoWindowTooLarge(65536))
        );

        let yaml = MINIMAL.replace("io_size: 64", "io_size: 65503");
        assert_eq!(
            ChipDescriptor::from_yaml(&yaml).unwrap().io_end(),
            Ok(0xFFFF)
        );
    }

    #[test]
    fn test_pin_shadowing_port_pin_is_reported() {
        let yaml = format!(
            "{}ports:\n  - {{ name: \"A\", port: 0x3b, ddr: 0x3a, pin: 0x39 }}\npins: [\"AREF\", \"A0\"]\n",
            MINIMAL
        );
        let chip = ChipDescriptor::from_yaml(&yaml).unwrap();
        assert_eq!(chip.shadowed_pins(), vec!["A0"]);
    }

    #[test]
    fn test_run_manifest_defaults() {
        let yaml = r#"
chip: "chips/atmega16.yaml"
analog_inputs:
  AREF: 5000
  A0: 1250
"#;
        let manifest: RunManifest = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(manifest.schema_version, "1.0");
        assert!(manifest.breakpoints.is_empty());
        assert_eq!(manifest.analog_inputs.get("A0"), Some(&1250));
        assert_eq!(manifest.max_steps, None);
    }
}

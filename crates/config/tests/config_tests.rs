// AvrSim - AVR Instruction-Set Simulator
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use avrsim_config::{parse_size, ChipDescriptor, RunManifest};
use std::path::PathBuf;

fn chips_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .unwrap()
        .parent()
        .unwrap()
        .join("configs/chips")
}

#[test]
fn test_shipped_chips_parse_and_validate() -> anyhow::Result<()> {
    for name in ["atmega16", "atmega32"] {
        let chip = ChipDescriptor::from_file(chips_dir().join(format!("{name}.yaml")))?;
        assert_eq!(chip.name, name);
        assert_eq!(chip.ports.len(), 4);
        assert_eq!(chip.interrupts.vectors, 21);
        let adc = chip.adc.as_ref().expect("adc section");
        assert_eq!(adc.vector, 14);
        assert_eq!(adc.channels[7], "A7");
    }
    Ok(())
}

#[test]
fn test_atmega32_memory_sizes() -> anyhow::Result<()> {
    let chip = ChipDescriptor::from_file(chips_dir().join("atmega32.yaml"))?;
    assert_eq!(parse_size(&chip.flash)?, 32 * 1024);
    assert_eq!(parse_size(&chip.ram)?, 2 * 1024);
    assert_eq!(parse_size(&chip.eeprom)?, 1024);
    assert_eq!(parse_size(&chip.external_ram)?, 0);
    Ok(())
}

#[test]
fn test_adc_needs_eight_channels() {
    let yaml = r#"
name: "broken"
flash: "8KiB"
ram: "512B"
io_size: 64
interrupts: { vectors: 21, entry_bytes: 4 }
status_register: 0x5f
stack_pointer: { low: 0x5d, high: 0x5e }
adc:
  admux: 0x27
  adcsr: 0x26
  adch: 0x25
  adcl: 0x24
  vector: 14
  channels: ["A0", "A1"]
  aref: "AREF"
"#;
    let err = ChipDescriptor::from_yaml(yaml).unwrap_err();
    assert!(err.to_string().contains("8 multiplexer channels"));
}

#[test]
fn test_run_manifest_from_file() -> anyhow::Result<()> {
    let dir = std::env::temp_dir().join(format!("avrsim-config-{}", std::process::id()));
    std::fs::create_dir_all(&dir)?;
    let path = dir.join("run.yaml");
    std::fs::write(
        &path,
        r#"
chip: "atmega16.yaml"
breakpoints: [0x10]
termination_addresses: [0x20]
connections:
  - { a: "A0", b: "B0" }
max_steps: 5000
"#,
    )?;
    let manifest = RunManifest::from_file(&path)?;
    assert_eq!(manifest.breakpoints, vec![0x10]);
    assert_eq!(manifest.termination_addresses, vec![0x20]);
    assert_eq!(manifest.connections[0].b, "B0");
    assert_eq!(manifest.max_steps, Some(5000));
    std::fs::remove_dir_all(&dir)?;
    Ok(())
}

// AvrSim - AVR Instruction-Set Simulator
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::bus::DataBus;
use crate::device::AvrDevice;
use crate::interrupt::{vector_table, InterruptController};
use crate::memory::store::{Eeprom, Flash};
use crate::memory::{ByteLane, MemoryLayout, RegisterSlot};
use crate::peripherals::adc::{Adc, AdcRegister};
use crate::peripherals::port::PortRegister;
use crate::signals::PinId;
use crate::DebugControl;
use anyhow::Context;
use avrsim_config::{parse_size, ChipDescriptor, RunManifest};
use std::path::Path;
use tracing::info;

fn map(bus: &mut DataBus, addr: u16, slot: RegisterSlot) -> anyhow::Result<()> {
    bus.map_register(addr as u32, slot)
        .with_context(|| format!("Failed to map {:?} at {:#06x}", slot, addr))?;
    Ok(())
}

/// Assemble a device from its chip descriptor and bring it out of reset.
pub fn build_device(chip: &ChipDescriptor) -> anyhow::Result<AvrDevice> {
    let flash_size = parse_size(&chip.flash)?;
    let ram_size = parse_size(&chip.ram)?;
    let eram_size = parse_size(&chip.external_ram)?;
    let eeprom_size = parse_size(&chip.eeprom)?;

    let layout = MemoryLayout {
        io_size: chip.io_size,
        iram_size: ram_size as usize,
        eram_size: eram_size as usize,
    };
    let irq = InterruptController::new(vector_table(
        chip.interrupts.vectors,
        chip.interrupts.entry_bytes,
    ));
    let mut bus = DataBus::new(layout, irq)
        .with_context(|| format!("Invalid memory layout for '{}'", chip.name))?;
    bus.set_abort_on_invalid_access(chip.abort_on_invalid_access);

    map(&mut bus, chip.status_register, RegisterSlot::Status)?;
    map(
        &mut bus,
        chip.stack_pointer.low,
        RegisterSlot::StackPointer(ByteLane::Low),
    )?;
    map(
        &mut bus,
        chip.stack_pointer.high,
        RegisterSlot::StackPointer(ByteLane::High),
    )?;

    for cfg in &chip.ports {
        let port = bus.add_port(&cfg.name);
        map(&mut bus, cfg.port, RegisterSlot::Port { port, reg: PortRegister::Port })?;
        map(&mut bus, cfg.ddr, RegisterSlot::Port { port, reg: PortRegister::Ddr })?;
        map(&mut bus, cfg.pin, RegisterSlot::Port { port, reg: PortRegister::Pin })?;
    }

    for name in &chip.pins {
        bus.signals.add_pin(name.as_str());
    }

    if let Some(cfg) = &chip.adc {
        let channels: Vec<PinId> = cfg
            .channels
            .iter()
            .map(|name| {
                bus.signals
                    .lookup(name)
                    .with_context(|| format!("ADC channel pin '{}'", name))
            })
            .collect::<anyhow::Result<_>>()?;
        let channels: [PinId; 8] = channels
            .try_into()
            .map_err(|v: Vec<PinId>| anyhow::anyhow!("ADC needs 8 channels, got {}", v.len()))?;
        let aref = bus
            .signals
            .lookup(&cfg.aref)
            .with_context(|| format!("ADC reference pin '{}'", cfg.aref))?;

        let id = bus.add_peripheral("adc", Box::new(Adc::new(channels, aref, cfg.vector)));
        bus.irq.attach(cfg.vector, "ADC", Some(id));
        for (addr, reg) in [
            (cfg.admux, AdcRegister::Admux),
            (cfg.adcsr, AdcRegister::Adcsr),
            (cfg.adch, AdcRegister::Adch),
            (cfg.adcl, AdcRegister::Adcl),
        ] {
            map(&mut bus, addr, RegisterSlot::Peripheral { id, reg: reg as u8 })?;
        }
    }

    let flash = Flash::new(flash_size as usize);
    let eeprom = Eeprom::new(eeprom_size as usize);
    let mut device = AvrDevice::new(bus, flash, eeprom, chip.clock_hz);
    device.reset();

    info!(
        "Assembled {}: {} bytes flash, {} bytes RAM, {} ports, {} peripherals",
        chip.name,
        flash_size,
        ram_size,
        chip.ports.len(),
        device.bus.peripherals.len()
    );
    Ok(device)
}

/// Wire the outside world described by a run manifest onto a device.
pub fn apply_manifest(device: &mut AvrDevice, manifest: &RunManifest) -> anyhow::Result<()> {
    for conn in &manifest.connections {
        let a = device.pin(&conn.a).context("Bad pin connection")?;
        let b = device.pin(&conn.b).context("Bad pin connection")?;
        device.bus.signals.connect(a, b);
    }
    for (name, value) in &manifest.analog_inputs {
        let pin = device.pin(name).context("Bad analog input")?;
        device.bus.signals.set_analog(pin, *value);
    }
    device.bus.propagate_signals();

    for addr in &manifest.breakpoints {
        device.add_breakpoint(*addr);
    }
    for addr in &manifest.termination_addresses {
        device.add_termination_address(*addr);
    }
    Ok(())
}

/// Load a run manifest, the chip it names (relative to the manifest), and
/// build the wired-up device.
pub fn load_run(manifest_path: &Path) -> anyhow::Result<(AvrDevice, RunManifest)> {
    info!("Loading run manifest: {:?}", manifest_path);
    let manifest = RunManifest::from_file(manifest_path)?;
    let chip_path = manifest_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(&manifest.chip);
    info!("Loading chip descriptor: {:?}", chip_path);
    let chip = ChipDescriptor::from_file(&chip_path)?;
    let mut device = build_device(&chip)?;
    apply_manifest(&mut device, &manifest)?;
    Ok((device, manifest))
}

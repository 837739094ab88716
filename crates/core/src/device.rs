// AvrSim - AVR Instruction-Set Simulator
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::bus::DataBus;
use crate::cpu::{pc_width_for_flash, CpuState, StatusRegister};
use crate::decoder::{Core, Execution};
use crate::interrupt::PendingInterrupt;
use crate::memory::store::{
    Eeprom, Flash, ProgramImage, SymbolTable, DATA_IMAGE_BASE, EEPROM_IMAGE_BASE, IMAGE_END,
};
use crate::memory::{RegisterSlot, ADDRESS_SPACE, REGISTER_FILE_SIZE};
use crate::peripherals::port::PortRegister;
use crate::signals::PinId;
use crate::snapshot::{CpuSnapshot, DeviceSnapshot, PortSnapshot};
use crate::{DebugControl, SimResult, SimulationError, StepOutcome, StepReport, StopReason};
use std::collections::BTreeSet;
use tracing::{debug, info, trace, warn};

/// Cycles spent pushing the return address on interrupt entry.
const IRQ_ENTRY_CYCLES: i32 = 4;

/// One simulated microcontroller: core, data bus, program and EEPROM stores.
#[derive(Debug)]
pub struct AvrDevice {
    pub cpu: CpuState,
    pub bus: DataBus,
    pub flash: Flash,
    pub eeprom: Eeprom,
    data_symbols: SymbolTable,
    breakpoints: BTreeSet<u32>,
    termination: BTreeSet<u32>,
    total_cycles: u64,
    clock_period_ns: u64,
}

impl AvrDevice {
    pub fn new(bus: DataBus, flash: Flash, eeprom: Eeprom, clock_hz: u64) -> Self {
        let pc_width = pc_width_for_flash(flash.size());
        Self {
            cpu: CpuState::new(pc_width),
            bus,
            flash,
            eeprom,
            data_symbols: SymbolTable::default(),
            breakpoints: BTreeSet::new(),
            termination: BTreeSet::new(),
            total_cycles: 0,
            clock_period_ns: 1_000_000_000 / clock_hz.max(1),
        }
    }

    pub fn clock_period_ns(&self) -> u64 {
        self.clock_period_ns
    }

    pub fn total_cycles(&self) -> u64 {
        self.total_cycles
    }

    pub fn sreg(&self) -> StatusRegister {
        self.bus.sreg()
    }

    fn report(&self, outcome: StepOutcome, wait: bool) -> StepReport {
        StepReport {
            outcome,
            core_step_finished: !(self.cpu.cycles > 0 || wait),
            next_step_in_ns: self.clock_period_ns,
        }
    }

    /// Advance the device by one clock cycle.
    ///
    /// Peripherals are ticked first. The core only dispatches once its cycle
    /// credits are used up and no peripheral holds it; a dispatch is either
    /// the entry into a latched interrupt or one instruction. After the
    /// dispatch the interrupt controller is polled and a new vector latched,
    /// to be taken after one more instruction.
    pub fn step(&mut self) -> SimResult<StepReport> {
        let wait = self.bus.tick_peripherals();
        self.total_cycles += 1;
        let mut outcome = StepOutcome::Normal;

        if self.cpu.cycles > 0 {
            trace!("pc={:#06x} wait state ({} left)", self.cpu.pc, self.cpu.cycles);
        } else if wait {
            trace!("pc={:#06x} core held by peripheral", self.cpu.pc);
        } else {
            let pc = self.cpu.pc;
            if self.breakpoints.contains(&pc) {
                debug!("Breakpoint at {:#x}", pc);
                return Ok(self.report(StepOutcome::Breakpoint(pc), wait));
            }
            if self.termination.contains(&pc) {
                info!("Simulation finished at {:#x}", pc);
                return Ok(self.report(StepOutcome::Finished, wait));
            }

            if let Some(pending) = self.cpu.pending_irq {
                if self.cpu.defer_irq {
                    self.cpu.defer_irq = false;
                } else {
                    self.enter_interrupt(pending)?;
                }
            }

            if self.cpu.cycles <= 0 {
                match self.execute()? {
                    Execution::Cycles(n) => self.cpu.cycles = n as i32,
                    Execution::Break => outcome = StepOutcome::Breakpoint(self.cpu.pc),
                }
            }

            if outcome == StepOutcome::Normal {
                self.cpu.pc = self.cpu.pc.wrapping_add(1);
            }

            if self.bus.sreg().contains(StatusRegister::I) && self.cpu.pending_irq.is_none() {
                if let Some(next) = self.bus.irq.first_pending_enabled() {
                    debug!("Latched interrupt vector {} -> {:#x}", next.vector, next.target_pc);
                    self.cpu.pending_irq = Some(next);
                    self.cpu.defer_irq = true;
                }
            }
        }

        self.cpu.cycles -= 1;
        Ok(self.report(outcome, wait))
    }

    fn execute(&mut self) -> SimResult<Execution> {
        let pc = self.cpu.pc;
        let instruction = self
            .flash
            .instruction(pc)
            .ok_or(SimulationError::PcOutOfFlash(pc << 1))?;
        trace!("pc={:#06x} {}", pc, instruction.mnemonic());
        let mut core = Core {
            cpu: &mut self.cpu,
            bus: &mut self.bus,
        };
        instruction.execute(&mut core)
    }

    fn enter_interrupt(&mut self, pending: PendingInterrupt) -> SimResult<()> {
        debug!(
            "Entering interrupt vector {} at {:#x}, return to {:#x}",
            pending.vector, pending.target_pc, self.cpu.pc
        );
        self.bus.start_interrupt(pending.vector);

        let mut ret = self.cpu.pc;
        for _ in 0..self.cpu.pc_width {
            self.bus.push((ret & 0xFF) as u8)?;
            ret >>= 8;
        }
        self.cpu.cycles = IRQ_ENTRY_CYCLES;
        self.bus.set_sreg(self.bus.sreg() - StatusRegister::I);
        self.cpu.pc = pending.target_pc.wrapping_sub(1);
        self.cpu.pending_irq = None;
        Ok(())
    }

    /// Peripherals reset in registration order, then core state is cleared.
    /// Memory contents, breakpoints and termination addresses survive.
    pub fn reset(&mut self) {
        self.bus.reset();
        self.cpu.reset();
        self.total_cycles = 0;
    }

    /// Route image sections and symbols to flash, data space or EEPROM by
    /// their unified address.
    pub fn load_image(&mut self, image: &ProgramImage) -> SimResult<()> {
        for section in &image.sections {
            let addr = section.address;
            match addr {
                a if a < DATA_IMAGE_BASE => self.flash.write_mem(&section.data, a)?,
                a if a < EEPROM_IMAGE_BASE => {
                    let offset = a - DATA_IMAGE_BASE;
                    if offset as usize + section.data.len() > ADDRESS_SPACE {
                        return Err(SimulationError::ImageOutOfRange {
                            store: "data",
                            addr: offset,
                            len: section.data.len(),
                        });
                    }
                    for (i, byte) in section.data.iter().enumerate() {
                        self.bus.write_u8(offset + i as u32, *byte)?;
                    }
                }
                a if a < IMAGE_END => {
                    self.eeprom.write_mem(&section.data, a - EEPROM_IMAGE_BASE)?
                }
                a => warn!(
                    "Skipping section at {:#x} ({} bytes): no store at that address",
                    a,
                    section.data.len()
                ),
            }
        }

        for sym in &image.symbols {
            match sym.address {
                a if a < DATA_IMAGE_BASE => self.flash.symbols_mut().add(&sym.name, a / 2),
                a if a < EEPROM_IMAGE_BASE => {
                    self.data_symbols.add(&sym.name, a - DATA_IMAGE_BASE)
                }
                a if a < IMAGE_END => self
                    .eeprom
                    .symbols_mut()
                    .add(&sym.name, a - EEPROM_IMAGE_BASE),
                a => warn!("Skipping symbol '{}' at {:#x}", sym.name, a),
            }
        }

        info!(
            "Loaded image: {} sections, {} symbols",
            image.sections.len(),
            image.symbols.len()
        );
        Ok(())
    }

    pub fn data_symbols(&self) -> &SymbolTable {
        &self.data_symbols
    }

    pub fn add_termination_address(&mut self, word_addr: u32) {
        self.termination.insert(word_addr);
    }

    /// Stop the simulation when PC reaches the flash symbol `name`.
    pub fn register_termination_symbol(&mut self, name: &str) -> SimResult<u32> {
        let addr = self
            .flash
            .symbols()
            .address_of(name)
            .ok_or_else(|| SimulationError::UnknownSymbol(name.to_string()))?;
        self.termination.insert(addr);
        Ok(addr)
    }

    pub fn pin(&self, name: &str) -> SimResult<PinId> {
        self.bus.signals.lookup(name)
    }

    /// Install a custom slot inside the I/O window.
    pub fn replace_io_register(
        &mut self,
        addr: u32,
        slot: RegisterSlot,
    ) -> SimResult<RegisterSlot> {
        self.bus.map_register(addr, slot)
    }

    pub fn snapshot(&self) -> DeviceSnapshot {
        let registers = (0..REGISTER_FILE_SIZE as u32)
            .map(|r| match self.bus.memory().slot(r) {
                Ok(RegisterSlot::Storage(v)) => *v,
                _ => 0,
            })
            .collect();

        DeviceSnapshot {
            cpu: CpuSnapshot {
                pc: self.cpu.pc,
                cycles: self.cpu.cycles,
                total_cycles: self.total_cycles,
                sreg: self.bus.sreg().bits(),
                sp: self.bus.sp(),
                pending_vector: self.cpu.pending_irq.map(|p| p.vector),
                defer_irq: self.cpu.defer_irq,
            },
            registers,
            ports: self
                .bus
                .ports()
                .iter()
                .map(|p| PortSnapshot {
                    name: p.name().to_string(),
                    port: p.read(PortRegister::Port),
                    ddr: p.read(PortRegister::Ddr),
                    pin: p.read(PortRegister::Pin),
                    drive: p.pin_string(&self.bus.signals),
                })
                .collect(),
            peripherals: self
                .bus
                .peripherals
                .iter()
                .map(|p| (p.name.clone(), p.dev.snapshot()))
                .collect(),
        }
    }
}

impl DebugControl for AvrDevice {
    fn add_breakpoint(&mut self, addr: u32) {
        self.breakpoints.insert(addr);
    }

    fn remove_breakpoint(&mut self, addr: u32) {
        self.breakpoints.remove(&addr);
    }

    fn clear_breakpoints(&mut self) {
        self.breakpoints.clear();
    }

    fn run(&mut self, max_steps: Option<u64>) -> SimResult<StopReason> {
        let mut steps = 0;
        loop {
            if let Some(max) = max_steps {
                if steps >= max {
                    return Ok(StopReason::MaxStepsReached);
                }
            }

            let report = self.step()?;
            steps += 1;

            match report.outcome {
                StepOutcome::Normal => {}
                StepOutcome::Breakpoint(pc) => return Ok(StopReason::Breakpoint(pc)),
                StepOutcome::Finished => return Ok(StopReason::Finished),
            }
        }
    }

    fn step_instruction(&mut self) -> SimResult<StopReason> {
        loop {
            let report = self.step()?;
            match report.outcome {
                StepOutcome::Breakpoint(pc) => return Ok(StopReason::Breakpoint(pc)),
                StepOutcome::Finished => return Ok(StopReason::Finished),
                StepOutcome::Normal if report.core_step_finished => {
                    return Ok(StopReason::StepDone)
                }
                StepOutcome::Normal => {}
            }
        }
    }

    fn read_memory(&mut self, addr: u32, len: usize) -> SimResult<Vec<u8>> {
        (0..len as u32).map(|i| self.bus.read_u8(addr + i)).collect()
    }

    fn write_memory(&mut self, addr: u32, data: &[u8]) -> SimResult<()> {
        for (i, byte) in data.iter().enumerate() {
            self.bus.write_u8(addr + i as u32, *byte)?;
        }
        Ok(())
    }

    fn get_pc(&self) -> u32 {
        self.cpu.pc
    }

    fn set_pc(&mut self, addr: u32) {
        self.cpu.pc = addr;
    }

    fn get_cycle_count(&self) -> u64 {
        self.total_cycles
    }

    fn reset(&mut self) {
        AvrDevice::reset(self);
    }
}

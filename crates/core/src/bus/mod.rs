// AvrSim - AVR Instruction-Set Simulator
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::cpu::StatusRegister;
use crate::interrupt::InterruptController;
use crate::memory::{ByteLane, MemoryLayout, MemorySpace, RegisterSlot, View};
use crate::peripherals::port::Port;
use crate::signals::SignalNetwork;
use crate::{Peripheral, PeripheralContext, PeripheralId, SimResult, SimulationError};

pub struct PeripheralEntry {
    pub name: String,
    pub dev: Box<dyn Peripheral>,
}

impl std::fmt::Debug for PeripheralEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeripheralEntry")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// The data-space register bus.
///
/// Owns every slot target: storage, the status register and stack pointer,
/// ports with their pins, and the peripheral registry. The registry order
/// is both the tick order and the reset order.
#[derive(Debug)]
pub struct DataBus {
    memory: MemorySpace,
    pub peripherals: Vec<PeripheralEntry>,
    ports: Vec<Port>,
    pub signals: SignalNetwork,
    pub irq: InterruptController,
    sreg: StatusRegister,
    sp: u16,
    abort_on_invalid_access: bool,
}

impl DataBus {
    pub fn new(layout: MemoryLayout, irq: InterruptController) -> SimResult<Self> {
        Ok(Self {
            memory: MemorySpace::new(layout)?,
            peripherals: Vec::new(),
            ports: Vec::new(),
            signals: SignalNetwork::new(),
            irq,
            sreg: StatusRegister::empty(),
            sp: 0,
            abort_on_invalid_access: false,
        })
    }

    pub fn memory(&self) -> &MemorySpace {
        &self.memory
    }

    pub fn set_abort_on_invalid_access(&mut self, abort: bool) {
        self.abort_on_invalid_access = abort;
    }

    pub fn add_peripheral(&mut self, name: &str, dev: Box<dyn Peripheral>) -> PeripheralId {
        self.peripherals.push(PeripheralEntry {
            name: name.to_string(),
            dev,
        });
        self.peripherals.len() - 1
    }

    /// Create a port named `name` with pins `<name>0`..`<name>7`.
    pub fn add_port(&mut self, name: &str) -> usize {
        self.ports.push(Port::new(name, &mut self.signals));
        self.ports.len() - 1
    }

    /// Install `slot` at an I/O address, returning the previous slot.
    pub fn map_register(&mut self, addr: u32, slot: RegisterSlot) -> SimResult<RegisterSlot> {
        self.memory.replace_io(addr, slot)
    }

    pub fn peripheral<T: 'static>(&self, name: &str) -> Option<&T> {
        self.peripherals
            .iter()
            .find(|p| p.name == name)
            .and_then(|p| p.dev.as_any())
            .and_then(|any| any.downcast_ref::<T>())
    }

    pub fn peripheral_mut<T: 'static>(&mut self, name: &str) -> Option<&mut T> {
        self.peripherals
            .iter_mut()
            .find(|p| p.name == name)
            .and_then(|p| p.dev.as_any_mut())
            .and_then(|any| any.downcast_mut::<T>())
    }

    pub fn ports(&self) -> &[Port] {
        &self.ports
    }

    pub fn port(&self, name: &str) -> Option<&Port> {
        self.ports.iter().find(|p| p.name() == name)
    }

    /// Overrides installed through this handle take effect on the next
    /// `propagate_signals`.
    pub fn port_mut(&mut self, name: &str) -> Option<&mut Port> {
        self.ports.iter_mut().find(|p| p.name() == name)
    }

    pub fn sreg(&self) -> StatusRegister {
        self.sreg
    }

    pub fn set_sreg(&mut self, sreg: StatusRegister) {
        self.sreg = sreg;
    }

    pub fn sp(&self) -> u16 {
        self.sp
    }

    pub fn set_sp(&mut self, sp: u16) {
        self.sp = sp;
    }

    fn invalid_access(&self, addr: u32, write: Option<u8>) -> SimResult<()> {
        if self.abort_on_invalid_access {
            return Err(SimulationError::InvalidAccess(addr));
        }
        match write {
            Some(value) => tracing::warn!(
                "Write {:#04x} to unimplemented register {:#06x} discarded",
                value,
                addr
            ),
            None => tracing::warn!("Read from unimplemented register {:#06x}, returning 0", addr),
        }
        Ok(())
    }

    fn port_at(&mut self, index: usize, addr: u32) -> SimResult<&mut Port> {
        self.ports
            .get_mut(index)
            .ok_or(SimulationError::InvalidAccess(addr))
    }

    pub fn read_u8(&mut self, addr: u32) -> SimResult<u8> {
        let slot = *self.memory.slot(addr)?;
        match slot {
            RegisterSlot::Storage(value) => Ok(value),
            RegisterSlot::Invalid => self.invalid_access(addr, None).map(|_| 0),
            RegisterSlot::Status => Ok(self.sreg.bits()),
            RegisterSlot::StackPointer(ByteLane::Low) => Ok(self.sp as u8),
            RegisterSlot::StackPointer(ByteLane::High) => Ok((self.sp >> 8) as u8),
            RegisterSlot::Port { port, reg } => Ok(self.port_at(port, addr)?.read(reg)),
            RegisterSlot::Peripheral { id, reg } => {
                let Self {
                    peripherals,
                    irq,
                    signals,
                    ..
                } = self;
                let entry = peripherals
                    .get_mut(id)
                    .ok_or(SimulationError::InvalidAccess(addr))?;
                let mut ctx = PeripheralContext { irq, signals };
                entry.dev.read(reg, &mut ctx)
            }
        }
    }

    pub fn write_u8(&mut self, addr: u32, value: u8) -> SimResult<()> {
        let slot = *self.memory.slot(addr)?;
        match slot {
            RegisterSlot::Storage(_) => {
                *self.memory.slot_mut(addr)? = RegisterSlot::Storage(value);
                Ok(())
            }
            RegisterSlot::Invalid => self.invalid_access(addr, Some(value)),
            RegisterSlot::Status => {
                self.sreg = StatusRegister::from_bits_retain(value);
                Ok(())
            }
            RegisterSlot::StackPointer(ByteLane::Low) => {
                self.sp = (self.sp & 0xFF00) | value as u16;
                Ok(())
            }
            RegisterSlot::StackPointer(ByteLane::High) => {
                self.sp = (self.sp & 0x00FF) | ((value as u16) << 8);
                Ok(())
            }
            RegisterSlot::Port { port, reg } => {
                if self.port_at(port, addr)?.write(reg, value) {
                    self.propagate_signals();
                }
                Ok(())
            }
            RegisterSlot::Peripheral { id, reg } => {
                let Self {
                    peripherals,
                    irq,
                    signals,
                    ..
                } = self;
                let entry = peripherals
                    .get_mut(id)
                    .ok_or(SimulationError::InvalidAccess(addr))?;
                let mut ctx = PeripheralContext { irq, signals };
                entry.dev.write(reg, value, &mut ctx)
            }
        }
    }

    pub fn read_u16(&mut self, addr: u32) -> SimResult<u16> {
        let lo = self.read_u8(addr)? as u16;
        let hi = self.read_u8(addr + 1)? as u16;
        Ok(lo | (hi << 8))
    }

    pub fn write_u16(&mut self, addr: u32, value: u16) -> SimResult<()> {
        self.write_u8(addr, (value & 0xFF) as u8)?;
        self.write_u8(addr + 1, (value >> 8) as u8)
    }

    pub fn read_view(&mut self, view: View, index: u32) -> SimResult<u8> {
        let addr = self.memory.absolute(view, index)?;
        self.read_u8(addr)
    }

    pub fn write_view(&mut self, view: View, index: u32, value: u8) -> SimResult<()> {
        let addr = self.memory.absolute(view, index)?;
        self.write_u8(addr, value)
    }

    /// Store at SP, then decrement.
    pub fn push(&mut self, value: u8) -> SimResult<()> {
        self.write_u8(self.sp as u32, value)?;
        self.sp = self.sp.wrapping_sub(1);
        Ok(())
    }

    /// Increment SP, then load.
    pub fn pop(&mut self) -> SimResult<u8> {
        self.sp = self.sp.wrapping_add(1);
        self.read_u8(self.sp as u32)
    }

    /// Tick every peripheral once, in registration order. Returns true if
    /// any of them holds the core this cycle.
    pub fn tick_peripherals(&mut self) -> bool {
        let Self {
            peripherals,
            irq,
            signals,
            ..
        } = self;
        let mut ctx = PeripheralContext { irq, signals };
        let mut wait = false;
        for p in peripherals.iter_mut() {
            let res = p.dev.tick(&mut ctx);
            if res.wait_cycles > 0 {
                tracing::trace!("{} holds the core for {} cycles", p.name, res.wait_cycles);
                wait = true;
            }
        }
        wait
    }

    /// Acknowledge `vector` at the controller and tell its owner.
    pub fn start_interrupt(&mut self, vector: usize) {
        let Some(owner) = self.irq.begin_service(vector) else {
            return;
        };
        let Self {
            peripherals,
            irq,
            signals,
            ..
        } = self;
        if let Some(entry) = peripherals.get_mut(owner) {
            let mut ctx = PeripheralContext { irq, signals };
            entry.dev.interrupt_started(vector, &mut ctx);
        }
    }

    /// Output pass on every port, then input pass on every port.
    pub fn propagate_signals(&mut self) {
        for port in &self.ports {
            port.calc_outputs(&mut self.signals);
        }
        for port in &mut self.ports {
            port.calc_pin(&self.signals);
        }
    }

    pub fn reset(&mut self) {
        self.irq.reset();
        self.sreg = StatusRegister::empty();
        self.sp = 0;
        for port in &mut self.ports {
            port.reset();
        }

        let Self {
            peripherals,
            irq,
            signals,
            ..
        } = self;
        let mut ctx = PeripheralContext { irq, signals };
        for p in peripherals.iter_mut() {
            p.dev.reset(&mut ctx);
        }

        self.propagate_signals();
    }
}

// AvrSim - AVR Instruction-Set Simulator
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::interrupt::PendingInterrupt;

bitflags::bitflags! {
    /// SREG.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct StatusRegister: u8 {
        const C = 1 << 0;
        const Z = 1 << 1;
        const N = 1 << 2;
        const V = 1 << 3;
        const S = 1 << 4;
        const H = 1 << 5;
        const T = 1 << 6;
        /// Global interrupt enable.
        const I = 1 << 7;
    }
}

/// Flash above 128 KiB needs a 22-bit PC, which is pushed as 3 bytes.
pub fn pc_width_for_flash(flash_bytes: usize) -> u8 {
    if flash_bytes > 128 * 1024 {
        3
    } else {
        2
    }
}

/// Core bookkeeping owned by the step engine.
///
/// The status register and stack pointer are not here: they live on the data
/// bus as register slots so plain loads and stores observe them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CpuState {
    /// Word address of the next instruction.
    pub pc: u32,
    /// Cycle credits left before the next dispatch; the core may dispatch
    /// when this is <= 0.
    pub cycles: i32,
    /// Vector latched after the last instruction, taken at a later step.
    pub pending_irq: Option<PendingInterrupt>,
    /// Lets one more instruction run before `pending_irq` is taken.
    pub defer_irq: bool,
    /// Bytes pushed for a return address.
    pub pc_width: u8,
}

impl CpuState {
    pub fn new(pc_width: u8) -> Self {
        Self {
            pc: 0,
            cycles: 0,
            pending_irq: None,
            defer_irq: false,
            pc_width,
        }
    }

    pub fn reset(&mut self) {
        self.pc = 0;
        self.cycles = 0;
        self.pending_irq = None;
        self.defer_irq = false;
    }
}

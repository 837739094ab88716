// AvrSim - AVR Instruction-Set Simulator
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

pub mod avr;

use crate::bus::DataBus;
use crate::cpu::{CpuState, StatusRegister};
use crate::SimResult;

pub use avr::{decode_avr, AvrDecoder, Instruction as AvrInstruction};

/// What executing one decoded instruction produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Execution {
    /// Cycle cost of the instruction (at least 1).
    Cycles(u32),
    /// Software breakpoint; PC stays on the instruction.
    Break,
}

/// The parts of the device an instruction may touch.
pub struct Core<'a> {
    pub cpu: &'a mut CpuState,
    pub bus: &'a mut DataBus,
}

impl Core<'_> {
    pub fn reg(&mut self, r: u8) -> SimResult<u8> {
        self.bus.read_u8(r as u32)
    }

    pub fn set_reg(&mut self, r: u8, value: u8) -> SimResult<()> {
        self.bus.write_u8(r as u32, value)
    }

    pub fn sreg(&self) -> StatusRegister {
        self.bus.sreg()
    }

    pub fn set_sreg(&mut self, sreg: StatusRegister) {
        self.bus.set_sreg(sreg)
    }
}

/// An opcode already decoded into something executable.
pub trait DecodedInstruction: std::fmt::Debug + Send {
    fn execute(&self, core: &mut Core<'_>) -> SimResult<Execution>;
    fn mnemonic(&self) -> String;
}

/// Turns flash words into executable instructions. `next` is the following
/// flash word, needed by two-word instructions.
pub trait Decoder: std::fmt::Debug + Send {
    fn decode(&self, opcode: u16, next: u16) -> Box<dyn DecodedInstruction>;
}

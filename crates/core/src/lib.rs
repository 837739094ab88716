// AvrSim - AVR Instruction-Set Simulator
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

pub mod bus;
pub mod cpu;
pub mod decoder;
pub mod device;
pub mod interrupt;
pub mod memory;
pub mod peripherals;
pub mod signals;
pub mod snapshot;
pub mod system;

use std::any::Any;


pub use bus::DataBus;
pub use device::AvrDevice;
pub use interrupt::InterruptController;
pub use signals::SignalNetwork;

#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    #[error("Address {0:#06x} is outside the data space")]
    AddressOutOfRange(u32),
    #[error("Access to unimplemented register at {0:#06x}")]
    InvalidAccess(u32),
    #[error("Cannot replace register at {addr:#06x}: outside the I/O window {start:#06x}..{end:#06x}")]
    ReplaceOutsideIo { addr: u32, start: u32, end: u32 },
    #[error("Memory layout needs {needed:#x} bytes but the address space has {available:#x}")]
    LayoutTooLarge { needed: usize, available: usize },
    #[error("Simulation runs out of flash space at {0:#x}")]
    PcOutOfFlash(u32),
    #[error("Illegal opcode {opcode:#06x} at word address {pc:#x}")]
    IllegalOpcode { pc: u32, opcode: u16 },
    #[error("Image section at {addr:#x} ({len} bytes) does not fit in {store}")]
    ImageOutOfRange {
        store: &'static str,
        addr: u32,
        len: usize,
    },
    #[error("Unknown pin requested: {0}")]
    UnknownPin(String),
    #[error("Unknown symbol: {0}")]
    UnknownSymbol(String),
}

pub type SimResult<T> = Result<T, SimulationError>;

/// Index of a peripheral in the device's registry.
pub type PeripheralId = usize;

/// What a peripheral reports back after observing one core cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PeripheralTickResult {
    /// Cycles the peripheral holds the core for; 0 when it leaves the bus free.
    pub wait_cycles: u32,
}

/// Everything a peripheral may touch besides its own state.
///
/// The signal network is read-only here: pin drive states are only changed by
/// the port output/input passes run by the bus.
pub struct PeripheralContext<'a> {
    pub irq: &'a mut InterruptController,
    pub signals: &'a SignalNetwork,
}

/// A register-backed device attached to the data bus.
///
/// `reg` is the peripheral-local register index given when the slot was
/// mapped, not a data-space address. Reads take `&mut self` because several
/// AVR registers change state when read.
pub trait Peripheral: std::fmt::Debug + Send {
    fn read(&mut self, reg: u8, ctx: &mut PeripheralContext<'_>) -> SimResult<u8>;
    fn write(&mut self, reg: u8, value: u8, ctx: &mut PeripheralContext<'_>) -> SimResult<()>;

    /// Observe exactly one core cycle.
    fn tick(&mut self, _ctx: &mut PeripheralContext<'_>) -> PeripheralTickResult {
        PeripheralTickResult::default()
    }

    fn reset(&mut self, _ctx: &mut PeripheralContext<'_>) {}

    /// Called when the core starts servicing a vector this peripheral owns.
    fn interrupt_started(&mut self, _vector: usize, _ctx: &mut PeripheralContext<'_>) {}

    fn as_any(&self) -> Option<&dyn Any> {
        None
    }
    fn as_any_mut(&mut self) -> Option<&mut dyn Any> {
        None
    }
    fn snapshot(&self) -> serde_json::Value {
        serde_json::Value::Null
    }
}

/// Result of a single `AvrDevice::step` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Normal,
    /// PC sits on a breakpoint (or a BREAK instruction ran); PC is not advanced.
    Breakpoint(u32),
    /// PC reached a termination address.
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepReport {
    pub outcome: StepOutcome,
    /// True once the current instruction (or interrupt entry) has used up
    /// its cycles and no peripheral is holding the core.
    pub core_step_finished: bool,
    /// Simulated time until the next step is meaningful.
    pub next_step_in_ns: u64,
}

/// Trait for controlling the device in debug mode
pub trait DebugControl {
    fn add_breakpoint(&mut self, addr: u32);
    fn remove_breakpoint(&mut self, addr: u32);
    fn clear_breakpoints(&mut self);

    /// Run until breakpoint, termination address or steps limit
    fn run(&mut self, max_steps: Option<u64>) -> SimResult<StopReason>;

    /// Step until the current instruction has completed
    fn step_instruction(&mut self) -> SimResult<StopReason>;

    fn read_memory(&mut self, addr: u32, len: usize) -> SimResult<Vec<u8>>;
    fn write_memory(&mut self, addr: u32, data: &[u8]) -> SimResult<()>;

    fn get_pc(&self) -> u32;
    fn set_pc(&mut self, addr: u32);
    fn get_cycle_count(&self) -> u64;
    fn reset(&mut self);
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub enum StopReason {
    Breakpoint(u32),
    Finished,
    StepDone,
    MaxStepsReached,
}

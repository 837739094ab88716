// AvrSim - AVR Instruction-Set Simulator
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Unified data space.
//!
//! | Address Range           | Content                       |
//! |-------------------------|-------------------------------|
//! | 0x0000..0x001F          | Register file R0-R31          |
//! | 0x0020..0x0020+io_size  | I/O registers (trap by default) |
//! | next iram_size bytes    | Internal SRAM                 |
//! | next eram_size bytes    | External SRAM                 |
//! | rest up to 0xFFFF       | Trap fill                     |

pub mod store;

use crate::peripherals::port::PortRegister;
use crate::{PeripheralId, SimResult, SimulationError};
use std::ops::Range;

pub const REGISTER_FILE_SIZE: usize = 32;
pub const IO_OFFSET: usize = 0x20;
pub const ADDRESS_SPACE: usize = 0x10000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteLane {
    Low,
    High,
}

/// What answers at one data-space address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterSlot {
    /// Plain byte storage (register file and RAM).
    Storage(u8),
    /// Unimplemented address; every access is reported.
    Invalid,
    Status,
    StackPointer(ByteLane),
    Port { port: usize, reg: PortRegister },
    Peripheral { id: PeripheralId, reg: u8 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryLayout {
    pub io_size: usize,
    pub iram_size: usize,
    pub eram_size: usize,
}

impl MemoryLayout {
    pub fn io_range(&self) -> Range<usize> {
        IO_OFFSET..IO_OFFSET + self.io_size
    }

    pub fn iram_start(&self) -> usize {
        IO_OFFSET + self.io_size
    }

    pub fn eram_start(&self) -> usize {
        self.iram_start() + self.iram_size
    }

    pub fn used(&self) -> usize {
        self.eram_start() + self.eram_size
    }
}

/// Named windows onto the one slot array. The register file and data views
/// both start at 0, so `LDS` can reach R0-R31.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    RegisterFile,
    Io,
    Data,
}

#[derive(Debug)]
pub struct MemorySpace {
    slots: Vec<RegisterSlot>,
    layout: MemoryLayout,
}

impl MemorySpace {
    pub fn new(layout: MemoryLayout) -> SimResult<Self> {
        let needed = layout.used();
        if needed > ADDRESS_SPACE {
            return Err(SimulationError::LayoutTooLarge {
                needed,
                available: ADDRESS_SPACE,
            });
        }

        let mut slots = Vec::with_capacity(ADDRESS_SPACE);
        slots.resize(REGISTER_FILE_SIZE, RegisterSlot::Storage(0));
        slots.resize(layout.iram_start(), RegisterSlot::Invalid);
        slots.resize(needed, RegisterSlot::Storage(0));
        slots.resize(ADDRESS_SPACE, RegisterSlot::Invalid);

        Ok(Self { slots, layout })
    }

    pub fn layout(&self) -> MemoryLayout {
        self.layout
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slot(&self, addr: u32) -> SimResult<&RegisterSlot> {
        self.slots
            .get(addr as usize)
            .ok_or(SimulationError::AddressOutOfRange(addr))
    }

    pub fn slot_mut(&mut self, addr: u32) -> SimResult<&mut RegisterSlot> {
        self.slots
            .get_mut(addr as usize)
            .ok_or(SimulationError::AddressOutOfRange(addr))
    }

    /// Install `slot` at `addr`, returning the one it replaces. Only the I/O
    /// window may be rewired.
    pub fn replace_io(&mut self, addr: u32, slot: RegisterSlot) -> SimResult<RegisterSlot> {
        let window = self.layout.io_range();
        if !window.contains(&(addr as usize)) {
            return Err(SimulationError::ReplaceOutsideIo {
                addr,
                start: window.start as u32,
                end: window.end as u32,
            });
        }
        Ok(std::mem::replace(&mut self.slots[addr as usize], slot))
    }

    /// Translate a view-relative index into a data-space address.
    pub fn absolute(&self, view: View, index: u32) -> SimResult<u32> {
        let (offset, size) = match view {
            View::RegisterFile => (0, REGISTER_FILE_SIZE),
            View::Io => (IO_OFFSET, self.layout.io_size),
            View::Data => (0, self.slots.len()),
        };
        if (index as usize) < size {
            Ok(offset as u32 + index)
        } else {
            Err(SimulationError::AddressOutOfRange(offset as u32 + index))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> MemoryLayout {
        MemoryLayout {
            io_size: 64,
            iram_size: 1024,
            eram_size: 0,
        }
    }

    #[test]
    fn test_layout_regions() {
        let mem = MemorySpace::new(layout()).unwrap();
        assert_eq!(mem.len(), ADDRESS_SPACE);
        assert_eq!(*mem.slot(0x1F).unwrap(), RegisterSlot::Storage(0));
        assert_eq!(*mem.slot(0x20).unwrap(), RegisterSlot::Invalid);
        assert_eq!(*mem.slot(0x5F).unwrap(), RegisterSlot::Invalid);
        assert_eq!(*mem.slot(0x60).unwrap(), RegisterSlot::Storage(0));
        assert_eq!(*mem.slot(0x45F).unwrap(), RegisterSlot::Storage(0));
        assert_eq!(*mem.slot(0x460).unwrap(), RegisterSlot::Invalid);
        assert_eq!(*mem.slot(0xFFFF).unwrap(), RegisterSlot::Invalid);
        assert!(matches!(
            mem.slot(0x10000),
            Err(SimulationError::AddressOutOfRange(0x10000))
        ));
    }

    #[test]
    fn test_layout_too_large() {
        let err = MemorySpace::new(MemoryLayout {
            io_size: 64,
            iram_size: 0xFFFF,
            eram_size: 0,
        })
        .unwrap_err();
        assert!(matches!(err, SimulationError::LayoutTooLarge { .. }));
    }

    #[test]
    fn test_replace_only_inside_io_window() {
        let mut mem = MemorySpace::new(layout()).unwrap();
        let old = mem.replace_io(0x3B, RegisterSlot::Status).unwrap();
        assert_eq!(old, RegisterSlot::Invalid);
        assert_eq!(*mem.slot(0x3B).unwrap(), RegisterSlot::Status);

        for addr in [0x00, 0x1F, 0x60, 0x200] {
            assert!(matches!(
                mem.replace_io(addr, RegisterSlot::Status),
                Err(SimulationError::ReplaceOutsideIo { start: 0x20, end: 0x60, .. })
            ));
        }
        // rejected replacements leave RAM untouched
        assert_eq!(*mem.slot(0x60).unwrap(), RegisterSlot::Storage(0));
    }

    #[test]
    fn test_views_share_backing_array() {
        let mem = MemorySpace::new(layout()).unwrap();
        assert_eq!(mem.absolute(View::RegisterFile, 5).unwrap(), 5);
        assert_eq!(mem.absolute(View::Data, 5).unwrap(), 5);
        assert_eq!(mem.absolute(View::Io, 0x1F).unwrap(), 0x3F);
        assert!(mem.absolute(View::RegisterFile, 32).is_err());
        assert!(mem.absolute(View::Io, 64).is_err());
    }
}

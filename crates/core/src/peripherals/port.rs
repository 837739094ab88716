// AvrSim - AVR Instruction-Set Simulator
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::signals::{DriveState, PinId, SignalNetwork};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum PortRegister {
    Port,
    Ddr,
    Pin,
}

/// An 8-bit I/O port.
///
/// Peripherals that take over a pin do so through the alternate masks; the
/// PORT and DDR registers themselves are never touched by an override.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Port {
    name: String,
    #[serde(skip)]
    pins: [PinId; 8],
    port: u8,
    ddr: u8,
    /// Input latch, refreshed by `calc_pin`.
    pin: u8,
    alternate_port: u8,
    alternate_ddr: u8,
    use_alternate_port: u8,
    use_alternate_ddr: u8,
    /// Alternate output, but only on bits whose DDR says output.
    use_alternate_port_if_ddr_set: u8,
}

impl Port {
    /// Registers pins `<name>0`..`<name>7` on `signals`.
    pub fn new(name: &str, signals: &mut SignalNetwork) -> Self {
        let pins = std::array::from_fn(|bit| signals.add_pin(format!("{}{}", name, bit)));
        Self {
            name: name.to_string(),
            pins,
            port: 0,
            ddr: 0,
            pin: 0,
            alternate_port: 0,
            alternate_ddr: 0,
            use_alternate_port: 0,
            use_alternate_ddr: 0,
            use_alternate_port_if_ddr_set: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pin_id(&self, bit: usize) -> Option<PinId> {
        self.pins.get(bit).copied()
    }

    pub fn read(&self, reg: PortRegister) -> u8 {
        match reg {
            PortRegister::Port => self.port,
            PortRegister::Ddr => self.ddr,
            PortRegister::Pin => self.pin,
        }
    }

    /// Returns true when the write changed something the outputs depend on.
    pub fn write(&mut self, reg: PortRegister, value: u8) -> bool {
        match reg {
            PortRegister::Port => {
                self.port = value;
                true
            }
            PortRegister::Ddr => {
                self.ddr = value;
                true
            }
            PortRegister::Pin => {
                tracing::warn!(
                    "Write {:#04x} to PIN{} ignored: register is read-only",
                    value,
                    self.name
                );
                false
            }
        }
    }

    pub fn reset(&mut self) {
        self.port = 0;
        self.ddr = 0;
        self.pin = 0;
        self.alternate_port = 0;
        self.alternate_ddr = 0;
        self.use_alternate_port = 0;
        self.use_alternate_ddr = 0;
        self.use_alternate_port_if_ddr_set = 0;
    }

    /// Drive the bits in `mask` from `value` instead of PORT.
    pub fn set_alternate_port(&mut self, mask: u8, value: u8) {
        self.use_alternate_port |= mask;
        self.alternate_port = (self.alternate_port & !mask) | (value & mask);
    }

    /// Take the direction of the bits in `mask` from `value` instead of DDR.
    pub fn set_alternate_ddr(&mut self, mask: u8, value: u8) {
        self.use_alternate_ddr |= mask;
        self.alternate_ddr = (self.alternate_ddr & !mask) | (value & mask);
    }

    /// Drive the bits in `mask` from `value` while DDR marks them as output.
    pub fn set_alternate_port_if_output(&mut self, mask: u8, value: u8) {
        self.use_alternate_port_if_ddr_set |= mask;
        self.alternate_port = (self.alternate_port & !mask) | (value & mask);
    }

    /// Hand the bits in `mask` back to the port registers.
    pub fn release_alternate(&mut self, mask: u8) {
        self.use_alternate_port &= !mask;
        self.use_alternate_ddr &= !mask;
        self.use_alternate_port_if_ddr_set &= !mask;
    }

    /// Effective (direction, output) of one bit after overrides.
    fn effective(&self, bit: u8) -> (bool, bool) {
        if self.use_alternate_port_if_ddr_set & bit != 0 {
            if self.ddr & bit != 0 {
                (true, self.alternate_port & bit != 0)
            } else {
                (false, false)
            }
        } else {
            let ddr = if self.use_alternate_ddr & bit != 0 {
                self.alternate_ddr
            } else {
                self.ddr
            };
            let port = if self.use_alternate_port & bit != 0 {
                self.alternate_port
            } else {
                self.port
            };
            (ddr & bit != 0, port & bit != 0)
        }
    }

    /// Push the effective drive state of every bit onto its pin.
    pub fn calc_outputs(&self, signals: &mut SignalNetwork) {
        for (n, pin) in self.pins.iter().enumerate() {
            let state = match self.effective(1 << n) {
                (true, true) => DriveState::High,
                (true, false) => DriveState::Low,
                (false, true) => DriveState::PullUp,
                (false, false) => DriveState::Tristate,
            };
            signals.set_drive(*pin, state);
        }
    }

    /// Latch the resolved net values into the PIN register.
    pub fn calc_pin(&mut self, signals: &SignalNetwork) {
        self.pin = self
            .pins
            .iter()
            .enumerate()
            .filter(|(_, id)| bool::from(signals.resolve(**id)))
            .fold(0, |acc, (n, _)| acc | (1 << n));
    }

    /// Drive states, bit 7 first: `H`/`L` driven, `h` pull-up, `t` tri-state.
    pub fn pin_string(&self, signals: &SignalNetwork) -> String {
        self.pins
            .iter()
            .rev()
            .map(|id| match signals.pin(*id).drive() {
                DriveState::High => 'H',
                DriveState::Low => 'L',
                DriveState::PullUp => 'h',
                DriveState::Tristate => 't',
            })
            .collect()
    }
}

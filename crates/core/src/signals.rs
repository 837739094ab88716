// AvrSim - AVR Instruction-Set Simulator
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::{SimResult, SimulationError};
use std::collections::HashMap;

/// How a single pin is being driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub enum DriveState {
    Low,
    High,
    PullUp,
    #[default]
    Tristate,
}

/// Resolved logical value of a net.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum Level {
    Low,
    High,
    /// Nothing drives or pulls the net.
    Floating,
}

impl From<bool> for Level {
    fn from(b: bool) -> Self {
        if b {
            Level::High
        } else {
            Level::Low
        }
    }
}

impl From<Level> for bool {
    fn from(level: Level) -> Self {
        matches!(level, Level::High)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
pub struct PinId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
pub struct NetId(usize);

#[derive(Debug, Clone)]
pub struct Pin {
    name: String,
    drive: DriveState,
    analog: Option<u32>,
    net: NetId,
}

impl Pin {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn drive(&self) -> DriveState {
        self.drive
    }

    pub fn analog(&self) -> Option<u32> {
        self.analog
    }

    pub fn net(&self) -> NetId {
        self.net
    }
}

#[derive(Debug, Clone, Default)]
struct Net {
    pins: Vec<PinId>,
}

/// Arena of every pin and net of one device.
///
/// Each pin starts on a net of its own; `connect` merges nets while the
/// device is being assembled. Topology is fixed after that, only electrical
/// state changes.
#[derive(Debug, Default)]
pub struct SignalNetwork {
    pins: Vec<Pin>,
    nets: Vec<Net>,
    names: HashMap<String, PinId>,
}

impl SignalNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_pin(&mut self, name: impl Into<String>) -> PinId {
        let name = name.into();
        let id = PinId(self.pins.len());
        let net = NetId(self.nets.len());
        self.nets.push(Net { pins: vec![id] });
        self.pins.push(Pin {
            name: name.clone(),
            drive: DriveState::Tristate,
            analog: None,
            net,
        });
        if self.names.insert(name.clone(), id).is_some() {
            tracing::warn!("Pin name '{}' registered twice; the newer pin wins", name);
        }
        id
    }

    pub fn lookup(&self, name: &str) -> SimResult<PinId> {
        self.names
            .get(name)
            .copied()
            .ok_or_else(|| SimulationError::UnknownPin(name.to_string()))
    }

    pub fn pin(&self, id: PinId) -> &Pin {
        &self.pins[id.0]
    }

    pub fn pin_count(&self) -> usize {
        self.pins.len()
    }

    /// Join the nets of `a` and `b`.
    pub fn connect(&mut self, a: PinId, b: PinId) {
        let keep = self.pins[a.0].net;
        let gone = self.pins[b.0].net;
        if keep == gone {
            return;
        }
        let moved = std::mem::take(&mut self.nets[gone.0].pins);
        for id in &moved {
            self.pins[id.0].net = keep;
        }
        self.nets[keep.0].pins.extend(moved);
    }

    pub fn net_pins(&self, net: NetId) -> &[PinId] {
        &self.nets[net.0].pins
    }

    pub fn set_drive(&mut self, id: PinId, state: DriveState) {
        self.pins[id.0].drive = state;
    }

    pub fn set_analog(&mut self, id: PinId, value: u32) {
        self.pins[id.0].analog = Some(value);
    }

    pub fn clear_analog(&mut self, id: PinId) {
        self.pins[id.0].analog = None;
    }

    /// Combine every driver on `net`.
    ///
    /// Explicit LOW/HIGH drivers beat pull-ups. When LOW and HIGH drivers
    /// disagree the last one in net order wins and the clash is logged.
    pub fn resolve_net(&self, net: NetId) -> Level {
        let mut driven: Option<DriveState> = None;
        let mut conflict = false;
        let mut pulled_up = false;

        for id in &self.nets[net.0].pins {
            match self.pins[id.0].drive {
                state @ (DriveState::Low | DriveState::High) => {
                    if driven.is_some_and(|prev| prev != state) {
                        conflict = true;
                    }
                    driven = Some(state);
                }
                DriveState::PullUp => pulled_up = true,
                DriveState::Tristate => {}
            }
        }

        if conflict {
            let names: Vec<&str> = self.nets[net.0]
                .pins
                .iter()
                .map(|id| self.pins[id.0].name.as_str())
                .collect();
            tracing::warn!(
                "Conflicting LOW/HIGH drivers on net {:?} {:?}; last driver wins",
                net,
                names
            );
        }

        match driven {
            Some(DriveState::High) => Level::High,
            Some(_) => Level::Low,
            None if pulled_up => Level::High,
            None => Level::Floating,
        }
    }

    pub fn resolve(&self, pin: PinId) -> Level {
        self.resolve_net(self.pins[pin.0].net)
    }

    /// Analog value seen at `pin`: its own value if set, otherwise the first
    /// value set anywhere on its net, otherwise 0.
    pub fn analog(&self, pin: PinId) -> u32 {
        let p = &self.pins[pin.0];
        if let Some(v) = p.analog {
            return v;
        }
        self.nets[p.net.0]
            .pins
            .iter()
            .find_map(|id| self.pins[id.0].analog)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn network_with(n: usize) -> (SignalNetwork, Vec<PinId>) {
        let mut net = SignalNetwork::new();
        let ids = (0..n).map(|i| net.add_pin(format!("P{i}"))).collect();
        (net, ids)
    }

    #[test]
    fn test_level_bool_conversion() {
        assert_eq!(Level::from(true), Level::High);
        let b: bool = Level::Floating.into();
        assert!(!b);
        let b: bool = Level::High.into();
        assert!(b);
    }

    #[test]
    fn test_unconnected_pin_floats() {
        let (net, ids) = network_with(1);
        assert_eq!(net.resolve(ids[0]), Level::Floating);
    }

    #[test]
    fn test_high_beats_tristate() {
        let (mut net, ids) = network_with(3);
        net.connect(ids[0], ids[1]);
        net.connect(ids[1], ids[2]);
        net.set_drive(ids[1], DriveState::High);
        for id in &ids {
            assert_eq!(net.resolve(*id), Level::High);
        }
    }

    #[test]
    fn test_low_driver_beats_pullup() {
        let (mut net, ids) = network_with(2);
        net.connect(ids[0], ids[1]);
        net.set_drive(ids[0], DriveState::PullUp);
        assert_eq!(net.resolve(ids[1]), Level::High);
        net.set_drive(ids[1], DriveState::Low);
        assert_eq!(net.resolve(ids[0]), Level::Low);
    }

    #[test]
    fn test_conflicting_drivers_resolve_to_last_in_net_order() {
        let (mut net, ids) = network_with(2);
        net.connect(ids[0], ids[1]);
        net.set_drive(ids[0], DriveState::High);
        net.set_drive(ids[1], DriveState::Low);
        assert_eq!(net.resolve(ids[0]), Level::Low);

        net.set_drive(ids[0], DriveState::Low);
        net.set_drive(ids[1], DriveState::High);
        assert_eq!(net.resolve(ids[0]), Level::High);
    }

    #[test]
    fn test_connect_merges_whole_nets() {
        let (mut net, ids) = network_with(4);
        net.connect(ids[0], ids[1]);
        net.connect(ids[2], ids[3]);
        net.connect(ids[1], ids[3]);
        let shared = net.pin(ids[0]).net();
        for id in &ids {
            assert_eq!(net.pin(*id).net(), shared);
        }
        assert_eq!(net.net_pins(shared).len(), 4);
        // connecting twice is harmless
        net.connect(ids[3], ids[0]);
        assert_eq!(net.net_pins(shared).len(), 4);
    }

    #[test]
    fn test_analog_falls_back_to_net() {
        let (mut net, ids) = network_with(2);
        assert_eq!(net.analog(ids[0]), 0);
        net.connect(ids[0], ids[1]);
        net.set_analog(ids[1], 3300);
        assert_eq!(net.analog(ids[0]), 3300);
        net.set_analog(ids[0], 1200);
        assert_eq!(net.analog(ids[0]), 1200);
        net.clear_analog(ids[0]);
        assert_eq!(net.analog(ids[0]), 3300);
    }

    #[test]
    fn test_lookup_unknown_pin_fails() {
        let (net, _) = network_with(1);
        assert!(net.lookup("P0").is_ok());
        assert!(matches!(
            net.lookup("Q9"),
            Err(SimulationError::UnknownPin(name)) if name == "Q9"
        ));
    }
}

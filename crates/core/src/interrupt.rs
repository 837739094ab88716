// AvrSim - AVR Instruction-Set Simulator
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::PeripheralId;

/// Word addresses of every vector in a table of `count` entries, each
/// `entry_bytes` wide (2 for RJMP tables, 4 for JMP tables).
pub fn vector_table(count: usize, entry_bytes: u32) -> Vec<u32> {
    (0..count as u32).map(|i| i * entry_bytes / 2).collect()
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct InterruptSource {
    pub name: String,
    pub target_pc: u32,
    pub enabled: bool,
    pub pending: bool,
    #[serde(skip)]
    pub owner: Option<PeripheralId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingInterrupt {
    pub vector: usize,
    pub target_pc: u32,
}

/// Static-priority interrupt controller.
///
/// Priority is the vector index: when several sources are pending and
/// enabled the lowest index always wins, regardless of arrival order.
/// Pending and enable flags are independent of each other.
#[derive(Debug, Clone)]
pub struct InterruptController {
    sources: Vec<InterruptSource>,
}

impl InterruptController {
    /// `targets` holds the service-routine word address of each vector.
    pub fn new(targets: Vec<u32>) -> Self {
        let sources = targets
            .into_iter()
            .enumerate()
            .map(|(i, target_pc)| InterruptSource {
                name: format!("vector{}", i),
                target_pc,
                enabled: false,
                pending: false,
                owner: None,
            })
            .collect();
        Self { sources }
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn source(&self, vector: usize) -> Option<&InterruptSource> {
        self.sources.get(vector)
    }

    fn source_mut(&mut self, vector: usize) -> Option<&mut InterruptSource> {
        let src = self.sources.get_mut(vector);
        if src.is_none() {
            tracing::warn!("Interrupt vector {} does not exist", vector);
        }
        src
    }

    /// Name a vector and record which peripheral is told when it is serviced.
    pub fn attach(&mut self, vector: usize, name: &str, owner: Option<PeripheralId>) {
        if let Some(src) = self.source_mut(vector) {
            src.name = name.to_string();
            src.owner = owner;
        }
    }

    pub fn set_pending(&mut self, vector: usize) {
        if let Some(src) = self.source_mut(vector) {
            src.pending = true;
        }
    }

    pub fn clear_pending(&mut self, vector: usize) {
        if let Some(src) = self.source_mut(vector) {
            src.pending = false;
        }
    }

    pub fn set_enabled(&mut self, vector: usize, enabled: bool) {
        if let Some(src) = self.source_mut(vector) {
            src.enabled = enabled;
        }
    }

    pub fn is_pending(&self, vector: usize) -> bool {
        self.sources.get(vector).is_some_and(|s| s.pending)
    }

    pub fn is_enabled(&self, vector: usize) -> bool {
        self.sources.get(vector).is_some_and(|s| s.enabled)
    }

    pub fn first_pending_enabled(&self) -> Option<PendingInterrupt> {
        self.sources
            .iter()
            .enumerate()
            .find(|(_, s)| s.pending && s.enabled)
            .map(|(vector, s)| PendingInterrupt {
                vector,
                target_pc: s.target_pc,
            })
    }

    /// Mark `vector` as being serviced: its pending flag drops and the owning
    /// peripheral (if any) is returned so it can clear its own flag.
    pub fn begin_service(&mut self, vector: usize) -> Option<PeripheralId> {
        let src = self.source_mut(vector)?;
        src.pending = false;
        src.owner
    }

    pub fn reset(&mut self) {
        for src in &mut self.sources {
            src.pending = false;
            src.enabled = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller() -> InterruptController {
        InterruptController::new(vector_table(8, 4))
    }

    #[test]
    fn test_vector_table_word_addresses() {
        assert_eq!(vector_table(4, 4), vec![0, 2, 4, 6]);
        assert_eq!(vector_table(4, 2), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_nothing_pending() {
        let irq = controller();
        assert_eq!(irq.first_pending_enabled(), None);
    }

    #[test]
    fn test_lowest_index_wins_regardless_of_arrival() {
        let mut irq = controller();
        irq.set_enabled(3, true);
        irq.set_enabled(5, true);
        irq.set_pending(5);
        irq.set_pending(3);
        assert_eq!(
            irq.first_pending_enabled(),
            Some(PendingInterrupt {
                vector: 3,
                target_pc: 6
            })
        );

        irq.clear_pending(3);
        assert_eq!(irq.first_pending_enabled().map(|p| p.vector), Some(5));
    }

    #[test]
    fn test_pending_without_enable_is_ignored() {
        let mut irq = controller();
        irq.set_pending(2);
        assert_eq!(irq.first_pending_enabled(), None);
        irq.set_enabled(2, true);
        assert_eq!(irq.first_pending_enabled().map(|p| p.vector), Some(2));
    }

    #[test]
    fn test_disable_keeps_pending() {
        let mut irq = controller();
        irq.set_enabled(4, true);
        irq.set_pending(4);
        irq.set_enabled(4, false);
        assert!(irq.is_pending(4));
        assert_eq!(irq.first_pending_enabled(), None);
    }

    #[test]
    fn test_begin_service_clears_pending_and_returns_owner() {
        let mut irq = controller();
        irq.attach(6, "ADC", Some(2));
        irq.set_enabled(6, true);
        irq.set_pending(6);
        assert_eq!(irq.begin_service(6), Some(2));
        assert!(!irq.is_pending(6));
        assert!(irq.is_enabled(6));
        assert_eq!(irq.source(6).unwrap().name, "ADC");
    }

    #[test]
    fn test_unknown_vector_is_ignored() {
        let mut irq = controller();
        irq.set_pending(99);
        assert!(!irq.is_pending(99));
        assert_eq!(irq.begin_service(99), None);
    }

    #[test]
    fn test_reset_clears_flags() {
        let mut irq = controller();
        irq.set_enabled(1, true);
        irq.set_pending(1);
        irq.reset();
        assert!(!irq.is_pending(1));
        assert!(!irq.is_enabled(1));
    }
}

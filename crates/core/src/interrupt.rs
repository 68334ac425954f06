// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::rc::Rc;

/// Trait representing the platform interrupt controller a device is wired to.
///
/// The switch chips only drive levels; routing and acknowledgement belong to
/// whatever sits behind this trait.
pub trait InterruptController: Debug {
    /// Signal the controller that an interrupt line has changed level.
    fn set_interrupt_pending(&self, irq: u32, pending: bool);

    /// Current level of a line as seen by the controller.
    fn is_interrupt_active(&self, irq: u32) -> bool;
}

/// A resolved link to one input of an interrupt controller.
#[derive(Debug, Clone)]
pub struct IrqLine {
    controller: Rc<dyn InterruptController>,
    irq: u32,
}

impl IrqLine {
    pub fn new(controller: Rc<dyn InterruptController>, irq: u32) -> Self {
        Self { controller, irq }
    }

    pub fn number(&self) -> u32 {
        self.irq
    }

    pub fn raise(&self) {
        self.controller.set_interrupt_pending(self.irq, true);
    }

    pub fn lower(&self) {
        self.controller.set_interrupt_pending(self.irq, false);
    }

    pub fn set_level(&self, level: bool) {
        self.controller.set_interrupt_pending(self.irq, level);
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct PinState {
    pub level: bool,
    pub rising_edges: u32,
    pub falling_edges: u32,
}

/// Level-tracking interrupt controller used by the machine builder.
///
/// Records the current level of every line plus how many times it moved,
/// so scripts and tests can check edge behaviour.
#[derive(Debug, Default)]
pub struct IrqPins {
    pins: RefCell<BTreeMap<u32, PinState>>,
}

impl IrqPins {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a line number into a link handle.
    pub fn line(self: &Rc<Self>, irq: u32) -> IrqLine {
        IrqLine::new(self.clone(), irq)
    }

    pub fn pin(&self, irq: u32) -> PinState {
        self.pins.borrow().get(&irq).copied().unwrap_or_default()
    }

    pub fn pins(&self) -> BTreeMap<u32, PinState> {
        self.pins.borrow().clone()
    }
}

impl InterruptController for IrqPins {
    fn set_interrupt_pending(&self, irq: u32, pending: bool) {
        let mut pins = self.pins.borrow_mut();
        let pin = pins.entry(irq).or_default();
        match (pin.level, pending) {
            (false, true) => pin.rising_edges += 1,
            (true, false) => pin.falling_edges += 1,
            _ => {}
        }
        pin.level = pending;
    }

    fn is_interrupt_active(&self, irq: u32) -> bool {
        self.pin(irq).level
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pins_count_edges() {
        let pins = Rc::new(IrqPins::new());
        let line = pins.line(7);

        line.raise();
        line.raise();
        line.lower();
        line.set_level(true);

        let pin = pins.pin(7);
        assert!(pin.level);
        assert_eq!(pin.rising_edges, 2);
        assert_eq!(pin.falling_edges, 1);
        assert!(pins.is_interrupt_active(7));
        assert!(!pins.is_interrupt_active(8));
    }
}

// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Scripted second bus master for the PCA9541.
//!
//! Each mode replays one contention scenario from the datasheet. A driver
//! that keeps claiming and releasing the bus walks through all of them in
//! turn: every release (a CONTROL write that leaves the bus off) moves to
//! the next mode.

use super::pca9541::Pca9541Regs;
use crate::regs::{self, ControlState, Istat};
use serde::{Deserialize, Serialize};

/// What the simulated other master is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OtherMasterMode {
    /// Just let the driver have the bus.
    #[default]
    BusoffGiveOwnership,
    /// Request ownership before the driver does.
    BusoffRequestOwnership,
    /// Request ownership before the driver and let the arbitration time out.
    BusoffArbTimeout,
    /// The driver owns the bus.
    BusonYouOwnIt,
    /// The other master owns the bus and gives it up on the next try.
    BusonIOwnIt,
    /// The other master owns the bus and never gives it up.
    BusonIOwnItTimeout,
}

impl OtherMasterMode {
    pub const ALL: [Self; 6] = [
        Self::BusoffGiveOwnership,
        Self::BusoffRequestOwnership,
        Self::BusoffArbTimeout,
        Self::BusonYouOwnIt,
        Self::BusonIOwnIt,
        Self::BusonIOwnItTimeout,
    ];

    pub fn next(self) -> Self {
        match self {
            Self::BusoffGiveOwnership => Self::BusoffRequestOwnership,
            Self::BusoffRequestOwnership => Self::BusoffArbTimeout,
            Self::BusoffArbTimeout => Self::BusonYouOwnIt,
            Self::BusonYouOwnIt => Self::BusonIOwnIt,
            Self::BusonIOwnIt => Self::BusonIOwnItTimeout,
            Self::BusonIOwnItTimeout => Self::BusoffGiveOwnership,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtherMasterEvent {
    ControlRead,
    IstatRead,
    /// Carries the CONTROL value about to be committed.
    ControlWrite(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OtherMaster {
    enabled: bool,
    mode: OtherMasterMode,
    control_reads: i32,
}

impl OtherMaster {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            mode: OtherMasterMode::default(),
            control_reads: 0,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn mode(&self) -> OtherMasterMode {
        self.mode
    }

    pub fn control_read_count(&self) -> i32 {
        self.control_reads
    }

    /// Jump straight to a scenario with a fresh read counter.
    pub fn set_mode(&mut self, mode: OtherMasterMode) {
        self.mode = mode;
        self.control_reads = 0;
    }

    pub fn restore(&mut self, mode: OtherMasterMode, control_reads: i32) {
        self.mode = mode;
        self.control_reads = control_reads;
    }

    pub fn reset(&mut self) {
        self.set_mode(OtherMasterMode::default());
    }

    fn next_state(&mut self, regs: &mut Pca9541Regs) {
        self.mode = self.mode.next();
        regs.istat &= !Istat::NMYTEST.bits();
        self.control_reads = 0;
        tracing::debug!("pca9541: other master now {:?}", self.mode);
    }

    fn next_state_on_busoff(&mut self, regs: &mut Pca9541Regs, newval: u8) {
        if !ControlState::decode(newval).bus_on {
            self.next_state(regs);
        }
    }

    /// React to a register access. A no-op unless simulation is enabled.
    pub fn work(&mut self, regs: &mut Pca9541Regs, event: OtherMasterEvent) {
        if !self.enabled {
            return;
        }

        tracing::debug!(
            "pca9541: other master {:?} event {:?} ctrl={:#04x} istat={:#04x}",
            self.mode,
            event,
            regs.control,
            regs.istat
        );

        if event == OtherMasterEvent::ControlRead {
            self.control_reads += 1;
        }
        let first_read = self.control_reads == 1;

        use OtherMasterEvent::*;
        use OtherMasterMode::*;
        match (self.mode, event) {
            (BusonIOwnItTimeout, ControlWrite(_)) => self.next_state(regs),
            (_, ControlWrite(newval)) => self.next_state_on_busoff(regs, newval),

            (BusoffGiveOwnership | BusoffRequestOwnership, ControlRead) => {
                if first_read {
                    regs.control = regs::set_bus_off(regs.control);
                }
            }
            (BusoffArbTimeout, ControlRead) => {
                if first_read {
                    regs.control = regs::set_bus_off(regs.control);
                }
                regs.istat |= Istat::NMYTEST.bits();
            }
            (BusonYouOwnIt, ControlRead) => {
                regs.control = regs::set_have_control(regs::set_bus_on(regs.control));
            }
            (BusonIOwnIt, ControlRead) => {
                regs.control = if first_read {
                    regs::set_not_have_control(regs::set_bus_on(regs.control))
                } else {
                    regs::set_bus_off(regs.control)
                };
            }
            (BusonIOwnItTimeout, ControlRead) => {
                regs.control = regs::set_not_have_control(regs::set_bus_on(regs.control));
            }

            // On first pass the other master raises its test interrupt,
            // on the second it drops it and lets the driver through.
            (BusoffRequestOwnership, IstatRead) => {
                regs.istat = regs::toggle_if(regs.istat, true, Istat::NMYTEST.bits());
            }
            (_, IstatRead) => {}
        }
    }
}

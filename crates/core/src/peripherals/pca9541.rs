// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use super::other_master::{OtherMaster, OtherMasterEvent, OtherMasterMode};
use crate::bus::I2cBus;
use crate::interrupt::IrqLine;
use crate::regs::{apply_masked, Control, ControlState, Ienable, Istat};
use crate::signals::IrqSignaler;
use crate::smbus::SmbusDevice;
use crate::topology::{ChannelProxy, ProxyTable};
use crate::{
    ConfigError, I2cError, I2cEvent, I2cResult, I2cSlave, SimResult, SimulationError, SlaveHandle,
};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::rc::Rc;

/// Pointer bit selecting auto-increment.
pub const PCA9541_AUTO_INC: u8 = 1 << 4;

pub const IENABLE_REG: usize = 0;
pub const CONTROL_REG: usize = 1;
pub const ISTAT_REG: usize = 2;

const POINTER_REG_BITS: u8 = 0x03;

/// Raw register file of the arbiter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Pca9541Regs {
    pub curr_regnum: u8,
    pub ienable: u8,
    pub control: u8,
    pub istat: u8,
}

impl Pca9541Regs {
    pub fn control_state(&self) -> ControlState {
        ControlState::decode(self.control)
    }

    /// Register the pointer currently addresses.
    pub fn current_reg(&self) -> usize {
        ((self.curr_regnum & POINTER_REG_BITS) % 3) as usize
    }

    /// Register for this access; moves the pointer on when auto-increment is set.
    fn next_reg(&mut self) -> usize {
        let reg = self.current_reg();
        let next = if self.curr_regnum & PCA9541_AUTO_INC != 0 {
            (reg + 1) % 3
        } else {
            reg
        };
        self.curr_regnum = (self.curr_regnum & !POINTER_REG_BITS) | next as u8;
        reg
    }

    /// Level the INT output should have.
    pub fn irq_asserted(&self) -> bool {
        self.istat & (!self.ienable | Istat::ALWAYS_ON.bits()) != 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pca9541Snapshot {
    pub curr_regnum: u8,
    pub ienable: u8,
    pub control: u8,
    pub istat: u8,
    pub irq_raised: bool,
    pub om_mode: OtherMasterMode,
    pub control_read_count: i32,
}

#[derive(Debug, Clone, Default)]
pub struct Pca9541Config {
    /// Drive the registers as if a second master were contending.
    pub sim_other_master: bool,
    pub irq: Option<IrqLine>,
    /// Refuse to build without `irq`.
    pub irq_required: bool,
}

/// NXP PCA9541 2-to-1 I2C master selector.
///
/// Our side of the chip is master 0; the competing master is either absent
/// or simulated by [`OtherMaster`].
#[derive(Debug)]
pub struct Pca9541 {
    regs: Rc<RefCell<Pca9541Regs>>,
    other_master: OtherMaster,
    irq: IrqSignaler,
    bus: I2cBus,
    topology: Rc<RefCell<ProxyTable<Pca9541Master>>>,
}

impl Pca9541 {
    pub fn new(upstream: &I2cBus, config: Pca9541Config) -> Result<Self, ConfigError> {
        let name = format!("{}-pca9541", upstream.name());
        if config.irq_required && config.irq.is_none() {
            return Err(ConfigError::MissingInterrupt(name));
        }

        let regs = Rc::new(RefCell::new(Pca9541Regs::default()));
        let proxy_regs = regs.clone();
        let topology = Rc::new(RefCell::new(ProxyTable::new(
            name.clone(),
            upstream.clone(),
            1,
            move || Pca9541Master::new(proxy_regs.clone()),
        )));
        let bus = I2cBus::new(name);
        ProxyTable::install(&topology, &bus, 0);

        Ok(Self {
            regs,
            other_master: OtherMaster::new(config.sim_other_master),
            irq: IrqSignaler::new(config.irq),
            bus,
            topology,
        })
    }

    pub fn bus(&self) -> &I2cBus {
        &self.bus
    }

    pub fn regs(&self) -> Pca9541Regs {
        *self.regs.borrow()
    }

    pub fn control_state(&self) -> ControlState {
        self.regs.borrow().control_state()
    }

    pub fn irq_raised(&self) -> bool {
        self.irq.is_raised()
    }

    pub fn other_master(&self) -> &OtherMaster {
        &self.other_master
    }

    pub fn set_other_master_mode(&mut self, mode: OtherMasterMode) {
        self.other_master.set_mode(mode);
    }

    pub fn proxy_addresses(&self) -> Vec<u8> {
        self.topology.borrow().addresses()
    }

    /// Load the register pointer (first byte of every write).
    pub fn set_pointer(&mut self, value: u8) {
        self.regs.borrow_mut().curr_regnum = value;
    }

    pub fn write_register(&mut self, value: u8) {
        let mut regs = self.regs.borrow_mut();
        let reg = regs.next_reg();
        tracing::debug!("pca9541: write reg {} val={:#04x}", reg, value);

        match reg {
            IENABLE_REG => {
                regs.ienable = value & Ienable::WRITE_MASK.bits();
            }
            CONTROL_REG => {
                let val = value & Control::WRITE_MASK.bits();

                // TESTON and ISTAT.MYTEST share a bit position.
                regs.istat = apply_masked(regs.istat, val, Control::TESTON.bits());

                let newval = apply_masked(regs.control, val, Control::WRITE_MASK.bits());
                self.other_master
                    .work(&mut regs, OtherMasterEvent::ControlWrite(newval));
                regs.control = newval;

                if val & Control::BUSINIT.bits() != 0 && regs.control_state().enabled {
                    regs.istat |= Istat::BUSINIT.bits();
                }
            }
            _ => {
                tracing::warn!("pca9541: ignoring write {:#04x} to ISTAT", value);
            }
        }

        let asserted = regs.irq_asserted();
        drop(regs);
        self.irq.update(asserted);
    }

    pub fn read_register(&mut self) -> u8 {
        let mut regs = self.regs.borrow_mut();
        let reg = regs.next_reg();

        let value = match reg {
            IENABLE_REG => regs.ienable,
            CONTROL_REG => {
                self.other_master
                    .work(&mut regs, OtherMasterEvent::ControlRead);
                regs.control
            }
            _ => {
                self.other_master
                    .work(&mut regs, OtherMasterEvent::IstatRead);
                let value = regs.istat;
                regs.istat &= !Istat::CLEAR_ON_READ.bits();
                value
            }
        };
        tracing::debug!("pca9541: read reg {} val={:#04x}", reg, value);

        let asserted = regs.irq_asserted();
        drop(regs);
        self.irq.update(asserted);
        value
    }
}

impl SmbusDevice for Pca9541 {
    fn write_data(&mut self, data: &[u8]) {
        let Some((&pointer, values)) = data.split_first() else {
            return;
        };
        self.set_pointer(pointer);
        for &value in values {
            self.write_register(value);
        }
    }

    fn receive_byte(&mut self) -> u8 {
        self.read_register()
    }

    fn reset(&mut self) {
        *self.regs.borrow_mut() = Pca9541Regs::default();
        self.other_master.reset();
        self.irq.reset();
    }

    fn snapshot(&self) -> serde_json::Value {
        let regs = self.regs.borrow();
        serde_json::to_value(Pca9541Snapshot {
            curr_regnum: regs.curr_regnum,
            ienable: regs.ienable,
            control: regs.control,
            istat: regs.istat,
            irq_raised: self.irq.is_raised(),
            om_mode: self.other_master.mode(),
            control_read_count: self.other_master.control_read_count(),
        })
        .unwrap_or(serde_json::Value::Null)
    }

    fn restore(&mut self, state: serde_json::Value) -> SimResult<()> {
        let snap: Pca9541Snapshot =
            serde_json::from_value(state).map_err(|e| SimulationError::InvalidSnapshot {
                device: "pca9541".to_string(),
                reason: e.to_string(),
            })?;
        *self.regs.borrow_mut() = Pca9541Regs {
            curr_regnum: snap.curr_regnum,
            ienable: snap.ienable,
            control: snap.control,
            istat: snap.istat,
        };
        self.other_master
            .restore(snap.om_mode, snap.control_read_count);
        self.irq.restore(snap.irq_raised);
        Ok(())
    }
}

/// Upstream stand-in for one address behind the arbiter.
///
/// Traffic only passes while our side owns the downstream bus.
#[derive(Debug)]
pub struct Pca9541Master {
    regs: Rc<RefCell<Pca9541Regs>>,
    slave: Option<SlaveHandle>,
}

impl Pca9541Master {
    fn new(regs: Rc<RefCell<Pca9541Regs>>) -> Self {
        Self { regs, slave: None }
    }

    fn owned_slave(&self) -> I2cResult<SlaveHandle> {
        if !self.regs.borrow().control_state().enabled {
            tracing::trace!("pca9541: bus not owned, refusing transfer");
            return Err(I2cError::Nack);
        }
        self.slave.clone().ok_or(I2cError::Nack)
    }
}

impl I2cSlave for Pca9541Master {
    fn event(&mut self, event: I2cEvent) -> I2cResult<()> {
        let slave = self.owned_slave()?;
        let res = slave.borrow_mut().event(event);
        res
    }

    fn recv(&mut self) -> I2cResult<u8> {
        let slave = self.owned_slave()?;
        let res = slave.borrow_mut().recv();
        tracing::trace!("pca9541: recv {:?}", res);
        res
    }

    fn send(&mut self, data: u8) -> I2cResult<()> {
        let slave = self.owned_slave()?;
        let res = slave.borrow_mut().send(data);
        tracing::trace!("pca9541: send {:#04x}: {:?}", data, res);
        res
    }
}

impl ChannelProxy for Pca9541Master {
    fn bind(&mut self, channel: usize, dev: Option<SlaveHandle>) {
        if channel == 0 {
            self.slave = dev;
        }
    }

    fn is_bound(&self, channel: usize) -> bool {
        channel == 0 && self.slave.is_some()
    }

    fn is_unbound(&self) -> bool {
        self.slave.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interrupt::IrqPins;

    fn arbiter(sim: bool) -> Pca9541 {
        let root = I2cBus::new("i2c0");
        Pca9541::new(
            &root,
            Pca9541Config {
                sim_other_master: sim,
                ..Default::default()
            },
        )
        .unwrap()
    }

    #[test]
    fn test_power_on_defaults() {
        let arb = arbiter(false);
        assert_eq!(arb.regs(), Pca9541Regs::default());
        assert!(!arb.irq_raised());
        assert_eq!(arb.bus().name(), "i2c0-pca9541");
    }

    #[test]
    fn test_pointer_auto_increment_cycles() {
        let mut arb = arbiter(false);
        arb.set_pointer(PCA9541_AUTO_INC);
        let mut seen = Vec::new();
        for _ in 0..5 {
            seen.push(arb.regs().current_reg());
            arb.read_register();
        }
        assert_eq!(seen, vec![0, 1, 2, 0, 1]);
        assert_ne!(arb.regs().curr_regnum & PCA9541_AUTO_INC, 0);
    }

    #[test]
    fn test_pointer_without_auto_increment_stays() {
        let mut arb = arbiter(false);
        arb.set_pointer(CONTROL_REG as u8);
        for _ in 0..4 {
            arb.write_register(0x04);
            assert_eq!(arb.regs().current_reg(), CONTROL_REG);
        }
    }

    #[test]
    fn test_pointer_low_bits_three_wraps_to_zero() {
        let mut arb = arbiter(false);
        arb.write_data(&[0x03, 0x0F]);
        assert_eq!(arb.regs().ienable, 0x0F);
    }

    #[test]
    fn test_ienable_write_mask() {
        let mut arb = arbiter(false);
        arb.write_data(&[IENABLE_REG as u8, 0xFF]);
        assert_eq!(arb.regs().ienable, 0x0F);
    }

    #[test]
    fn test_control_write_mask_protects_other_master_bits() {
        let mut arb = arbiter(false);
        arb.write_data(&[CONTROL_REG as u8, 0xFF]);
        assert_eq!(arb.regs().control, Control::WRITE_MASK.bits());
    }

    #[test]
    fn test_teston_mirrors_into_istat() {
        let mut arb = arbiter(false);
        arb.write_data(&[CONTROL_REG as u8, Control::TESTON.bits()]);
        assert_ne!(arb.regs().istat & Istat::MYTEST.bits(), 0);
        arb.write_data(&[CONTROL_REG as u8, 0]);
        assert_eq!(arb.regs().istat & Istat::MYTEST.bits(), 0);
    }

    #[test]
    fn test_businit_requires_ownership() {
        let mut arb = arbiter(false);
        // BUSINIT without claiming the bus: nibble 0 is not enabled.
        arb.write_data(&[CONTROL_REG as u8, Control::BUSINIT.bits()]);
        assert_eq!(arb.regs().istat & Istat::BUSINIT.bits(), 0);

        arb.write_data(&[
            CONTROL_REG as u8,
            Control::BUSINIT.bits() | Control::BUSON.bits(),
        ]);
        assert_ne!(arb.regs().istat & Istat::BUSINIT.bits(), 0);
    }

    #[test]
    fn test_istat_clear_on_read() {
        let mut arb = arbiter(false);
        arb.write_data(&[
            CONTROL_REG as u8,
            Control::BUSINIT.bits() | Control::BUSON.bits() | Control::TESTON.bits(),
        ]);
        arb.set_pointer(ISTAT_REG as u8);
        let first = arb.read_register();
        assert_eq!(first, Istat::BUSINIT.bits() | Istat::MYTEST.bits());
        let second = arb.read_register();
        assert_eq!(second, Istat::MYTEST.bits());
    }

    #[test]
    fn test_istat_is_read_only() {
        let mut arb = arbiter(false);
        arb.write_data(&[ISTAT_REG as u8, 0xFF]);
        assert_eq!(arb.regs().istat, 0);
    }

    #[test]
    fn test_irq_masking_and_edges() {
        let pins = Rc::new(IrqPins::new());
        let root = I2cBus::new("i2c0");
        let mut arb = Pca9541::new(
            &root,
            Pca9541Config {
                irq: Some(pins.line(9)),
                ..Default::default()
            },
        )
        .unwrap();

        // Mask BUSINIT, then trigger it: line stays low.
        arb.write_data(&[IENABLE_REG as u8, Ienable::BUSINIT.bits()]);
        arb.write_data(&[
            CONTROL_REG as u8,
            Control::BUSINIT.bits() | Control::BUSON.bits(),
        ]);
        assert!(!arb.irq_raised());

        // Unmask: the pending status now drives the line.
        arb.write_data(&[IENABLE_REG as u8, 0]);
        assert!(arb.irq_raised());
        assert_eq!(pins.pin(9).rising_edges, 1);

        // Same condition again: no second edge.
        arb.write_data(&[IENABLE_REG as u8, 0]);
        assert_eq!(pins.pin(9).rising_edges, 1);

        // Test interrupts ignore the mask.
        arb.write_data(&[IENABLE_REG as u8, 0x0F]);
        assert!(!arb.irq_raised());
        arb.write_data(&[CONTROL_REG as u8, Control::TESTON.bits() | Control::BUSON.bits()]);
        assert!(arb.irq_raised());
        assert_eq!(pins.pin(9).rising_edges, 2);
    }

    #[test]
    fn test_missing_required_irq_is_config_error() {
        let root = I2cBus::new("i2c0");
        let err = Pca9541::new(
            &root,
            Pca9541Config {
                irq_required: true,
                ..Default::default()
            },
        )
        .unwrap_err();
        assert_eq!(err, ConfigError::MissingInterrupt("i2c0-pca9541".into()));
    }

    #[test]
    fn test_reset_restores_defaults() {
        let mut arb = arbiter(true);
        arb.set_other_master_mode(OtherMasterMode::BusonIOwnIt);
        arb.write_data(&[CONTROL_REG as u8 | PCA9541_AUTO_INC, 0x44, 0x0F]);
        arb.reset();
        assert_eq!(arb.regs(), Pca9541Regs::default());
        assert_eq!(arb.other_master().mode(), OtherMasterMode::BusoffGiveOwnership);
        assert_eq!(arb.other_master().control_read_count(), 0);
        assert!(!arb.irq_raised());
    }
}

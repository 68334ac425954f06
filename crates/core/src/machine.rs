// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::bus::I2cBus;
use crate::interrupt::{IrqLine, IrqPins};
use crate::peripherals::pca9540::Pca9540;
use crate::peripherals::pca9541::Pca9541;
use crate::peripherals::smbus_alert::SmbusAlert;
use crate::smbus::SmbusSlave;
use crate::snapshot::MachineSnapshot;
use crate::{ConfigError, SimResult, SimulationError, SlaveHandle};
use serde::Serialize;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use switchsim_config::child_bus_name;

/// A device wired into the machine, with typed access to the chips the
/// machine needs to reach past the bus interface.
#[derive(Debug, Clone)]
pub enum DeviceHandle {
    Multiplexer(Rc<RefCell<SmbusSlave<Pca9540>>>),
    Arbiter(Rc<RefCell<SmbusSlave<Pca9541>>>),
    Alert(Rc<RefCell<SmbusSlave<SmbusAlert>>>),
    Slave(SlaveHandle),
}

impl DeviceHandle {
    pub fn as_slave(&self) -> SlaveHandle {
        match self {
            DeviceHandle::Multiplexer(d) => d.clone(),
            DeviceHandle::Arbiter(d) => d.clone(),
            DeviceHandle::Alert(d) => d.clone(),
            DeviceHandle::Slave(d) => d.clone(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            DeviceHandle::Multiplexer(_) => "pca9540",
            DeviceHandle::Arbiter(_) => "pca9541",
            DeviceHandle::Alert(_) => "smbus_alert",
            DeviceHandle::Slave(_) => "slave",
        }
    }

    /// Buses owned by the device, in channel order.
    pub fn child_buses(&self) -> Vec<I2cBus> {
        match self {
            DeviceHandle::Multiplexer(d) => d.borrow().device().buses().to_vec(),
            DeviceHandle::Arbiter(d) => vec![d.borrow().device().bus().clone()],
            DeviceHandle::Alert(_) | DeviceHandle::Slave(_) => Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeviceEntry {
    pub name: String,
    pub bus: String,
    pub address: u8,
    pub dev: DeviceHandle,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotSummary {
    pub address: u8,
    /// Device id, or `None` for a master proxy relaying to a child bus.
    pub device: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BusSummary {
    pub name: String,
    pub slots: Vec<SlotSummary>,
}

/// The emulated system: every bus, every device on them, and the
/// interrupt controller their lines are resolved against.
#[derive(Debug)]
pub struct Machine {
    root_name: String,
    buses: BTreeMap<String, I2cBus>,
    devices: Vec<DeviceEntry>,
    irqs: Rc<IrqPins>,
}

impl Machine {
    pub fn new(root_bus: impl Into<String>) -> Self {
        let root_name = root_bus.into();
        let root = I2cBus::new(root_name.clone());
        Self {
            buses: BTreeMap::from([(root_name.clone(), root)]),
            root_name,
            devices: Vec::new(),
            irqs: Rc::new(IrqPins::new()),
        }
    }

    pub fn root(&self) -> &I2cBus {
        // The root bus is inserted at construction and never removed.
        &self.buses[&self.root_name]
    }

    pub fn root_name(&self) -> &str {
        &self.root_name
    }

    pub fn bus(&self, name: &str) -> Option<&I2cBus> {
        self.buses.get(name)
    }

    pub fn bus_names(&self) -> Vec<String> {
        self.buses.keys().cloned().collect()
    }

    pub fn irqs(&self) -> &Rc<IrqPins> {
        &self.irqs
    }

    pub fn irq_line(&self, irq: u32) -> IrqLine {
        self.irqs.line(irq)
    }

    pub fn devices(&self) -> &[DeviceEntry] {
        &self.devices
    }

    pub fn device(&self, name: &str) -> Option<&DeviceEntry> {
        self.devices.iter().find(|d| d.name == name)
    }

    /// Wire `dev` onto bus `bus` and register the child buses it owns as
    /// `<name>.<n>`.
    pub fn add_device(
        &mut self,
        name: &str,
        bus: &str,
        address: u8,
        dev: DeviceHandle,
    ) -> SimResult<()> {
        if self.device(name).is_some() {
            return Err(ConfigError::DuplicateDevice(name.to_string()).into());
        }
        let Some(parent) = self.buses.get(bus) else {
            return Err(ConfigError::UnknownBus(bus.to_string()).into());
        };

        parent.attach(address, dev.as_slave())?;

        for (n, child) in dev.child_buses().into_iter().enumerate() {
            self.buses.insert(child_bus_name(name, n), child);
        }
        tracing::info!("{}: {} '{}' at {:#04x}", bus, dev.kind(), name, address);

        self.devices.push(DeviceEntry {
            name: name.to_string(),
            bus: bus.to_string(),
            address,
            dev,
        });
        Ok(())
    }

    /// Unwire a device. Anything on its child buses goes first.
    pub fn detach_device(&mut self, name: &str) -> SimResult<DeviceEntry> {
        let Some(index) = self.devices.iter().position(|d| d.name == name) else {
            return Err(ConfigError::UnknownDevice(name.to_string()).into());
        };

        let child_buses: Vec<String> = (0..self.devices[index].dev.child_buses().len())
            .map(|n| child_bus_name(name, n))
            .collect();
        let children: Vec<String> = self
            .devices
            .iter()
            .filter(|d| child_buses.contains(&d.bus))
            .map(|d| d.name.clone())
            .collect();
        for child in children {
            self.detach_device(&child)?;
        }

        // Indices shifted while the children were removed.
        let Some(index) = self.devices.iter().position(|d| d.name == name) else {
            return Err(ConfigError::UnknownDevice(name.to_string()).into());
        };
        let entry = self.devices.remove(index);
        if let Some(parent) = self.buses.get(&entry.bus) {
            parent.detach(entry.address);
        }
        for bus in &child_buses {
            self.buses.remove(bus);
        }
        tracing::info!("{}: removed '{}' from {:#04x}", entry.bus, name, entry.address);
        Ok(entry)
    }

    /// Power-on reset of every device.
    pub fn reset(&mut self) {
        tracing::info!("Resetting {} devices", self.devices.len());
        for entry in &self.devices {
            entry.dev.as_slave().borrow_mut().reset();
        }
    }

    pub fn snapshot(&self) -> MachineSnapshot {
        MachineSnapshot {
            devices: self
                .devices
                .iter()
                .map(|d| (d.name.clone(), d.dev.as_slave().borrow().snapshot()))
                .collect(),
        }
    }

    /// Load device state without replaying any write side effects.
    ///
    /// Every device named in the snapshot must exist; devices it does not
    /// mention keep their current state.
    pub fn apply_snapshot(&mut self, snapshot: &MachineSnapshot) -> SimResult<()> {
        for name in snapshot.devices.keys() {
            if self.device(name).is_none() {
                return Err(ConfigError::UnknownDevice(name.clone()).into());
            }
        }
        for entry in &self.devices {
            let Some(state) = snapshot.devices.get(&entry.name) else {
                continue;
            };
            entry
                .dev
                .as_slave()
                .borrow_mut()
                .restore(state.clone())
                .map_err(|e| match e {
                    SimulationError::InvalidSnapshot { reason, .. } => {
                        SimulationError::InvalidSnapshot {
                            device: entry.name.clone(),
                            reason,
                        }
                    }
                    other => other,
                })?;
        }
        Ok(())
    }

    /// Current state of a single device.
    pub fn peek_device(&self, name: &str) -> Option<serde_json::Value> {
        self.device(name)
            .map(|d| d.dev.as_slave().borrow().snapshot())
    }

    /// Have `devaddr` pull SMBALERT# towards alert responder `name`.
    pub fn alert(&self, name: &str, devaddr: u8) -> SimResult<()> {
        match self.device(name).map(|d| &d.dev) {
            Some(DeviceHandle::Alert(ara)) => {
                ara.borrow_mut().device_mut().alert(devaddr);
                Ok(())
            }
            _ => Err(ConfigError::UnknownDevice(name.to_string()).into()),
        }
    }

    /// Every bus with its occupied addresses, naming the device at each.
    pub fn topology(&self) -> Vec<BusSummary> {
        self.buses
            .iter()
            .map(|(bus_name, bus)| BusSummary {
                name: bus_name.clone(),
                slots: bus
                    .addresses()
                    .into_iter()
                    .map(|address| SlotSummary {
                        address,
                        device: self
                            .devices
                            .iter()
                            .find(|d| &d.bus == bus_name && d.address == address)
                            .map(|d| d.name.clone()),
                    })
                    .collect(),
            })
            .collect()
    }
}

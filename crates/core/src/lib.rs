// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

pub mod bus;
pub mod interrupt;
pub mod machine;
pub mod peripherals;
pub mod regs;
pub mod signals;
pub mod smbus;
pub mod snapshot;
pub mod system;
pub mod topology;

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

pub use bus::I2cBus;
pub use machine::{DeviceEntry, DeviceHandle, Machine};

mod tests;

/// Number of 7-bit addresses a chip can proxy onto its upstream bus.
pub const MAX_I2C_ADDRS: usize = 128;

/// Bus condition delivered to a slave by the bus engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum I2cEvent {
    StartRecv,
    StartSend,
    Finish,
    Nack,
}

/// Protocol outcomes of a bus transaction. None of these are fatal; real
/// hardware reports all of them as a missing acknowledge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum I2cError {
    #[error("transfer not acknowledged")]
    Nack,
    #[error("no device at address {0:#04x}")]
    NoDevice(u8),
    #[error("no transfer in progress")]
    NoTransfer,
}

pub type I2cResult<T> = Result<T, I2cError>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TopologyError {
    #[error("address {address:#04x} is outside the {limit}-entry address space")]
    AddressOutOfRange { address: u8, limit: usize },
    #[error("unknown child bus index {0}")]
    UnknownChannel(usize),
    #[error("address {address:#04x} already in use on bus '{bus}'")]
    AddressInUse { address: u8, bus: String },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("device '{0}' requires an interrupt line but none is configured")]
    MissingInterrupt(String),
    #[error("unknown bus '{0}'")]
    UnknownBus(String),
    #[error("duplicate device id '{0}'")]
    DuplicateDevice(String),
    #[error("unknown device '{0}'")]
    UnknownDevice(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    #[error("invalid snapshot for '{device}': {reason}")]
    InvalidSnapshot { device: String, reason: String },
    #[error(transparent)]
    Topology(#[from] TopologyError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type SimResult<T> = Result<T, SimulationError>;

/// Trait representing a device sitting on an I2C bus as a slave.
///
/// The bus engine drives `event`/`recv`/`send`; everything else is the
/// machine's lifecycle (reset, snapshot, restore).
pub trait I2cSlave: std::fmt::Debug {
    fn event(&mut self, event: I2cEvent) -> I2cResult<()>;
    fn recv(&mut self) -> I2cResult<u8>;
    fn send(&mut self, data: u8) -> I2cResult<()>;

    fn reset(&mut self) {}
    fn as_any(&self) -> Option<&dyn Any> {
        None
    }
    fn as_any_mut(&mut self) -> Option<&mut dyn Any> {
        None
    }
    fn snapshot(&self) -> serde_json::Value {
        serde_json::Value::Null
    }
    fn restore(&mut self, _state: serde_json::Value) -> SimResult<()> {
        Ok(())
    }
}

/// Shared handle to a slave. The emulation loop is single-threaded, so
/// devices are reference counted and borrowed per transaction.
pub type SlaveHandle = Rc<RefCell<dyn I2cSlave>>;

/// Wrap a concrete device into a shared cell, keeping the typed handle.
pub fn shared<T: I2cSlave + 'static>(dev: T) -> Rc<RefCell<T>> {
    Rc::new(RefCell::new(dev))
}

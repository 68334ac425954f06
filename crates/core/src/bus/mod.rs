// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::{I2cError, I2cEvent, I2cResult, SlaveHandle, TopologyError};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

/// Callbacks fired when a device is wired onto, or removed from, a bus.
///
/// Chips that own child buses install one of these to keep their proxy
/// table in step with the devices behind them.
pub trait BusListener: fmt::Debug {
    fn child_added(&self, address: u8, dev: &SlaveHandle) -> Result<(), TopologyError>;
    fn child_removed(&self, address: u8);
}

struct BusState {
    name: String,
    slaves: BTreeMap<u8, SlaveHandle>,
    current: Option<u8>,
    listener: Option<Rc<dyn BusListener>>,
}

/// A single I2C/SMBus segment.
///
/// Cloning yields another handle to the same segment.
#[derive(Clone)]
pub struct I2cBus {
    state: Rc<RefCell<BusState>>,
}

impl fmt::Debug for I2cBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("I2cBus")
            .field("name", &state.name)
            .field("addresses", &state.slaves.keys().collect::<Vec<_>>())
            .field("current", &state.current)
            .finish()
    }
}

impl I2cBus {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            state: Rc::new(RefCell::new(BusState {
                name: name.into(),
                slaves: BTreeMap::new(),
                current: None,
                listener: None,
            })),
        }
    }

    pub fn name(&self) -> String {
        self.state.borrow().name.clone()
    }

    pub fn set_listener(&self, listener: Rc<dyn BusListener>) {
        self.state.borrow_mut().listener = Some(listener);
    }

    /// Two handles refer to the same segment.
    pub fn same_bus(&self, other: &I2cBus) -> bool {
        Rc::ptr_eq(&self.state, &other.state)
    }

    /// Wire `dev` onto this bus at `address`.
    ///
    /// If a listener rejects the device, the bus is left as it was.
    pub fn attach(&self, address: u8, dev: SlaveHandle) -> Result<(), TopologyError> {
        let listener = {
            let mut state = self.state.borrow_mut();
            if state.slaves.contains_key(&address) {
                return Err(TopologyError::AddressInUse {
                    address,
                    bus: state.name.clone(),
                });
            }
            state.slaves.insert(address, dev.clone());
            state.listener.clone()
        };

        if let Some(listener) = listener {
            if let Err(e) = listener.child_added(address, &dev) {
                self.state.borrow_mut().slaves.remove(&address);
                return Err(e);
            }
        }

        tracing::debug!("{}: attached device at {:#04x}", self.name(), address);
        Ok(())
    }

    /// Remove whatever sits at `address`, returning it.
    pub fn detach(&self, address: u8) -> Option<SlaveHandle> {
        let (removed, listener) = {
            let mut state = self.state.borrow_mut();
            let removed = state.slaves.remove(&address);
            if removed.is_some() && state.current == Some(address) {
                state.current = None;
            }
            (removed, state.listener.clone())
        };

        if removed.is_some() {
            tracing::debug!("{}: detached device at {:#04x}", self.name(), address);
            if let Some(listener) = listener {
                listener.child_removed(address);
            }
        }
        removed
    }

    pub fn device(&self, address: u8) -> Option<SlaveHandle> {
        self.state.borrow().slaves.get(&address).cloned()
    }

    /// Occupied addresses, ascending.
    pub fn addresses(&self) -> Vec<u8> {
        self.state.borrow().slaves.keys().copied().collect()
    }

    /// Address a device and announce the transfer direction. Also used for
    /// a repeated start.
    pub fn start_transfer(&self, address: u8, is_recv: bool) -> I2cResult<()> {
        let dev = {
            let mut state = self.state.borrow_mut();
            let dev = state.slaves.get(&address).cloned();
            state.current = dev.as_ref().map(|_| address);
            dev
        };
        let Some(dev) = dev else {
            return Err(I2cError::NoDevice(address));
        };

        let event = if is_recv {
            I2cEvent::StartRecv
        } else {
            I2cEvent::StartSend
        };
        let res = dev.borrow_mut().event(event);
        if res.is_err() {
            self.state.borrow_mut().current = None;
        }
        res
    }

    fn current_device(&self) -> I2cResult<SlaveHandle> {
        let state = self.state.borrow();
        state
            .current
            .and_then(|addr| state.slaves.get(&addr).cloned())
            .ok_or(I2cError::NoTransfer)
    }

    pub fn send(&self, data: u8) -> I2cResult<()> {
        let dev = self.current_device()?;
        let res = dev.borrow_mut().send(data);
        res
    }

    pub fn recv(&self) -> I2cResult<u8> {
        let dev = self.current_device()?;
        let res = dev.borrow_mut().recv();
        res
    }

    /// Master signals it wants no more bytes.
    pub fn nack(&self) {
        if let Ok(dev) = self.current_device() {
            let _ = dev.borrow_mut().event(I2cEvent::Nack);
        }
    }

    pub fn end_transfer(&self) {
        let dev = self.current_device().ok();
        self.state.borrow_mut().current = None;
        if let Some(dev) = dev {
            if let Err(e) = dev.borrow_mut().event(I2cEvent::Finish) {
                tracing::trace!("{}: finish not acknowledged: {}", self.name(), e);
            }
        }
    }

    /// SMBus block write: one START_SEND, every byte, then STOP.
    pub fn write_block(&self, address: u8, data: &[u8]) -> I2cResult<()> {
        self.start_transfer(address, false)?;
        for &byte in data {
            if let Err(e) = self.send(byte) {
                self.end_transfer();
                return Err(e);
            }
        }
        self.end_transfer();
        Ok(())
    }

    pub fn send_byte(&self, address: u8, data: u8) -> I2cResult<()> {
        self.write_block(address, &[data])
    }

    pub fn write_byte_data(&self, address: u8, command: u8, value: u8) -> I2cResult<()> {
        self.write_block(address, &[command, value])
    }

    /// Plain receive: START_RECV, `count` bytes, NACK, STOP.
    pub fn read_block(&self, address: u8, count: usize) -> I2cResult<Vec<u8>> {
        self.start_transfer(address, true)?;
        let data = self.recv_bytes(count);
        self.nack();
        self.end_transfer();
        data
    }

    pub fn receive_byte(&self, address: u8) -> I2cResult<u8> {
        self.read_block(address, 1)?
            .first()
            .copied()
            .ok_or(I2cError::Nack)
    }

    /// Write `command`, then a repeated start for `count` bytes.
    pub fn read_block_data(&self, address: u8, command: u8, count: usize) -> I2cResult<Vec<u8>> {
        self.start_transfer(address, false)?;
        let res = self
            .send(command)
            .and_then(|_| self.start_transfer(address, true))
            .and_then(|_| self.recv_bytes(count));
        if res.is_ok() {
            self.nack();
        }
        self.end_transfer();
        res
    }

    pub fn read_byte_data(&self, address: u8, command: u8) -> I2cResult<u8> {
        self.read_block_data(address, command, 1)?
            .first()
            .copied()
            .ok_or(I2cError::Nack)
    }

    fn recv_bytes(&self, count: usize) -> I2cResult<Vec<u8>> {
        let mut data = Vec::new();
        for _ in 0..count {
            data.push(self.recv()?);
        }
        Ok(data)
    }
}

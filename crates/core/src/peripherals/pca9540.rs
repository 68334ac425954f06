// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::bus::I2cBus;
use crate::smbus::SmbusDevice;
use crate::topology::{ChannelProxy, ProxyTable};
use crate::{I2cError, I2cEvent, I2cResult, I2cSlave, SimResult, SimulationError, SlaveHandle};
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

pub const PCA9540_CHANNELS: usize = 2;

const SELECT_ENABLE: u8 = 0x04;
const SELECT_CHANNEL: u8 = 0x03;

/// Channel routed by a raw control byte, if any.
///
/// Only indices below [`PCA9540_CHANNELS`] select a bus; the two spare
/// encodings of the channel field route nowhere.
pub fn selected_channel(selector: u8) -> Option<usize> {
    if selector & SELECT_ENABLE == 0 {
        return None;
    }
    let channel = (selector & SELECT_CHANNEL) as usize;
    (channel < PCA9540_CHANNELS).then_some(channel)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pca9540Snapshot {
    pub selector: u8,
}

/// NXP PCA9540 2-channel I2C multiplexer.
#[derive(Debug)]
pub struct Pca9540 {
    selector: Rc<Cell<u8>>,
    buses: [I2cBus; PCA9540_CHANNELS],
    topology: Rc<RefCell<ProxyTable<Pca9540Master>>>,
}

impl Pca9540 {
    /// Create the chip behind `upstream`, along with its two child buses.
    pub fn new(upstream: &I2cBus) -> Self {
        let selector = Rc::new(Cell::new(0));
        let upstream_name = upstream.name();
        let proxy_selector = selector.clone();
        let topology = Rc::new(RefCell::new(ProxyTable::new(
            format!("{}-pca9540", upstream_name),
            upstream.clone(),
            PCA9540_CHANNELS,
            move || Pca9540Master::new(proxy_selector.clone()),
        )));

        let buses = [0, 1].map(|i| {
            let bus = I2cBus::new(format!("{}-pca9540-{}", upstream_name, i));
            ProxyTable::install(&topology, &bus, i);
            bus
        });

        Self {
            selector,
            buses,
            topology,
        }
    }

    pub fn bus(&self, channel: usize) -> Option<&I2cBus> {
        self.buses.get(channel)
    }

    pub fn buses(&self) -> &[I2cBus] {
        &self.buses
    }

    pub fn write_select(&mut self, value: u8) {
        tracing::debug!("pca9540: selector {:#04x} -> {:#04x}", self.selector.get(), value);
        self.selector.set(value);
    }

    pub fn read_select(&self) -> u8 {
        self.selector.get()
    }

    pub fn selected_channel(&self) -> Option<usize> {
        selected_channel(self.selector.get())
    }

    /// Upstream addresses currently served by a master proxy.
    pub fn proxy_addresses(&self) -> Vec<u8> {
        self.topology.borrow().addresses()
    }
}

impl SmbusDevice for Pca9540 {
    fn write_data(&mut self, data: &[u8]) {
        if let Some(&value) = data.first() {
            self.write_select(value);
        }
    }

    fn receive_byte(&mut self) -> u8 {
        self.read_select()
    }

    fn reset(&mut self) {
        self.selector.set(0);
    }

    fn snapshot(&self) -> serde_json::Value {
        serde_json::to_value(Pca9540Snapshot {
            selector: self.selector.get(),
        })
        .unwrap_or(serde_json::Value::Null)
    }

    fn restore(&mut self, state: serde_json::Value) -> SimResult<()> {
        let snap: Pca9540Snapshot =
            serde_json::from_value(state).map_err(|e| SimulationError::InvalidSnapshot {
                device: "pca9540".to_string(),
                reason: e.to_string(),
            })?;
        self.selector.set(snap.selector);
        Ok(())
    }
}

/// Upstream stand-in for one address, relaying to whichever child bus the
/// selector currently routes to.
#[derive(Debug)]
pub struct Pca9540Master {
    selector: Rc<Cell<u8>>,
    slaves: [Option<SlaveHandle>; PCA9540_CHANNELS],
}

impl Pca9540Master {
    fn new(selector: Rc<Cell<u8>>) -> Self {
        Self {
            selector,
            slaves: [None, None],
        }
    }

    fn current_slave(&self) -> I2cResult<SlaveHandle> {
        let sel = self.selector.get();
        tracing::trace!("pca9540: current selector={:#04x}", sel);
        selected_channel(sel)
            .and_then(|channel| self.slaves[channel].clone())
            .ok_or(I2cError::Nack)
    }
}

impl I2cSlave for Pca9540Master {
    fn event(&mut self, event: I2cEvent) -> I2cResult<()> {
        let slave = self.current_slave()?;
        let res = slave.borrow_mut().event(event);
        res
    }

    fn recv(&mut self) -> I2cResult<u8> {
        let slave = self.current_slave()?;
        let res = slave.borrow_mut().recv();
        tracing::trace!("pca9540: recv {:?}", res);
        res
    }

    fn send(&mut self, data: u8) -> I2cResult<()> {
        let slave = self.current_slave()?;
        let res = slave.borrow_mut().send(data);
        tracing::trace!("pca9540: send {:#04x}: {:?}", data, res);
        res
    }
}

impl ChannelProxy for Pca9540Master {
    fn bind(&mut self, channel: usize, dev: Option<SlaveHandle>) {
        if let Some(slot) = self.slaves.get_mut(channel) {
            *slot = dev;
        }
    }

    fn is_bound(&self, channel: usize) -> bool {
        self.slaves.get(channel).is_some_and(Option::is_some)
    }

    fn is_unbound(&self) -> bool {
        self.slaves.iter().all(Option::is_none)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selected_channel_decode() {
        assert_eq!(selected_channel(0x00), None);
        assert_eq!(selected_channel(0x01), None);
        assert_eq!(selected_channel(0x04), Some(0));
        assert_eq!(selected_channel(0x05), Some(1));
        assert_eq!(selected_channel(0x06), None);
        assert_eq!(selected_channel(0x07), None);
        assert_eq!(selected_channel(0xFD), Some(1));
    }

    #[test]
    fn test_select_register_is_transparent() {
        let root = I2cBus::new("i2c0");
        let mut mux = Pca9540::new(&root);
        for value in 0..=u8::MAX {
            mux.write_data(&[value]);
            assert_eq!(mux.receive_byte(), value);
        }
    }

    #[test]
    fn test_child_bus_names() {
        let root = I2cBus::new("i2c0");
        let mux = Pca9540::new(&root);
        assert_eq!(mux.bus(0).unwrap().name(), "i2c0-pca9540-0");
        assert_eq!(mux.bus(1).unwrap().name(), "i2c0-pca9540-1");
        assert!(mux.bus(2).is_none());
    }

    #[test]
    fn test_snapshot_restore() {
        let root = I2cBus::new("i2c0");
        let mut mux = Pca9540::new(&root);
        mux.write_select(0x05);
        let snap = mux.snapshot();
        mux.reset();
        assert_eq!(mux.read_select(), 0);
        mux.restore(snap).unwrap();
        assert_eq!(mux.read_select(), 0x05);
        assert!(mux.restore(serde_json::json!({"bogus": 1})).is_err());
    }
}

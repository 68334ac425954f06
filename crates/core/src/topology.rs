// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Per-address master proxies for chips that own child buses.
//!
//! Every address that has a device on any child bus gets exactly one proxy
//! registered on the upstream bus. The proxy relays transfers to the child
//! device the chip currently routes to, and goes away once no child bus has
//! a device at that address any more. Register state is never touched here.

use crate::bus::{BusListener, I2cBus};
use crate::{I2cSlave, SlaveHandle, TopologyError, MAX_I2C_ADDRS};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

/// A relay slave with one slot per child bus.
pub trait ChannelProxy: I2cSlave + 'static {
    fn bind(&mut self, channel: usize, dev: Option<SlaveHandle>);
    fn is_bound(&self, channel: usize) -> bool;
    fn is_unbound(&self) -> bool;
}

pub struct ProxyTable<P> {
    owner: String,
    upstream: I2cBus,
    channels: usize,
    proxies: BTreeMap<u8, Rc<RefCell<P>>>,
    make_proxy: Box<dyn Fn() -> P>,
}

impl<P: fmt::Debug> fmt::Debug for ProxyTable<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyTable")
            .field("owner", &self.owner)
            .field("upstream", &self.upstream.name())
            .field("channels", &self.channels)
            .field("proxies", &self.proxies.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl<P: ChannelProxy> ProxyTable<P> {
    pub fn new(
        owner: impl Into<String>,
        upstream: I2cBus,
        channels: usize,
        make_proxy: impl Fn() -> P + 'static,
    ) -> Self {
        Self {
            owner: owner.into(),
            upstream,
            channels,
            proxies: BTreeMap::new(),
            make_proxy: Box::new(make_proxy),
        }
    }

    /// Hook `bus` up as child bus `channel` of the table's chip.
    pub fn install(table: &Rc<RefCell<Self>>, bus: &I2cBus, channel: usize) {
        bus.set_listener(Rc::new(ChannelListener {
            table: table.clone(),
            channel,
        }));
    }

    fn check(&self, channel: usize, address: u8) -> Result<(), TopologyError> {
        if address as usize >= MAX_I2C_ADDRS {
            return Err(TopologyError::AddressOutOfRange {
                address,
                limit: MAX_I2C_ADDRS,
            });
        }
        if channel >= self.channels {
            return Err(TopologyError::UnknownChannel(channel));
        }
        Ok(())
    }

    pub fn attach(
        &mut self,
        channel: usize,
        address: u8,
        dev: SlaveHandle,
    ) -> Result<(), TopologyError> {
        if let Err(e) = self.check(channel, address) {
            tracing::error!("{}: cannot attach child: {}", self.owner, e);
            return Err(e);
        }

        let proxy = match self.proxies.get(&address) {
            Some(proxy) => proxy.clone(),
            None => {
                let proxy = Rc::new(RefCell::new((self.make_proxy)()));
                self.upstream.attach(address, proxy.clone())?;
                self.proxies.insert(address, proxy.clone());
                tracing::debug!(
                    "{}: created master proxy at {:#04x} on {}",
                    self.owner,
                    address,
                    self.upstream.name()
                );
                proxy
            }
        };
        proxy.borrow_mut().bind(channel, Some(dev));
        Ok(())
    }

    pub fn detach(&mut self, channel: usize, address: u8) {
        if let Err(e) = self.check(channel, address) {
            tracing::error!("{}: cannot remove child: {}", self.owner, e);
            return;
        }
        let Some(proxy) = self.proxies.get(&address).cloned() else {
            return;
        };

        let unbound = {
            let mut proxy = proxy.borrow_mut();
            if !proxy.is_bound(channel) {
                return;
            }
            proxy.bind(channel, None);
            proxy.is_unbound()
        };

        if unbound {
            self.proxies.remove(&address);
            self.upstream.detach(address);
            tracing::debug!(
                "{}: destroyed master proxy at {:#04x}",
                self.owner,
                address
            );
        }
    }

    pub fn addresses(&self) -> Vec<u8> {
        self.proxies.keys().copied().collect()
    }

    pub fn proxy(&self, address: u8) -> Option<Rc<RefCell<P>>> {
        self.proxies.get(&address).cloned()
    }
}

struct ChannelListener<P> {
    table: Rc<RefCell<ProxyTable<P>>>,
    channel: usize,
}

impl<P> fmt::Debug for ChannelListener<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelListener")
            .field("channel", &self.channel)
            .finish()
    }
}

impl<P: ChannelProxy> BusListener for ChannelListener<P> {
    fn child_added(&self, address: u8, dev: &SlaveHandle) -> Result<(), TopologyError> {
        self.table
            .borrow_mut()
            .attach(self.channel, address, dev.clone())
    }

    fn child_removed(&self, address: u8) {
        self.table.borrow_mut().detach(self.channel, address);
    }
}

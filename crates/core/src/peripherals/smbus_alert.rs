// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::interrupt::IrqLine;
use crate::signals::IrqSignaler;
use crate::smbus::SmbusDevice;
use crate::{ConfigError, I2cError, I2cEvent, I2cResult, SimResult, SimulationError};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// SMBus Alert Response Address.
pub const SMBUS_ALERT_ADDR: u8 = 0x0C;

pub const SMBUS_ALERT_QLEN: usize = 32;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmbusAlertSnapshot {
    pub queue: Vec<u8>,
}

/// Alert responder: devices pulling SMBALERT# queue their address here and
/// the host reads them back one at a time from the alert response address.
#[derive(Debug)]
pub struct SmbusAlert {
    queue: VecDeque<u8>,
    irq: IrqSignaler,
}

impl SmbusAlert {
    pub fn new(irq: Option<IrqLine>) -> Result<Self, ConfigError> {
        let Some(irq) = irq else {
            return Err(ConfigError::MissingInterrupt("smbus-alert".to_string()));
        };
        Ok(Self {
            queue: VecDeque::with_capacity(SMBUS_ALERT_QLEN),
            irq: IrqSignaler::new(Some(irq)),
        })
    }

    /// Queue an alert from `devaddr`. Duplicates and overflow are dropped.
    pub fn alert(&mut self, devaddr: u8) {
        if self.queue.contains(&devaddr) {
            return;
        }
        if self.queue.len() >= SMBUS_ALERT_QLEN {
            tracing::warn!("smbus-alert: queue full, dropping {:#04x}", devaddr);
            return;
        }
        self.queue.push_back(devaddr);
        tracing::debug!("smbus-alert: {:#04x} queued ({} pending)", devaddr, self.queue.len());
        self.irq.update(true);
    }

    pub fn pending(&self) -> Vec<u8> {
        self.queue.iter().copied().collect()
    }

    pub fn irq_raised(&self) -> bool {
        self.irq.is_raised()
    }
}

impl SmbusDevice for SmbusAlert {
    fn write_data(&mut self, data: &[u8]) {
        tracing::warn!("smbus-alert: ignoring {}-byte write", data.len());
    }

    fn receive_byte(&mut self) -> u8 {
        let Some(addr) = self.queue.pop_front() else {
            return 0xFF;
        };
        if self.queue.is_empty() {
            self.irq.update(false);
        }
        addr
    }

    fn event(&mut self, event: I2cEvent) -> I2cResult<()> {
        if event == I2cEvent::StartRecv && self.queue.is_empty() {
            return Err(I2cError::Nack);
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.queue.clear();
        self.irq.reset();
    }

    fn snapshot(&self) -> serde_json::Value {
        serde_json::to_value(SmbusAlertSnapshot {
            queue: self.pending(),
        })
        .unwrap_or(serde_json::Value::Null)
    }

    fn restore(&mut self, state: serde_json::Value) -> SimResult<()> {
        let snap: SmbusAlertSnapshot =
            serde_json::from_value(state).map_err(|e| SimulationError::InvalidSnapshot {
                device: "smbus-alert".to_string(),
                reason: e.to_string(),
            })?;
        self.queue = snap.queue.into_iter().take(SMBUS_ALERT_QLEN).collect();
        let raised = !self.queue.is_empty();
        self.irq.restore(raised);
        Ok(())
    }
}

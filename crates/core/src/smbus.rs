// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::{I2cError, I2cEvent, I2cResult, I2cSlave, SimResult};
use std::any::Any;

/// Largest SMBus block: command + count + 32 data bytes.
pub const SMBUS_DATA_MAX_LEN: usize = 34;

/// Register-level behaviour of an SMBus device.
///
/// Implementors see whole writes and single-byte reads; the START/STOP
/// framing is handled by [`SmbusSlave`].
pub trait SmbusDevice: std::fmt::Debug {
    /// A transfer with no data bytes.
    fn quick_cmd(&mut self, _read: bool) {}

    /// Bytes written in one transfer, command byte first.
    fn write_data(&mut self, data: &[u8]);

    fn receive_byte(&mut self) -> u8;

    /// Raw bus events, before framing. Returning an error refuses the event.
    fn event(&mut self, _event: I2cEvent) -> I2cResult<()> {
        Ok(())
    }

    fn reset(&mut self) {}

    fn snapshot(&self) -> serde_json::Value {
        serde_json::Value::Null
    }

    fn restore(&mut self, _state: serde_json::Value) -> SimResult<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum SmbusMode {
    #[default]
    Idle,
    WriteData,
    RecvByte,
    ReadData,
    Done,
}

/// Adapts an [`SmbusDevice`] to the raw [`I2cSlave`] primitives.
#[derive(Debug)]
pub struct SmbusSlave<D> {
    dev: D,
    mode: SmbusMode,
    data: Vec<u8>,
}

impl<D: SmbusDevice> SmbusSlave<D> {
    pub fn new(dev: D) -> Self {
        Self {
            dev,
            mode: SmbusMode::Idle,
            data: Vec::with_capacity(SMBUS_DATA_MAX_LEN),
        }
    }

    pub fn device(&self) -> &D {
        &self.dev
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.dev
    }

    fn flush_write(&mut self) {
        if self.data.is_empty() {
            self.dev.quick_cmd(false);
        } else {
            self.dev.write_data(&self.data);
            self.data.clear();
        }
    }
}

impl<D: SmbusDevice + 'static> I2cSlave for SmbusSlave<D> {
    fn event(&mut self, event: I2cEvent) -> I2cResult<()> {
        self.dev.event(event)?;

        match event {
            I2cEvent::StartSend => {
                self.mode = SmbusMode::WriteData;
                self.data.clear();
            }
            I2cEvent::StartRecv => {
                self.mode = match self.mode {
                    // Command byte(s) written, now reading: hand them over first.
                    SmbusMode::WriteData if !self.data.is_empty() => {
                        self.dev.write_data(&self.data);
                        self.data.clear();
                        SmbusMode::ReadData
                    }
                    _ => SmbusMode::RecvByte,
                };
            }
            I2cEvent::Finish => {
                if self.mode == SmbusMode::WriteData {
                    self.flush_write();
                }
                self.mode = SmbusMode::Idle;
            }
            I2cEvent::Nack => {
                if self.mode == SmbusMode::ReadData || self.mode == SmbusMode::RecvByte {
                    self.mode = SmbusMode::Done;
                }
            }
        }
        Ok(())
    }

    fn recv(&mut self) -> I2cResult<u8> {
        match self.mode {
            SmbusMode::RecvByte | SmbusMode::ReadData => Ok(self.dev.receive_byte()),
            _ => Err(I2cError::Nack),
        }
    }

    fn send(&mut self, data: u8) -> I2cResult<()> {
        if self.mode != SmbusMode::WriteData {
            return Err(I2cError::Nack);
        }
        if self.data.len() >= SMBUS_DATA_MAX_LEN {
            tracing::warn!("SMBus write overflow, dropping {:#04x}", data);
            return Err(I2cError::Nack);
        }
        self.data.push(data);
        Ok(())
    }

    fn reset(&mut self) {
        self.mode = SmbusMode::Idle;
        self.data.clear();
        self.dev.reset();
    }

    fn as_any(&self) -> Option<&dyn Any> {
        Some(self)
    }

    fn as_any_mut(&mut self) -> Option<&mut dyn Any> {
        Some(self)
    }

    fn snapshot(&self) -> serde_json::Value {
        self.dev.snapshot()
    }

    fn restore(&mut self, state: serde_json::Value) -> SimResult<()> {
        self.mode = SmbusMode::Idle;
        self.data.clear();
        self.dev.restore(state)
    }
}

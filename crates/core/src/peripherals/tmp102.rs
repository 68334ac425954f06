// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::smbus::SmbusDevice;
use crate::{SimResult, SimulationError};

const REG_TEMP: u8 = 0x00;
const REG_CONFIG: u8 = 0x01;
const REG_T_LOW: u8 = 0x02;
const REG_T_HIGH: u8 = 0x03;

/// TI TMP102 I2C temperature sensor.
///
/// Temperatures are kept as 12-bit counts of 0.0625 °C and presented
/// left-justified in 16-bit big-endian registers, as on the wire.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct Tmp102 {
    pub temp: i16,   // 0x00 - Temperature (12-bit)
    pub config: u16, // 0x01 - Configuration
    pub t_low: i16,  // 0x02 - T_LOW
    pub t_high: i16, // 0x03 - T_HIGH

    pointer: u8,
    #[serde(skip)]
    read_lsb: bool,
}

impl Tmp102 {
    pub fn new() -> Self {
        Self {
            temp: 0x190, // 25.0°C
            config: 0x60A0,
            t_low: 0x4B0,  // 75°C
            t_high: 0x500, // 80°C
            pointer: REG_TEMP,
            read_lsb: false,
        }
    }

    /// Force a new measurement, in 0.0625 °C steps.
    pub fn set_temperature(&mut self, counts: i16) {
        self.temp = counts;
    }

    fn read_reg(&self, reg: u8) -> u16 {
        match reg {
            REG_TEMP => (self.temp as u16) << 4,
            REG_CONFIG => self.config,
            REG_T_LOW => (self.t_low as u16) << 4,
            _ => (self.t_high as u16) << 4,
        }
    }

    fn write_reg(&mut self, reg: u8, value: u16) {
        match reg {
            REG_CONFIG => self.config = value,
            REG_T_LOW => self.t_low = (value as i16) >> 4,
            REG_T_HIGH => self.t_high = (value as i16) >> 4,
            _ => tracing::warn!("tmp102: temperature register is read-only"),
        }
    }
}

impl Default for Tmp102 {
    fn default() -> Self {
        Self::new()
    }
}

impl SmbusDevice for Tmp102 {
    fn write_data(&mut self, data: &[u8]) {
        let Some((&pointer, rest)) = data.split_first() else {
            return;
        };
        self.pointer = pointer & 0x03;
        self.read_lsb = false;
        if let [msb, lsb, ..] = rest {
            self.write_reg(self.pointer, u16::from_be_bytes([*msb, *lsb]));
        }
    }

    fn receive_byte(&mut self) -> u8 {
        let [msb, lsb] = self.read_reg(self.pointer).to_be_bytes();
        let byte = if self.read_lsb { lsb } else { msb };
        self.read_lsb = !self.read_lsb;
        byte
    }

    fn reset(&mut self) {
        *self = Self::new();
    }

    fn snapshot(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    fn restore(&mut self, state: serde_json::Value) -> SimResult<()> {
        let restored: Tmp102 =
            serde_json::from_value(state).map_err(|e| SimulationError::InvalidSnapshot {
                device: "tmp102".to_string(),
                reason: e.to_string(),
            })?;
        *self = restored;
        Ok(())
    }
}

// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Saved state of every device in a machine, keyed by device id.
///
/// Each value is whatever the device's own snapshot type serializes to.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct MachineSnapshot {
    pub devices: BTreeMap<String, serde_json::Value>,
}

impl MachineSnapshot {
    pub fn device(&self, name: &str) -> Option<&serde_json::Value> {
        self.devices.get(name)
    }
}

// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::machine::{DeviceHandle, Machine};
use crate::peripherals::pca9540::Pca9540;
use crate::peripherals::pca9541::{Pca9541, Pca9541Config};
use crate::peripherals::smbus_alert::SmbusAlert;
use crate::peripherals::tmp102::Tmp102;
use crate::smbus::SmbusSlave;
use crate::ConfigError;
use anyhow::Context;
use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;
use switchsim_config::{DeviceConfig, DeviceKind, SystemManifest};
use tracing::info;

/// Builds a Machine from a given system manifest path.
/// If no path is provided, returns an empty machine with only the root bus.
pub fn build_machine(system_path: Option<&Path>) -> anyhow::Result<Machine> {
    let machine = if let Some(sys_path) = system_path {
        info!("Loading system manifest: {:?}", sys_path);
        let manifest = SystemManifest::from_file(sys_path)?;
        Machine::from_manifest(&manifest)?
    } else {
        info!("Using default bus configuration");
        Machine::new("i2c0")
    };

    Ok(machine)
}

impl Machine {
    /// Instantiate every device of `manifest`, in order.
    pub fn from_manifest(manifest: &SystemManifest) -> anyhow::Result<Self> {
        manifest.validate()?;
        let mut machine = Machine::new(manifest.root_bus.clone());

        for cfg in &manifest.devices {
            let dev = machine
                .instantiate(cfg)
                .with_context(|| format!("Failed to create device '{}'", cfg.id))?;
            machine
                .add_device(&cfg.id, &cfg.bus, cfg.address, dev)
                .with_context(|| {
                    format!(
                        "Failed to attach device '{}' at {:#04x} on '{}'",
                        cfg.id, cfg.address, cfg.bus
                    )
                })?;
        }

        info!(
            "System '{}' ready: {} devices on {} buses",
            manifest.name,
            machine.devices().len(),
            machine.bus_names().len()
        );
        Ok(machine)
    }

    fn instantiate(&self, cfg: &DeviceConfig) -> Result<DeviceHandle, ConfigError> {
        let upstream = self
            .bus(&cfg.bus)
            .ok_or_else(|| ConfigError::UnknownBus(cfg.bus.clone()))?;
        // Links are resolved here once; devices keep the typed handle.
        let irq = cfg.irq.map(|n| self.irq_line(n));

        let dev = match cfg.r#type {
            DeviceKind::Pca9540 => {
                if cfg.irq.is_some() {
                    tracing::warn!("{}: pca9540 has no interrupt output, ignoring irq", cfg.id);
                }
                DeviceHandle::Multiplexer(Rc::new(RefCell::new(SmbusSlave::new(Pca9540::new(
                    upstream,
                )))))
            }
            DeviceKind::Pca9541 => {
                let arb = Pca9541::new(
                    upstream,
                    Pca9541Config {
                        sim_other_master: cfg.sim_other_master,
                        irq,
                        irq_required: cfg.irq_required,
                    },
                )
                .map_err(|_| ConfigError::MissingInterrupt(cfg.id.clone()))?;
                DeviceHandle::Arbiter(Rc::new(RefCell::new(SmbusSlave::new(arb))))
            }
            DeviceKind::SmbusAlert => {
                let ara = SmbusAlert::new(irq)
                    .map_err(|_| ConfigError::MissingInterrupt(cfg.id.clone()))?;
                DeviceHandle::Alert(Rc::new(RefCell::new(SmbusSlave::new(ara))))
            }
            DeviceKind::Tmp102 => {
                DeviceHandle::Slave(Rc::new(RefCell::new(SmbusSlave::new(Tmp102::new()))))
            }
        };
        Ok(dev)
    }
}

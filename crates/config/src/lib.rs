// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

pub const SUPPORTED_SCHEMA_VERSION: &str = "1.0";

/// Upper bound (exclusive) of the 7-bit address space.
pub const ADDRESS_LIMIT: u8 = 0x80;

/// Most bytes a single read step may request.
pub const READ_COUNT_LIMIT: usize = 255;

/// Default schema version for YAML configs
fn default_schema_version() -> String {
    SUPPORTED_SCHEMA_VERSION.to_string()
}

fn default_root_bus() -> String {
    "i2c0".to_string()
}

fn default_read_count() -> usize {
    1
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Unsupported schema_version '{0}'. Supported versions: '1.0'")]
    UnsupportedSchema(String),
    #[error("duplicate device id '{0}'")]
    DuplicateId(String),
    #[error("device '{id}': address {address:#04x} is outside the 7-bit address space")]
    AddressOutOfRange { id: String, address: u8 },
    #[error("device '{id}': bus '{bus}' is neither the root bus nor a child bus declared earlier")]
    UnknownBus { id: String, bus: String },
    #[error("step {index}: {reason}")]
    InvalidStep { index: usize, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    Pca9540,
    Pca9541,
    SmbusAlert,
    Tmp102,
}

impl DeviceKind {
    /// Number of child buses the chip owns.
    pub fn child_buses(self) -> usize {
        match self {
            DeviceKind::Pca9540 => 2,
            DeviceKind::Pca9541 => 1,
            DeviceKind::SmbusAlert | DeviceKind::Tmp102 => 0,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct DeviceConfig {
    pub id: String,
    pub r#type: DeviceKind,
    pub bus: String,
    pub address: u8,
    #[serde(default)]
    pub irq: Option<u32>,
    #[serde(default)]
    pub irq_required: bool,
    #[serde(default)]
    pub sim_other_master: bool,
}

/// Name of child bus `n` of chip `id`.
pub fn child_bus_name(id: &str, n: usize) -> String {
    format!("{}.{}", id, n)
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SystemManifest {
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    pub name: String,
    #[serde(default = "default_root_bus")]
    pub root_bus: String,
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
}

impl SystemManifest {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let f = std::fs::File::open(&path)
            .with_context(|| format!("Failed to open system manifest at {:?}", path.as_ref()))?;
        let manifest: Self =
            serde_yaml::from_reader(f).context("Failed to parse System Manifest")?;
        manifest.validate()?;
        tracing::debug!(
            "Loaded manifest '{}' with {} devices",
            manifest.name,
            manifest.devices.len()
        );
        Ok(manifest)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let manifest: Self =
            serde_yaml::from_str(yaml).context("Failed to parse System Manifest")?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Devices may only sit on the root bus or on a child bus of a chip
    /// declared before them.
    pub fn validate(&self) -> Result<()> {
        if self.schema_version != SUPPORTED_SCHEMA_VERSION {
            anyhow::bail!(ValidationError::UnsupportedSchema(
                self.schema_version.clone()
            ));
        }

        let mut ids = HashSet::new();
        let mut buses: HashSet<String> = HashSet::from([self.root_bus.clone()]);

        for dev in &self.devices {
            if !ids.insert(dev.id.as_str()) {
                anyhow::bail!(ValidationError::DuplicateId(dev.id.clone()));
            }
            if dev.address >= ADDRESS_LIMIT {
                anyhow::bail!(ValidationError::AddressOutOfRange {
                    id: dev.id.clone(),
                    address: dev.address,
                });
            }
            if !buses.contains(&dev.bus) {
                anyhow::bail!(ValidationError::UnknownBus {
                    id: dev.id.clone(),
                    bus: dev.bus.clone(),
                });
            }
            buses.extend((0..dev.r#type.child_buses()).map(|n| child_bus_name(&dev.id, n)));
        }

        Ok(())
    }

    pub fn device(&self, id: &str) -> Option<&DeviceConfig> {
        self.devices.iter().find(|d| d.id == id)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct WriteStep {
    pub bus: String,
    pub address: u8,
    #[serde(default)]
    pub data: Vec<u8>,
    #[serde(default)]
    pub expect_nack: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ReadStep {
    pub bus: String,
    pub address: u8,
    /// Command byte sent before a repeated start.
    #[serde(default)]
    pub command: Option<u8>,
    #[serde(default = "default_read_count")]
    pub count: usize,
    #[serde(default)]
    pub expect: Option<Vec<u8>>,
    #[serde(default)]
    pub expect_nack: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct AlertStep {
    pub device: String,
    pub address: u8,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(from = "StepEntry", into = "StepEntry")]
pub enum Step {
    Write(WriteStep),
    Read(ReadStep),
    Alert(AlertStep),
    Reset,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
struct WriteEntry {
    write: WriteStep,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
struct ReadEntry {
    read: ReadStep,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
struct AlertEntry {
    alert: AlertStep,
}

/// Steps that carry no arguments, written as a bare word.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
#[serde(rename_all = "snake_case")]
enum StepKeyword {
    Reset,
}

/// On-disk form of a step: `- write: {...}`, `- read: {...}`,
/// `- alert: {...}` or `- reset`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
enum StepEntry {
    Write(WriteEntry),
    Read(ReadEntry),
    Alert(AlertEntry),
    Keyword(StepKeyword),
}

impl From<StepEntry> for Step {
    fn from(entry: StepEntry) -> Self {
        match entry {
            StepEntry::Write(w) => Step::Write(w.write),
            StepEntry::Read(r) => Step::Read(r.read),
            StepEntry::Alert(a) => Step::Alert(a.alert),
            StepEntry::Keyword(StepKeyword::Reset) => Step::Reset,
        }
    }
}

impl From<Step> for StepEntry {
    fn from(step: Step) -> Self {
        match step {
            Step::Write(write) => StepEntry::Write(WriteEntry { write }),
            Step::Read(read) => StepEntry::Read(ReadEntry { read }),
            Step::Alert(alert) => StepEntry::Alert(AlertEntry { alert }),
            Step::Reset => StepEntry::Keyword(StepKeyword::Reset),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct IrqLevelDetails {
    pub irq: u32,
    pub level: bool,
    #[serde(default)]
    pub rising_edges: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct IrqLevelAssertion {
    pub irq_level: IrqLevelDetails,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct DeviceFieldDetails {
    pub device: String,
    pub field: String,
    pub expected: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct DeviceFieldAssertion {
    pub device_field: DeviceFieldDetails,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum ScriptAssertion {
    IrqLevel(IrqLevelAssertion),
    DeviceField(DeviceFieldAssertion),
}

/// A sequence of bus transactions replayed against a system.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TransactionScript {
    pub schema_version: String,
    #[serde(default)]
    pub system: Option<String>,
    #[serde(default)]
    pub steps: Vec<Step>,
    #[serde(default)]
    pub assertions: Vec<ScriptAssertion>,
}

impl TransactionScript {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read transaction script at {:?}", path.as_ref()))?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let script: Self =
            serde_yaml::from_str(yaml).context("Failed to parse Transaction Script YAML")?;
        script.validate()?;
        Ok(script)
    }

    pub fn validate(&self) -> Result<()> {
        if self.schema_version != SUPPORTED_SCHEMA_VERSION {
            anyhow::bail!(ValidationError::UnsupportedSchema(
                self.schema_version.clone()
            ));
        }

        for (index, step) in self.steps.iter().enumerate() {
            let invalid = |reason: &str| ValidationError::InvalidStep {
                index,
                reason: reason.to_string(),
            };
            match step {
                Step::Write(w) if w.address >= ADDRESS_LIMIT => {
                    anyhow::bail!(invalid("write address outside the 7-bit address space"))
                }
                Step::Read(r) if r.address >= ADDRESS_LIMIT => {
                    anyhow::bail!(invalid("read address outside the 7-bit address space"))
                }
                Step::Read(r) if r.count == 0 && !r.expect_nack => {
                    anyhow::bail!(invalid("read 'count' must be greater than zero"))
                }
                Step::Read(r) if r.count > READ_COUNT_LIMIT => {
                    anyhow::bail!(invalid("read 'count' exceeds 255 bytes"))
                }
                Step::Read(ReadStep {
                    expect: Some(expect),
                    count,
                    ..
                }) if expect.len() != *count => {
                    anyhow::bail!(invalid("'expect' length must match 'count'"))
                }
                Step::Read(ReadStep {
                    expect: Some(_),
                    expect_nack: true,
                    ..
                }) => anyhow::bail!(invalid("'expect' and 'expect_nack' are exclusive")),
                _ => {}
            }
        }

        Ok(())
    }
}

// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use serde::Serialize;
use switchsim_config::{ReadStep, ScriptAssertion, Step, WriteStep};
use switchsim_core::{I2cResult, Machine};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pass,
    /// The bus answered, but not the way the script expected.
    Fail,
    /// The step could not be carried out at all.
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepResult {
    pub index: usize,
    pub kind: &'static str,
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<u8>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AssertionResult {
    pub assertion: ScriptAssertion,
    pub passed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub steps: Vec<StepResult>,
    pub assertions: Vec<AssertionResult>,
}

impl RunOutcome {
    pub fn status(&self) -> StepStatus {
        if self.steps.iter().any(|s| s.status == StepStatus::Error) {
            StepStatus::Error
        } else if self.steps.iter().any(|s| s.status == StepStatus::Fail)
            || self.assertions.iter().any(|a| !a.passed)
        {
            StepStatus::Fail
        } else {
            StepStatus::Pass
        }
    }
}

fn step_kind(step: &Step) -> &'static str {
    match step {
        Step::Write(_) => "write",
        Step::Read(_) => "read",
        Step::Alert(_) => "alert",
        Step::Reset => "reset",
    }
}

/// Replay `steps` in order, stopping at the first one that does not pass,
/// then evaluate every assertion against the resulting state.
pub fn run_script(
    machine: &mut Machine,
    steps: &[Step],
    assertions: &[ScriptAssertion],
) -> RunOutcome {
    let mut results = Vec::with_capacity(steps.len());
    for (index, step) in steps.iter().enumerate() {
        let (status, data, message) = match execute_step(machine, step) {
            Ok(Ok(data)) => (StepStatus::Pass, data, None),
            Ok(Err(mismatch)) => (StepStatus::Fail, None, Some(mismatch)),
            Err(e) => (StepStatus::Error, None, Some(e)),
        };
        debug!("step {} ({}): {:?}", index, step_kind(step), status);
        if let Some(msg) = &message {
            warn!("step {} ({}) {:?}: {}", index, step_kind(step), status, msg);
        }
        results.push(StepResult {
            index,
            kind: step_kind(step),
            status,
            data,
            message,
        });
        if status != StepStatus::Pass {
            break;
        }
    }

    let assertions = assertions
        .iter()
        .map(|a| AssertionResult {
            assertion: a.clone(),
            passed: check_assertion(machine, a),
        })
        .collect();

    RunOutcome {
        steps: results,
        assertions,
    }
}

type StepReturn = Result<Result<Option<Vec<u8>>, String>, String>;

fn execute_step(machine: &mut Machine, step: &Step) -> StepReturn {
    match step {
        Step::Write(w) => write_step(machine, w),
        Step::Read(r) => read_step(machine, r),
        Step::Alert(a) => {
            machine
                .alert(&a.device, a.address)
                .map_err(|e| e.to_string())?;
            Ok(Ok(None))
        }
        Step::Reset => {
            machine.reset();
            Ok(Ok(None))
        }
    }
}

fn write_step(machine: &Machine, w: &WriteStep) -> StepReturn {
    let bus = machine
        .bus(&w.bus)
        .ok_or_else(|| format!("unknown bus '{}'", w.bus))?;
    let res = bus.write_block(w.address, &w.data);
    Ok(match (res, w.expect_nack) {
        (Ok(()), false) | (Err(_), true) => Ok(None),
        (Ok(()), true) => Err(format!("write to {:#04x} was acknowledged", w.address)),
        (Err(e), false) => Err(format!("write to {:#04x}: {}", w.address, e)),
    })
}

fn read_step(machine: &Machine, r: &ReadStep) -> StepReturn {
    let bus = machine
        .bus(&r.bus)
        .ok_or_else(|| format!("unknown bus '{}'", r.bus))?;
    let res: I2cResult<Vec<u8>> = match r.command {
        Some(command) => bus.read_block_data(r.address, command, r.count),
        None => bus.read_block(r.address, r.count),
    };

    Ok(match (res, r.expect_nack, &r.expect) {
        (Err(_), true, _) => Ok(None),
        (Ok(_), true, _) => Err(format!("read from {:#04x} was acknowledged", r.address)),
        (Err(e), false, _) => Err(format!("read from {:#04x}: {}", r.address, e)),
        (Ok(data), false, Some(expect)) if &data != expect => Err(format!(
            "read {:02x?} from {:#04x}, expected {:02x?}",
            data, r.address, expect
        )),
        (Ok(data), false, _) => Ok(Some(data)),
    })
}

fn check_assertion(machine: &Machine, assertion: &ScriptAssertion) -> bool {
    match assertion {
        ScriptAssertion::IrqLevel(a) => {
            let pin = machine.irqs().pin(a.irq_level.irq);
            pin.level == a.irq_level.level
                && a
                    .irq_level
                    .rising_edges
                    .map_or(true, |n| u64::from(pin.rising_edges) == n)
        }
        ScriptAssertion::DeviceField(a) => {
            let d = &a.device_field;
            machine
                .peek_device(&d.device)
                .and_then(|state| state.get(&d.field).cloned())
                .is_some_and(|value| value == d.expected)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchsim_config::{SystemManifest, TransactionScript};

    fn machine() -> Machine {
        let manifest = SystemManifest::from_yaml(
            r#"
name: "runner"
devices:
  - { id: "mux", type: "pca9540", bus: "i2c0", address: 0x70 }
  - { id: "temp", type: "tmp102", bus: "mux.0", address: 0x48 }
  - { id: "ara", type: "smbus_alert", bus: "i2c0", address: 0x0c, irq: 2 }
"#,
        )
        .unwrap();
        Machine::from_manifest(&manifest).unwrap()
    }

    fn run(yaml: &str) -> RunOutcome {
        let script = TransactionScript::from_yaml(yaml).unwrap();
        run_script(&mut machine(), &script.steps, &script.assertions)
    }

    #[test]
    fn test_passing_script() {
        let outcome = run(r#"
schema_version: "1.0"
steps:
  - read: { bus: "i2c0", address: 0x48, command: 0x00, expect_nack: true }
  - write: { bus: "i2c0", address: 0x70, data: [0x04] }
  - read: { bus: "i2c0", address: 0x48, command: 0x00, count: 2, expect: [0x19, 0x00] }
  - alert: { device: "ara", address: 0x48 }
assertions:
  - irq_level: { irq: 2, level: true, rising_edges: 1 }
  - device_field: { device: "mux", field: "selector", expected: 4 }
"#);
        assert_eq!(outcome.status(), StepStatus::Pass);
        assert_eq!(outcome.steps[2].data, Some(vec![0x19, 0x00]));
    }

    #[test]
    fn test_mismatch_stops_script() {
        let outcome = run(r#"
schema_version: "1.0"
steps:
  - write: { bus: "i2c0", address: 0x70, data: [0x04] }
  - read: { bus: "i2c0", address: 0x70, expect: [0x05] }
  - reset
"#);
        assert_eq!(outcome.status(), StepStatus::Fail);
        assert_eq!(outcome.steps.len(), 2);
        assert!(outcome.steps[1].message.as_deref().unwrap().contains("expected"));
    }

    #[test]
    fn test_unknown_bus_is_error() {
        let outcome = run(r#"
schema_version: "1.0"
steps:
  - write: { bus: "mux.7", address: 0x48, data: [0x01] }
"#);
        assert_eq!(outcome.status(), StepStatus::Error);
    }

    #[test]
    fn test_failed_assertion() {
        let outcome = run(r#"
schema_version: "1.0"
steps:
  - reset
assertions:
  - irq_level: { irq: 2, level: true }
  - device_field: { device: "nope", field: "selector", expected: 0 }
"#);
        assert_eq!(outcome.status(), StepStatus::Fail);
        assert!(outcome.assertions.iter().all(|a| !a.passed));
    }
}

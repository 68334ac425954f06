// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

mod runner;

use clap::{Parser, Subcommand};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info};

use runner::{run_script, AssertionResult, RunOutcome, StepResult, StepStatus};
use switchsim_config::TransactionScript;
use switchsim_core::interrupt::PinState;
use switchsim_core::snapshot::MachineSnapshot;
use switchsim_core::system::builder::build_machine;

const EXIT_PASS: u8 = 0;
const EXIT_ASSERT_FAIL: u8 = 1;
const EXIT_CONFIG_ERROR: u8 = 2;
const EXIT_RUNTIME_ERROR: u8 = 3;

const RESULT_SCHEMA_VERSION: &str = "1.0";

#[derive(Parser, Debug)]
#[command(author, version, about = "I2C switch and arbiter simulator", long_about = None)]
struct Cli {
    /// Enable register-level tracing
    #[arg(short, long, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replay a transaction script (YAML) against a system and check it.
    Test(TestArgs),

    /// Print the buses of a system and what answers at each address.
    Topology(TopologyArgs),
}

#[derive(Parser, Debug)]
struct TestArgs {
    /// Path to the system manifest (YAML)
    #[arg(short = 's', long)]
    system: Option<PathBuf>,

    /// Path to the transaction script (YAML)
    #[arg(short = 'c', long)]
    script: PathBuf,

    /// Directory to write test artifacts (result.json, snapshot.json)
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Optional path to write a JUnit XML report for CI systems
    #[arg(long)]
    junit: Option<PathBuf>,

    /// Load device state from a snapshot (JSON) before the first step
    #[arg(long)]
    restore: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct TopologyArgs {
    /// Path to the system manifest (YAML)
    #[arg(short = 's', long)]
    system: PathBuf,

    /// Print JSON instead of a listing
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Serialize)]
struct TestResult {
    result_schema_version: String,
    status: StepStatus,
    steps_executed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    steps: Vec<StepResult>,
    assertions: Vec<AssertionResult>,
    irqs: BTreeMap<u32, PinState>,
    config: TestConfig,
}

#[derive(Debug, Clone, Serialize)]
struct TestConfig {
    system: Option<PathBuf>,
    script: PathBuf,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize tracing with appropriate level based on --trace flag.
    // Logs go to stderr; stdout carries command output.
    let level = if cli.trace {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Test(args) => run_test(args),
        Commands::Topology(args) => run_topology(args),
    }
}

fn run_test(args: TestArgs) -> ExitCode {
    let script = match TransactionScript::from_file(&args.script) {
        Ok(s) => s,
        Err(e) => {
            let msg = format!("{:#}", e);
            error!("{}", msg);
            write_config_error_outputs(&args, args.system.clone(), msg);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    let system_path = args.system.clone().or_else(|| {
        script
            .system
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .map(|s| resolve_script_path(&args.script, s))
    });

    let mut machine = match build_machine(system_path.as_deref()) {
        Ok(m) => m,
        Err(e) => {
            let msg = format!("Failed to build system: {:#}", e);
            error!("{}", msg);
            write_config_error_outputs(&args, system_path, msg);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    if let Some(path) = &args.restore {
        if let Err(e) = restore_snapshot(&mut machine, path) {
            let msg = format!("Failed to restore snapshot {:?}: {:#}", path, e);
            error!("{}", msg);
            write_config_error_outputs(&args, system_path, msg);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    }

    info!(
        "Running {} steps from {:?}",
        script.steps.len(),
        args.script
    );
    let start = std::time::Instant::now();
    let outcome = run_script(&mut machine, &script.steps, &script.assertions);
    let duration = start.elapsed();

    let status = outcome.status();
    let result = TestResult {
        result_schema_version: RESULT_SCHEMA_VERSION.to_string(),
        status,
        steps_executed: outcome.steps.len(),
        message: outcome
            .steps
            .iter()
            .find_map(|s| s.message.clone()),
        steps: outcome.steps.clone(),
        assertions: outcome.assertions.clone(),
        irqs: machine.irqs().pins(),
        config: TestConfig {
            system: system_path,
            script: args.script.clone(),
        },
    };

    for (idx, a) in outcome.assertions.iter().enumerate() {
        if !a.passed {
            error!("Assertion {} failed: {:?}", idx + 1, a.assertion);
        }
    }
    info!("Result: {:?} after {} steps", status, result.steps_executed);

    write_outputs(&args, &result, Some(&machine.snapshot()), &outcome, duration);

    match status {
        StepStatus::Pass => ExitCode::from(EXIT_PASS),
        StepStatus::Fail => ExitCode::from(EXIT_ASSERT_FAIL),
        StepStatus::Error => ExitCode::from(EXIT_RUNTIME_ERROR),
    }
}

fn restore_snapshot(machine: &mut switchsim_core::Machine, path: &Path) -> anyhow::Result<()> {
    let f = std::fs::File::open(path)?;
    let snapshot: MachineSnapshot = serde_json::from_reader(f)?;
    machine.apply_snapshot(&snapshot)?;
    info!("Restored {} devices from {:?}", snapshot.devices.len(), path);
    Ok(())
}

fn run_topology(args: TopologyArgs) -> ExitCode {
    let machine = match build_machine(Some(&args.system)) {
        Ok(m) => m,
        Err(e) => {
            error!("Failed to build system: {:#}", e);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    let topology = machine.topology();
    if args.json {
        match serde_json::to_string_pretty(&topology) {
            Ok(s) => println!("{}", s),
            Err(e) => {
                error!("Failed to serialize topology: {}", e);
                return ExitCode::from(EXIT_RUNTIME_ERROR);
            }
        }
    } else {
        for bus in &topology {
            println!("{}", bus.name);
            for slot in &bus.slots {
                match &slot.device {
                    Some(id) => println!("  {:#04x}  {}", slot.address, id),
                    None => println!("  {:#04x}  (proxy)", slot.address),
                }
            }
        }
    }
    ExitCode::from(EXIT_PASS)
}

fn write_json<T: Serialize>(path: &Path, value: &T) {
    match std::fs::File::create(path) {
        Ok(f) => {
            if let Err(e) = serde_json::to_writer_pretty(f, value) {
                error!("Failed to write {:?}: {}", path, e);
            }
        }
        Err(e) => error!("Failed to create {:?}: {}", path, e),
    }
}

fn write_outputs(
    args: &TestArgs,
    result: &TestResult,
    snapshot: Option<&MachineSnapshot>,
    outcome: &RunOutcome,
    duration: std::time::Duration,
) {
    if let Some(output_dir) = &args.output_dir {
        if let Err(e) = std::fs::create_dir_all(output_dir) {
            error!("Failed to create output directory {:?}: {}", output_dir, e);
        } else {
            write_json(&output_dir.join("result.json"), result);
            if let Some(snapshot) = snapshot {
                write_json(&output_dir.join("snapshot.json"), snapshot);
            }

            let junit_path = output_dir.join("junit.xml");
            if let Err(e) = write_junit_xml(&junit_path, result, outcome, duration) {
                error!("Failed to write junit.xml: {}", e);
            }
        }
    }

    if let Some(junit_path) = &args.junit {
        if let Some(parent) = junit_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        if let Err(e) = write_junit_xml(junit_path, result, outcome, duration) {
            error!("Failed to write JUnit report {:?}: {}", junit_path, e);
        }
    }
}

fn write_config_error_outputs(args: &TestArgs, system: Option<PathBuf>, message: String) {
    let result = TestResult {
        result_schema_version: RESULT_SCHEMA_VERSION.to_string(),
        status: StepStatus::Error,
        steps_executed: 0,
        message: Some(message),
        steps: Vec::new(),
        assertions: Vec::new(),
        irqs: BTreeMap::new(),
        config: TestConfig {
            system,
            script: args.script.clone(),
        },
    };
    let outcome = RunOutcome {
        steps: Vec::new(),
        assertions: Vec::new(),
    };
    write_outputs(args, &result, None, &outcome, std::time::Duration::ZERO);
}

fn resolve_script_path(script_path: &Path, value: &str) -> PathBuf {
    let p = PathBuf::from(value);
    if p.is_absolute() {
        return p;
    }
    script_path
        .parent()
        .unwrap_or_else(|| std::path::Path::new("."))
        .join(p)
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

fn write_junit_xml(
    path: &Path,
    result: &TestResult,
    outcome: &RunOutcome,
    duration: std::time::Duration,
) -> std::io::Result<()> {
    let time_secs = duration.as_secs_f64();
    let mut tests: u64 = 0;
    let mut failures: u64 = 0;
    let mut errors: u64 = 0;
    let mut testcases = String::new();

    // A top-level "run" testcase carries configuration errors, which have
    // no steps to attach to.
    tests += 1;
    testcases.push_str(&format!(
        "  <testcase classname=\"switchsim\" name=\"run\" time=\"{:.6}\">\n",
        time_secs
    ));
    if result.steps.is_empty() && result.status == StepStatus::Error {
        errors += 1;
        testcases.push_str(&format!(
            "    <error message=\"config error\">{}</error>\n",
            xml_escape(result.message.as_deref().unwrap_or_default())
        ));
    }
    testcases.push_str("  </testcase>\n");

    // One testcase per step and per assertion so CI UIs show exactly what broke.
    for step in &outcome.steps {
        tests += 1;
        let name = format!("step {}: {}", step.index, step.kind);
        testcases.push_str(&format!(
            "  <testcase classname=\"switchsim\" name=\"{}\" time=\"0.000000\">\n",
            xml_escape(&name)
        ));
        let msg = xml_escape(step.message.as_deref().unwrap_or_default());
        match step.status {
            StepStatus::Pass => {}
            StepStatus::Fail => {
                failures += 1;
                testcases.push_str(&format!(
                    "    <failure message=\"step failed\">{}</failure>\n",
                    msg
                ));
            }
            StepStatus::Error => {
                errors += 1;
                testcases.push_str(&format!(
                    "    <error message=\"runtime error\">{}</error>\n",
                    msg
                ));
            }
        }
        testcases.push_str("  </testcase>\n");
    }

    for (idx, a) in outcome.assertions.iter().enumerate() {
        tests += 1;
        let name = format!("assertion {}: {:?}", idx + 1, a.assertion);
        testcases.push_str(&format!(
            "  <testcase classname=\"switchsim\" name=\"{}\" time=\"0.000000\">\n",
            xml_escape(&name)
        ));
        if !a.passed {
            failures += 1;
            testcases.push_str(&format!(
                "    <failure message=\"assertion failed\">{}</failure>\n",
                xml_escape(&name)
            ));
        }
        testcases.push_str("  </testcase>\n");
    }

    let mut xml = String::new();
    xml.push_str(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
    xml.push('\n');
    xml.push_str(&format!(
        r#"<testsuite name="switchsim" tests="{}" failures="{}" errors="{}" time="{:.6}">"#,
        tests, failures, errors, time_secs
    ));
    xml.push('\n');
    xml.push_str("  <properties>\n");
    xml.push_str(&format!(
        "    <property name=\"result_schema_version\" value=\"{}\"/>\n",
        xml_escape(RESULT_SCHEMA_VERSION)
    ));
    xml.push_str(&format!(
        "    <property name=\"script\" value=\"{}\"/>\n",
        xml_escape(&result.config.script.display().to_string())
    ));
    xml.push_str("  </properties>\n");
    xml.push_str(&testcases);
    xml.push_str("</testsuite>\n");

    std::fs::write(path, xml)
}

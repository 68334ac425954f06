// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use std::time::{SystemTime, UNIX_EPOCH};
use switchsim_config::{DeviceKind, Step, SystemManifest, TransactionScript};

fn write_temp_file(prefix: &str, contents: &str) -> std::path::PathBuf {
    let mut dir = std::env::temp_dir();
    dir.push("switchsim-config-tests");
    let _ = std::fs::create_dir_all(&dir);

    let nonce = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let path = dir.join(format!("{}-{}.yaml", prefix, nonce));
    std::fs::write(&path, contents).expect("Failed to write temp file");
    path
}

#[test]
fn test_minimal_manifest_defaults() {
    let yaml = r#"
name: "bare"
"#;
    let manifest: SystemManifest = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(manifest.schema_version, "1.0");
    assert_eq!(manifest.root_bus, "i2c0");
    assert!(manifest.devices.is_empty());
    assert!(manifest.validate().is_ok());
}

#[test]
fn test_manifest_from_file() {
    let path = write_temp_file(
        "manifest",
        r#"
schema_version: "1.0"
name: "alerting"
root_bus: "smbus1"
devices:
  - id: "ara"
    type: "smbus_alert"
    bus: "smbus1"
    address: 0x0c
    irq: 7
  - id: "arb"
    type: "pca9541"
    bus: "smbus1"
    address: 0x74
    irq: 3
    irq_required: true
"#,
    );

    let manifest = SystemManifest::from_file(&path).unwrap();
    assert_eq!(manifest.root_bus, "smbus1");
    assert_eq!(manifest.devices[0].r#type, DeviceKind::SmbusAlert);
    assert_eq!(manifest.devices[0].address, 0x0C);
    assert!(manifest.devices[1].irq_required);
}

#[test]
fn test_manifest_unknown_field_rejected() {
    let yaml = r#"
name: "typo"
devices:
  - { id: "a", type: "tmp102", bus: "i2c0", adress: 0x48 }
"#;
    assert!(SystemManifest::from_yaml(yaml).is_err());
}

#[test]
fn test_missing_file_reports_path() {
    let err = TransactionScript::from_file("/nonexistent/script.yaml").unwrap_err();
    assert!(format!("{:#}", err).contains("script.yaml"));
}

#[test]
fn test_script_from_file() {
    let path = write_temp_file(
        "script",
        r#"
schema_version: "1.0"
steps:
  - write: { bus: "i2c0", address: 0x70, data: [0x05] }
  - write: { bus: "i2c0", address: 0x71 }
  - read: { bus: "mux.1", address: 0x48, command: 0x00, count: 2, expect: [0x19, 0x00] }
"#,
    );
    let script = TransactionScript::from_file(&path).unwrap();
    assert!(script.system.is_none());
    assert!(script.assertions.is_empty());
    match &script.steps[1] {
        Step::Write(w) => assert!(w.data.is_empty()),
        other => panic!("unexpected step {:?}", other),
    }
}

#[test]
fn test_script_rejects_exclusive_expectations() {
    let yaml = r#"
schema_version: "1.0"
steps:
  - read: { bus: "i2c0", address: 0x48, expect: [0x00], expect_nack: true }
"#;
    let err = TransactionScript::from_yaml(yaml).unwrap_err();
    assert!(err.to_string().contains("exclusive"));
}

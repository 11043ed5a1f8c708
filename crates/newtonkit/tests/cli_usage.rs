#![cfg(all(unix, feature = "cli"))]

use std::process::Command;

#[test]
fn missing_device_path_is_usage_error() {
    let output = Command::new(env!("CARGO_BIN_EXE_newch"))
        .output()
        .expect("newch should run");

    assert_eq!(output.status.code(), Some(64));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("<DEVICE>"), "stderr: {stderr}");
}

#[test]
fn help_exits_cleanly() {
    let output = Command::new(env!("CARGO_BIN_EXE_newch"))
        .arg("--help")
        .output()
        .expect("newch should run");

    assert_eq!(output.status.code(), Some(0));
    assert!(String::from_utf8_lossy(&output.stdout).contains("--baud"));
}

#[test]
fn absent_device_is_transport_error() {
    let output = Command::new(env!("CARGO_BIN_EXE_newch"))
        .arg("--log-level")
        .arg("error")
        .arg("/dev/newch-test-does-not-exist")
        .output()
        .expect("newch should run");

    assert_eq!(output.status.code(), Some(3));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("open failed"), "stderr: {stderr}");
}

//! Black-box tests of the CLI binary against the simulated axis.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

fn encoder_cmd() -> Command {
    Command::cargo_bin("encoder_cli").expect("binary builds")
}

fn parse_stdout_json(output: &[u8]) -> serde_json::Value {
    let text = String::from_utf8_lossy(output);
    serde_json::from_str(text.trim()).expect("stdout is a JSON line")
}

#[test]
fn self_check_reports_ok() {
    let assert = encoder_cmd().args(["--json", "self-check"]).assert().success();
    let v = parse_stdout_json(&assert.get_output().stdout);
    assert_eq!(v["ok"], true);
    assert_eq!(v["cpr"], 8192);
}

#[test]
fn calibrate_recovers_the_simulated_zero() {
    let assert = encoder_cmd()
        .args(["--json", "--sim-zero-count", "1000", "calibrate"])
        .assert()
        .success();
    let v = parse_stdout_json(&assert.get_output().stdout);
    assert_eq!(v["ok"], true);
    assert_eq!(v["ready"], true);
    assert_eq!(v["direction"], 1);
    // The offset is only defined modulo one electrical revolution
    // (cpr / pole_pairs counts).
    let offset = v["offset"].as_i64().expect("offset is an integer");
    let period = 8192.0 / 7.0;
    let diff = (offset - 1000) as f64;
    let residue = diff - (diff / period).round() * period;
    assert!(residue.abs() <= 2.5, "offset {offset} (residue {residue})");
}

#[test]
fn calibrate_with_index_search_from_config() {
    let mut f = tempfile::NamedTempFile::new().expect("tempfile");
    write!(
        f,
        r#"
[encoder]
use_index = true
"#
    )
    .expect("write config");

    let assert = encoder_cmd()
        .args(["--json", "--config"])
        .arg(f.path())
        .arg("calibrate")
        .assert()
        .success();
    let v = parse_stdout_json(&assert.get_output().stdout);
    assert_eq!(v["ok"], true);
    assert_eq!(v["index_found"], true);
    assert_eq!(v["ready"], true);
}

#[test]
fn direction_find_reports_forward_pairing() {
    let assert = encoder_cmd()
        .args(["--json", "direction-find"])
        .assert()
        .success();
    let v = parse_stdout_json(&assert.get_output().stdout);
    assert_eq!(v["direction"], 1);
}

#[test]
fn estimate_tracks_one_revolution() {
    let assert = encoder_cmd()
        .args(["--json", "estimate", "--turns", "1.0", "--ticks", "8000"])
        .assert()
        .success();
    let v = parse_stdout_json(&assert.get_output().stdout);
    let shadow = v["shadow_count"].as_i64().expect("shadow_count");
    assert!((shadow - 8192).abs() <= 2, "shadow {shadow}");
    assert!(v["vel_estimate"].as_f64().expect("vel") > 0.0);
}

#[test]
fn cpr_mismatch_exits_with_calibration_fault_code() {
    let mut f = tempfile::NamedTempFile::new().expect("tempfile");
    // Claim half the simulated sensor's true resolution.
    write!(
        f,
        r#"
[encoder]
cpr = 4096
"#
    )
    .expect("write config");

    encoder_cmd()
        .args(["--json", "--config"])
        .arg(f.path())
        .arg("calibrate")
        .assert()
        .failure()
        .code(2)
        .stdout(predicate::str::contains("\"ok\":false"));
}

#[test]
fn rejects_a_malformed_config_file() {
    let mut f = tempfile::NamedTempFile::new().expect("tempfile");
    write!(
        f,
        r#"
[encoder]
mode = "absolute"
"#
    )
    .expect("write config");

    encoder_cmd()
        .args(["--config"])
        .arg(f.path())
        .arg("self-check")
        .assert()
        .failure()
        .stderr(predicate::str::contains("parse config"));
}

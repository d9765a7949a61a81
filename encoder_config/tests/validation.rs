use encoder_config::{Mode, MotorKind, load_toml};

#[test]
fn parses_a_full_axis_config() {
    let toml = r#"
[encoder]
mode = "incremental"
cpr = 8192
bandwidth_hz = 1000.0
use_index = true
pre_calibrated = true
offset = 1493
offset_float = 0.37

[axis]
control_rate_hz = 8000
direction = 1

[motor]
kind = "highcurrent"
pole_pairs = 7
phase_resistance_ohm = 0.041
calibration_current_a = 10.0

[calibration]
scan_distance_rad = 50.26
scan_omega_rad_s = 12.56
cpr_tolerance = 0.02

[logging]
level = "debug"
"#;

    let cfg = load_toml(toml).expect("parse TOML");
    cfg.validate().expect("valid config should pass");
    assert_eq!(cfg.encoder.mode, Mode::Incremental);
    assert_eq!(cfg.effective_cpr(), 8192);
    assert_eq!(cfg.encoder.offset, 1493);
    assert!(cfg.encoder.use_index);
    assert_eq!(cfg.axis.direction, 1);
    assert_eq!(cfg.motor.kind, MotorKind::HighCurrent);
    assert_eq!(cfg.logging.level.as_deref(), Some("debug"));
}

#[test]
fn empty_config_falls_back_to_defaults() {
    let cfg = load_toml("").expect("parse TOML");
    cfg.validate().expect("defaults must validate");
    assert_eq!(cfg.encoder.mode, Mode::Incremental);
    assert_eq!(cfg.effective_cpr(), 8192);
    assert_eq!(cfg.axis.control_rate_hz, 8000);
    assert!(!cfg.encoder.pre_calibrated);
}

#[test]
fn hall_mode_derives_cpr_from_pole_pairs() {
    let toml = r#"
[encoder]
mode = "hall"

[motor]
pole_pairs = 11
"#;
    let cfg = load_toml(toml).expect("parse TOML");
    assert_eq!(cfg.effective_cpr(), 66);
}

#[test]
fn sincos_mode_uses_its_synthetic_cpr() {
    let toml = r#"
[encoder]
mode = "sincos"
"#;
    let cfg = load_toml(toml).expect("parse TOML");
    assert_eq!(cfg.effective_cpr(), 6283);
}

#[test]
fn rejects_unknown_mode() {
    let toml = r#"
[encoder]
mode = "absolute"
"#;
    assert!(load_toml(toml).is_err());
}

#[test]
fn rejects_unstable_bandwidth_for_the_tick_rate() {
    let toml = r#"
[encoder]
bandwidth_hz = 5000.0

[axis]
control_rate_hz = 8000
"#;
    let cfg = load_toml(toml).expect("parse TOML");
    let err = cfg.validate().expect_err("should reject unstable bandwidth");
    assert!(format!("{err}").contains("unstable"));
}

#[test]
fn rejects_zero_pole_pairs() {
    let toml = r#"
[motor]
pole_pairs = 0
"#;
    let cfg = load_toml(toml).expect("parse TOML");
    let err = cfg.validate().expect_err("should reject pole_pairs=0");
    assert!(format!("{err}").contains("pole_pairs must be > 0"));
}

#[test]
fn rejects_out_of_range_offset_float() {
    let toml = r#"
[encoder]
offset_float = 1.5
"#;
    let cfg = load_toml(toml).expect("parse TOML");
    let err = cfg.validate().expect_err("should reject offset_float");
    assert!(format!("{err}").contains("offset_float"));
}

#[test]
fn rejects_invalid_direction() {
    let toml = r#"
[axis]
direction = 2
"#;
    let cfg = load_toml(toml).expect("parse TOML");
    assert!(cfg.validate().is_err());
}

#[test]
fn loads_from_a_file_on_disk() {
    use std::io::Write;
    let mut f = tempfile::NamedTempFile::new().expect("tempfile");
    write!(
        f,
        r#"
[encoder]
mode = "hall"
ignore_illegal_hall_state = true
"#
    )
    .expect("write");
    let text = std::fs::read_to_string(f.path()).expect("read back");
    let cfg = load_toml(&text).expect("parse TOML");
    cfg.validate().expect("valid config should pass");
    assert_eq!(cfg.encoder.mode, Mode::Hall);
    assert!(cfg.encoder.ignore_illegal_hall_state);
}

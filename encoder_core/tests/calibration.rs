//! End-to-end calibration scenarios against the simulated axis.

use encoder_core::{
    CalPhase, Encoder, EncoderConfig, ErrorFlags, build_encoder,
};
use encoder_hardware::{
    InstantLoop, SimAxis, SimIndexPin, SimMotor, SimSensor, SimSensorCfg, sim_axis,
};
use encoder_traits::{Commutation, FaultSignal, MotorParams, MotorType};

const TICK_HZ: u32 = 8000;
const SENSOR_CPR: i32 = 8192;
const POLE_PAIRS: u32 = 7;

type SimEncoder = Encoder<SimSensor, SimMotor, InstantLoop, SimIndexPin>;

fn motor_params() -> MotorParams {
    MotorParams {
        motor_type: MotorType::HighCurrent,
        pole_pairs: POLE_PAIRS,
        phase_resistance: 0.04,
        calibration_current: 10.0,
    }
}

fn axis_with_zero(zero_count: i32) -> SimAxis {
    sim_axis(
        SimSensorCfg {
            cpr: SENSOR_CPR,
            zero_count,
            pole_pairs: POLE_PAIRS,
        },
        motor_params(),
        TICK_HZ,
    )
}

fn build(axis: SimAxis, config: EncoderConfig, fault: Option<FaultSignal>) -> SimEncoder {
    build_encoder(
        axis.sensor,
        axis.motor,
        axis.driver,
        axis.index_pin,
        config,
        fault,
    )
    .expect("encoder builds")
}

/// Run standstill estimation ticks until the tracking loop has settled.
fn settle(enc: &mut SimEncoder, ticks: u32) {
    for _ in 0..ticks {
        enc.sample_now().expect("sample");
        enc.update().expect("update");
    }
}

#[test]
fn offset_calibration_recovers_sensor_zero() {
    let zero_count = 1000;
    let enc = &mut build(axis_with_zero(zero_count), EncoderConfig::default(), None);
    enc.setup().expect("setup");

    enc.run_offset_calibration().expect("calibration succeeds");

    assert!(enc.is_ready());
    assert_eq!(enc.cal_phase(), CalPhase::Ready);
    assert!(enc.do_checks());
    assert_eq!(enc.motor().direction(), 1);

    // The offset is only defined modulo one electrical revolution; the
    // symmetric sweep lands whole electrical turns away from the start.
    let cfg = enc.config();
    let period = SENSOR_CPR as f32 / POLE_PAIRS as f32;
    let diff = (cfg.offset - zero_count) as f32;
    let residue = diff - (diff / period).round() * period;
    assert!(
        residue.abs() <= 2.5,
        "offset {} vs sensor zero {zero_count} (residue {residue})",
        cfg.offset
    );
    assert!((0.0..1.0).contains(&cfg.offset_float));

    // The measured scan span must agree with cpr and pole pairs.
    let expected = cfg.calib_scan_distance
        / (POLE_PAIRS as f32 * 2.0 * std::f32::consts::PI / SENSOR_CPR as f32);
    let response = enc.calib_scan_response();
    assert!(
        (response - expected).abs() / expected < 0.02,
        "response {response} vs expected {expected}"
    );

    // With the rotor parked where the scan left it, the reported electrical
    // phase must sit at the commanded zero.
    settle(enc, 200);
    assert!(enc.phase().abs() < 0.05, "phase {}", enc.phase());
}

#[test]
fn offset_calibration_discovers_inverted_pairing() {
    let mut axis = axis_with_zero(0);
    axis.motor = SimMotor::new(axis.rotor.clone(), motor_params()).with_coupling(-1);
    let enc = &mut build(axis, EncoderConfig::default(), None);
    enc.setup().expect("setup");

    enc.run_offset_calibration().expect("calibration succeeds");
    assert_eq!(enc.motor().direction(), -1);
    assert!(enc.is_ready());
}

#[test]
fn cpr_mismatch_is_latched_and_escalated() {
    let fault = FaultSignal::new();
    let config = EncoderConfig {
        // Claim half the true resolution; the scan span will be 2x expected.
        cpr: SENSOR_CPR / 2,
        ..Default::default()
    };
    let enc = &mut build(axis_with_zero(0), config, Some(fault.clone()));
    enc.setup().expect("setup");

    assert!(enc.run_offset_calibration().is_err());
    assert!(enc.error_flags().contains(ErrorFlags::CPR_OUT_OF_RANGE));
    assert_eq!(enc.cal_phase(), CalPhase::Faulted);
    assert!(!enc.is_ready());
    assert!(!enc.do_checks());
    assert!(fault.is_raised(), "axis supervisor must be notified");
}

#[test]
fn unresponsive_motor_reports_no_response() {
    let mut axis = axis_with_zero(0);
    // Decoupled motor: voltage goes out, the shaft never moves.
    axis.motor = SimMotor::new(axis.rotor.clone(), motor_params()).with_coupling(0);
    let enc = &mut build(axis, EncoderConfig::default(), None);
    enc.setup().expect("setup");

    assert!(enc.run_offset_calibration().is_err());
    assert!(enc.error_flags().contains(ErrorFlags::NO_RESPONSE));
    assert!(!enc.is_ready());
}

#[test]
fn motor_fault_aborts_without_latching_encoder_errors() {
    let mut axis = axis_with_zero(0);
    axis.motor = SimMotor::new(axis.rotor.clone(), motor_params()).fail_after_enqueues(100);
    let enc = &mut build(axis, EncoderConfig::default(), None);
    enc.setup().expect("setup");

    assert!(enc.run_offset_calibration().is_err());
    // The failure belongs to the motor; the encoder keeps a clean slate
    // and simply stays uncalibrated.
    assert!(enc.error_flags().is_empty());
    assert!(!enc.is_ready());
    assert_eq!(enc.cal_phase(), CalPhase::Uncalibrated);
}

#[test]
fn acim_motor_cannot_be_offset_calibrated() {
    let mut axis = axis_with_zero(0);
    let params = MotorParams {
        motor_type: MotorType::Acim,
        ..motor_params()
    };
    axis.motor = SimMotor::new(axis.rotor.clone(), params);
    let enc = &mut build(axis, EncoderConfig::default(), None);

    assert!(enc.run_offset_calibration().is_err());
    assert!(enc.error_flags().contains(ErrorFlags::UNSUPPORTED_MOTOR_TYPE));
}

#[test]
fn degenerate_scan_config_is_rejected_before_any_motion() {
    let config = EncoderConfig {
        // Positive but so short that no whole scan step fits.
        calib_scan_distance: 1e-4,
        ..Default::default()
    };
    let mut axis = axis_with_zero(0);
    axis.motor = SimMotor::new(axis.rotor.clone(), motor_params());
    let enc = &mut build(axis, config, None);

    assert!(enc.run_offset_calibration().is_err());
    assert!(enc.error_flags().contains(ErrorFlags::INVALID_SCAN_CONFIG));
    assert_eq!(enc.motor().enqueue_count(), 0, "no voltage may be injected");
}

#[test]
fn offset_calibration_requires_index_when_configured() {
    let config = EncoderConfig {
        use_index: true,
        ..Default::default()
    };
    let enc = &mut build(axis_with_zero(0), config, None);
    enc.setup().expect("setup");

    assert!(enc.run_offset_calibration().is_err());
    assert!(enc.error_flags().contains(ErrorFlags::INDEX_NOT_FOUND_YET));
}

#[test]
fn direction_find_resolves_both_pairings() {
    for (coupling, expected) in [(1i8, 1i8), (-1, -1)] {
        let mut axis = axis_with_zero(0);
        axis.motor = SimMotor::new(axis.rotor.clone(), motor_params()).with_coupling(coupling);
        let enc = &mut build(axis, EncoderConfig::default(), None);
        enc.setup().expect("setup");

        enc.run_direction_find().expect("direction find succeeds");
        assert_eq!(enc.motor().direction(), expected, "coupling {coupling}");
        assert!(enc.do_checks());
    }
}

#[test]
fn direction_find_within_hysteresis_stays_ambiguous() {
    let mut axis = axis_with_zero(0);
    // Three counts of travel: inside the +-8 count dead band.
    let tiny = 3.0 / f64::from(SENSOR_CPR) * std::f64::consts::TAU;
    axis.motor = SimMotor::new(axis.rotor.clone(), motor_params()).with_lockin_distance(tiny);
    let enc = &mut build(axis, EncoderConfig::default(), None);
    enc.setup().expect("setup");

    enc.run_direction_find().expect("ambiguity is not an error");
    assert_eq!(enc.motor().direction(), 0);
    assert!(enc.error_flags().is_empty());
}

#[test]
fn index_search_rebases_counts_at_the_pulse() {
    let config = EncoderConfig {
        use_index: true,
        zero_count_on_find_idx: true,
        ..Default::default()
    };
    let axis = axis_with_zero(500);
    let rotor = axis.rotor.clone();
    // Park just below the revolution boundary so the lock-in spin crosses it.
    rotor.set_angle(-0.3);
    let enc = &mut build(axis, config, None);
    enc.setup().expect("setup");

    enc.run_index_search().expect("index search succeeds");

    assert!(enc.index_found());
    assert_eq!(enc.shadow_count(), 0);
    assert_eq!(enc.count_in_cpr(), 0);
    // A fresh absolute reference invalidates any stored offset.
    assert!(!enc.is_ready());
    assert_eq!(enc.cal_phase(), CalPhase::Uncalibrated);
}

#[test]
fn index_search_with_pre_calibrated_offset_becomes_ready() {
    let config = EncoderConfig {
        use_index: true,
        pre_calibrated: true,
        offset: 123,
        ..Default::default()
    };
    let axis = axis_with_zero(0);
    axis.rotor.set_angle(-0.3);
    let enc = &mut build(axis, config, None);
    enc.setup().expect("setup");

    enc.run_index_search().expect("index search succeeds");
    assert!(enc.index_found());
    assert!(enc.is_ready());
    assert_eq!(enc.cal_phase(), CalPhase::Ready);
}

#[test]
fn index_search_then_offset_calibration_round_trip() {
    let config = EncoderConfig {
        use_index: true,
        ..Default::default()
    };
    let axis = axis_with_zero(0);
    axis.rotor.set_angle(-0.3);
    let enc = &mut build(axis, config, None);
    enc.setup().expect("setup");

    enc.run_index_search().expect("index search succeeds");
    enc.run_offset_calibration()
        .expect("calibration after index search succeeds");
    assert!(enc.is_ready());
    assert_eq!(enc.cal_phase(), CalPhase::Ready);
}

#[test]
fn check_pre_calibrated_demotes_untrusted_claims() {
    let config = EncoderConfig {
        pre_calibrated: true,
        ..Default::default()
    };
    // Incremental without an index event cannot honor the claim.
    let enc = &mut build(axis_with_zero(0), config, None);
    assert!(!enc.is_ready());
    enc.check_pre_calibrated();
    assert!(!enc.config().pre_calibrated);
}

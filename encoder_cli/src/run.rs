//! Command execution: config mapping, simulated axis assembly, and the
//! calibration/estimation runs.

use crate::cli::{Cli, Commands};
use encoder_config::{Config, Mode, MotorKind};
use encoder_core::{Encoder, EncoderConfig, EncoderMode, build_encoder};
use encoder_hardware::{
    InstantLoop, SimIndexPin, SimMotor, SimRotor, SimSensor, SimSensorCfg, sim_axis,
};
use encoder_traits::{Commutation, MotorParams, MotorType};
use eyre::{Result, WrapErr};
use serde_json::json;

type SimEncoder = Encoder<SimSensor, SimMotor, InstantLoop, SimIndexPin>;

fn encoder_config(cfg: &Config) -> EncoderConfig {
    EncoderConfig {
        mode: match cfg.encoder.mode {
            Mode::Incremental => EncoderMode::Incremental,
            Mode::Hall => EncoderMode::Hall,
            Mode::Sincos => EncoderMode::SinCos,
        },
        cpr: cfg.effective_cpr(),
        offset: cfg.encoder.offset,
        offset_float: cfg.encoder.offset_float,
        bandwidth: cfg.encoder.bandwidth_hz,
        use_index: cfg.encoder.use_index,
        find_idx_on_lockin_only: cfg.encoder.find_idx_on_lockin_only,
        idx_search_unidirectional: cfg.encoder.idx_search_unidirectional,
        zero_count_on_find_idx: cfg.encoder.zero_count_on_find_idx,
        pre_calibrated: cfg.encoder.pre_calibrated,
        ignore_illegal_hall_state: cfg.encoder.ignore_illegal_hall_state,
        enable_phase_interpolation: cfg.encoder.enable_phase_interpolation,
        calib_scan_distance: cfg.calibration.scan_distance_rad,
        calib_scan_omega: cfg.calibration.scan_omega_rad_s,
        calib_range: cfg.calibration.cpr_tolerance,
    }
}

fn motor_params(cfg: &Config) -> MotorParams {
    MotorParams {
        motor_type: match cfg.motor.kind {
            MotorKind::HighCurrent => MotorType::HighCurrent,
            MotorKind::Gimbal => MotorType::Gimbal,
            MotorKind::Acim => MotorType::Acim,
        },
        pole_pairs: cfg.motor.pole_pairs,
        phase_resistance: cfg.motor.phase_resistance_ohm,
        calibration_current: cfg.motor.calibration_current_a,
    }
}

/// Assemble a simulated axis and wrap it in the estimation core.
///
/// The simulated sensor's resolution comes from `--sim-cpr`, not from the
/// config; a mismatch between the two is exactly what the calibration
/// sanity check exists to catch.
fn build_sim_encoder(args: &Cli, cfg: &Config) -> Result<(SimEncoder, SimRotor)> {
    let mut axis = sim_axis(
        SimSensorCfg {
            cpr: args.sim_cpr,
            zero_count: args.sim_zero_count,
            pole_pairs: cfg.motor.pole_pairs,
        },
        motor_params(cfg),
        cfg.axis.control_rate_hz,
    );
    axis.motor.set_direction(cfg.axis.direction);
    let rotor = axis.rotor.clone();
    let enc = build_encoder(
        axis.sensor,
        axis.motor,
        axis.driver,
        axis.index_pin,
        encoder_config(cfg),
        None,
    )
    .wrap_err("assemble encoder")?;
    Ok((enc, rotor))
}

/// Execute the selected command and return the structured result.
pub fn dispatch(args: &Cli, cfg: &Config) -> Result<serde_json::Value> {
    let (mut enc, rotor) = build_sim_encoder(args, cfg)?;
    enc.setup().wrap_err("encoder setup")?;

    match args.cmd {
        Commands::Calibrate => {
            if enc.config().use_index {
                // Park the simulated shaft just below the revolution
                // boundary so the search spin crosses the pulse.
                rotor.set_angle(-0.25);
                enc.run_index_search().wrap_err("index search")?;
            }
            enc.run_offset_calibration().wrap_err("offset calibration")?;
            Ok(json!({
                "ok": true,
                "offset": enc.config().offset,
                "offset_float": enc.config().offset_float,
                "direction": enc.motor().direction(),
                "scan_response": enc.calib_scan_response(),
                "index_found": enc.index_found(),
                "ready": enc.is_ready(),
            }))
        }
        Commands::DirectionFind => {
            enc.run_direction_find().wrap_err("direction find")?;
            Ok(json!({
                "ok": true,
                "direction": enc.motor().direction(),
            }))
        }
        Commands::IndexSearch => {
            rotor.set_angle(-0.25);
            enc.run_index_search().wrap_err("index search")?;
            Ok(json!({
                "ok": true,
                "index_found": enc.index_found(),
                "count_in_cpr": enc.count_in_cpr(),
                "ready": enc.is_ready(),
            }))
        }
        Commands::Estimate { turns, ticks } => {
            let travel = turns * std::f64::consts::TAU;
            let step = travel / f64::from(ticks.max(1));
            for _ in 0..ticks {
                rotor.advance(step);
                enc.sample_now().wrap_err("sample")?;
                enc.update().wrap_err("update")?;
            }
            Ok(json!({
                "ok": true,
                "shadow_count": enc.shadow_count(),
                "count_in_cpr": enc.count_in_cpr(),
                "pos_estimate": enc.pos_estimate(),
                "vel_estimate": enc.vel_estimate(),
                "pos_cpr": enc.pos_cpr(),
                "phase": enc.phase(),
            }))
        }
        Commands::SelfCheck => Ok(json!({
            "ok": true,
            "mode": format!("{:?}", enc.config().mode),
            "cpr": enc.config().cpr,
            "tick_rate_hz": cfg.axis.control_rate_hz,
        })),
    }
}

/// Render a result object as human-readable `key: value` lines.
pub fn print_human(value: &serde_json::Value) {
    if let Some(obj) = value.as_object() {
        for (k, v) in obj {
            if k == "ok" {
                continue;
            }
            println!("{k}: {v}");
        }
    } else {
        println!("{value}");
    }
}

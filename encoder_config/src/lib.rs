#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema for an encoder axis.
//!
//! `Config` and sub-structs are deserialized from TOML and validated here;
//! mapping onto the core's runtime types is the caller's job, keeping this
//! crate free of core dependencies.
use serde::Deserialize;

/// Sensing mode as written in config files.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Incremental,
    Hall,
    Sincos,
}

/// Motor construction family; decides the calibration voltage law.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MotorKind {
    #[default]
    HighCurrent,
    Gimbal,
    Acim,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct EncoderCfg {
    pub mode: Mode,
    /// Counts per revolution. When absent, the mode's natural resolution is
    /// used (hall: 6 * pole_pairs; sincos: its fixed synthetic cpr).
    pub cpr: Option<i32>,
    /// Tracking-loop bandwidth in Hz.
    pub bandwidth_hz: f32,
    /// Stored electrical-zero offset from a previous calibration, counts.
    pub offset: i32,
    /// Stored sub-count part of the offset, in [0.0, 1.0).
    pub offset_float: f32,
    pub use_index: bool,
    pub find_idx_on_lockin_only: bool,
    pub idx_search_unidirectional: bool,
    pub zero_count_on_find_idx: bool,
    /// Trust the stored offset from a previous session.
    pub pre_calibrated: bool,
    pub ignore_illegal_hall_state: bool,
    pub enable_phase_interpolation: bool,
}

impl Default for EncoderCfg {
    fn default() -> Self {
        Self {
            mode: Mode::Incremental,
            cpr: None,
            bandwidth_hz: 1000.0,
            offset: 0,
            offset_float: 0.0,
            use_index: false,
            find_idx_on_lockin_only: false,
            idx_search_unidirectional: false,
            zero_count_on_find_idx: true,
            pre_calibrated: false,
            ignore_illegal_hall_state: false,
            enable_phase_interpolation: true,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AxisCfg {
    /// Control loop tick rate in Hz.
    pub control_rate_hz: u32,
    /// Stored motor-to-sensor direction: 1, -1, or 0 (unknown).
    pub direction: i8,
}

impl Default for AxisCfg {
    fn default() -> Self {
        Self {
            control_rate_hz: 8000,
            direction: 0,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct MotorCfg {
    pub kind: MotorKind,
    pub pole_pairs: u32,
    /// Per-phase resistance in ohms.
    pub phase_resistance_ohm: f32,
    /// Open-loop calibration current in amps.
    pub calibration_current_a: f32,
}

impl Default for MotorCfg {
    fn default() -> Self {
        Self {
            kind: MotorKind::HighCurrent,
            pole_pairs: 7,
            phase_resistance_ohm: 0.04,
            calibration_current_a: 10.0,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CalibrationCfg {
    /// Electrical scan distance in radians.
    pub scan_distance_rad: f32,
    /// Electrical scan rate in radians per second.
    pub scan_omega_rad_s: f32,
    /// Relative tolerance for the scan-response CPR check.
    pub cpr_tolerance: f32,
}

impl Default for CalibrationCfg {
    fn default() -> Self {
        Self {
            scan_distance_rad: 16.0 * std::f32::consts::PI,
            scan_omega_rad_s: 4.0 * std::f32::consts::PI,
            cpr_tolerance: 0.02,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub encoder: EncoderCfg,
    pub axis: AxisCfg,
    pub motor: MotorCfg,
    pub calibration: CalibrationCfg,
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Encoder
        if let Some(cpr) = self.encoder.cpr
            && cpr <= 0
        {
            eyre::bail!("encoder.cpr must be > 0");
        }
        if !(self.encoder.bandwidth_hz.is_finite() && self.encoder.bandwidth_hz > 0.0) {
            eyre::bail!("encoder.bandwidth_hz must be > 0");
        }
        if !(0.0..1.0).contains(&self.encoder.offset_float) {
            eyre::bail!("encoder.offset_float must be in [0.0, 1.0)");
        }

        // Axis
        if self.axis.control_rate_hz == 0 {
            eyre::bail!("axis.control_rate_hz must be > 0");
        }
        if !matches!(self.axis.direction, -1 | 0 | 1) {
            eyre::bail!("axis.direction must be -1, 0 or 1");
        }
        // Discrete stability bound of the tracking loop, checked early so a
        // bad file fails at load rather than at axis startup.
        let kp = 2.0 * self.encoder.bandwidth_hz;
        if kp / self.axis.control_rate_hz as f32 >= 1.0 {
            eyre::bail!(
                "encoder.bandwidth_hz {} is unstable at axis.control_rate_hz {}",
                self.encoder.bandwidth_hz,
                self.axis.control_rate_hz
            );
        }

        // Motor
        if self.motor.pole_pairs == 0 {
            eyre::bail!("motor.pole_pairs must be > 0");
        }
        if !(self.motor.phase_resistance_ohm.is_finite() && self.motor.phase_resistance_ohm > 0.0)
        {
            eyre::bail!("motor.phase_resistance_ohm must be > 0");
        }
        if !(self.motor.calibration_current_a.is_finite()
            && self.motor.calibration_current_a > 0.0)
        {
            eyre::bail!("motor.calibration_current_a must be > 0");
        }

        // Calibration
        if !(self.calibration.scan_distance_rad.is_finite()
            && self.calibration.scan_distance_rad > 0.0)
        {
            eyre::bail!("calibration.scan_distance_rad must be > 0");
        }
        if !(self.calibration.scan_omega_rad_s.is_finite()
            && self.calibration.scan_omega_rad_s > 0.0)
        {
            eyre::bail!("calibration.scan_omega_rad_s must be > 0");
        }
        if !(self.calibration.cpr_tolerance.is_finite() && self.calibration.cpr_tolerance > 0.0) {
            eyre::bail!("calibration.cpr_tolerance must be > 0");
        }

        Ok(())
    }

    /// Counts per revolution after applying the mode's natural default.
    pub fn effective_cpr(&self) -> i32 {
        // Sincos synthetic resolution: floor(2pi * 1000) counts per rev.
        const SINCOS_CPR: i32 = 6283;
        self.encoder.cpr.unwrap_or(match self.encoder.mode {
            Mode::Incremental => 8192,
            Mode::Hall => 6 * self.motor.pole_pairs as i32,
            Mode::Sincos => SINCOS_CPR,
        })
    }
}

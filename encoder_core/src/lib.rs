#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Position/velocity estimation and commutation calibration for a motor
//! shaft sensor (hardware-agnostic).
//!
//! All hardware interaction goes through the `encoder_traits` seams:
//! raw sampling, open-loop voltage injection, the fixed-rate loop driver,
//! and the index edge subscription.
//!
//! ## Architecture
//!
//! - **Decoding**: wraparound-safe per-mode delta decoding (`decode` module)
//! - **Estimation**: critically-damped discrete PLL over shadow/circular
//!   counts with sub-count interpolation (`estimator` module)
//! - **Calibration**: index search, direction find, and offset calibration
//!   driven through the external loop driver (`calibration` module)
//! - **Errors**: sticky `ErrorFlags` plus a one-way `FaultSignal` to the
//!   owning axis (`error` module); readiness phases in `status`
//!
//! ## Concurrency
//!
//! The index interrupt is delivered as a typed `IndexLatch`; `update()`
//! consumes it at tick start and applies the count zeroing on the control
//! thread, so no lock is ever held across a tick boundary.

mod calibration;
pub mod config;
pub mod decode;
pub mod error;
pub mod estimator;
pub mod mocks;
pub mod status;

pub use config::{EncoderConfig, EncoderMode, HALL_CPR, SINCOS_CPR};
pub use error::{BuildError, EncoderError, ErrorFlags, Result};
pub use estimator::{PllGains, RuntimeState};
pub use status::CalPhase;

use crate::error::Report;
use encoder_traits::{
    Commutation, EncoderSensor, FaultSignal, IndexLatch, IndexPin, LockinSpin, LoopDriver,
};
use estimator::Estimator;

/// The sensing core: per-tick estimation plus the calibration engine.
///
/// Owns its collaborators by value; the axis builds one `Encoder` per
/// sensor and drives `sample_now`/`update` once per control tick.
pub struct Encoder<S, M, D, I> {
    pub(crate) est: Estimator,
    pub(crate) sensor: S,
    pub(crate) motor: M,
    pub(crate) driver: D,
    pub(crate) index_pin: I,
    pub(crate) index_latch: IndexLatch,
    pub(crate) fault: Option<FaultSignal>,
    pub(crate) flags: ErrorFlags,
    pub(crate) cal_phase: CalPhase,
}

impl<S, M, D, I> core::fmt::Debug for Encoder<S, M, D, I> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Encoder")
            .field("mode", &self.est.cfg.mode)
            .field("phase", &self.est.state.phase)
            .field("vel_estimate", &self.est.state.vel_estimate)
            .field("cal_phase", &self.cal_phase)
            .field("flags", &self.flags)
            .finish()
    }
}

/// Validate the configuration and build an [`Encoder`].
///
/// Fails with the unstable-gain error when the bandwidth violates the
/// discrete stability bound at the driver's tick rate.
pub fn build_encoder<S, M, D, I>(
    sensor: S,
    motor: M,
    driver: D,
    index_pin: I,
    mut config: EncoderConfig,
    fault: Option<FaultSignal>,
) -> Result<Encoder<S, M, D, I>>
where
    S: EncoderSensor,
    M: Commutation + LockinSpin,
    D: LoopDriver,
    I: IndexPin,
{
    config.validate().map_err(Report::new)?;
    config.normalize_offset();

    let tick_rate_hz = driver.tick_rate_hz();
    if tick_rate_hz == 0 {
        return Err(Report::new(BuildError::InvalidConfig(
            "loop driver tick rate must be > 0",
        )));
    }
    let pole_pairs = motor.motor_params().pole_pairs;
    if pole_pairs == 0 {
        return Err(Report::new(BuildError::InvalidConfig(
            "pole_pairs must be > 0",
        )));
    }

    let mode = config.mode;
    let pre_calibrated = config.pre_calibrated;
    let est = Estimator::new(config, tick_rate_hz, pole_pairs).map_err(Report::new)?;

    let mut enc = Encoder {
        est,
        sensor,
        motor,
        driver,
        index_pin,
        index_latch: IndexLatch::new(),
        fault,
        flags: ErrorFlags::empty(),
        cal_phase: CalPhase::Uncalibrated,
    };

    // A stored mapping can be trusted immediately for modes that carry an
    // absolute reference; incremental needs the index event first.
    if pre_calibrated && matches!(mode, EncoderMode::Hall | EncoderMode::SinCos) {
        enc.est.state.is_ready = true;
        enc.cal_phase = CalPhase::Ready;
    }

    tracing::debug!(?mode, tick_rate_hz, pole_pairs, "encoder built");
    Ok(enc)
}

/// Apply a pending index event: zero the counts, rebase the hardware
/// counter, and disarm the subscription. Free-standing so the calibration
/// loops can call it on split borrows.
pub(crate) fn consume_index<S: EncoderSensor, I: IndexPin>(
    est: &mut Estimator,
    sensor: &mut S,
    index_pin: &mut I,
    latch: &IndexLatch,
) {
    if latch.take() {
        if est.on_index_event()
            && let Err(e) = sensor.write_counter(0)
        {
            tracing::warn!(error = %e, "counter rebase after index event failed");
        }
        index_pin.unsubscribe();
    }
}

impl<S, M, D, I> Encoder<S, M, D, I>
where
    S: EncoderSensor,
    M: Commutation + LockinSpin,
    D: LoopDriver,
    I: IndexPin,
{
    /// Arm the counting hardware and the index subscription.
    pub fn setup(&mut self) -> Result<()> {
        self.sensor
            .start()
            .map_err(|e| Report::new(EncoderError::Hardware(e.to_string())))?;
        self.set_idx_subscribe(false)
    }

    /// (Re)arm or disarm the index subscription according to config.
    /// `override_enable` forces the subscription for an active search even
    /// when `find_idx_on_lockin_only` is set.
    pub fn set_idx_subscribe(&mut self, override_enable: bool) -> Result<()> {
        let cfg = &self.est.cfg;
        if cfg.use_index && (override_enable || !cfg.find_idx_on_lockin_only) {
            self.index_pin
                .subscribe(self.index_latch.clone())
                .map_err(|e| Report::new(EncoderError::Hardware(e.to_string())))?;
        } else if !cfg.use_index || cfg.find_idx_on_lockin_only {
            self.index_pin.unsubscribe();
        }
        Ok(())
    }

    /// Capture this tick's raw sample. Call before `update`.
    pub fn sample_now(&mut self) -> Result<()> {
        let Self { est, sensor, .. } = self;
        if let Err(e) = est.sample_now(sensor) {
            return Err(self.fail(e));
        }
        Ok(())
    }

    /// Advance the estimator by one tick. Consumes a pending index event
    /// first, then decodes the captured sample and runs the tracking loop.
    pub fn update(&mut self) -> Result<()> {
        let Self {
            est,
            sensor,
            index_pin,
            index_latch,
            ..
        } = self;
        consume_index(est, sensor, index_pin, index_latch);
        if let Err(e) = est.update() {
            return Err(self.fail(e));
        }
        Ok(())
    }

    /// Overwrite the linear count (state and hardware register).
    pub fn set_linear_count(&mut self, count: i32) -> Result<()> {
        self.est.set_linear_count(count);
        self.sensor
            .write_counter(count as u16)
            .map_err(|e| Report::new(EncoderError::Hardware(e.to_string())))
    }

    /// Overwrite the circular count; see [`EncoderConfig::offset`] for the
    /// `update_offset` semantics.
    pub fn set_circular_count(&mut self, count: i32, update_offset: bool) {
        self.est.set_circular_count(count, update_offset);
    }

    /// Recompute the tracking-loop gains for a new bandwidth.
    pub fn set_bandwidth(&mut self, bandwidth: f32) -> Result<()> {
        if let Err(e) = self.est.set_bandwidth(bandwidth) {
            return Err(self.fail(e));
        }
        Ok(())
    }

    /// Demote a claimed pre-calibration when it cannot be trusted.
    pub fn check_pre_calibrated(&mut self) {
        if !self.est.state.is_ready {
            self.est.cfg.pre_calibrated = false;
        }
        if self.est.cfg.mode == EncoderMode::Incremental && !self.est.state.index_found {
            self.est.cfg.pre_calibrated = false;
        }
    }

    /// Latch an error, escalate to the axis, and return it as a report.
    pub(crate) fn fail(&mut self, err: EncoderError) -> Report {
        self.set_error(&err);
        Report::new(err)
    }

    /// Latch the sticky bit for `err` (if it has one) and raise the axis
    /// fault signal. Hardware errors propagate without latching.
    pub fn set_error(&mut self, err: &EncoderError) {
        if let Some(flag) = err.flag() {
            self.flags |= flag;
            self.cal_phase = CalPhase::Faulted;
            if let Some(fault) = &self.fault {
                fault.raise();
            }
            tracing::error!(error = %err, flags = ?self.flags, "encoder error latched");
        } else {
            tracing::warn!(error = %err, "encoder hardware error");
        }
    }

    /// True iff no sticky error bit is set.
    pub fn do_checks(&self) -> bool {
        self.flags.is_empty()
    }

    /// Explicit reset of the sticky error set.
    pub fn clear_errors(&mut self) {
        self.flags = ErrorFlags::empty();
        self.refresh_phase();
    }

    /// Recompute the readiness phase after a non-latching failure or reset.
    pub(crate) fn refresh_phase(&mut self) {
        self.cal_phase = if !self.flags.is_empty() {
            CalPhase::Faulted
        } else if self.est.state.is_ready {
            CalPhase::Ready
        } else {
            CalPhase::Uncalibrated
        };
    }

    // Accessors for the owning axis.

    pub fn config(&self) -> &EncoderConfig {
        &self.est.cfg
    }

    /// Operator-facing configuration access; calibration mutates config
    /// through its own entry points.
    pub fn config_mut(&mut self) -> &mut EncoderConfig {
        &mut self.est.cfg
    }

    pub fn motor(&self) -> &M {
        &self.motor
    }

    pub fn error_flags(&self) -> ErrorFlags {
        self.flags
    }

    pub fn cal_phase(&self) -> CalPhase {
        self.cal_phase
    }

    pub fn is_ready(&self) -> bool {
        self.est.state.is_ready
    }

    pub fn index_found(&self) -> bool {
        self.est.state.index_found
    }

    /// Electrical phase in radians, wrapped to [-pi, pi).
    pub fn phase(&self) -> f32 {
        self.est.state.phase
    }

    /// Filtered linear position in counts.
    pub fn pos_estimate(&self) -> f32 {
        self.est.state.pos_estimate
    }

    /// Filtered velocity in counts per second.
    pub fn vel_estimate(&self) -> f32 {
        self.est.state.vel_estimate
    }

    /// Filtered circular position in [0, cpr).
    pub fn pos_cpr(&self) -> f32 {
        self.est.state.pos_cpr
    }

    pub fn shadow_count(&self) -> i32 {
        self.est.state.shadow_count
    }

    pub fn count_in_cpr(&self) -> i32 {
        self.est.state.count_in_cpr
    }

    /// Sub-count interpolation fraction in [0, 1].
    pub fn interpolation(&self) -> f32 {
        self.est.state.interpolation
    }

    /// Telemetry: absolute count span of the last calibration scan.
    pub fn calib_scan_response(&self) -> f32 {
        self.est.state.calib_scan_response
    }
}

//! Calibration engine: index search, direction find, offset calibration.
//!
//! Every routine here drives the estimator from inside the loop driver's
//! tick callback, the same cadence the axis uses at runtime. The voltage
//! scan is open loop: commanded electrical angles go out through the
//! commutation seam while the estimator keeps ingesting counts.

use crate::decode::wrap_pm_pi;
use crate::error::{EncoderError, Result};
use crate::status::CalPhase;
use crate::{Encoder, consume_index};
use encoder_traits::{
    Commutation, EncoderSensor, IndexPin, LockinSpin, LoopDriver, MotorType,
};

/// Minimum count motion that distinguishes a real scan response from noise.
const DIRECTION_HYSTERESIS: i32 = 8;

/// Ticks pumped through the estimator after a lockin spin so the decoded
/// counts (and a pending index event) are ingested before they are read.
const POST_LOCKIN_SETTLE_TICKS: u32 = 32;

/// Hold time on the first scan vector, letting the rotor settle onto the
/// commanded zero angle before counts are accumulated.
const START_LOCK_DURATION_S: f32 = 1.0;

impl<S, M, D, I> Encoder<S, M, D, I>
where
    S: EncoderSensor,
    M: Commutation + LockinSpin,
    D: LoopDriver,
    I: IndexPin,
{
    /// Spin until the index pulse fires and the count origin is rebased.
    ///
    /// Leaves `use_index` enabled; whether the encoder comes out ready
    /// depends on `pre_calibrated` (see the index event semantics).
    pub fn run_index_search(&mut self) -> Result<()> {
        self.cal_phase = CalPhase::Calibrating;
        match self.index_search_impl() {
            Ok(()) => {
                self.refresh_phase();
                tracing::info!(index_found = self.est.state.index_found, "index search finished");
                Ok(())
            }
            Err(e) => {
                let report = self.fail(e);
                self.refresh_phase();
                Err(report)
            }
        }
    }

    fn index_search_impl(&mut self) -> Result<(), EncoderError> {
        self.est.cfg.use_index = true;
        self.est.state.index_found = false;
        if !self.est.cfg.idx_search_unidirectional && self.motor.direction() == 0 {
            self.motor.set_direction(1);
        }
        self.index_pin
            .subscribe(self.index_latch.clone())
            .map_err(|e| EncoderError::Hardware(e.to_string()))?;
        self.motor
            .run_lockin_spin(false)
            .map_err(|e| EncoderError::Hardware(e.to_string()))?;
        self.pump_estimation(POST_LOCKIN_SETTLE_TICKS)
    }

    /// Determine the sensor counting direction relative to a forward spin.
    ///
    /// Motion within the hysteresis band resolves to direction 0
    /// (undetermined), not an error; the caller decides whether that is
    /// acceptable.
    pub fn run_direction_find(&mut self) -> Result<()> {
        self.cal_phase = CalPhase::Calibrating;
        match self.direction_find_impl() {
            Ok(()) => {
                self.refresh_phase();
                tracing::info!(direction = self.motor.direction(), "direction find finished");
                Ok(())
            }
            Err(e) => {
                let report = self.fail(e);
                self.refresh_phase();
                Err(report)
            }
        }
    }

    fn direction_find_impl(&mut self) -> Result<(), EncoderError> {
        let init_enc = self.est.state.shadow_count;
        // The spin itself must be forward so the sign comparison means
        // something.
        self.motor.set_direction(1);
        self.motor
            .run_lockin_spin(true)
            .map_err(|e| EncoderError::Hardware(e.to_string()))?;
        self.pump_estimation(POST_LOCKIN_SETTLE_TICKS)?;

        let shadow = self.est.state.shadow_count;
        let direction = if shadow > init_enc + DIRECTION_HYSTERESIS {
            1
        } else if shadow < init_enc - DIRECTION_HYSTERESIS {
            -1
        } else {
            0
        };
        self.motor.set_direction(direction);
        Ok(())
    }

    /// Measure the electrical-zero offset with a symmetric open-loop
    /// voltage scan. On success the encoder becomes ready; any failure
    /// leaves the previous offset and readiness untouched.
    pub fn run_offset_calibration(&mut self) -> Result<()> {
        self.cal_phase = CalPhase::Calibrating;
        match self.offset_calibration_impl() {
            Ok(()) => {
                self.refresh_phase();
                tracing::info!(
                    offset = self.est.cfg.offset,
                    offset_float = self.est.cfg.offset_float,
                    response = self.est.state.calib_scan_response,
                    "offset calibration complete"
                );
                Ok(())
            }
            Err(e) => {
                let report = self.fail(e);
                self.refresh_phase();
                Err(report)
            }
        }
    }

    fn offset_calibration_impl(&mut self) -> Result<(), EncoderError> {
        if self.est.cfg.use_index && !self.est.state.index_found {
            return Err(EncoderError::IndexNotFoundYet);
        }

        let distance = self.est.cfg.calib_scan_distance;
        let num_steps = (distance / self.est.cfg.calib_scan_omega * self.est.tick_hz) as i64;
        if num_steps < 1 {
            return Err(EncoderError::InvalidScanConfig(
                "scan distance / omega / tick rate yield zero steps",
            ));
        }

        let params = self.motor.motor_params();
        let voltage_magnitude = match params.motor_type {
            MotorType::HighCurrent => params.calibration_current * params.phase_resistance,
            MotorType::Gimbal => params.calibration_current,
            _ => return Err(EncoderError::UnsupportedMotorType),
        };

        // Calibration works in cpr-relative terms; any multiple-of-cpr
        // component in the resulting offset is invisible to the phase map.
        self.est.state.shadow_count = self.est.state.count_in_cpr;

        // Hold electrical zero until the rotor has settled onto it.
        let settle_ticks = (START_LOCK_DURATION_S * self.est.tick_hz) as i64;
        self.scan_segment(settle_ticks, voltage_magnitude, |_| 0.0, None)?;

        let init_enc = self.est.state.shadow_count;
        let mut encvaluesum: i64 = 0;
        let steps_f = num_steps as f32;

        // Forward scan, sweeping electrical angle from -distance/2 to
        // +distance/2.
        self.scan_segment(
            num_steps,
            voltage_magnitude,
            move |i| wrap_pm_pi(distance * (i as f32) / steps_f - distance * 0.5),
            Some(&mut encvaluesum),
        )?;

        let shadow = self.est.state.shadow_count;
        if shadow > init_enc + DIRECTION_HYSTERESIS {
            self.motor.set_direction(1);
        } else if shadow < init_enc - DIRECTION_HYSTERESIS {
            self.motor.set_direction(-1);
        } else {
            return Err(EncoderError::NoResponse);
        }

        // Sanity check: the observed count span must match what cpr and
        // pole pairs predict for the scanned electrical distance.
        let expected = distance / self.est.elec_rad_per_enc();
        let response = ((shadow - init_enc) as f32).abs();
        self.est.state.calib_scan_response = response;
        if ((response - expected).abs() / expected) > self.est.cfg.calib_range {
            return Err(EncoderError::CprOutOfRange {
                measured: response,
                expected,
            });
        }

        // Backward scan over the same range; averaging both directions
        // cancels cogging and friction bias.
        self.scan_segment(
            num_steps,
            voltage_magnitude,
            move |i| wrap_pm_pi(-distance * (i as f32) / steps_f + distance * 0.5),
            Some(&mut encvaluesum),
        )?;

        let total = num_steps * 2;
        let offset = (encvaluesum / total) as i32;
        let residual = encvaluesum - i64::from(offset) * total;
        self.est.cfg.offset = offset;
        self.est.cfg.offset_float = residual as f32 / total as f32 + 0.5;
        self.est.cfg.normalize_offset();
        self.est.state.is_ready = true;
        Ok(())
    }

    /// Run estimation-only ticks through the loop driver.
    fn pump_estimation(&mut self, ticks: u32) -> Result<(), EncoderError> {
        let Self {
            est,
            sensor,
            driver,
            index_pin,
            index_latch,
            ..
        } = self;
        let mut tick_err: Option<EncoderError> = None;
        let mut i = 0u32;
        driver
            .run_control_loop(&mut || {
                consume_index(est, sensor, index_pin, index_latch);
                if let Err(e) = est.sample_now(sensor).and_then(|()| est.update().map(|_| ())) {
                    tick_err = Some(e);
                    return false;
                }
                i += 1;
                i < ticks
            })
            .map_err(|e| EncoderError::Hardware(e.to_string()))?;
        match tick_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// One scan segment: per tick, ingest a sample, command the voltage
    /// vector for `phase_at(step)`, and optionally accumulate the shadow
    /// count into `sum`.
    fn scan_segment(
        &mut self,
        steps: i64,
        voltage_magnitude: f32,
        phase_at: impl Fn(i64) -> f32,
        mut sum: Option<&mut i64>,
    ) -> Result<(), EncoderError> {
        let Self {
            est,
            sensor,
            motor,
            driver,
            index_pin,
            index_latch,
            ..
        } = self;
        let mut tick_err: Option<EncoderError> = None;
        let mut i: i64 = 0;
        driver
            .run_control_loop(&mut || {
                consume_index(est, sensor, index_pin, index_latch);
                if let Err(e) = est.sample_now(sensor).and_then(|()| est.update().map(|_| ())) {
                    tick_err = Some(e);
                    return false;
                }
                if let Some(sum) = sum.as_deref_mut() {
                    *sum += i64::from(est.state.shadow_count);
                }
                let phase = phase_at(i);
                let v_alpha = voltage_magnitude * phase.cos();
                let v_beta = voltage_magnitude * phase.sin();
                if let Err(e) = motor.enqueue_voltage_timings(v_alpha, v_beta) {
                    tick_err = Some(EncoderError::Hardware(e.to_string()));
                    return false;
                }
                i += 1;
                i < steps
            })
            .map_err(|e| EncoderError::Hardware(e.to_string()))?;
        match tick_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

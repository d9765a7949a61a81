//! Per-tick estimation pipeline: raw sample -> delta -> counts -> PLL.
//!
//! The estimator owns the encoder config and runtime state but no hardware;
//! the sensor backend is borrowed for the sampling step only. That split is
//! what lets the calibration engine drive estimation ticks from inside a
//! loop-driver callback.

use crate::config::{EncoderConfig, EncoderMode, HALL_CPR};
use crate::decode;
use crate::error::EncoderError;
use encoder_traits::{EncoderSensor, SensorChannel};

/// Discrete tracking-loop gains derived from the configured bandwidth.
#[derive(Debug, Clone, Copy)]
pub struct PllGains {
    pub kp: f32,
    pub ki: f32,
}

impl PllGains {
    /// Basic conversion to discrete time; ki chosen for critical damping.
    pub fn from_bandwidth(bandwidth: f32) -> Self {
        let kp = 2.0 * bandwidth;
        Self {
            kp,
            ki: 0.25 * kp * kp,
        }
    }

    /// Discrete-time stability bound for the proportional path.
    pub fn stable_at(&self, period: f32) -> bool {
        period * self.kp < 1.0
    }
}

/// Mutable estimator state, reset-or-mutated only by this core.
#[derive(Debug, Clone, Default)]
pub struct RuntimeState {
    /// Unbounded linear count accumulated from decoded deltas.
    pub(crate) shadow_count: i32,
    /// Circular count, always reduced into [0, cpr).
    pub(crate) count_in_cpr: i32,
    pub(crate) pos_estimate: f32,
    pub(crate) vel_estimate: f32,
    /// Filtered circular position, kept in [0, cpr).
    pub(crate) pos_cpr: f32,
    /// Sub-count prediction fraction in [0, 1].
    pub(crate) interpolation: f32,
    /// Electrical phase in radians, wrapped to [-pi, pi).
    pub(crate) phase: f32,
    pub(crate) tim_cnt_sample: u16,
    pub(crate) hall_state: u8,
    pub(crate) sincos_sample_s: f32,
    pub(crate) sincos_sample_c: f32,
    pub(crate) index_found: bool,
    pub(crate) is_ready: bool,
    /// Absolute count span observed by the last calibration forward scan.
    pub(crate) calib_scan_response: f32,
}

#[derive(Debug)]
pub(crate) struct Estimator {
    pub(crate) cfg: EncoderConfig,
    pub(crate) gains: PllGains,
    pub(crate) period: f32,
    pub(crate) tick_hz: f32,
    pub(crate) pole_pairs: u32,
    pub(crate) state: RuntimeState,
}

impl Estimator {
    pub(crate) fn new(
        cfg: EncoderConfig,
        tick_rate_hz: u32,
        pole_pairs: u32,
    ) -> Result<Self, EncoderError> {
        let tick_hz = tick_rate_hz as f32;
        let period = 1.0 / tick_hz;
        let gains = PllGains::from_bandwidth(cfg.bandwidth);
        if !gains.stable_at(period) {
            return Err(EncoderError::UnstableGain);
        }
        Ok(Self {
            cfg,
            gains,
            period,
            tick_hz,
            pole_pairs,
            state: RuntimeState::default(),
        })
    }

    /// Recompute gains for a new bandwidth, rejecting unstable products.
    pub(crate) fn set_bandwidth(&mut self, bandwidth: f32) -> Result<(), EncoderError> {
        let gains = PllGains::from_bandwidth(bandwidth);
        if !gains.stable_at(self.period) {
            return Err(EncoderError::UnstableGain);
        }
        self.cfg.bandwidth = bandwidth;
        self.gains = gains;
        Ok(())
    }

    pub(crate) fn elec_rad_per_enc(&self) -> f32 {
        self.pole_pairs as f32 * 2.0 * core::f32::consts::PI / self.cfg.cpr as f32
    }

    /// Capture this tick's raw sample for the configured mode.
    pub(crate) fn sample_now<S: EncoderSensor + ?Sized>(
        &mut self,
        sensor: &mut S,
    ) -> Result<(), EncoderError> {
        let hw = |e: Box<dyn std::error::Error + Send + Sync>| EncoderError::Hardware(e.to_string());
        match self.cfg.mode {
            EncoderMode::Incremental => {
                if !sensor.supports(SensorChannel::Counter) {
                    return Err(EncoderError::UnsupportedMode);
                }
                self.state.tim_cnt_sample = sensor.read_counter().map_err(hw)?;
            }
            EncoderMode::Hall => {
                if !sensor.supports(SensorChannel::Hall) {
                    return Err(EncoderError::UnsupportedMode);
                }
                self.state.hall_state = sensor.read_hall().map_err(hw)?;
            }
            EncoderMode::SinCos => {
                if !sensor.supports(SensorChannel::SinCos) {
                    return Err(EncoderError::UnsupportedMode);
                }
                let (s, c) = sensor.read_sincos().map_err(hw)?;
                self.state.sincos_sample_s = s;
                self.state.sincos_sample_c = c;
            }
        }
        Ok(())
    }

    /// Advance the estimator by one tick using the captured sample.
    /// Returns the decoded count delta.
    pub(crate) fn update(&mut self) -> Result<i32, EncoderError> {
        let elec_rad_per_enc = self.elec_rad_per_enc();
        let st = &mut self.state;
        let cpr = self.cfg.cpr;

        let delta_enc = match self.cfg.mode {
            EncoderMode::Incremental => {
                decode::incremental_delta(st.tim_cnt_sample, st.shadow_count as u16)
            }
            EncoderMode::Hall => match decode::decode_hall(st.hall_state) {
                Some(ordinal) => decode::circular_delta(ordinal, st.count_in_cpr, HALL_CPR),
                None if self.cfg.ignore_illegal_hall_state => {
                    tracing::trace!(state = st.hall_state, "ignoring illegal hall state");
                    0
                }
                None => {
                    return Err(EncoderError::IllegalHallState {
                        state: st.hall_state,
                    });
                }
            },
            EncoderMode::SinCos => {
                let fake_count = decode::sincos_count(st.sincos_sample_s, st.sincos_sample_c);
                decode::circular_delta(fake_count, st.count_in_cpr, cpr)
            }
        };

        st.shadow_count = st.shadow_count.wrapping_add(delta_enc);
        st.count_in_cpr = decode::mod_cpr(st.count_in_cpr + delta_enc, cpr);

        // Tracking loop: predict, phase-detect, correct.
        let t = self.period;
        st.pos_estimate += t * st.vel_estimate;
        st.pos_cpr += t * st.vel_estimate;

        let delta_pos = (st.shadow_count - st.pos_estimate.floor() as i32) as f32;
        let delta_pos_cpr = decode::wrap_pm(
            (st.count_in_cpr - st.pos_cpr.floor() as i32) as f32,
            0.5 * cpr as f32,
        );

        st.pos_estimate += t * self.gains.kp * delta_pos;
        st.pos_cpr += t * self.gains.kp * delta_pos_cpr;
        st.pos_cpr = st.pos_cpr.rem_euclid(cpr as f32);
        st.vel_estimate += t * self.gains.ki * delta_pos_cpr;

        // Align on zero to prevent limit-cycle jitter at standstill.
        let snap_to_zero_vel = st.vel_estimate.abs() < 0.5 * t * self.gains.ki;
        if snap_to_zero_vel {
            st.vel_estimate = 0.0;
        }

        // Sub-count interpolation for low-resolution sensors.
        let corrected_enc = st.count_in_cpr - self.cfg.offset;
        if snap_to_zero_vel || !self.cfg.enable_phase_interpolation {
            st.interpolation = 0.5;
        } else if delta_enc > 0 {
            st.interpolation = 0.0;
        } else if delta_enc < 0 {
            st.interpolation = 1.0;
        } else {
            st.interpolation = (st.interpolation + t * st.vel_estimate).clamp(0.0, 1.0);
        }
        let interpolated_enc = corrected_enc as f32 + st.interpolation;

        st.phase =
            decode::wrap_pm_pi(elec_rad_per_enc * (interpolated_enc - self.cfg.offset_float));

        Ok(delta_enc)
    }

    /// Overwrite the linear count. The owning wrapper is responsible for
    /// writing the hardware counter register afterwards.
    pub(crate) fn set_linear_count(&mut self, count: i32) {
        self.state.shadow_count = count;
        self.state.pos_estimate = count as f32;
        self.state.tim_cnt_sample = count as u16;
    }

    /// Overwrite the circular count, optionally shifting `offset` so a
    /// previously calibrated phase mapping stays consistent with the new
    /// absolute reference.
    pub(crate) fn set_circular_count(&mut self, count: i32, update_offset: bool) {
        if update_offset {
            self.cfg.offset += count - self.state.count_in_cpr;
            self.cfg.offset = decode::mod_cpr(self.cfg.offset, self.cfg.cpr);
        }
        self.state.count_in_cpr = decode::mod_cpr(count, self.cfg.cpr);
        self.state.pos_cpr = self.state.count_in_cpr as f32;
    }

    /// Apply the index event on the control thread. Returns whether the
    /// linear count was zeroed (the caller then rebases the hw counter).
    pub(crate) fn on_index_event(&mut self) -> bool {
        let mut zeroed_linear = false;
        if self.cfg.use_index {
            self.set_circular_count(0, false);
            if self.cfg.zero_count_on_find_idx {
                // Avoid a position-control transient after the search.
                self.set_linear_count(0);
                zeroed_linear = true;
            }
            if self.cfg.pre_calibrated {
                self.state.is_ready = true;
            } else {
                // A new absolute reference invalidates any offset
                // calibration done before the search.
                self.state.is_ready = false;
            }
            self.state.index_found = true;
            tracing::info!("index found");
        }
        zeroed_linear
    }
}

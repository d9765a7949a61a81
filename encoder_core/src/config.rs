//! Encoder configuration owned by the axis and handed in at build time.

use crate::error::BuildError;

/// Sensor mode selecting the acquisition and decode path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderMode {
    /// Quadrature counter sampled through a 16-bit hardware register.
    Incremental,
    /// Three digital hall lines, six states per electrical revolution.
    Hall,
    /// Analog sine/cosine pair decoded through atan2.
    SinCos,
}

/// Hall mode has six counts per electrical revolution.
pub const HALL_CPR: i32 = 6;

/// Synthetic resolution of the sincos decode path, counts per radian.
pub const SINCOS_COUNTS_PER_RAD: f32 = 1000.0;

/// Effective CPR of the sincos path: floor(2pi * 1000).
pub const SINCOS_CPR: i32 = 6283;

#[derive(Debug, Clone)]
pub struct EncoderConfig {
    pub mode: EncoderMode,
    /// Counts per revolution; must stay positive.
    pub cpr: i32,
    /// Integer count bias mapping circular count to electrical phase zero.
    pub offset: i32,
    /// Sub-count bias, kept normalized into [0, 1).
    pub offset_float: f32,
    /// PLL bandwidth in Hz; drives the tracking-loop gains.
    pub bandwidth: f32,
    pub use_index: bool,
    /// Only arm the index interrupt for the search itself.
    pub find_idx_on_lockin_only: bool,
    /// Leave the spin direction alone when starting an index search.
    pub idx_search_unidirectional: bool,
    /// Zero the linear count too when the index fires.
    pub zero_count_on_find_idx: bool,
    /// Trust a stored offset calibration from a previous session.
    pub pre_calibrated: bool,
    pub ignore_illegal_hall_state: bool,
    pub enable_phase_interpolation: bool,
    /// Electrical scan distance for offset calibration, radians.
    pub calib_scan_distance: f32,
    /// Electrical scan rate, radians per second.
    pub calib_scan_omega: f32,
    /// Relative tolerance for the CPR sanity check.
    pub calib_range: f32,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            mode: EncoderMode::Incremental,
            cpr: 8192,
            offset: 0,
            offset_float: 0.0,
            bandwidth: 1000.0,
            use_index: false,
            find_idx_on_lockin_only: false,
            idx_search_unidirectional: false,
            zero_count_on_find_idx: true,
            pre_calibrated: false,
            ignore_illegal_hall_state: false,
            enable_phase_interpolation: true,
            calib_scan_distance: 16.0 * core::f32::consts::PI,
            calib_scan_omega: 4.0 * core::f32::consts::PI,
            calib_range: 0.02,
        }
    }
}

impl EncoderConfig {
    /// Validate the invariants the estimator relies on.
    pub fn validate(&self) -> Result<(), BuildError> {
        if self.cpr <= 0 {
            return Err(BuildError::InvalidConfig("cpr must be > 0"));
        }
        if !self.bandwidth.is_finite() || self.bandwidth <= 0.0 {
            return Err(BuildError::InvalidConfig("bandwidth must be > 0"));
        }
        if !self.calib_scan_distance.is_finite() || self.calib_scan_distance <= 0.0 {
            return Err(BuildError::InvalidConfig("calib_scan_distance must be > 0"));
        }
        if !self.calib_scan_omega.is_finite() || self.calib_scan_omega <= 0.0 {
            return Err(BuildError::InvalidConfig("calib_scan_omega must be > 0"));
        }
        if !self.calib_range.is_finite() || self.calib_range <= 0.0 {
            return Err(BuildError::InvalidConfig("calib_range must be > 0"));
        }
        if !self.offset_float.is_finite() {
            return Err(BuildError::InvalidConfig("offset_float must be finite"));
        }
        Ok(())
    }

    /// Re-normalize `offset_float` into [0, 1), folding whole counts into
    /// `offset` so the resulting electrical phase is unchanged.
    pub fn normalize_offset(&mut self) {
        let carry = self.offset_float.floor();
        if carry != 0.0 {
            self.offset += carry as i32;
            self.offset_float -= carry;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(EncoderConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_nonpositive_cpr() {
        let cfg = EncoderConfig {
            cpr: 0,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn normalize_folds_whole_counts_into_offset() {
        let mut cfg = EncoderConfig {
            offset: 10,
            offset_float: 1.25,
            ..Default::default()
        };
        cfg.normalize_offset();
        assert_eq!(cfg.offset, 11);
        assert!((cfg.offset_float - 0.25).abs() < 1e-6);

        cfg.offset_float = -0.25;
        cfg.normalize_offset();
        assert_eq!(cfg.offset, 10);
        assert!((cfg.offset_float - 0.75).abs() < 1e-6);
    }
}

use bitflags::bitflags;
use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum EncoderError {
    #[error("unstable pll gain: tick period * kp must stay below 1")]
    UnstableGain,
    #[error("encoder mode not supported by the sensor backend")]
    UnsupportedMode,
    #[error("illegal hall state {state:#05b}")]
    IllegalHallState { state: u8 },
    #[error("index not found yet")]
    IndexNotFoundYet,
    #[error("no encoder response during calibration scan")]
    NoResponse,
    #[error("cpr out of range: measured {measured:.1} counts, expected {expected:.1}")]
    CprOutOfRange { measured: f32, expected: f32 },
    #[error("motor type does not support offset calibration")]
    UnsupportedMotorType,
    #[error("invalid calibration scan config: {0}")]
    InvalidScanConfig(&'static str),
    #[error("hardware error: {0}")]
    Hardware(String),
}

bitflags! {
    /// Sticky error set. Bits accumulate until an explicit reset; readiness
    /// is never reported while any bit is set.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ErrorFlags: u32 {
        const UNSTABLE_GAIN = 1 << 0;
        const UNSUPPORTED_ENCODER_MODE = 1 << 1;
        const ILLEGAL_HALL_STATE = 1 << 2;
        const INDEX_NOT_FOUND_YET = 1 << 3;
        const NO_RESPONSE = 1 << 4;
        const CPR_OUT_OF_RANGE = 1 << 5;
        const INVALID_SCAN_CONFIG = 1 << 6;
        const UNSUPPORTED_MOTOR_TYPE = 1 << 7;
    }
}

impl EncoderError {
    /// Sticky flag for this error, if it is one of the latched kinds.
    /// Hardware errors propagate without latching a bit.
    pub fn flag(&self) -> Option<ErrorFlags> {
        match self {
            Self::UnstableGain => Some(ErrorFlags::UNSTABLE_GAIN),
            Self::UnsupportedMode => Some(ErrorFlags::UNSUPPORTED_ENCODER_MODE),
            Self::IllegalHallState { .. } => Some(ErrorFlags::ILLEGAL_HALL_STATE),
            Self::IndexNotFoundYet => Some(ErrorFlags::INDEX_NOT_FOUND_YET),
            Self::NoResponse => Some(ErrorFlags::NO_RESPONSE),
            Self::CprOutOfRange { .. } => Some(ErrorFlags::CPR_OUT_OF_RANGE),
            Self::InvalidScanConfig(_) => Some(ErrorFlags::INVALID_SCAN_CONFIG),
            Self::UnsupportedMotorType => Some(ErrorFlags::UNSUPPORTED_MOTOR_TYPE),
            Self::Hardware(_) => None,
        }
    }
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T, E = Report> = core::result::Result<T, E>;
pub use eyre::Report;

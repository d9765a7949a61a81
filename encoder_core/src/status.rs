/// Calibration/readiness phase of the estimator.
///
/// `Faulted` is terminal for the session; the axis supervisor decides what
/// happens next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalPhase {
    Uncalibrated,
    Calibrating,
    Ready,
    Faulted,
}

impl CalPhase {
    pub fn is_ready(self) -> bool {
        matches!(self, Self::Ready)
    }

    pub fn is_faulted(self) -> bool {
        matches!(self, Self::Faulted)
    }
}

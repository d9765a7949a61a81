//! Test and helper mocks for encoder_core.

use encoder_traits::{EncoderSensor, SensorChannel};

/// A sensor backend that supports no channel; useful for exercising the
/// unsupported-mode path and as a placeholder where sampling never runs.
pub struct NoopSensor;

impl EncoderSensor for NoopSensor {
    fn supports(&self, _channel: SensorChannel) -> bool {
        false
    }
}

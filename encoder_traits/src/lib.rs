//! Hardware-abstraction traits for the encoder estimation stack.
//!
//! Everything the sensing core touches outside its own state goes through
//! these narrow seams: raw sensor acquisition (`EncoderSensor`), open-loop
//! voltage injection (`Commutation`), the forced-rotation maneuver
//! (`LockinSpin`), the fixed-rate tick driver (`LoopDriver`), and the index
//! edge subscription (`IndexPin`). Real register access and simulation
//! backends implement the same traits.

pub mod notify;

pub use notify::{FaultSignal, IndexLatch};

use std::error::Error;

/// Boxed error type shared by all hardware seams.
pub type HwResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

fn unsupported(what: &str) -> Box<dyn Error + Send + Sync> {
    std::io::Error::other(format!("{what} not supported by this backend")).into()
}

/// Acquisition channel a sensor backend may provide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorChannel {
    /// Hardware quadrature counter register (incremental mode).
    Counter,
    /// Three digital hall lines packed into bits 0..=2.
    Hall,
    /// Two analog channels carrying sine and cosine of the shaft angle.
    SinCos,
}

/// Raw sensor acquisition. One backend may support several channels; the
/// default method bodies reject a channel so narrow backends only implement
/// what they have.
pub trait EncoderSensor {
    /// Arm the counting hardware. Called once during setup.
    fn start(&mut self) -> HwResult<()> {
        Ok(())
    }

    /// Whether this backend can service the given channel.
    fn supports(&self, channel: SensorChannel) -> bool;

    /// Instantaneous counter register value, truncated to 16 bits.
    fn read_counter(&mut self) -> HwResult<u16> {
        Err(unsupported("counter read"))
    }

    /// Overwrite the hardware counter register.
    fn write_counter(&mut self, _count: u16) -> HwResult<()> {
        Err(unsupported("counter write"))
    }

    /// Current hall line state, bits 0..=2.
    fn read_hall(&mut self) -> HwResult<u8> {
        Err(unsupported("hall read"))
    }

    /// Unit-centered sine/cosine pair, each in [-0.5, 0.5).
    fn read_sincos(&mut self) -> HwResult<(f32, f32)> {
        Err(unsupported("sin/cos read"))
    }
}

/// Motor construction family; decides how the calibration voltage magnitude
/// is derived from the calibration current.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum MotorType {
    /// Low-resistance motor: V = I_cal * phase_resistance.
    HighCurrent,
    /// Gimbal motor driven by voltage directly: V = I_cal.
    Gimbal,
    /// Induction motor; offset calibration is not defined for it.
    Acim,
}

/// Electrical parameters the calibration engine needs from the motor side.
#[derive(Debug, Clone, Copy)]
pub struct MotorParams {
    pub motor_type: MotorType,
    pub pole_pairs: u32,
    /// Per-phase resistance in ohms.
    pub phase_resistance: f32,
    /// Open-loop calibration current in amps.
    pub calibration_current: f32,
}

/// Open-loop voltage injection into the commutation stage, plus the
/// motor-to-sensor direction sign the calibration engine discovers.
pub trait Commutation {
    /// Apply an alpha/beta voltage vector for the next tick. An `Err` means
    /// the motor side faulted; the caller must unwind without committing
    /// partial calibration state.
    fn enqueue_voltage_timings(&mut self, v_alpha: f32, v_beta: f32) -> HwResult<()>;

    fn motor_params(&self) -> MotorParams;

    /// Motor-to-sensor direction: +1, -1, or 0 when unknown/ambiguous.
    fn direction(&self) -> i8;

    fn set_direction(&mut self, direction: i8);
}

/// Externally defined open-loop spin-and-settle maneuver used by index
/// search and direction find.
pub trait LockinSpin {
    /// Run the maneuver to completion. `finish_on_distance` ends the spin
    /// after the configured travel instead of the default criterion.
    fn run_lockin_spin(&mut self, finish_on_distance: bool) -> HwResult<()>;
}

/// Fixed-rate control loop driver. The calibration engine is expressed
/// entirely as tick callbacks handed to this collaborator.
pub trait LoopDriver {
    /// Invoke `tick` once per control period until it returns `false`.
    /// Returns `Err` when the driver itself observes a fault (deadline
    /// overrun, axis-level error) before the callback finished.
    fn run_control_loop(&mut self, tick: &mut dyn FnMut() -> bool) -> HwResult<()>;

    /// Tick rate in Hz; fixed for the lifetime of the driver.
    fn tick_rate_hz(&self) -> u32;
}

/// Edge interrupt subscription for the index pulse.
///
/// Delivery guarantee: at most one `IndexLatch::raise` per `subscribe` call;
/// the implementation disarms itself after firing.
pub trait IndexPin {
    fn subscribe(&mut self, latch: IndexLatch) -> HwResult<()>;
    fn unsubscribe(&mut self);
}

//! Simulation backends for the encoder estimation stack.
//!
//! A shared [`SimRotor`] holds the mechanical shaft angle; the sensor,
//! motor, and index-pin simulations all observe or move that one angle, so
//! an injected voltage vector produces exactly the sensor counts a real
//! axis would see. Everything is deterministic: the loop driver runs ticks
//! back to back with no wall-clock sleeps.

pub mod error;

use encoder_traits::{
    Commutation, EncoderSensor, HwResult, IndexLatch, IndexPin, LockinSpin, LoopDriver,
    MotorParams, SensorChannel,
};
use error::SimError;
use std::cell::{Cell, RefCell};
use std::f64::consts::{PI, TAU};
use std::rc::Rc;

/// Hall line patterns indexed by electrical sector ordinal 0..=5.
const HALL_PATTERNS: [u8; 6] = [0b001, 0b011, 0b010, 0b110, 0b100, 0b101];

fn wrap_pm_pi(x: f64) -> f64 {
    (x + PI).rem_euclid(TAU) - PI
}

struct Watcher {
    latch: IndexLatch,
    armed: bool,
}

/// Shared mechanical shaft model. Clones observe the same angle.
#[derive(Clone, Default)]
pub struct SimRotor {
    mech: Rc<Cell<f64>>,
    watchers: Rc<RefCell<Vec<Watcher>>>,
}

impl SimRotor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mechanical angle in radians, unbounded.
    pub fn angle(&self) -> f64 {
        self.mech.get()
    }

    /// Teleport the shaft without generating index pulses.
    pub fn set_angle(&self, angle: f64) {
        self.mech.set(angle);
    }

    /// Move the shaft, firing any armed index watcher when the angle
    /// crosses a whole-revolution boundary. Each watcher fires at most once.
    pub fn advance(&self, delta: f64) {
        let old = self.mech.get();
        let new = old + delta;
        self.mech.set(new);
        if (old / TAU).floor() != (new / TAU).floor() {
            for w in self.watchers.borrow_mut().iter_mut() {
                if w.armed {
                    w.armed = false;
                    tracing::debug!(angle = new, "sim index pulse");
                    w.latch.raise();
                }
            }
        }
    }

    fn arm(&self, latch: IndexLatch) {
        self.watchers.borrow_mut().push(Watcher { latch, armed: true });
    }

    fn disarm(&self) {
        self.watchers.borrow_mut().clear();
    }
}

/// Configuration for a simulated sensor head.
#[derive(Debug, Clone, Copy)]
pub struct SimSensorCfg {
    /// True resolution of the simulated sensor in counts per revolution.
    pub cpr: i32,
    /// Arbitrary count the sensor reports at mechanical angle zero.
    pub zero_count: i32,
    /// Pole pairs, used to derive hall sectors from the shaft angle.
    pub pole_pairs: u32,
}

impl Default for SimSensorCfg {
    fn default() -> Self {
        Self {
            cpr: 8192,
            zero_count: 0,
            pole_pairs: 7,
        }
    }
}

/// Simulated sensor head serving all three channels from the rotor angle.
pub struct SimSensor {
    rotor: SimRotor,
    cfg: SimSensorCfg,
    /// Counter register bias so `write_counter` behaves like a real timer.
    counter_bias: i64,
}

impl SimSensor {
    pub fn new(rotor: SimRotor, cfg: SimSensorCfg) -> Self {
        Self {
            rotor,
            cfg,
            counter_bias: 0,
        }
    }

    /// Absolute count the sensor would report, before counter truncation.
    fn mech_count(&self) -> i64 {
        let turns = self.rotor.angle() / TAU;
        (turns * f64::from(self.cfg.cpr)).round() as i64 + i64::from(self.cfg.zero_count)
    }
}

impl EncoderSensor for SimSensor {
    fn supports(&self, _channel: SensorChannel) -> bool {
        true
    }

    fn read_counter(&mut self) -> HwResult<u16> {
        Ok((self.mech_count() + self.counter_bias) as u16)
    }

    fn write_counter(&mut self, count: u16) -> HwResult<()> {
        self.counter_bias = i64::from(count) - self.mech_count();
        Ok(())
    }

    fn read_hall(&mut self) -> HwResult<u8> {
        let elec = self.rotor.angle() * f64::from(self.cfg.pole_pairs);
        let sector = (elec / (TAU / 6.0)).floor() as i64;
        Ok(HALL_PATTERNS[sector.rem_euclid(6) as usize])
    }

    fn read_sincos(&mut self) -> HwResult<(f32, f32)> {
        let mech = self.rotor.angle();
        Ok((0.45 * mech.sin() as f32, 0.45 * mech.cos() as f32))
    }
}

/// Simulated commutation stage: the rotor tracks the injected voltage angle.
///
/// `coupling` is the physical motor-to-sensor pairing the calibration engine
/// is supposed to discover; `direction` is the config value the engine
/// writes back.
pub struct SimMotor {
    rotor: SimRotor,
    params: MotorParams,
    direction: i8,
    coupling: i8,
    prev_phase: f64,
    aligned: bool,
    /// Mechanical travel of one lock-in spin, radians.
    lockin_distance: f64,
    fail_after: Option<u32>,
    enqueues: u32,
}

impl SimMotor {
    pub fn new(rotor: SimRotor, params: MotorParams) -> Self {
        Self {
            rotor,
            params,
            direction: 0,
            coupling: 1,
            prev_phase: 0.0,
            aligned: false,
            lockin_distance: 0.5,
            fail_after: None,
            enqueues: 0,
        }
    }

    /// Invert the physical motor-to-sensor pairing.
    pub fn with_coupling(mut self, coupling: i8) -> Self {
        self.coupling = coupling;
        self
    }

    pub fn with_lockin_distance(mut self, mech_rad: f64) -> Self {
        self.lockin_distance = mech_rad;
        self
    }

    /// Inject a commutation fault after `n` voltage enqueues.
    pub fn fail_after_enqueues(mut self, n: u32) -> Self {
        self.fail_after = Some(n);
        self
    }

    pub fn enqueue_count(&self) -> u32 {
        self.enqueues
    }
}

impl Commutation for SimMotor {
    fn enqueue_voltage_timings(&mut self, v_alpha: f32, v_beta: f32) -> HwResult<()> {
        self.enqueues += 1;
        if let Some(n) = self.fail_after
            && self.enqueues > n
        {
            return Err(Box::new(SimError::CommutationFault(n)));
        }
        let cmd = f64::from(v_beta).atan2(f64::from(v_alpha));
        if !self.aligned {
            // First vector: rotor is assumed to settle onto it.
            self.aligned = true;
            self.prev_phase = cmd;
            return Ok(());
        }
        let delta = wrap_pm_pi(cmd - self.prev_phase);
        self.prev_phase = cmd;
        self.rotor
            .advance(f64::from(self.coupling) * delta / f64::from(self.params.pole_pairs));
        Ok(())
    }

    fn motor_params(&self) -> MotorParams {
        self.params
    }

    fn direction(&self) -> i8 {
        self.direction
    }

    fn set_direction(&mut self, direction: i8) {
        self.direction = direction;
    }
}

impl LockinSpin for SimMotor {
    fn run_lockin_spin(&mut self, _finish_on_distance: bool) -> HwResult<()> {
        let travel =
            f64::from(self.direction) * f64::from(self.coupling) * self.lockin_distance;
        tracing::debug!(travel, "sim lock-in spin");
        // Step so index-revolution crossings are observed mid-travel.
        for _ in 0..64 {
            self.rotor.advance(travel / 64.0);
        }
        Ok(())
    }
}

/// Loop driver that runs ticks back to back, bounded by a tick budget so a
/// callback that never finishes fails the run instead of hanging.
pub struct InstantLoop {
    rate_hz: u32,
    max_ticks: u64,
}

impl InstantLoop {
    pub fn new(rate_hz: u32) -> Self {
        Self {
            rate_hz,
            max_ticks: 10_000_000,
        }
    }

    pub fn with_max_ticks(mut self, max_ticks: u64) -> Self {
        self.max_ticks = max_ticks;
        self
    }
}

impl LoopDriver for InstantLoop {
    fn run_control_loop(&mut self, tick: &mut dyn FnMut() -> bool) -> HwResult<()> {
        for _ in 0..self.max_ticks {
            if !tick() {
                return Ok(());
            }
        }
        Err(Box::new(SimError::TickBudget(self.max_ticks)))
    }

    fn tick_rate_hz(&self) -> u32 {
        self.rate_hz
    }
}

/// Simulated index pin wired to the rotor's revolution boundary.
pub struct SimIndexPin {
    rotor: SimRotor,
}

impl SimIndexPin {
    pub fn new(rotor: SimRotor) -> Self {
        Self { rotor }
    }
}

impl IndexPin for SimIndexPin {
    fn subscribe(&mut self, latch: IndexLatch) -> HwResult<()> {
        // Re-subscribing re-arms; the previous arm is discarded.
        self.rotor.disarm();
        self.rotor.arm(latch);
        Ok(())
    }

    fn unsubscribe(&mut self) {
        self.rotor.disarm();
    }
}

/// Bundle of simulated collaborators sharing one rotor.
pub struct SimAxis {
    pub rotor: SimRotor,
    pub sensor: SimSensor,
    pub motor: SimMotor,
    pub driver: InstantLoop,
    pub index_pin: SimIndexPin,
}

/// Build a coherent simulated axis: sensor, motor, index pin and loop driver
/// all observing the same shaft.
pub fn sim_axis(sensor_cfg: SimSensorCfg, params: MotorParams, tick_rate_hz: u32) -> SimAxis {
    let rotor = SimRotor::new();
    SimAxis {
        sensor: SimSensor::new(rotor.clone(), sensor_cfg),
        motor: SimMotor::new(rotor.clone(), params),
        driver: InstantLoop::new(tick_rate_hz),
        index_pin: SimIndexPin::new(rotor.clone()),
        rotor,
    }
}

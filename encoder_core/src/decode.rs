//! Wraparound-safe delta decoding and angle helpers.
//!
//! These are the numeric primitives the tracker and estimator lean on; all
//! of them are pure so the wraparound edge cases can be tested exhaustively.

use crate::config::SINCOS_COUNTS_PER_RAD;

/// Signed delta between two 16-bit counter snapshots.
///
/// The cast to `i16` picks the minimal-magnitude signed representative of
/// `(raw - prev) mod 2^16`, which absorbs counter overflow as long as
/// per-tick motion stays under half the register range.
#[inline]
pub fn incremental_delta(raw: u16, prev: u16) -> i32 {
    i32::from(raw.wrapping_sub(prev) as i16)
}

/// Decode a 3-bit hall line state to its ordinal in 0..=5.
///
/// The six valid patterns are a Gray sequence; anything else means a stuck
/// or glitching line.
#[inline]
pub fn decode_hall(state: u8) -> Option<i32> {
    match state {
        0b001 => Some(0),
        0b011 => Some(1),
        0b010 => Some(2),
        0b110 => Some(3),
        0b100 => Some(4),
        0b101 => Some(5),
        _ => None,
    }
}

/// Synthetic count from a unit-centered sine/cosine pair, at a fixed scale
/// of 1000 counts per radian (truncated, matching the decode convention).
#[inline]
pub fn sincos_count(s: f32, c: f32) -> i32 {
    (SINCOS_COUNTS_PER_RAD * s.atan2(c)) as i32
}

/// Positive-result modulo into [0, m).
#[inline]
pub fn mod_cpr(x: i32, m: i32) -> i32 {
    x.rem_euclid(m)
}

/// Circular delta between two counts, wrapped into (-cpr/2, cpr/2].
#[inline]
pub fn circular_delta(new: i32, prev: i32, cpr: i32) -> i32 {
    let mut delta = mod_cpr(new - prev, cpr);
    if delta > cpr / 2 {
        delta -= cpr;
    }
    delta
}

/// Wrap a float into [-bound, bound).
#[inline]
pub fn wrap_pm(x: f32, bound: f32) -> f32 {
    (x + bound).rem_euclid(2.0 * bound) - bound
}

/// Wrap an angle into [-pi, pi).
#[inline]
pub fn wrap_pm_pi(x: f32) -> f32 {
    wrap_pm(x, core::f32::consts::PI)
}

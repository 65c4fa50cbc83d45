//! Engine-wide timing constants.

/// Track position units per millisecond at a 1.0x multiplier.
pub const POSITION_SCALE: f64 = 100.0;

/// Interval between hold-credit ticks while a hold is pressed.
pub const HOLD_TICK_MS: f64 = 100.0;

/// Tempo the beat judge windows are tuned for.
pub const REFERENCE_BPM: f64 = 240.0;

pub use crate::formats::measure::{MS_PER_MEASURE_AT_1BPM, TICKS_PER_MEASURE};

/// Notes are spawned this far ahead of the clock.
pub const PREBUFFER_MS: f64 = 3000.0;

/// Track distance at which notes are spawned regardless of time, at
/// scroll speed 10.
pub const PREBUFFER_POSITION: f64 = 300_000.0;

/// Pool slots reserved per lane before growing.
pub const MAX_NOTES_PER_LANE: usize = 500;

/// The session ends this long after the chart length.
pub const END_GRACE_MS: f64 = 2500.0;

/// Delay before autoplay releases a tap.
pub const AUTOPLAY_RELEASE_MS: f64 = 25.0;

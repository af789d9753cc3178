// Quantization - Align user-triggered events to clock boundaries

use super::transport::ClockSnapshot;
use serde::{Deserialize, Serialize};

/// Granularity a trigger is aligned to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum QuantizationMode {
    /// Sound immediately
    #[default]
    None,
    HalfMeasure,
    Measure,
}

impl QuantizationMode {
    /// Grid spacing in seconds for a clock, `None` when unquantized
    pub fn grid(&self, clock: &ClockSnapshot) -> Option<f64> {
        match self {
            QuantizationMode::None => None,
            QuantizationMode::HalfMeasure => Some(clock.measure_duration() / 2.0),
            QuantizationMode::Measure => Some(clock.measure_duration()),
        }
    }
}

/// Next time at which a trigger requested at `now` should sound
///
/// Without a running clock, or with `QuantizationMode::None`, that is `now`.
/// Otherwise it is the first grid line (counted from the clock's start
/// time) strictly after `now`; a trigger exactly on a boundary goes to the
/// following one.
pub fn next_quantization_time(mode: QuantizationMode, clock: &ClockSnapshot, now: f64) -> f64 {
    if !clock.is_running {
        return now;
    }
    let Some(grid) = mode.grid(clock) else {
        return now;
    };
    if !(grid.is_finite() && grid > 0.0) || !now.is_finite() {
        return now;
    }

    let elapsed = now - clock.start_time;
    let slots = (elapsed / grid).floor() + 1.0;
    let next = clock.start_time + slots * grid;
    if next > now {
        return next;
    }
    // Float error can put the candidate on or before now
    let next = clock.start_time + (slots + 1.0) * grid;
    // Past 2^53 slots the grid is finer than f64 spacing
    if next > now { next } else { now }
}

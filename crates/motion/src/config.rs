//! Machine configuration.
//!
//! The planner reads configuration at append time only; a settings change
//! during motion never retroactively affects blocks already in the buffer.

use crate::N_AXIS;

/// Per-axis mechanical limits.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde-support", derive(serde::Serialize, serde::Deserialize))]
pub struct AxisConfig {
    /// Steps per millimeter of travel.
    pub steps_per_mm: f32,
    /// Maximum rate (mm/min).
    pub max_rate: f32,
    /// Maximum acceleration (mm/min²).
    pub max_accel: f32,
    /// Maximum travel from the homed origin (mm).
    pub max_travel: f32,
}

impl Default for AxisConfig {
    fn default() -> Self {
        AxisConfig {
            steps_per_mm: 250.0,
            max_rate: 500.0,
            max_accel: 10.0 * 60.0 * 60.0,
            max_travel: 200.0,
        }
    }
}

/// Whole-machine configuration consumed by the planner and executor.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde-support", derive(serde::Serialize, serde::Deserialize))]
pub struct MotionConfig {
    pub axes: [AxisConfig; N_AXIS],
    /// Junction deviation (mm): the cornering chord tolerance.
    pub junction_deviation: f32,
    /// Floor applied to any programmed feed rate (mm/min).
    pub min_feed_rate: f32,
    /// Floor applied to junction speeds (mm/min). Zero lets sharp corners
    /// plan down to a full stop.
    pub min_junction_speed: f32,
    /// Step timer tick rate (Hz).
    pub tick_hz: u32,
    /// Minimum step pulse high time, in timer ticks. Must satisfy the
    /// stepper driver's datasheet minimum.
    pub pulse_width_ticks: u32,
}

impl Default for MotionConfig {
    fn default() -> Self {
        MotionConfig {
            axes: [AxisConfig::default(); N_AXIS],
            junction_deviation: 0.01,
            min_feed_rate: 1.0,
            min_junction_speed: 0.0,
            tick_hz: 1_562_500,
            pulse_width_ticks: 40,
        }
    }
}

impl MotionConfig {
    /// Shortest pulse period the timer hardware may be programmed with:
    /// the pulse must go high for the driver minimum and low again before
    /// the next edge.
    pub fn min_period_ticks(&self) -> u32 {
        self.pulse_width_ticks * 2
    }

    /// Longest representable pulse period (16-bit compare timers).
    pub fn max_period_ticks(&self) -> u32 {
        u16::MAX as u32
    }
}

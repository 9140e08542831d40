//! GRBL-numbered settings record.
//!
//! The host protocol exposes machine configuration as a flat record of
//! floats indexed by setting number (`$100=250.000` and friends). This
//! crate implements the numbered record with validation, serde round-trip
//! for persistence, and conversion into the [`motion::MotionConfig`] the
//! core reads at block-append time. Changing a setting during motion never
//! touches blocks already buffered; the new values apply from the next
//! append.
//!
//! Numbering follows the GRBL v1.1 convention for the subset the motion
//! core consumes:
//!
//! | number      | meaning                      | unit    |
//! |-------------|------------------------------|---------|
//! | `$0`        | step pulse time              | µs      |
//! | `$11`       | junction deviation           | mm      |
//! | `$100..102` | steps per millimeter (X,Y,Z) | step/mm |
//! | `$110..112` | maximum rate                 | mm/min  |
//! | `$120..122` | maximum acceleration         | mm/s²   |
//! | `$130..132` | maximum travel               | mm      |
//!
//! Acceleration is stored in the protocol's mm/s² and converted to the
//! planner's internal mm/min² on the way out.

use motion::{AxisConfig, MotionConfig, N_AXIS};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from the numbered get/set surface.
#[derive(Debug, Error, PartialEq)]
pub enum SettingsError {
    /// The setting number is not one this controller stores.
    #[error("unknown setting number ${0}")]
    UnknownSetting(u16),
    /// The value is out of range for the setting (non-finite, or outside
    /// the positive domain the setting requires).
    #[error("invalid value {value} for setting ${setting}")]
    InvalidValue { setting: u16, value: f32 },
}

/// Per-axis numbered settings, protocol units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisSettings {
    /// `$10x`: steps per millimeter.
    pub steps_per_mm: f32,
    /// `$11x`: maximum rate (mm/min).
    pub max_rate: f32,
    /// `$12x`: maximum acceleration (mm/s²).
    pub max_accel: f32,
    /// `$13x`: maximum travel (mm).
    pub max_travel: f32,
}

impl Default for AxisSettings {
    fn default() -> Self {
        AxisSettings {
            steps_per_mm: 250.0,
            max_rate: 500.0,
            max_accel: 10.0,
            max_travel: 200.0,
        }
    }
}

/// The flat settings record.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// `$0`: step pulse time (µs).
    pub step_pulse_us: f32,
    /// `$11`: junction deviation (mm).
    pub junction_deviation: f32,
    pub axes: [AxisSettings; N_AXIS],
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            step_pulse_us: 10.0,
            junction_deviation: 0.010,
            axes: [AxisSettings::default(); N_AXIS],
        }
    }
}

impl Settings {
    /// Read one numbered setting.
    pub fn get(&self, number: u16) -> Result<f32, SettingsError> {
        match number {
            0 => Ok(self.step_pulse_us),
            11 => Ok(self.junction_deviation),
            100..=132 => {
                let (group, axis) = (number / 10 % 10, (number % 10) as usize);
                if axis >= N_AXIS {
                    return Err(SettingsError::UnknownSetting(number));
                }
                let axes = &self.axes[axis];
                match group {
                    0 => Ok(axes.steps_per_mm),
                    1 => Ok(axes.max_rate),
                    2 => Ok(axes.max_accel),
                    3 => Ok(axes.max_travel),
                    _ => Err(SettingsError::UnknownSetting(number)),
                }
            }
            _ => Err(SettingsError::UnknownSetting(number)),
        }
    }

    /// Write one numbered setting, validating the value's domain.
    pub fn set(&mut self, number: u16, value: f32) -> Result<(), SettingsError> {
        let invalid = SettingsError::InvalidValue {
            setting: number,
            value,
        };
        if !value.is_finite() {
            return Err(invalid);
        }
        match number {
            0 => {
                // The driver needs a real pulse; sub-microsecond settings
                // are configuration mistakes.
                if value < 1.0 {
                    return Err(invalid);
                }
                self.step_pulse_us = value;
            }
            11 => {
                if value < 0.0 {
                    return Err(invalid);
                }
                self.junction_deviation = value;
            }
            100..=132 => {
                let (group, axis) = (number / 10 % 10, (number % 10) as usize);
                if axis >= N_AXIS {
                    return Err(SettingsError::UnknownSetting(number));
                }
                if value <= 0.0 {
                    return Err(invalid);
                }
                let axes = &mut self.axes[axis];
                match group {
                    0 => axes.steps_per_mm = value,
                    1 => axes.max_rate = value,
                    2 => axes.max_accel = value,
                    3 => axes.max_travel = value,
                    _ => return Err(SettingsError::UnknownSetting(number)),
                }
            }
            _ => return Err(SettingsError::UnknownSetting(number)),
        }
        Ok(())
    }

    /// Every stored setting as `(number, value)`, in dump (`$$`) order.
    pub fn iter(&self) -> impl Iterator<Item = (u16, f32)> + '_ {
        let fixed = [(0, self.step_pulse_us), (11, self.junction_deviation)];
        let per_axis = (0..N_AXIS).flat_map(move |axis| {
            let axes = self.axes[axis];
            [
                (100 + axis as u16, axes.steps_per_mm),
                (110 + axis as u16, axes.max_rate),
                (120 + axis as u16, axes.max_accel),
                (130 + axis as u16, axes.max_travel),
            ]
        });
        fixed.into_iter().chain(per_axis)
    }

    /// Build the motion core configuration for a given step-timer rate.
    ///
    /// Acceleration converts from the protocol's mm/s² to the planner's
    /// mm/min²; the pulse width converts from microseconds to timer ticks,
    /// rounded up so the driver minimum is never shaved.
    pub fn to_motion_config(&self, tick_hz: u32) -> MotionConfig {
        let mut axes = [AxisConfig::default(); N_AXIS];
        for (axis, stored) in axes.iter_mut().zip(self.axes.iter()) {
            *axis = AxisConfig {
                steps_per_mm: stored.steps_per_mm,
                max_rate: stored.max_rate,
                max_accel: stored.max_accel * 60.0 * 60.0,
                max_travel: stored.max_travel,
            };
        }
        let pulse_width_ticks =
            ((self.step_pulse_us * tick_hz as f32 / 1_000_000.0).ceil()) as u32;
        MotionConfig {
            axes,
            junction_deviation: self.junction_deviation,
            tick_hz,
            pulse_width_ticks: pulse_width_ticks.max(1),
            ..MotionConfig::default()
        }
    }
}

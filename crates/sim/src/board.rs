//! Simulated board behind the motion core's `StepHal`.
//!
//! Each axis gets a real DRV8825 driver instance over recorded pins plus a
//! simulated pulse generator (a period register and a running flag). The
//! harness owns the clock: it asks which generator is running, advances
//! virtual time by the programmed period, emits the STEP edge through the
//! driver, and delivers the pulse interrupt.

use core::cell::Cell;
use core::convert::Infallible;
use std::rc::Rc;

use driver_drv8825::{Direction, Drv8825, Microsteps};
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{ErrorType, InputPin, OutputPin};
use motion::{Axis, StepHal, N_AXIS};

/// Recorded GPIO output: tracks the level and counts rising edges.
#[derive(Clone, Default)]
pub struct SimPin {
    level: Rc<Cell<bool>>,
    rises: Rc<Cell<u32>>,
}

impl SimPin {
    pub fn new() -> SimPin {
        SimPin::default()
    }

    pub fn rises(&self) -> u32 {
        self.rises.get()
    }

    pub fn is_high(&self) -> bool {
        self.level.get()
    }
}

impl ErrorType for SimPin {
    type Error = Infallible;
}

impl OutputPin for SimPin {
    fn set_low(&mut self) -> Result<(), Infallible> {
        self.level.set(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        if !self.level.get() {
            self.rises.set(self.rises.get() + 1);
        }
        self.level.set(true);
        Ok(())
    }
}

/// Simulated GPIO input with an externally settable level, for the limit
/// switches.
#[derive(Clone, Default)]
pub struct SimInput {
    level: Rc<Cell<bool>>,
}

impl SimInput {
    pub fn new() -> SimInput {
        SimInput::default()
    }

    pub fn set_level(&self, high: bool) {
        self.level.set(high);
    }
}

impl ErrorType for SimInput {
    type Error = Infallible;
}

impl InputPin for SimInput {
    fn is_high(&mut self) -> Result<bool, Infallible> {
        Ok(self.level.get())
    }

    fn is_low(&mut self) -> Result<bool, Infallible> {
        Ok(!self.level.get())
    }
}

/// Virtual time is advanced by the harness; pulse widths cost nothing.
struct NoDelay;

impl DelayNs for NoDelay {
    fn delay_ns(&mut self, _ns: u32) {}
}

struct AxisChannel {
    driver: Drv8825<SimPin, SimPin, SimPin, SimPin, SimPin, SimPin>,
    step_pin: SimPin,
    running: bool,
    period: u32,
}

impl AxisChannel {
    fn new() -> AxisChannel {
        let step_pin = SimPin::new();
        let mut driver = Drv8825::new(
            step_pin.clone(),
            SimPin::new(),
            SimPin::new(),
            SimPin::new(),
            SimPin::new(),
            SimPin::new(),
        );
        // Fixed microstepping; the pipeline's steps/mm already folds it in.
        driver
            .set_microsteps(Microsteps::Sixteenth)
            .unwrap_or_else(|never| match never {});
        AxisChannel {
            driver,
            step_pin,
            running: false,
            period: 0,
        }
    }
}

/// The simulated board.
pub struct SimBoard {
    axes: [AxisChannel; N_AXIS],
    enabled: bool,
}

impl SimBoard {
    pub fn new() -> SimBoard {
        SimBoard {
            axes: [AxisChannel::new(), AxisChannel::new(), AxisChannel::new()],
            enabled: false,
        }
    }

    /// The running pulse generator, if any: `(axis index, period ticks)`.
    pub fn running_generator(&self) -> Option<(usize, u32)> {
        self.axes
            .iter()
            .position(|a| a.running)
            .map(|i| (i, self.axes[i].period))
    }

    /// Produce the hardware STEP edge the generator would have emitted.
    pub fn emit_edge(&mut self, axis: usize) {
        self.axes[axis]
            .driver
            .step(&mut NoDelay)
            .unwrap_or_else(|never| match never {});
    }

    /// Rising STEP edges observed per axis since construction.
    pub fn step_edges(&self) -> [u32; N_AXIS] {
        let mut edges = [0u32; N_AXIS];
        for (i, axis) in self.axes.iter().enumerate() {
            edges[i] = axis.step_pin.rises();
        }
        edges
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

impl Default for SimBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl StepHal for SimBoard {
    fn set_direction(&mut self, axis: Axis, negative: bool) {
        let direction = if negative {
            Direction::Negative
        } else {
            Direction::Positive
        };
        self.axes[axis.index()]
            .driver
            .set_direction(direction)
            .unwrap_or_else(|never| match never {});
    }

    fn set_period(&mut self, axis: Axis, ticks: u32) {
        self.axes[axis.index()].period = ticks;
    }

    fn start_pulses(&mut self, axis: Axis) {
        self.axes[axis.index()].running = true;
    }

    fn stop_pulses(&mut self, axis: Axis) {
        self.axes[axis.index()].running = false;
    }

    fn step_pulse(&mut self, axis: Axis) {
        self.emit_edge(axis.index());
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        for axis in &mut self.axes {
            let result = if enabled {
                axis.driver.enable()
            } else {
                axis.driver.disable()
            };
            result.unwrap_or_else(|never| match never {});
        }
    }
}

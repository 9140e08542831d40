//! A `no_std` driver for the DRV8825 stepper motor driver.
//!
//! Controls the DRV8825 through GPIO: STEP and DIR outputs, the active-low
//! nENABLE input, and the three microstep mode pins. Step timing follows
//! the datasheet: STEP must stay high, and then low, for at least 1.9 µs
//! each, and DIR must be stable 650 ns before a rising STEP edge. The
//! driver exposes both a blocking [`Drv8825::step`] that owns the timing
//! and a split [`Drv8825::step_start`]/[`Drv8825::step_end`] pair for
//! callers that hide the high time inside other work, the way a pulse
//! interrupt does.

#![no_std]

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{OutputPin, PinState};

/// Datasheet minimum STEP high (and low) time, nanoseconds.
pub const STEP_PULSE_MIN_NS: u32 = 1_900;

/// Datasheet DIR-to-STEP setup time, nanoseconds.
pub const DIR_SETUP_MIN_NS: u32 = 650;

/// Microstepping resolution selected by the MODE0..2 pins.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Microsteps {
    Full,
    Half,
    Quarter,
    Eighth,
    Sixteenth,
    ThirtySecond,
}

impl Microsteps {
    fn mode_pins(self) -> (PinState, PinState, PinState) {
        use PinState::{High, Low};
        match self {
            Microsteps::Full => (Low, Low, Low),
            Microsteps::Half => (High, Low, Low),
            Microsteps::Quarter => (Low, High, Low),
            Microsteps::Eighth => (High, High, Low),
            Microsteps::Sixteenth => (Low, Low, High),
            Microsteps::ThirtySecond => (High, Low, High),
        }
    }
}

/// Motor direction. `Positive` is the direction that increases the axis
/// coordinate; flip the wiring, not the code, if a motor runs backwards.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Positive,
    Negative,
}

/// A DRV8825 driver instance over its control pins.
pub struct Drv8825<STEP, DIR, EN, M0, M1, M2> {
    step: STEP,
    dir: DIR,
    n_enable: EN,
    m0: M0,
    m1: M1,
    m2: M2,
}

impl<STEP, DIR, EN, M0, M1, M2, E> Drv8825<STEP, DIR, EN, M0, M1, M2>
where
    STEP: OutputPin<Error = E>,
    DIR: OutputPin<Error = E>,
    EN: OutputPin<Error = E>,
    M0: OutputPin<Error = E>,
    M1: OutputPin<Error = E>,
    M2: OutputPin<Error = E>,
{
    pub fn new(step: STEP, dir: DIR, n_enable: EN, m0: M0, m1: M1, m2: M2) -> Self {
        Self {
            step,
            dir,
            n_enable,
            m0,
            m1,
            m2,
        }
    }

    /// Enable the output stage (nENABLE low).
    pub fn enable(&mut self) -> Result<(), E> {
        self.n_enable.set_low()
    }

    /// Disable the output stage (nENABLE high). The motor is free-wheeling
    /// afterwards.
    pub fn disable(&mut self) -> Result<(), E> {
        self.n_enable.set_high()
    }

    /// Latch the direction output. Callers must leave [`DIR_SETUP_MIN_NS`]
    /// before the next rising STEP edge.
    pub fn set_direction(&mut self, direction: Direction) -> Result<(), E> {
        let state = match direction {
            Direction::Positive => PinState::High,
            Direction::Negative => PinState::Low,
        };
        self.dir.set_state(state)
    }

    /// Raise STEP. The caller owns the high time and must call
    /// [`step_end`](Self::step_end) no sooner than [`STEP_PULSE_MIN_NS`]
    /// later.
    pub fn step_start(&mut self) -> Result<(), E> {
        self.step.set_high()
    }

    /// Lower STEP, completing the pulse.
    pub fn step_end(&mut self) -> Result<(), E> {
        self.step.set_low()
    }

    /// One complete step pulse with the datasheet minimum high time.
    pub fn step(&mut self, delay: &mut impl DelayNs) -> Result<(), E> {
        self.step.set_high()?;
        delay.delay_ns(STEP_PULSE_MIN_NS);
        self.step.set_low()
    }

    /// Select the microstepping resolution via the MODE pins.
    pub fn set_microsteps(&mut self, microsteps: Microsteps) -> Result<(), E> {
        let (m0, m1, m2) = microsteps.mode_pins();
        self.m0.set_state(m0)?;
        self.m1.set_state(m1)?;
        self.m2.set_state(m2)
    }
}

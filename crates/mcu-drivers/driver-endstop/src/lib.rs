//! A `no_std` driver for reading limit-switch inputs.
//!
//! Wraps a fixed array of GPIO inputs with a polarity convention. CNC limit
//! switches are usually wired normally-closed so a broken wire reads as
//! triggered; that makes the inputs active-low ([`Polarity::ActiveLow`]).
//! The outer control loop polls [`Endstops::any_triggered`] and invokes the
//! motion core's emergency stop when a switch trips.

#![no_std]

use embedded_hal::digital::InputPin;

/// Electrical polarity of the switch inputs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Polarity {
    /// A high pin means the switch is triggered.
    ActiveHigh,
    /// A low pin means the switch is triggered (normally-closed wiring).
    ActiveLow,
}

/// A collection of limit-switch input pins, one per monitored position.
pub struct Endstops<const N: usize, PIN> {
    pins: [PIN; N],
    polarity: Polarity,
}

impl<const N: usize, PIN, E> Endstops<N, PIN>
where
    PIN: InputPin<Error = E>,
{
    pub fn new(pins: [PIN; N], polarity: Polarity) -> Self {
        Self { pins, polarity }
    }

    /// Whether the switch at `index` is triggered.
    pub fn is_triggered(&mut self, index: usize) -> Result<bool, E> {
        let high = self.pins[index].is_high()?;
        Ok(match self.polarity {
            Polarity::ActiveHigh => high,
            Polarity::ActiveLow => !high,
        })
    }

    /// Triggered state of every switch.
    pub fn triggered(&mut self) -> Result<[bool; N], E> {
        let mut states = [false; N];
        for i in 0..N {
            states[i] = self.is_triggered(i)?;
        }
        Ok(states)
    }

    /// Whether any switch is triggered. This is the emergency-stop poll.
    pub fn any_triggered(&mut self) -> Result<bool, E> {
        for i in 0..N {
            if self.is_triggered(i)? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

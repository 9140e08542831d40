//! Cross-context machine state.
//!
//! Everything the main loop, the prep tick, and the pulse interrupt share
//! outside the segment queue lives here, one atomic word at a time.
//! Multi-word snapshots (the position vector) tolerate one-step skew
//! between axes; readers that need a coherent snapshot take a short
//! critical section instead.

use core::sync::atomic::{AtomicI32, AtomicU16, AtomicU32, AtomicU8, Ordering};

use crate::N_AXIS;

/// System-level execution state.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde-support", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "defmt-support", derive(defmt::Format))]
pub enum MachineState {
    /// No blocks, no segments, no pulses.
    Idle,
    /// Blocks are buffered but the dispatcher has not started.
    Queued,
    /// The dispatcher is emitting pulses.
    Running,
    /// Pulses stopped, buffers preserved, resumable via cycle start.
    Hold,
    /// Emergency stop. Buffers cleared; position must be resynchronized.
    Alarm,
}

impl MachineState {
    fn from_u8(raw: u8) -> MachineState {
        match raw {
            0 => MachineState::Idle,
            1 => MachineState::Queued,
            2 => MachineState::Running,
            3 => MachineState::Hold,
            _ => MachineState::Alarm,
        }
    }
}

/// Default feed override, percent.
pub const FEED_OVERRIDE_DEFAULT: u16 = 100;
/// Feed override clamp range, percent.
pub const FEED_OVERRIDE_MIN: u16 = 10;
pub const FEED_OVERRIDE_MAX: u16 = 200;

/// State shared across execution contexts.
pub struct SharedState {
    state: AtomicU8,
    /// Execution position: pulses actually emitted, per axis.
    position: [AtomicI32; N_AXIS],
    /// Feed override scalar, percent. Applied by the executor at prep time.
    feed_override: AtomicU16,
    /// Instantaneous cruise rate of the segment being generated (mm/min),
    /// stored as f32 bits.
    current_rate: AtomicU32,
}

impl SharedState {
    pub const fn new() -> Self {
        SharedState {
            state: AtomicU8::new(0),
            position: [const { AtomicI32::new(0) }; N_AXIS],
            feed_override: AtomicU16::new(FEED_OVERRIDE_DEFAULT),
            current_rate: AtomicU32::new(0),
        }
    }

    pub fn state(&self) -> MachineState {
        MachineState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: MachineState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Per-axis execution position in steps. Axes are read one word at a
    /// time; a concurrent pulse may skew the snapshot by a single step.
    pub fn machine_position(&self) -> [i32; N_AXIS] {
        let mut snapshot = [0i32; N_AXIS];
        for (i, axis) in self.position.iter().enumerate() {
            snapshot[i] = axis.load(Ordering::Relaxed);
        }
        snapshot
    }

    pub(crate) fn add_steps(&self, axis: usize, delta: i32) {
        self.position[axis].fetch_add(delta, Ordering::Relaxed);
    }

    pub(crate) fn set_position(&self, steps: [i32; N_AXIS]) {
        for (axis, value) in self.position.iter().zip(steps) {
            axis.store(value, Ordering::Relaxed);
        }
    }

    pub fn feed_override(&self) -> u16 {
        self.feed_override.load(Ordering::Relaxed)
    }

    /// Set the feed override percentage, clamped to the legal range.
    pub fn set_feed_override(&self, percent: u16) {
        let clamped = percent.clamp(FEED_OVERRIDE_MIN, FEED_OVERRIDE_MAX);
        self.feed_override.store(clamped, Ordering::Relaxed);
    }

    /// Cruise rate of the most recently generated segment (mm/min).
    pub fn current_rate(&self) -> f32 {
        f32::from_bits(self.current_rate.load(Ordering::Relaxed))
    }

    pub(crate) fn set_current_rate(&self, mm_per_min: f32) {
        self.current_rate
            .store(mm_per_min.to_bits(), Ordering::Relaxed);
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}

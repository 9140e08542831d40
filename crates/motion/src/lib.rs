//! # Motion Core
//!
//! The motion pipeline for a small CNC controller: a look-ahead velocity
//! planner, a trapezoidal segment executor, and a step-pulse dispatcher with
//! Bresenham coordination of the subordinate axes.
//!
//! The crate is split along the controller's three execution contexts:
//!
//! 1. [`planner`]: main context. Accepts linear moves in absolute machine
//!    millimeters and settles junction-limited entry speeds across a fixed
//!    look-ahead window of buffered blocks.
//! 2. [`executor`]: cooperative prep tick. Slices the block at the ring
//!    tail into short constant-velocity segments sampled along a trapezoidal
//!    velocity profile.
//! 3. [`dispatcher`]: pulse interrupt. Emits precisely timed dominant-axis
//!    step pulses through a board-provided [`StepHal`] and bit-bangs the
//!    subordinate axes off the dominant pulse count.
//!
//! Contexts meet only at a single-producer single-consumer segment queue,
//! per-axis position atomics, and brief `critical-section` control regions.
//! Nothing on the pulse hot path takes a lock, and nothing in the crate
//! allocates at runtime.
//!
//! Usable on both host and MCU (`no_std`-friendly; `std` is the default
//! feature and enables the built-in critical-section implementation).

#![cfg_attr(not(feature = "std"), no_std)]

pub mod config;
pub mod controller;
pub mod dispatcher;
pub mod errors;
pub mod executor;
pub mod planner;
pub mod segment;
pub mod state;

mod math;

pub use config::{AxisConfig, MotionConfig};
pub use controller::{MotionController, Status};
pub use dispatcher::{Dispatcher, DispatcherCell, StepHal};
pub use errors::PlanError;
pub use executor::SegmentPrep;
pub use planner::{Block, Condition, LineData, Planner};
pub use segment::{Segment, SegmentConsumer, SegmentProducer, SegmentQueue};
pub use state::{MachineState, SharedState};

/// Number of controlled axes. Fixed at build time.
pub const N_AXIS: usize = 3;

/// Identifier for one physical axis.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-support", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "defmt-support", derive(defmt::Format))]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    /// All axes, in per-axis array order.
    pub const ALL: [Axis; N_AXIS] = [Axis::X, Axis::Y, Axis::Z];

    /// Index of this axis into per-axis arrays.
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// The axis for a per-axis array index.
    ///
    /// Panics if `index >= N_AXIS`.
    #[inline]
    pub fn from_index(index: usize) -> Axis {
        Self::ALL[index]
    }
}

//! # In-Process Motion Simulation Harness
//!
//! A deterministic simulation environment for the motion pipeline, designed
//! for CI validation without hardware. The simulated board implements the
//! core's `StepHal` over real `driver-drv8825` instances wired to recorded
//! pins, so a run exercises the exact code a physical controller would:
//! planner → segment prep → dispatcher → driver pin wiggles.
//!
//! A run advances a virtual step-timer clock edge by edge, delivers the
//! pulse interrupt the way the hardware would, polls simulated limit
//! switches, and captures a serializable trace of segment period changes
//! for analysis and regression checks.

pub mod board;
pub mod harness;

pub use board::SimBoard;
pub use harness::{run, Move, SimReport, TraceEntry};

//! Main-context facade over the motion pipeline.
//!
//! Owns the planner and the segment prep, the producer half of the segment
//! queue, and the control surface (hold, resume, reset, emergency stop)
//! that reaches the dispatcher through its critical-section cell. This is
//! the single type the G-code layer talks to.

use crate::dispatcher::{DispatcherCell, StepHal};
use crate::errors::PlanError;
use crate::executor::SegmentPrep;
use crate::planner::{LineData, Planner};
use crate::segment::SegmentProducer;
use crate::state::{MachineState, SharedState};
use crate::{config::MotionConfig, N_AXIS};

/// Pollable status snapshot.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serde-support", derive(serde::Serialize, serde::Deserialize))]
pub struct Status {
    pub state: MachineState,
    /// Pulses actually emitted, per axis.
    pub machine_position: [i32; N_AXIS],
    /// Where the machine will be after all buffered blocks.
    pub planner_position: [i32; N_AXIS],
    pub buffered_blocks: usize,
    pub available_slots: usize,
    /// Programmed rate of the block at the ring tail (mm/min), zero when
    /// the buffer is empty.
    pub programmed_rate: f32,
    /// Cruise rate of the segment currently being generated (mm/min).
    pub current_rate: f32,
}

pub struct MotionController<'q, H: StepHal> {
    planner: Planner,
    prep: SegmentPrep,
    segments: SegmentProducer<'q>,
    shared: &'q SharedState,
    dispatcher: &'q DispatcherCell<'q, H>,
}

impl<'q, H: StepHal> MotionController<'q, H> {
    pub fn new(
        config: MotionConfig,
        segments: SegmentProducer<'q>,
        shared: &'q SharedState,
        dispatcher: &'q DispatcherCell<'q, H>,
    ) -> Self {
        MotionController {
            planner: Planner::new(config),
            prep: SegmentPrep::new(),
            segments,
            shared,
            dispatcher,
        }
    }

    /// Append one linear move. See [`Planner::append`] for the error
    /// contract; `BufferFull` is the flow-control signal and must be
    /// retried, not dropped.
    pub fn append(&mut self, target_mm: &[f32; N_AXIS], line: LineData) -> Result<(), PlanError> {
        self.planner.append(target_mm, line)?;
        if self.shared.state() == MachineState::Idle {
            self.shared.set_state(MachineState::Queued);
        }
        Ok(())
    }

    /// One cooperative slice of background work: at most one new segment,
    /// plus a dispatcher kick if it idled while work remains. Call this
    /// from the main loop, roughly every few milliseconds during motion.
    pub fn tick(&mut self) -> bool {
        let progressed = self
            .prep
            .tick(&mut self.planner, &mut self.segments, self.shared);

        match self.shared.state() {
            MachineState::Idle | MachineState::Queued => {
                let started =
                    critical_section::with(|cs| self.dispatcher.borrow_ref_mut(cs).start());
                if !started {
                    // Nothing executable yet. Blocks still buffered means
                    // we are queued, not idle.
                    if self.planner.is_empty() && !self.prep.is_busy() {
                        self.shared.set_state(MachineState::Idle);
                    } else {
                        self.shared.set_state(MachineState::Queued);
                    }
                }
            }
            _ => {}
        }
        progressed
    }

    /// Pause pulse generation, preserving all buffers.
    pub fn feed_hold(&mut self) {
        if self.shared.state() == MachineState::Running {
            critical_section::with(|cs| self.dispatcher.borrow_ref_mut(cs).feed_hold());
        }
    }

    /// Resume from hold, or start a queued buffer.
    pub fn cycle_start(&mut self) {
        match self.shared.state() {
            MachineState::Hold => {
                critical_section::with(|cs| self.dispatcher.borrow_ref_mut(cs).resume());
            }
            MachineState::Idle | MachineState::Queued => {
                critical_section::with(|cs| self.dispatcher.borrow_ref_mut(cs).start());
            }
            _ => {}
        }
    }

    /// Synchronous emergency stop: pulse generators are disabled inside the
    /// critical section, then both rings are cleared from this context. The
    /// execution position keeps the pulses actually emitted; the planner
    /// rejects appends until [`sync_position`](Self::sync_position).
    pub fn emergency_stop(&mut self) {
        critical_section::with(|cs| self.dispatcher.borrow_ref_mut(cs).emergency_stop());
        self.planner.clear_for_alarm();
        self.prep.reset();
    }

    /// Soft reset: stop motion, drop all buffered work, and rebase the
    /// planner on wherever the pulses actually stopped.
    pub fn reset(&mut self) {
        critical_section::with(|cs| self.dispatcher.borrow_ref_mut(cs).clear());
        self.prep.reset();
        self.planner.reset_from(self.shared.machine_position());
        self.shared.set_state(MachineState::Idle);
    }

    /// Install a known position after homing or G92. Sets both the planner
    /// and execution positions and clears an alarm.
    pub fn sync_position(&mut self, steps: [i32; N_AXIS]) {
        self.prep.reset();
        self.planner.sync_position(steps);
        self.shared.set_position(steps);
        if self.shared.state() == MachineState::Alarm {
            self.shared.set_state(MachineState::Idle);
        }
    }

    /// Set the feed override percentage (clamped). Applies to segments
    /// generated from now on; rapids and no-override blocks are exempt.
    pub fn set_feed_override(&self, percent: u16) {
        self.shared.set_feed_override(percent);
    }

    pub fn status(&self) -> Status {
        Status {
            state: self.shared.state(),
            machine_position: self.shared.machine_position(),
            planner_position: self.planner.position(),
            buffered_blocks: self.planner.block_count(),
            available_slots: self.planner.available_slots(),
            programmed_rate: self
                .planner
                .current_block()
                .map(|b| b.programmed_rate)
                .unwrap_or(0.0),
            current_rate: self.shared.current_rate(),
        }
    }

    /// Planner access for diagnostics and tests.
    pub fn planner(&self) -> &Planner {
        &self.planner
    }
}

//! Step-pulse dispatcher.
//!
//! The interrupt-context consumer of the segment queue. For each segment it
//! latches direction outputs, programs the dominant axis's pulse generator,
//! and on every generated pulse edge runs the Bresenham distribution for
//! the subordinate axes and the execution-position bookkeeping.
//!
//! The dispatcher is installed behind a [`DispatcherCell`] at board init.
//! The pulse interrupt borrows it through the cell; main-context control
//! operations (start, hold, resume, emergency stop) go through the same
//! brief critical section. The per-pulse work is strictly bounded: one
//! dominant count, at most `N_AXIS - 1` conditional subordinate toggles,
//! and segment-retire bookkeeping on the last pulse.

use core::cell::RefCell;

use critical_section::Mutex;

use crate::segment::{Segment, SegmentConsumer};
use crate::state::{MachineState, SharedState};
use crate::{Axis, N_AXIS};

/// Board-side step hardware. Implemented once per board.
///
/// Each axis has a direction output, a pulse generator that emits step
/// edges at a programmed period and calls [`Dispatcher::on_pulse`] from its
/// interrupt on every edge, and a manual step output for subordinate-axis
/// toggling. Pulse high time must meet the stepper driver's datasheet
/// minimum; the generator and the manual path both own that timing.
pub trait StepHal {
    /// Latch the direction output for an axis. Must be observable at the
    /// driver before the next step edge on that axis.
    fn set_direction(&mut self, axis: Axis, negative: bool);
    /// Program the pulse period for an axis generator, in timer ticks.
    fn set_period(&mut self, axis: Axis, ticks: u32);
    /// Start the pulse generator for an axis.
    fn start_pulses(&mut self, axis: Axis);
    /// Stop the pulse generator for an axis.
    fn stop_pulses(&mut self, axis: Axis);
    /// Emit one manual step pulse on an axis.
    fn step_pulse(&mut self, axis: Axis);
    /// Assert or release the driver enable outputs (the active-low polarity
    /// is the implementation's concern).
    fn set_enabled(&mut self, enabled: bool);
}

/// The dispatcher behind its critical-section mutex, as installed at init.
pub type DispatcherCell<'q, H> = Mutex<RefCell<Dispatcher<'q, H>>>;

struct ActiveSegment {
    segment: Segment,
    pulses_emitted: u32,
    counters: [u32; N_AXIS],
}

pub struct Dispatcher<'q, H: StepHal> {
    hal: H,
    segments: SegmentConsumer<'q>,
    shared: &'q SharedState,
    active: Option<ActiveSegment>,
    held: bool,
}

impl<'q, H: StepHal> Dispatcher<'q, H> {
    pub fn new(hal: H, segments: SegmentConsumer<'q>, shared: &'q SharedState) -> Self {
        Dispatcher {
            hal,
            segments,
            shared,
            active: None,
            held: false,
        }
    }

    /// One completed dominant-axis pulse edge. The pulse interrupt's entire
    /// job is this call.
    pub fn on_pulse(&mut self) {
        let Some(active) = self.active.as_mut() else {
            // Spurious edge after a stop raced the generator disable.
            return;
        };
        let segment = &active.segment;
        let dominant = segment.dominant as usize;

        // The hardware pulse that got us here moved the dominant axis.
        let direction = step_delta(segment.direction_bits, dominant);
        self.shared.add_steps(dominant, direction);
        active.pulses_emitted += 1;

        // Subordinate axes: one Bresenham wrap per due step.
        for axis in 0..N_AXIS {
            if axis == dominant || segment.steps[axis] == 0 {
                continue;
            }
            active.counters[axis] += segment.steps[axis];
            if active.counters[axis] >= segment.step_event_count {
                active.counters[axis] -= segment.step_event_count;
                self.hal.step_pulse(Axis::from_index(axis));
                self.shared
                    .add_steps(axis, step_delta(segment.direction_bits, axis));
            }
        }

        if active.pulses_emitted == segment.n_step {
            self.hal.stop_pulses(Axis::from_index(dominant));
            self.active = None;
            self.advance();
        }
    }

    /// Activate the next queued segment, or go idle on underrun.
    fn advance(&mut self) {
        if self.held {
            return;
        }
        match self.segments.dequeue() {
            Some(segment) => self.activate(segment),
            None => self.shared.set_state(MachineState::Idle),
        }
    }

    fn activate(&mut self, segment: Segment) {
        let dominant = Axis::from_index(segment.dominant as usize);
        // Direction must be latched before the first pulse of the segment.
        for axis in Axis::ALL {
            self.hal
                .set_direction(axis, segment.direction_bits & (1 << axis.index()) != 0);
        }
        self.hal.set_period(dominant, segment.period);
        self.active = Some(ActiveSegment {
            counters: segment.counters,
            segment,
            pulses_emitted: 0,
        });
        self.shared.set_state(MachineState::Running);
        self.hal.start_pulses(dominant);
    }

    /// Begin execution if idle and a segment is queued. Returns `true` when
    /// a segment is (now) active. Called from the main context.
    pub fn start(&mut self) -> bool {
        if self.held {
            return false;
        }
        if self.active.is_some() {
            return true;
        }
        match self.segments.dequeue() {
            Some(segment) => {
                self.hal.set_enabled(true);
                self.activate(segment);
                true
            }
            None => false,
        }
    }

    /// Stop pulse generation, preserving the active segment and all
    /// buffers. Resumable.
    pub fn feed_hold(&mut self) {
        self.held = true;
        if let Some(active) = &self.active {
            self.hal
                .stop_pulses(Axis::from_index(active.segment.dominant as usize));
        }
        self.shared.set_state(MachineState::Hold);
    }

    /// Resume from a feed hold, mid-segment if one was interrupted.
    pub fn resume(&mut self) {
        if !self.held {
            return;
        }
        self.held = false;
        if let Some(active) = &self.active {
            let dominant = Axis::from_index(active.segment.dominant as usize);
            self.hal.set_period(dominant, active.segment.period);
            self.shared.set_state(MachineState::Running);
            self.hal.start_pulses(dominant);
        } else if !self.start() {
            self.shared.set_state(MachineState::Idle);
        }
    }

    /// Emergency stop: generators off, driver disabled, segment queue
    /// drained, state to alarm. The execution position keeps the pulses
    /// actually emitted; the caller must resynchronize the planner.
    pub fn emergency_stop(&mut self) {
        for axis in Axis::ALL {
            self.hal.stop_pulses(axis);
        }
        self.hal.set_enabled(false);
        self.active = None;
        self.held = false;
        while self.segments.dequeue().is_some() {}
        self.shared.set_state(MachineState::Alarm);
    }

    /// Stop and drain without raising an alarm. Used by the soft-reset
    /// path, which rebases the planner on the execution position.
    pub fn clear(&mut self) {
        for axis in Axis::ALL {
            self.hal.stop_pulses(axis);
        }
        self.active = None;
        self.held = false;
        while self.segments.dequeue().is_some() {}
    }

    /// No segment active (pulse generators quiet).
    pub fn is_idle(&self) -> bool {
        self.active.is_none()
    }

    /// Pulse period of the active segment, if any. Lets a simulated board
    /// schedule its next edge.
    pub fn active_period(&self) -> Option<u32> {
        self.active.as_ref().map(|a| a.segment.period)
    }

    pub fn hal_mut(&mut self) -> &mut H {
        &mut self.hal
    }
}

#[inline]
fn step_delta(direction_bits: u8, axis: usize) -> i32 {
    if direction_bits & (1 << axis) != 0 {
        -1
    } else {
        1
    }
}

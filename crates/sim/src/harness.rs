//! Virtual-clock simulation loop.
//!
//! Streams a toolpath into the controller exactly the way the G-code layer
//! would (retry on `BufferFull`, acknowledge-and-drop on `EmptyBlock`),
//! advances a virtual step-timer clock edge by edge, and delivers pulse
//! interrupts through the dispatcher cell. Limit switches are polled
//! between edges; a trip fires the emergency stop just as the outer
//! control loop would on hardware.

use core::cell::RefCell;

use anyhow::{bail, Result};
use critical_section::Mutex;
use driver_endstop::{Endstops, Polarity};
use grbl_settings::Settings;
use heapless::spsc::Queue;
use motion::{
    Dispatcher, DispatcherCell, LineData, MachineState, MotionController, PlanError, SegmentQueue,
    SharedState, N_AXIS,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::board::{SimBoard, SimInput};

/// Step-timer rate of the simulated board.
pub const TICK_HZ: u32 = 1_562_500;

/// Iteration ceiling; hitting it means the pipeline starved.
const MAX_ITERATIONS: u64 = 50_000_000;

/// One toolpath move: absolute target in machine millimeters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Move {
    pub target: [f32; N_AXIS],
    /// Feed rate (mm/min); ignored when `rapid` is set.
    pub feed: f32,
    pub rapid: bool,
}

impl Move {
    pub fn feed(target: [f32; N_AXIS], feed: f32) -> Move {
        Move {
            target,
            feed,
            rapid: false,
        }
    }

    pub fn rapid(target: [f32; N_AXIS]) -> Move {
        Move {
            target,
            feed: 0.0,
            rapid: true,
        }
    }
}

/// A segment-period change in the pulse stream.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TraceEntry {
    /// Virtual time of the change, in timer ticks.
    pub at_ticks: u64,
    /// New pulse period (ticks per dominant step).
    pub period: u32,
}

/// What a simulation run observed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimReport {
    pub final_state: MachineState,
    /// Execution position at the end of the run (steps).
    pub final_position: [i32; N_AXIS],
    /// Rising STEP edges counted at the driver pins, per axis.
    pub step_edges: [u32; N_AXIS],
    pub pulse_count: u64,
    pub duration_ticks: u64,
    pub duration_secs: f64,
    /// True when a limit trip fired the emergency stop mid-run.
    pub limit_tripped: bool,
    pub trace: Vec<TraceEntry>,
}

struct SimRig {
    controller: MotionController<'static, SimBoard>,
    dispatcher: &'static DispatcherCell<'static, SimBoard>,
    clock_ticks: u64,
    pulse_count: u64,
    last_period: u32,
    trace: Vec<TraceEntry>,
}

impl SimRig {
    fn new(settings: &Settings) -> SimRig {
        let config = settings.to_motion_config(TICK_HZ);
        let queue: &'static mut SegmentQueue = Box::leak(Box::new(Queue::new()));
        let (producer, consumer) = queue.split();
        let shared: &'static SharedState = Box::leak(Box::new(SharedState::new()));
        let dispatcher: &'static DispatcherCell<'static, SimBoard> = Box::leak(Box::new(
            Mutex::new(RefCell::new(Dispatcher::new(SimBoard::new(), consumer, shared))),
        ));
        let controller = MotionController::new(config, producer, shared, dispatcher);
        SimRig {
            controller,
            dispatcher,
            clock_ticks: 0,
            pulse_count: 0,
            last_period: 0,
            trace: Vec::new(),
        }
    }

    /// One pipeline step: a prep tick, then the next pulse edge if a
    /// generator is running. Returns whether an edge was delivered.
    fn step_once(&mut self) -> bool {
        self.controller.tick();
        let period = critical_section::with(|cs| {
            let mut dispatcher = self.dispatcher.borrow_ref_mut(cs);
            let Some((axis, period)) = dispatcher.hal_mut().running_generator() else {
                return None;
            };
            dispatcher.hal_mut().emit_edge(axis);
            dispatcher.on_pulse();
            Some(period)
        });
        let Some(period) = period else {
            return false;
        };
        self.clock_ticks += u64::from(period);
        self.pulse_count += 1;
        if period != self.last_period {
            self.trace.push(TraceEntry {
                at_ticks: self.clock_ticks,
                period,
            });
            self.last_period = period;
        }
        true
    }

    fn step_edges(&self) -> [u32; N_AXIS] {
        critical_section::with(|cs| {
            self.dispatcher
                .borrow_ref_mut(cs)
                .hal_mut()
                .step_edges()
        })
    }
}

/// Run a toolpath to completion on the simulated board.
///
/// `limit_trip_at_x_steps` arms a simulated X limit switch that closes once
/// the execution position reaches the given step count.
pub fn run(
    settings: &Settings,
    moves: &[Move],
    limit_trip_at_x_steps: Option<i32>,
) -> Result<SimReport> {
    let mut rig = SimRig::new(settings);

    // Normally-closed limit inputs: high means released.
    let limit_pins = [SimInput::new(), SimInput::new(), SimInput::new()];
    for pin in &limit_pins {
        pin.set_level(true);
    }
    let x_limit = limit_pins[0].clone();
    let mut endstops = Endstops::new(limit_pins, Polarity::ActiveLow);

    let mut iterations = 0u64;
    let mut limit_tripped = false;
    let mut pending = moves.iter();
    let mut current = pending.next();

    loop {
        iterations += 1;
        if iterations > MAX_ITERATIONS {
            bail!("pipeline starved after {iterations} iterations");
        }

        // Feed the next move when the planner will take it, the way the
        // line-acceptance layer withholds its ok on BufferFull.
        if let Some(mv) = current {
            let line = if mv.rapid {
                LineData::rapid()
            } else {
                LineData::feed(mv.feed)
            };
            match rig.controller.append(&mv.target, line) {
                Ok(()) => {
                    debug!(move_target = ?mv.target, "move accepted");
                    current = pending.next();
                }
                Err(PlanError::BufferFull) => {}
                Err(PlanError::EmptyBlock) => {
                    debug!(move_target = ?mv.target, "empty move dropped");
                    current = pending.next();
                }
                Err(e) => bail!("append failed: {e}"),
            }
        }

        let pulsed = rig.step_once();

        // Limit polling, as the outer control loop would between edges.
        if !limit_tripped {
            if let Some(trip_at) = limit_trip_at_x_steps {
                if rig.controller.status().machine_position[0] >= trip_at {
                    x_limit.set_level(false);
                }
            }
            if endstops.any_triggered().unwrap_or(false) {
                warn!("limit switch tripped, firing emergency stop");
                rig.controller.emergency_stop();
                limit_tripped = true;
                current = None;
            }
        }

        let status = rig.controller.status();
        let drained = current.is_none() && status.buffered_blocks == 0;
        let stopped = matches!(status.state, MachineState::Idle | MachineState::Alarm);
        if !pulsed && drained && stopped {
            break;
        }
    }

    let status = rig.controller.status();
    let report = SimReport {
        final_state: status.state,
        final_position: status.machine_position,
        step_edges: rig.step_edges(),
        pulse_count: rig.pulse_count,
        duration_ticks: rig.clock_ticks,
        duration_secs: rig.clock_ticks as f64 / f64::from(TICK_HZ),
        limit_tripped,
        trace: rig.trace,
    };
    info!(
        state = ?report.final_state,
        position = ?report.final_position,
        pulses = report.pulse_count,
        secs = report.duration_secs,
        "simulation complete"
    );
    Ok(report)
}

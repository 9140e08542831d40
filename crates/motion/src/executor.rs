//! Trapezoidal segment executor.
//!
//! Transforms the block at the planner's tail into a stream of short
//! constant-velocity segments whose per-step periods, executed in order,
//! trace a trapezoid from the block's entry speed through its nominal
//! speed down to the exit speed (the successor's entry speed, or rest).
//!
//! One call to [`SegmentPrep::tick`] does a strictly bounded amount of
//! work: it generates at most one segment. The tick runs in the main loop
//! (or any context below the pulse interrupt) and owns the producer side
//! of the segment queue.
//!
//! The planner works in mm/min; this module converts to mm/sec and mm/sec²
//! at the adoption boundary and never hands the units back.

use crate::math::{roundf, sqrtf};
use crate::planner::Planner;
use crate::segment::{Segment, SegmentProducer};
use crate::state::SharedState;
use crate::N_AXIS;

/// Nominal segment length (mm). Blocks shorter than this become a single
/// segment; the last segment of a block absorbs the remainder.
pub const SEGMENT_LENGTH_MM: f32 = 2.0;

const MM_PER_MIN_TO_MM_PER_SEC: f32 = 1.0 / 60.0;
const MM_MIN2_TO_MM_SEC2: f32 = 1.0 / 3600.0;

/// Distance slop treated as "end of block" when slicing segments (mm).
const BLOCK_END_EPSILON_MM: f32 = 1e-6;

/// Milestone comparison slop (mm); keeps a segment from straddling two
/// profile phases because of float dust at the boundary.
const PHASE_EPSILON_MM: f32 = 1e-9;

/// Snapshot of the block being executed, with the trapezoid already solved.
/// All speeds in mm/sec, acceleration in mm/sec², distances in mm.
#[derive(Debug, Clone, Copy)]
struct PrepBlock {
    steps: [u32; N_AXIS],
    direction_bits: u8,
    step_event_count: u32,
    dominant: u8,
    millimeters: f32,
    nominal_speed: f32,
    exit_speed: f32,
    acceleration: f32,
    /// Distance from block start where acceleration ends.
    accelerate_until: f32,
    /// Distance from block start where deceleration begins.
    decelerate_after: f32,
    /// Dominant steps per millimeter of path.
    steps_per_mm_path: f32,
}

/// The segment prep state machine.
pub struct SegmentPrep {
    active: Option<PrepBlock>,
    /// Cursor along the active block (mm).
    mm_complete: f32,
    /// Speed at the cursor (mm/sec). Carried across blocks so the pulse
    /// stream stays continuous even when a snapshot went stale.
    current_speed: f32,
    /// Dominant steps already emitted for the active block.
    steps_done: u32,
    /// Bresenham accumulators carried across segments of the block.
    counters: [u32; N_AXIS],
}

impl SegmentPrep {
    pub const fn new() -> Self {
        SegmentPrep {
            active: None,
            mm_complete: 0.0,
            current_speed: 0.0,
            steps_done: 0,
            counters: [0; N_AXIS],
        }
    }

    /// True while a block is checked out and partially sliced.
    pub fn is_busy(&self) -> bool {
        self.active.is_some()
    }

    /// Drop all prep state. Used by the reset and emergency-stop paths; the
    /// planner's ring is cleared separately.
    pub fn reset(&mut self) {
        self.active = None;
        self.mm_complete = 0.0;
        self.current_speed = 0.0;
        self.steps_done = 0;
        self.counters = [0; N_AXIS];
    }

    /// Generate at most one segment. Returns `true` when the cursor moved
    /// (a segment was enqueued, a sub-step slice was absorbed, or a block
    /// was adopted or retired); `false` when there is nothing to do or the
    /// segment queue is full.
    pub fn tick(
        &mut self,
        planner: &mut Planner,
        out: &mut SegmentProducer<'_>,
        shared: &SharedState,
    ) -> bool {
        if self.active.is_none() && !self.adopt(planner, shared) {
            return false;
        }
        if !out.ready() {
            return false;
        }

        let Some(block) = self.active else {
            return false;
        };
        let remaining = block.millimeters - self.mm_complete;

        // Slice length: the nominal segment length, capped by the distance
        // left and by the next profile milestone so a segment never spans
        // two phases.
        let mut ds = SEGMENT_LENGTH_MM.min(remaining);
        if self.mm_complete + PHASE_EPSILON_MM < block.accelerate_until {
            ds = ds.min(block.accelerate_until - self.mm_complete);
        } else if self.mm_complete + PHASE_EPSILON_MM < block.decelerate_after {
            ds = ds.min(block.decelerate_after - self.mm_complete);
        }

        // Speed at the end of the slice, by phase.
        let v0 = self.current_speed;
        let a = block.acceleration;
        let v1 = if self.mm_complete + PHASE_EPSILON_MM < block.accelerate_until {
            sqrtf((v0 * v0 + 2.0 * a * ds).max(0.0)).min(block.nominal_speed)
        } else if self.mm_complete + PHASE_EPSILON_MM < block.decelerate_after {
            // Cruise.
            v0
        } else {
            sqrtf((v0 * v0 - 2.0 * a * ds).max(0.0)).max(block.exit_speed)
        };
        let cruise_speed = 0.5 * (v0 + v1);

        let next_mm = self.mm_complete + ds;
        let last = next_mm >= block.millimeters - BLOCK_END_EPSILON_MM;

        // Dominant step count by cumulative rounding; the final slice is
        // forced to the block total so the sum is exact.
        let target_steps = if last {
            block.step_event_count
        } else {
            (roundf(next_mm * block.steps_per_mm_path) as u32).min(block.step_event_count)
        };
        let n_step = target_steps.saturating_sub(self.steps_done);

        if n_step == 0 {
            // A sub-step slice: advance the cursor and let the next tick
            // fold the distance into a following segment.
            self.mm_complete = next_mm;
            self.current_speed = v1;
            if last {
                self.finish_block(planner);
            }
            return true;
        }

        let config = planner.config();
        let period = period_for(
            cruise_speed * block.steps_per_mm_path,
            config.tick_hz,
            config.min_period_ticks(),
            config.max_period_ticks(),
        );

        let segment = Segment {
            n_step,
            period,
            direction_bits: block.direction_bits,
            dominant: block.dominant,
            steps: block.steps,
            step_event_count: block.step_event_count,
            counters: self.counters,
        };
        if out.enqueue(segment).is_err() {
            return false;
        }

        // Carry the Bresenham accumulators over the slice. After n dominant
        // steps each accumulator is congruent to seed + n·steps mod the
        // event count, with one subordinate step emitted per wrap, so the
        // per-axis totals close exactly at the block boundary.
        for i in 0..N_AXIS {
            let advanced =
                self.counters[i] as u64 + u64::from(n_step) * u64::from(block.steps[i]);
            self.counters[i] = (advanced % u64::from(block.step_event_count)) as u32;
        }

        self.steps_done = target_steps;
        self.mm_complete = next_mm;
        self.current_speed = v1;
        shared.set_current_rate(cruise_speed * 60.0);

        if last {
            self.finish_block(planner);
        }
        true
    }

    fn finish_block(&mut self, planner: &mut Planner) {
        planner.discard_current_block();
        self.active = None;
        self.mm_complete = 0.0;
        self.steps_done = 0;
        self.counters = [0; N_AXIS];
        // current_speed carries into the next block as its entry speed.
    }

    /// Check the tail block out of the planner and solve its trapezoid.
    fn adopt(&mut self, planner: &mut Planner, shared: &SharedState) -> bool {
        let exit_speed_sqr = planner.next_block_entry_speed_sqr().unwrap_or(0.0);
        let min_feed_rate = planner.config().min_feed_rate;
        let override_pct = shared.feed_override();

        let Some(block) = planner.get_current_block() else {
            return false;
        };

        let nominal = block.nominal_speed(override_pct, min_feed_rate) * MM_PER_MIN_TO_MM_PER_SEC;
        let acceleration = block.acceleration * MM_MIN2_TO_MM_SEC2;
        let millimeters = block.millimeters;

        // Entry is the speed actually carried out of the previous block
        // (zero from idle), never the planned figure: a stale exit snapshot
        // may have under-shot the planned entry, and continuity wins.
        let entry = self.current_speed.min(nominal);
        let mut exit = (sqrtf(exit_speed_sqr) * MM_PER_MIN_TO_MM_PER_SEC).min(nominal);
        // The exit must also be reachable from this entry within the block.
        let exit_cap_sqr = entry * entry + 2.0 * acceleration * millimeters;
        if exit * exit > exit_cap_sqr {
            exit = sqrtf(exit_cap_sqr);
        }

        let accel_distance =
            (nominal * nominal - entry * entry) / (2.0 * acceleration);
        let decel_distance = (nominal * nominal - exit * exit) / (2.0 * acceleration);
        let (accelerate_until, decelerate_after) =
            if accel_distance + decel_distance > millimeters {
                // Too short to cruise: accelerate to the triangle peak,
                // then straight into deceleration.
                let peak_sqr =
                    0.5 * (2.0 * acceleration * millimeters + entry * entry + exit * exit);
                let up =
                    ((peak_sqr - entry * entry) / (2.0 * acceleration)).clamp(0.0, millimeters);
                (up, up)
            } else {
                (accel_distance, millimeters - decel_distance)
            };

        let dominant = block
            .steps
            .iter()
            .position(|&s| s == block.step_event_count)
            .unwrap_or(0) as u8;

        self.active = Some(PrepBlock {
            steps: block.steps,
            direction_bits: block.direction_bits,
            step_event_count: block.step_event_count,
            dominant,
            millimeters,
            nominal_speed: nominal,
            exit_speed: exit,
            acceleration,
            accelerate_until,
            decelerate_after,
            steps_per_mm_path: block.step_event_count as f32 / millimeters,
        });
        self.mm_complete = 0.0;
        self.steps_done = 0;
        // Canonical midpoint seed: subordinate steps spread evenly from the
        // first half-step on.
        self.counters = [block.step_event_count >> 1; N_AXIS];
        self.current_speed = entry;
        true
    }
}

impl Default for SegmentPrep {
    fn default() -> Self {
        Self::new()
    }
}

/// Pulse period for a step rate, clamped to the timer's representable
/// range. Too fast pins the period at the minimum (capping the rate); too
/// slow pins it at the maximum (the rate floor). Neither case surfaces as
/// an error.
fn period_for(step_rate_hz: f32, tick_hz: u32, min_ticks: u32, max_ticks: u32) -> u32 {
    if step_rate_hz <= 0.0 {
        return max_ticks;
    }
    let period = roundf(tick_hz as f32 / step_rate_hz);
    // `as` saturates, so an overlarge period lands on the max clamp.
    (period as u32).clamp(min_ticks, max_ticks)
}

//! Look-ahead velocity planner.
//!
//! A fixed ring of decorated linear moves ("blocks"). On every append the
//! planner computes block geometry (step counts, unit vector, axis-limited
//! acceleration and rapid rate), the junction-deviation-limited corner speed
//! against the previous move, and then re-settles entry speeds across the
//! unplanned tail of the ring with a reverse pass followed by a forward
//! pass, so that every block boundary speed is reachable under the
//! acceleration limit of the block that crosses it.
//!
//! Velocities are stored squared, in (mm/min)². That is the contract of the
//! planning fields, not an afterthought: the passes are pure add/compare
//! chains and the single square root is deferred to the executor, the only
//! consumer of actual speeds.
//!
//! ## Ring ownership
//!
//! `head` and `planned` are written by the main context only; `tail` only
//! advances through [`Planner::discard_current_block`], called by the
//! executor's prep tick. Blocks in `[tail, planned)` are frozen: the
//! recalculation passes never touch them, which is what makes it safe for
//! the executor to consume the tail without locking. Handing the tail block
//! to the executor ([`Planner::get_current_block`]) commits its entry speed
//! and bumps `planned` past it.

use bitflags::bitflags;

use crate::config::MotionConfig;
use crate::errors::PlanError;
use crate::math::{fabsf, roundf, sqrtf};
use crate::N_AXIS;

/// Capacity of the block ring. Must be a power of two; one slot is kept
/// open to distinguish full from empty.
pub const BLOCK_BUFFER_SIZE: usize = 16;

const INDEX_MASK: usize = BLOCK_BUFFER_SIZE - 1;

/// Direction cosines below this are treated as "axis does not participate"
/// when computing axis-limited acceleration and rapid rate.
const UNIT_VEC_EPSILON: f32 = 1e-8;

bitflags! {
    /// Per-block condition flags carried from the parsed line.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Condition: u8 {
        /// G0 motion: the programmed feed rate is ignored and the
        /// axis-limited rapid rate is used instead.
        const RAPID = 1 << 0;
        /// Internal motion (pull-off and similar) that bypasses junction
        /// planning and does not update the previous-move vector.
        const SYSTEM_MOTION = 1 << 1;
        /// The feed override scalar must not be applied to this block.
        const NO_FEED_OVERRIDE = 1 << 2;
        /// Spindle on, clockwise.
        const SPINDLE_CW = 1 << 3;
        /// Spindle on, counter-clockwise.
        const SPINDLE_CCW = 1 << 4;
        /// Flood coolant on.
        const COOLANT_FLOOD = 1 << 5;
        /// Mist coolant on.
        const COOLANT_MIST = 1 << 6;
    }
}

/// Feed and modal state attached to one parsed linear move.
#[derive(Debug, Clone, Copy)]
pub struct LineData {
    /// Programmed feed rate (mm/min). Ignored for rapid moves.
    pub feed_rate: f32,
    pub condition: Condition,
    /// Programmed spindle speed, carried through for status reporting.
    pub spindle_speed: f32,
}

impl LineData {
    /// A feed move at the given rate with spindle and coolant off.
    pub fn feed(feed_rate: f32) -> Self {
        LineData {
            feed_rate,
            condition: Condition::empty(),
            spindle_speed: 0.0,
        }
    }

    /// A rapid (G0) move.
    pub fn rapid() -> Self {
        LineData {
            feed_rate: 0.0,
            condition: Condition::RAPID,
            spindle_speed: 0.0,
        }
    }
}

/// One linear move, decorated for execution.
#[derive(Debug, Clone, Copy)]
pub struct Block {
    /// Absolute step count per axis.
    pub steps: [u32; N_AXIS],
    /// Bit set = the axis moves in the negative direction.
    pub direction_bits: u8,
    /// Step count of the dominant axis; the Bresenham tick count for the
    /// whole block.
    pub step_event_count: u32,
    /// Euclidean length of the move (mm). Always positive.
    pub millimeters: f32,
    /// Unit vector of the move in machine space.
    pub unit_vec: [f32; N_AXIS],
    /// Planned entry speed squared ((mm/min)²). Settled by recalculation.
    pub entry_speed_sqr: f32,
    /// Upper bound on the entry speed, from junction geometry and the
    /// nominal speeds of this block and its predecessor.
    pub max_entry_speed_sqr: f32,
    /// Junction-deviation-limited corner speed against the previous block.
    pub max_junction_speed_sqr: f32,
    /// Axis-limited acceleration for this direction (mm/min²).
    pub acceleration: f32,
    /// Axis-limited maximum rate for this direction (mm/min).
    pub rapid_rate: f32,
    /// The feed rate the line asked for, or the rapid rate for G0 (mm/min).
    pub programmed_rate: f32,
    pub spindle_speed: f32,
    pub condition: Condition,
}

impl Block {
    const fn zeroed() -> Block {
        Block {
            steps: [0; N_AXIS],
            direction_bits: 0,
            step_event_count: 0,
            millimeters: 0.0,
            unit_vec: [0.0; N_AXIS],
            entry_speed_sqr: 0.0,
            max_entry_speed_sqr: 0.0,
            max_junction_speed_sqr: 0.0,
            acceleration: 0.0,
            rapid_rate: 0.0,
            programmed_rate: 0.0,
            spindle_speed: 0.0,
            condition: Condition::empty(),
        }
    }

    /// Cruise-speed ceiling for this block with the feed override applied
    /// (mm/min). The override never touches rapids or no-override blocks,
    /// never raises a block above its axis-limited rapid rate, and never
    /// drops a feed below the configured minimum.
    pub fn nominal_speed(&self, override_pct: u16, min_feed_rate: f32) -> f32 {
        let mut speed = self.programmed_rate;
        if !self
            .condition
            .intersects(Condition::RAPID | Condition::NO_FEED_OVERRIDE)
        {
            speed *= f32::from(override_pct) * 0.01;
        }
        if speed > self.rapid_rate {
            speed = self.rapid_rate;
        }
        if speed < min_feed_rate {
            min_feed_rate
        } else {
            speed
        }
    }
}

/// The look-ahead planner: block ring, planner position, and the
/// previous-move vector used for junction geometry.
pub struct Planner {
    config: MotionConfig,
    blocks: [Block; BLOCK_BUFFER_SIZE],
    /// Next slot to write.
    head: usize,
    /// Next block to execute.
    tail: usize,
    /// First ring index whose entry speed could still improve.
    planned: usize,
    /// Where the machine will be once every buffered block has run (steps).
    position: [i32; N_AXIS],
    previous_unit_vec: [f32; N_AXIS],
    /// Nominal speed of the previously appended block (mm/min). Zero means
    /// there is no usable previous move and the next block enters from rest.
    previous_nominal_speed: f32,
    /// Set when an alarm invalidated `position`; appends are rejected until
    /// the caller resynchronizes.
    unsynced: bool,
    /// The tail block has been handed to the executor and must not be
    /// re-planned.
    tail_checked_out: bool,
}

impl Planner {
    pub fn new(config: MotionConfig) -> Self {
        Planner {
            config,
            blocks: [Block::zeroed(); BLOCK_BUFFER_SIZE],
            head: 0,
            tail: 0,
            planned: 0,
            position: [0; N_AXIS],
            previous_unit_vec: [0.0; N_AXIS],
            previous_nominal_speed: 0.0,
            unsynced: false,
            tail_checked_out: false,
        }
    }

    #[inline]
    fn next_index(index: usize) -> usize {
        (index + 1) & INDEX_MASK
    }

    #[inline]
    fn prev_index(index: usize) -> usize {
        (index + BLOCK_BUFFER_SIZE - 1) & INDEX_MASK
    }

    pub fn config(&self) -> &MotionConfig {
        &self.config
    }

    pub fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    pub fn is_full(&self) -> bool {
        Self::next_index(self.head) == self.tail
    }

    /// Number of blocks currently buffered.
    pub fn block_count(&self) -> usize {
        (self.head + BLOCK_BUFFER_SIZE - self.tail) & INDEX_MASK
    }

    /// Free block slots before [`append`](Self::append) reports
    /// [`PlanError::BufferFull`].
    pub fn available_slots(&self) -> usize {
        BLOCK_BUFFER_SIZE - 1 - self.block_count()
    }

    /// Where the machine will be after all buffered blocks complete (steps).
    pub fn position(&self) -> [i32; N_AXIS] {
        self.position
    }

    /// True when an alarm has invalidated the planner position.
    pub fn needs_sync(&self) -> bool {
        self.unsynced
    }

    /// Buffered blocks in execution order, for diagnostics and tests.
    pub fn blocks(&self) -> impl Iterator<Item = &Block> + '_ {
        let mut index = self.tail;
        let head = self.head;
        core::iter::from_fn(move || {
            if index == head {
                return None;
            }
            let block = &self.blocks[index];
            index = Self::next_index(index);
            Some(block)
        })
    }

    /// Append one linear move to the ring and re-settle entry speeds.
    ///
    /// `target_mm` is the absolute target in machine millimeters. Returns
    /// [`PlanError::BufferFull`] (transient; retry), [`PlanError::EmptyBlock`]
    /// (permanent; the move rounds to zero steps or carried non-finite
    /// values), or [`PlanError::PositionUnsynced`] after an alarm.
    pub fn append(&mut self, target_mm: &[f32; N_AXIS], line: LineData) -> Result<(), PlanError> {
        if self.unsynced {
            return Err(PlanError::PositionUnsynced);
        }
        if self.is_full() {
            return Err(PlanError::BufferFull);
        }

        // Target in steps. Non-finite input must not reach the float
        // pipeline below, so it is filtered here and reported as an empty
        // block, which the caller acknowledges and discards.
        let mut target_steps = [0i32; N_AXIS];
        let mut steps = [0u32; N_AXIS];
        let mut delta_mm = [0.0f32; N_AXIS];
        let mut direction_bits = 0u8;
        let mut step_event_count = 0u32;
        let mut distance_sqr = 0.0f32;

        for i in 0..N_AXIS {
            let scaled = target_mm[i] * self.config.axes[i].steps_per_mm;
            if !scaled.is_finite() {
                return Err(PlanError::EmptyBlock);
            }
            target_steps[i] = roundf(scaled) as i32;
            let delta_steps = target_steps[i] - self.position[i];
            steps[i] = delta_steps.unsigned_abs();
            if delta_steps < 0 {
                direction_bits |= 1 << i;
            }
            step_event_count = step_event_count.max(steps[i]);
            delta_mm[i] = delta_steps as f32 / self.config.axes[i].steps_per_mm;
            distance_sqr += delta_mm[i] * delta_mm[i];
        }

        if step_event_count == 0 {
            return Err(PlanError::EmptyBlock);
        }

        let millimeters = sqrtf(distance_sqr);
        let inverse_millimeters = 1.0 / millimeters;

        // Unit vector and, from it, the largest path acceleration and rapid
        // rate that keep every participating axis inside its own limit: the
        // per-axis limit divided by the direction cosine.
        let mut unit_vec = [0.0f32; N_AXIS];
        let mut acceleration = f32::MAX;
        let mut rapid_rate = f32::MAX;
        for i in 0..N_AXIS {
            unit_vec[i] = delta_mm[i] * inverse_millimeters;
            let cosine = fabsf(unit_vec[i]);
            if cosine > UNIT_VEC_EPSILON {
                acceleration = acceleration.min(self.config.axes[i].max_accel / cosine);
                rapid_rate = rapid_rate.min(self.config.axes[i].max_rate / cosine);
            }
        }

        let programmed_rate = if line.condition.contains(Condition::RAPID) {
            rapid_rate
        } else {
            if !line.feed_rate.is_finite() {
                return Err(PlanError::EmptyBlock);
            }
            line.feed_rate.max(self.config.min_feed_rate)
        };

        // Junction-deviation-limited corner speed against the previous move.
        // The negated dot product measures the exterior angle: +1 is a full
        // reversal, -1 a straight continuation.
        let min_junction_sqr = self.config.min_junction_speed * self.config.min_junction_speed;
        let max_junction_speed_sqr = if line.condition.contains(Condition::SYSTEM_MOTION)
            || self.previous_nominal_speed <= 0.0
        {
            // First move of a sequence, or an internal motion: enter from
            // (near) rest.
            min_junction_sqr
        } else {
            let mut cos_theta = 0.0;
            for i in 0..N_AXIS {
                cos_theta -= self.previous_unit_vec[i] * unit_vec[i];
            }
            if cos_theta > 0.999999 {
                // Full reversal; the machine must all but stop.
                min_junction_sqr
            } else if cos_theta < -0.999999 {
                // Collinear; the junction imposes no limit.
                f32::MAX
            } else {
                let sin_theta_d2 = sqrtf(0.5 * (1.0 - cos_theta));
                min_junction_sqr.max(
                    acceleration * self.config.junction_deviation * sin_theta_d2
                        / (1.0 - sin_theta_d2),
                )
            }
        };

        let nominal_speed = programmed_rate
            .min(rapid_rate)
            .max(self.config.min_feed_rate);
        let mut max_entry_speed_sqr = max_junction_speed_sqr.min(nominal_speed * nominal_speed);
        if !line.condition.contains(Condition::SYSTEM_MOTION) && self.previous_nominal_speed > 0.0
        {
            max_entry_speed_sqr =
                max_entry_speed_sqr.min(self.previous_nominal_speed * self.previous_nominal_speed);
        }

        // Provisional entry: the newest block always plans to end at rest,
        // so its entry cannot exceed a full deceleration over its length.
        // The recalculation passes refine this as successors arrive.
        let entry_speed_sqr = max_entry_speed_sqr.min(2.0 * acceleration * millimeters);

        self.blocks[self.head] = Block {
            steps,
            direction_bits,
            step_event_count,
            millimeters,
            unit_vec,
            entry_speed_sqr,
            max_entry_speed_sqr,
            max_junction_speed_sqr,
            acceleration,
            rapid_rate,
            programmed_rate,
            spindle_speed: line.spindle_speed,
            condition: line.condition,
        };
        self.head = Self::next_index(self.head);

        self.position = target_steps;
        if !line.condition.contains(Condition::SYSTEM_MOTION) {
            self.previous_unit_vec = unit_vec;
            self.previous_nominal_speed = nominal_speed;
        }

        self.recalculate();
        Ok(())
    }

    /// Settle entry speeds over the unplanned window `[planned, head)`.
    ///
    /// Reverse pass: walking from the newest block back, cap every entry so
    /// the block can still shed speed down to its successor's entry within
    /// its own length. Forward pass: walking from `planned` out, cap every
    /// entry to what the predecessor can actually reach, and advance
    /// `planned` past blocks whose entry can no longer improve.
    fn recalculate(&mut self) {
        let newest = Self::prev_index(self.head);
        if newest == self.planned {
            // A single unplanned block; its provisional entry is already
            // the settled value.
            return;
        }

        // The move chain always ends at rest.
        {
            let block = &mut self.blocks[newest];
            block.entry_speed_sqr = block
                .max_entry_speed_sqr
                .min(2.0 * block.acceleration * block.millimeters);
        }

        let mut next_index = newest;
        let mut index = Self::prev_index(newest);
        while index != self.planned {
            let next_entry = self.blocks[next_index].entry_speed_sqr;
            let block = &mut self.blocks[index];
            // A block already at its ceiling cannot improve.
            if block.entry_speed_sqr != block.max_entry_speed_sqr {
                block.entry_speed_sqr = block
                    .max_entry_speed_sqr
                    .min(next_entry + 2.0 * block.acceleration * block.millimeters);
            }
            next_index = index;
            index = Self::prev_index(index);
        }

        // Forward pass.
        let mut index = self.planned;
        let mut next_index = Self::next_index(index);
        while next_index != self.head {
            let (entry, acceleration, millimeters) = {
                let block = &self.blocks[index];
                (block.entry_speed_sqr, block.acceleration, block.millimeters)
            };
            let next = &mut self.blocks[next_index];
            // If the predecessor accelerates through its whole length and
            // still cannot reach the successor's entry, lower the entry and
            // freeze everything behind it: nothing that arrives later can
            // raise a fully-accelerated boundary.
            if entry < next.entry_speed_sqr {
                let reachable = entry + 2.0 * acceleration * millimeters;
                if reachable < next.entry_speed_sqr {
                    next.entry_speed_sqr = reachable;
                    self.planned = next_index;
                }
            }
            // A boundary at its geometric ceiling is equally final.
            if next.entry_speed_sqr == next.max_entry_speed_sqr {
                self.planned = next_index;
            }
            index = next_index;
            next_index = Self::next_index(next_index);
        }
    }

    /// Hand the tail block to the executor.
    ///
    /// The first call for a given block commits its entry speed: `planned`
    /// is bumped past it so recalculation can never rewrite a block that is
    /// being executed.
    pub fn get_current_block(&mut self) -> Option<&Block> {
        if self.is_empty() {
            return None;
        }
        if !self.tail_checked_out {
            self.tail_checked_out = true;
            if self.planned == self.tail {
                self.planned = Self::next_index(self.tail);
            }
        }
        Some(&self.blocks[self.tail])
    }

    /// The tail block without checking it out, for status reporting.
    pub fn current_block(&self) -> Option<&Block> {
        if self.is_empty() {
            None
        } else {
            Some(&self.blocks[self.tail])
        }
    }

    /// Entry speed squared of the block after the tail, if one is buffered.
    /// This is the exit speed the executor must plan the tail block down to.
    pub fn next_block_entry_speed_sqr(&self) -> Option<f32> {
        if self.is_empty() {
            return None;
        }
        let next = Self::next_index(self.tail);
        if next == self.head {
            None
        } else {
            Some(self.blocks[next].entry_speed_sqr)
        }
    }

    /// Retire the tail block. Called by the executor when the last segment
    /// of the block has been generated.
    pub fn discard_current_block(&mut self) {
        if self.is_empty() {
            return;
        }
        let old_tail = self.tail;
        self.tail = Self::next_index(self.tail);
        self.tail_checked_out = false;
        if self.planned == old_tail {
            self.planned = self.tail;
        }
    }

    /// Reset the planner position after homing or a coordinate set (G92).
    /// Clears the resync requirement after an alarm.
    pub fn sync_position(&mut self, steps: [i32; N_AXIS]) {
        self.position = steps;
        self.previous_unit_vec = [0.0; N_AXIS];
        self.previous_nominal_speed = 0.0;
        self.unsynced = false;
    }

    /// Drop all buffered blocks and rebase the planner position. Used by the
    /// soft-reset path, which resynchronizes from the execution position.
    pub fn reset_from(&mut self, steps: [i32; N_AXIS]) {
        self.clear();
        self.sync_position(steps);
    }

    /// Drop all buffered blocks and mark the position stale. Used by the
    /// emergency-stop path; the next append is rejected until the caller
    /// calls [`sync_position`](Self::sync_position).
    pub fn clear_for_alarm(&mut self) {
        self.clear();
        self.unsynced = true;
    }

    fn clear(&mut self) {
        self.head = 0;
        self.tail = 0;
        self.planned = 0;
        self.tail_checked_out = false;
        self.previous_unit_vec = [0.0; N_AXIS];
        self.previous_nominal_speed = 0.0;
    }
}

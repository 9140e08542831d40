//! Ready-to-execute segments and the ISR-shared segment queue.
//!
//! Segments are created by the executor's prep tick, never mutated after
//! enqueue, and destroyed when the dispatcher retires them. The queue is a
//! `heapless` single-producer single-consumer ring: index handoff uses
//! acquire/release ordering, which is the whole synchronization story
//! between the prep context and the pulse interrupt.

use heapless::spsc::{Consumer, Producer, Queue};

use crate::N_AXIS;

/// Segment queue length. `heapless` keeps one slot open, so this holds five
/// segments in flight: enough to ride out a late prep tick at full step
/// rate without starving the dispatcher.
pub const SEGMENT_QUEUE_LEN: usize = 6;

pub type SegmentQueue = Queue<Segment, SEGMENT_QUEUE_LEN>;
pub type SegmentProducer<'a> = Producer<'a, Segment, SEGMENT_QUEUE_LEN>;
pub type SegmentConsumer<'a> = Consumer<'a, Segment, SEGMENT_QUEUE_LEN>;

/// A short constant-velocity slice of one block.
///
/// The dominant axis is pulsed `n_step` times at `period` ticks per pulse.
/// Subordinate axes are distributed off the dominant pulse count with the
/// block-level Bresenham state: `counters` seeds the per-axis error
/// accumulators at segment entry, `steps` are the numerators, and
/// `step_event_count` is the shared denominator. The executor carries the
/// counters across segments of a block, so per-axis step totals are exact
/// by integer arithmetic alone.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt-support", derive(defmt::Format))]
pub struct Segment {
    /// Dominant-axis steps in this segment.
    pub n_step: u32,
    /// Pulse period for the dominant axis, in timer ticks. Always within
    /// the timer's representable range; prep clamps before enqueue.
    pub period: u32,
    /// Bit set = axis moves negative. Latched to hardware before the first
    /// pulse of the segment.
    pub direction_bits: u8,
    /// Index of the dominant axis.
    pub dominant: u8,
    /// Block step counts per axis: the Bresenham numerators.
    pub steps: [u32; N_AXIS],
    /// Block dominant step count: the Bresenham denominator.
    pub step_event_count: u32,
    /// Bresenham accumulator values at segment entry, one per axis.
    pub counters: [u32; N_AXIS],
}

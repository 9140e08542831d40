//! Segment executor tests.
//!
//! Drives the prep tick against a real planner and walks the produced
//! segment stream with a reference Bresenham loop, checking step-total
//! exactness and the shape of the trapezoidal period profile.

use heapless::spsc::Queue;
use motion::{
    AxisConfig, LineData, MotionConfig, Planner, Segment, SegmentPrep, SegmentQueue, SharedState,
    N_AXIS,
};

fn config(max_accel: f32) -> MotionConfig {
    MotionConfig {
        axes: [AxisConfig {
            steps_per_mm: 80.0,
            max_rate: 1200.0,
            max_accel,
            max_travel: 300.0,
        }; N_AXIS],
        junction_deviation: 0.01,
        min_feed_rate: 1.0,
        min_junction_speed: 0.0,
        tick_hz: 1_562_500,
        pulse_width_ticks: 40,
    }
}

/// Run prep to exhaustion and collect every produced segment.
fn drain_segments(planner: &mut Planner, prep: &mut SegmentPrep) -> Vec<Segment> {
    let shared = SharedState::new();
    let queue: &'static mut SegmentQueue = Box::leak(Box::new(Queue::new()));
    let (mut producer, mut consumer) = queue.split();

    let mut segments = Vec::new();
    loop {
        let progressed = prep.tick(planner, &mut producer, &shared);
        while let Some(segment) = consumer.dequeue() {
            segments.push(segment);
        }
        if !progressed && planner.is_empty() && !prep.is_busy() {
            break;
        }
    }
    segments
}

/// Reference dispatcher: replay the segment stream through the Bresenham
/// recurrence and count emitted steps per axis.
fn replay(segments: &[Segment]) -> [u32; N_AXIS] {
    let mut emitted = [0u32; N_AXIS];
    for segment in segments {
        let mut counters = segment.counters;
        for _ in 0..segment.n_step {
            emitted[segment.dominant as usize] += 1;
            for axis in 0..N_AXIS {
                if axis == segment.dominant as usize || segment.steps[axis] == 0 {
                    continue;
                }
                counters[axis] += segment.steps[axis];
                if counters[axis] >= segment.step_event_count {
                    counters[axis] -= segment.step_event_count;
                    emitted[axis] += 1;
                }
            }
        }
    }
    emitted
}

#[test]
fn step_totals_are_exact_across_segments() {
    let mut planner = Planner::new(config(500.0));
    let mut prep = SegmentPrep::new();
    planner
        .append(&[10.0, 7.3, 3.1], LineData::feed(600.0))
        .unwrap();
    let expected = planner.current_block().unwrap().steps;
    assert_eq!(expected, [800, 584, 248]);

    let segments = drain_segments(&mut planner, &mut prep);

    let dominant_total: u32 = segments.iter().map(|s| s.n_step).sum();
    assert_eq!(dominant_total, 800);
    assert_eq!(replay(&segments), expected);
    assert!(planner.is_empty());
}

#[test]
fn step_totals_survive_a_block_chain() {
    let mut planner = Planner::new(config(60_000.0));
    let mut prep = SegmentPrep::new();

    // A zigzag whose per-block deltas are known exactly.
    let waypoints: [[f32; N_AXIS]; 4] = [
        [5.0, 1.0, 0.0],
        [5.0, 9.0, 0.5],
        [-3.2, 9.0, 0.5],
        [0.0, 0.0, 0.0],
    ];
    let mut expected = [0i64; N_AXIS];
    let mut previous = [0i32; N_AXIS];
    for target in &waypoints {
        planner.append(target, LineData::feed(900.0)).unwrap();
        for axis in 0..N_AXIS {
            let steps = (target[axis] * 80.0).round() as i32;
            expected[axis] += i64::from((steps - previous[axis]).abs());
            previous[axis] = steps;
        }
    }

    let segments = drain_segments(&mut planner, &mut prep);
    let emitted = replay(&segments);
    for axis in 0..N_AXIS {
        assert_eq!(i64::from(emitted[axis]), expected[axis], "axis {axis}");
    }
}

#[test]
fn periods_trace_a_trapezoid() {
    // 600 mm/min at 60000 mm/min² gives 3 mm of acceleration: a 20 mm move
    // ramps over 3 mm, cruises 14 mm, and sheds the speed over the last 3.
    let mut planner = Planner::new(config(60_000.0));
    let mut prep = SegmentPrep::new();
    planner
        .append(&[20.0, 0.0, 0.0], LineData::feed(600.0))
        .unwrap();

    let segments = drain_segments(&mut planner, &mut prep);
    let periods: Vec<u32> = segments.iter().map(|s| s.period).collect();
    assert!(periods.len() >= 5, "expected a sliced profile, got {periods:?}");

    // Cruise at 600 mm/min = 800 steps/sec = 1953 ticks at 1.5625 MHz.
    let cruise = 1_562_500u32 / 800;
    assert!(
        periods.iter().filter(|&&p| p == cruise).count() >= 5,
        "no cruise plateau in {periods:?}"
    );

    // Ramp in, plateau, ramp out.
    assert!(periods[0] > periods[1]);
    assert!(periods[1] > cruise);
    assert_eq!(periods[periods.len() - 3], cruise);
    let last = periods.len() - 1;
    assert!(periods[last] > periods[last - 1]);
    assert!(periods[last - 1] > cruise);

    let total: u32 = segments.iter().map(|s| s.n_step).sum();
    assert_eq!(total, 1600);
}

#[test]
fn single_step_move_is_one_segment_one_pulse() {
    let mut planner = Planner::new(config(60_000.0));
    let mut prep = SegmentPrep::new();

    // Exactly one X step forward.
    planner
        .append(&[0.0125, 0.0, 0.0], LineData::feed(600.0))
        .unwrap();
    let segments = drain_segments(&mut planner, &mut prep);
    assert_eq!(segments.len(), 1);
    assert_eq!(segments[0].n_step, 1);
    assert_eq!(segments[0].dominant, 0);
    assert_eq!(segments[0].direction_bits, 0);

    // And one step back.
    planner
        .append(&[0.0, 0.0, 0.0], LineData::feed(600.0))
        .unwrap();
    let segments = drain_segments(&mut planner, &mut prep);
    assert_eq!(segments.len(), 1);
    assert_eq!(segments[0].n_step, 1);
    assert_eq!(segments[0].direction_bits, 0b001);
}

#[test]
fn slow_moves_pin_the_period_at_the_timer_ceiling() {
    let mut planner = Planner::new(config(60_000.0));
    let mut prep = SegmentPrep::new();
    // 2 mm/min on one axis: far below the representable step rate.
    planner
        .append(&[1.0, 0.0, 0.0], LineData::feed(2.0))
        .unwrap();
    let segments = drain_segments(&mut planner, &mut prep);
    assert!(!segments.is_empty());
    for segment in &segments {
        assert!(segment.period <= u16::MAX as u32);
        assert!(segment.period >= 80);
    }
    assert_eq!(segments.iter().map(|s| s.n_step).sum::<u32>(), 80);
}

#[test]
fn feed_override_scales_the_cruise_rate() {
    let mut planner = Planner::new(config(60_000.0));
    let mut prep = SegmentPrep::new();
    let shared = SharedState::new();
    shared.set_feed_override(50);

    planner
        .append(&[20.0, 0.0, 0.0], LineData::feed(600.0))
        .unwrap();

    let queue: &'static mut SegmentQueue = Box::leak(Box::new(Queue::new()));
    let (mut producer, mut consumer) = queue.split();
    let mut periods = Vec::new();
    loop {
        let progressed = prep.tick(&mut planner, &mut producer, &shared);
        while let Some(segment) = consumer.dequeue() {
            periods.push(segment.period);
        }
        if !progressed && planner.is_empty() && !prep.is_busy() {
            break;
        }
    }

    // Half the feed doubles the cruise period: 300 mm/min = 400 steps/sec.
    let cruise = 1_562_500u32 / 400;
    assert!(
        periods.iter().filter(|&&p| p == cruise).count() >= 5,
        "no half-speed plateau in {periods:?}"
    );
}

#[test]
fn chained_blocks_do_not_stop_at_the_boundary() {
    let mut planner = Planner::new(config(60_000.0));
    let mut prep = SegmentPrep::new();
    planner
        .append(&[20.0, 0.0, 0.0], LineData::feed(600.0))
        .unwrap();
    planner
        .append(&[40.0, 0.0, 0.0], LineData::feed(600.0))
        .unwrap();

    let segments = drain_segments(&mut planner, &mut prep);
    // With both blocks buffered before prep ran, the boundary is planned at
    // full cruise: no segment in the interior should fall back to the
    // from-rest period.
    let cruise = 1_562_500u32 / 800;
    let interior = &segments[2..segments.len() - 2];
    for segment in interior {
        assert!(
            segment.period <= cruise + cruise / 4,
            "mid-chain slowdown: period {}",
            segment.period
        );
    }
    let total: u32 = segments.iter().map(|s| s.n_step).sum();
    assert_eq!(total, 3200);
}

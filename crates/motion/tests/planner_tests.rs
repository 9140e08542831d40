//! Planner geometry and look-ahead tests.
//!
//! Exercises block decoration (step counts, unit vectors, axis-limited
//! acceleration), junction-deviation corner speeds, and the reverse/forward
//! entry-speed passes over the look-ahead window.

use motion::planner::BLOCK_BUFFER_SIZE;
use motion::{AxisConfig, LineData, MotionConfig, PlanError, Planner, N_AXIS};

/// 80 steps/mm everywhere, gentle acceleration, generous rapids.
fn config() -> MotionConfig {
    MotionConfig {
        axes: [AxisConfig {
            steps_per_mm: 80.0,
            max_rate: 5000.0,
            max_accel: 500.0,
            max_travel: 300.0,
        }; N_AXIS],
        junction_deviation: 0.01,
        min_feed_rate: 1.0,
        min_junction_speed: 0.0,
        ..MotionConfig::default()
    }
}

fn approx(a: f32, b: f32, tol: f32) -> bool {
    (a - b).abs() <= tol
}

#[test]
fn first_block_geometry() {
    let mut planner = Planner::new(config());
    planner
        .append(&[10.0, 0.0, 0.0], LineData::feed(600.0))
        .unwrap();

    let block = planner.current_block().unwrap();
    assert_eq!(block.steps, [800, 0, 0]);
    assert_eq!(block.direction_bits, 0);
    assert_eq!(block.step_event_count, 800);
    assert!(approx(block.millimeters, 10.0, 1e-5));
    assert!(approx(block.acceleration, 500.0, 1e-3));
    assert!(approx(block.programmed_rate, 600.0, 1e-3));
    // No previous move: the block enters from rest.
    assert_eq!(block.max_junction_speed_sqr, 0.0);
    assert_eq!(block.entry_speed_sqr, 0.0);
    assert!(approx(block.unit_vec[0], 1.0, 1e-6));
}

#[test]
fn planner_position_tracks_appends() {
    let mut planner = Planner::new(config());
    planner
        .append(&[10.0, -2.5, 1.0], LineData::feed(600.0))
        .unwrap();
    assert_eq!(planner.position(), [800, -200, 80]);

    let block = planner.current_block().unwrap();
    assert_eq!(block.steps, [800, 200, 80]);
    // Only Y runs negative.
    assert_eq!(block.direction_bits, 0b010);
}

#[test]
fn collinear_pair_settles_symmetric_entry() {
    let mut planner = Planner::new(config());
    planner
        .append(&[10.0, 0.0, 0.0], LineData::feed(1500.0))
        .unwrap();
    planner
        .append(&[20.0, 0.0, 0.0], LineData::feed(1500.0))
        .unwrap();

    let blocks: Vec<_> = planner.blocks().collect();
    assert_eq!(blocks.len(), 2);

    // Collinear continuation: the junction imposes no limit, so the shared
    // boundary speed is set purely by accelerating over the first 10 mm and
    // decelerating over the second: v² = 2·a·10.
    assert_eq!(blocks[0].entry_speed_sqr, 0.0);
    let expected = 2.0 * 500.0 * 10.0;
    assert!(
        approx(blocks[1].entry_speed_sqr, expected, expected * 1e-4),
        "entry² = {}, expected {}",
        blocks[1].entry_speed_sqr,
        expected
    );
    assert_eq!(blocks[1].max_junction_speed_sqr, f32::MAX);
}

#[test]
fn right_angle_junction_uses_deviation_formula() {
    let mut planner = Planner::new(config());
    planner
        .append(&[10.0, 0.0, 0.0], LineData::feed(1500.0))
        .unwrap();
    planner
        .append(&[10.0, 10.0, 0.0], LineData::feed(1500.0))
        .unwrap();

    let blocks: Vec<_> = planner.blocks().collect();
    let second = blocks[1];

    // Perpendicular moves: cos θ = 0, sin(θ/2) = √½.
    let sin_theta_d2 = 0.5f32.sqrt();
    let expected =
        second.acceleration * 0.01 * sin_theta_d2 / (1.0 - sin_theta_d2);
    assert!(
        approx(second.max_junction_speed_sqr, expected, expected * 1e-4),
        "junction² = {}, expected {}",
        second.max_junction_speed_sqr,
        expected
    );
    // Finite and well under the programmed rate.
    assert!(second.max_junction_speed_sqr < 1500.0 * 1500.0);
    assert!(second.entry_speed_sqr <= second.max_junction_speed_sqr);
}

#[test]
fn reversal_forces_entry_from_rest() {
    let mut planner = Planner::new(config());
    planner
        .append(&[10.0, 0.0, 0.0], LineData::feed(1500.0))
        .unwrap();
    planner
        .append(&[-10.0, 0.0, 0.0], LineData::feed(1500.0))
        .unwrap();

    let blocks: Vec<_> = planner.blocks().collect();
    assert_eq!(blocks[1].max_junction_speed_sqr, 0.0);
    assert_eq!(blocks[1].entry_speed_sqr, 0.0);
    assert_eq!(blocks[1].direction_bits, 0b001);
}

#[test]
fn zero_length_move_is_rejected() {
    let mut planner = Planner::new(config());
    assert_eq!(
        planner.append(&[0.0, 0.0, 0.0], LineData::feed(600.0)),
        Err(PlanError::EmptyBlock)
    );
    // Below half a step everywhere also rounds to nothing.
    assert_eq!(
        planner.append(&[0.006, 0.006, 0.0], LineData::feed(600.0)),
        Err(PlanError::EmptyBlock)
    );
    assert!(planner.is_empty());
}

#[test]
fn non_finite_input_is_rejected_as_empty() {
    let mut planner = Planner::new(config());
    assert_eq!(
        planner.append(&[f32::NAN, 0.0, 0.0], LineData::feed(600.0)),
        Err(PlanError::EmptyBlock)
    );
    assert_eq!(
        planner.append(&[f32::INFINITY, 0.0, 0.0], LineData::feed(600.0)),
        Err(PlanError::EmptyBlock)
    );
    assert_eq!(
        planner.append(&[10.0, 0.0, 0.0], LineData::feed(f32::NAN)),
        Err(PlanError::EmptyBlock)
    );
    assert!(planner.is_empty());
    assert_eq!(planner.position(), [0, 0, 0]);
}

#[test]
fn buffer_full_is_transient() {
    let mut planner = Planner::new(config());

    let mut accepted = 0usize;
    for i in 1.. {
        match planner.append(&[i as f32, 0.0, 0.0], LineData::feed(600.0)) {
            Ok(()) => accepted += 1,
            Err(PlanError::BufferFull) => break,
            Err(e) => panic!("unexpected error: {e:?}"),
        }
    }
    // One ring slot stays open to distinguish full from empty.
    assert_eq!(accepted, BLOCK_BUFFER_SIZE - 1);
    assert_eq!(planner.available_slots(), 0);

    // Consuming one block frees a slot and the retry succeeds.
    planner.get_current_block().unwrap();
    planner.discard_current_block();
    planner
        .append(&[(accepted + 1) as f32, 0.0, 0.0], LineData::feed(600.0))
        .unwrap();
    assert_eq!(planner.available_slots(), 0);
}

#[test]
fn rapid_uses_axis_limited_rate() {
    let mut planner = Planner::new(config());
    planner.append(&[10.0, 10.0, 0.0], LineData::rapid()).unwrap();
    let block = planner.current_block().unwrap();
    // A 45° diagonal saturates both axes at max_rate/|cos| = 5000·√2.
    let expected = 5000.0 / (0.5f32.sqrt());
    assert!(approx(block.rapid_rate, expected, 1.0));
    assert!(approx(block.programmed_rate, expected, 1.0));
}

#[test]
fn sync_position_rebases_step_deltas() {
    let mut planner = Planner::new(config());
    planner.sync_position([100, 0, 0]);
    planner
        .append(&[2.5, 0.0, 0.0], LineData::feed(600.0))
        .unwrap();
    let block = planner.current_block().unwrap();
    // 2.5 mm at 80 steps/mm is step 200; from step 100 that is 100 steps.
    assert_eq!(block.steps, [100, 0, 0]);
    assert_eq!(block.direction_bits, 0);
    assert_eq!(planner.position(), [200, 0, 0]);
}

#[test]
fn alarm_blocks_appends_until_synced() {
    let mut planner = Planner::new(config());
    planner
        .append(&[10.0, 0.0, 0.0], LineData::feed(600.0))
        .unwrap();
    planner.clear_for_alarm();
    assert!(planner.is_empty());
    assert!(planner.needs_sync());
    assert_eq!(
        planner.append(&[12.0, 0.0, 0.0], LineData::feed(600.0)),
        Err(PlanError::PositionUnsynced)
    );
    planner.sync_position([0, 0, 0]);
    planner
        .append(&[12.0, 0.0, 0.0], LineData::feed(600.0))
        .unwrap();
}

/// Entry-speed invariants over a churning window: every boundary speed must
/// be inside the junction ceiling and reachable under the acceleration
/// limits of both blocks that share it.
#[test]
fn lookahead_invariants_hold_across_random_polyline() {
    let mut planner = Planner::new(config());

    // Deterministic pseudo-random walk.
    let mut lcg: u32 = 0x2545_f491;
    let mut next = move || {
        lcg = lcg.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        (lcg >> 8) as f32 / (1u32 << 24) as f32
    };

    let mut target = [0.0f32; N_AXIS];
    for step in 0..200 {
        target[0] += next() * 8.0 - 4.0;
        target[1] += next() * 8.0 - 4.0;
        target[2] += next() * 2.0 - 1.0;
        let feed = 200.0 + next() * 1800.0;

        match planner.append(&target, LineData::feed(feed)) {
            Ok(()) | Err(PlanError::EmptyBlock) => {}
            Err(PlanError::BufferFull) => {
                // Drain a few blocks like the executor would, then retry.
                for _ in 0..3 {
                    planner.get_current_block();
                    planner.discard_current_block();
                }
                planner.append(&target, LineData::feed(feed)).ok();
            }
            Err(e) => panic!("unexpected error at step {step}: {e:?}"),
        }

        let blocks: Vec<_> = planner.blocks().collect();
        for pair in blocks.windows(2) {
            let (current, following) = (pair[0], pair[1]);
            let reach = current.entry_speed_sqr
                + 2.0 * current.acceleration * current.millimeters;
            assert!(
                following.entry_speed_sqr <= reach * (1.0 + 1e-4) + 1e-3,
                "entry speed unreachable from predecessor"
            );
            let decel_reach = following.entry_speed_sqr
                + 2.0 * current.acceleration * current.millimeters;
            assert!(
                current.entry_speed_sqr <= decel_reach * (1.0 + 1e-4) + 1e-3,
                "predecessor cannot shed speed to this boundary"
            );
        }
        for block in &blocks {
            assert!(block.entry_speed_sqr <= block.max_entry_speed_sqr * (1.0 + 1e-5) + 1e-3);
            assert!(block.max_entry_speed_sqr <= block.max_junction_speed_sqr);
            let programmed_sqr = block.programmed_rate * block.programmed_rate;
            assert!(block.max_entry_speed_sqr <= programmed_sqr * (1.0 + 1e-5) + 1e-3);
            assert!(block.millimeters > 0.0);
            assert_eq!(
                block.step_event_count,
                *block.steps.iter().max().unwrap()
            );
        }
    }
}

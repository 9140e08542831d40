//! Planner throughput benchmark: append + recalculate over a churning
//! look-ahead window, the hot path of the main loop during streaming.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use motion::{AxisConfig, LineData, MotionConfig, PlanError, Planner, N_AXIS};

fn config() -> MotionConfig {
    MotionConfig {
        axes: [AxisConfig {
            steps_per_mm: 80.0,
            max_rate: 3000.0,
            max_accel: 36_000.0,
            max_travel: 300.0,
        }; N_AXIS],
        ..MotionConfig::default()
    }
}

/// Stream a 64-chord polyline through a window that drains like a real
/// executor: every full buffer retires one block.
fn stream_polyline(planner: &mut Planner) {
    let mut target = [0.0f32; N_AXIS];
    for i in 0..64u32 {
        let angle = i as f32 * 0.197;
        target[0] += angle.cos() * 1.5;
        target[1] += angle.sin() * 1.5;
        loop {
            match planner.append(&target, LineData::feed(1800.0)) {
                Ok(()) => break,
                Err(PlanError::BufferFull) => {
                    planner.get_current_block();
                    planner.discard_current_block();
                }
                Err(_) => break,
            }
        }
    }
}

fn bench_append_recalculate(c: &mut Criterion) {
    c.bench_function("append_recalculate_64_chords", |b| {
        b.iter(|| {
            let mut planner = Planner::new(config());
            stream_polyline(black_box(&mut planner));
            black_box(planner.block_count())
        })
    });
}

criterion_group!(benches, bench_append_recalculate);
criterion_main!(benches);

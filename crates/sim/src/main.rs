//! Simulation CLI.
//!
//! Runs a canned toolpath against the simulated board and prints what the
//! pulse stream did. Useful for eyeballing planner behavior and for
//! generating trace artifacts:
//!
//! ```text
//! sim --pattern square --size 40 --feed 900 --trace square.json
//! ```

use std::fs::File;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use grbl_settings::Settings;
use sim::{run, Move};
use tracing::info;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Pattern {
    /// A single straight move and back.
    Line,
    /// A closed square in XY.
    Square,
    /// A zigzag with alternating shallow corners.
    Zigzag,
}

#[derive(Debug, Parser)]
#[command(name = "sim", about = "Deterministic motion pipeline simulator")]
struct Args {
    #[arg(long, value_enum, default_value = "square")]
    pattern: Pattern,
    /// Pattern size (mm).
    #[arg(long, default_value_t = 40.0)]
    size: f32,
    /// Feed rate (mm/min).
    #[arg(long, default_value_t = 900.0)]
    feed: f32,
    /// Steps per millimeter, all axes ($100..$102).
    #[arg(long, default_value_t = 80.0)]
    steps_per_mm: f32,
    /// Maximum rate (mm/min, $110..$112).
    #[arg(long, default_value_t = 3000.0)]
    max_rate: f32,
    /// Maximum acceleration (mm/s², $120..$122).
    #[arg(long, default_value_t = 50.0)]
    accel: f32,
    /// Junction deviation (mm, $11).
    #[arg(long, default_value_t = 0.01)]
    junction_deviation: f32,
    /// Close a simulated X limit switch at this step count.
    #[arg(long)]
    trip_limit_at: Option<i32>,
    /// Write the segment-period trace as JSON.
    #[arg(long)]
    trace: Option<PathBuf>,
}

fn toolpath(pattern: Pattern, size: f32, feed: f32) -> Vec<Move> {
    match pattern {
        Pattern::Line => vec![
            Move::feed([size, 0.0, 0.0], feed),
            Move::feed([0.0, 0.0, 0.0], feed),
        ],
        Pattern::Square => vec![
            Move::feed([size, 0.0, 0.0], feed),
            Move::feed([size, size, 0.0], feed),
            Move::feed([0.0, size, 0.0], feed),
            Move::feed([0.0, 0.0, 0.0], feed),
        ],
        Pattern::Zigzag => {
            let mut moves = Vec::new();
            let step = size / 8.0;
            for i in 1..=8 {
                let y = if i % 2 == 0 { 0.0 } else { step };
                moves.push(Move::feed([step * i as f32, y, 0.0], feed));
            }
            moves.push(Move::rapid([0.0, 0.0, 0.0]));
            moves
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let args = Args::parse();

    let mut settings = Settings::default();
    for axis in 0..3u16 {
        settings.set(100 + axis, args.steps_per_mm)?;
        settings.set(110 + axis, args.max_rate)?;
        settings.set(120 + axis, args.accel)?;
    }
    settings.set(11, args.junction_deviation)?;

    let moves = toolpath(args.pattern, args.size, args.feed);
    info!(moves = moves.len(), pattern = ?args.pattern, "starting simulation");

    let report = run(&settings, &moves, args.trip_limit_at)?;

    info!(
        state = ?report.final_state,
        position = ?report.final_position,
        edges = ?report.step_edges,
        pulses = report.pulse_count,
        virtual_secs = report.duration_secs,
        segments_traced = report.trace.len(),
        "done"
    );
    if report.limit_tripped {
        info!("run ended in alarm from the simulated limit switch");
    }

    if let Some(path) = &args.trace {
        let file = File::create(path)
            .with_context(|| format!("creating trace file {}", path.display()))?;
        serde_json::to_writer_pretty(file, &report)
            .context("serializing simulation report")?;
        info!(path = %path.display(), "trace written");
    }
    Ok(())
}

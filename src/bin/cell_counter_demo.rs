//! cell_counter_demo - deterministic synthetic run of the cell counter
//!
//! Drives the synthetic cell stream with a manual clock (one tick per frame),
//! so the same arguments always produce the same counts and rates.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use cell_counter::config::parse_roi;
use cell_counter::{
    Clock, Controls, CounterSession, CsvRateLog, Frame, FrameProcessor, FrameSource,
    InMemoryRateLog, ManualClock, RoiRect, SourceConfig, SyntheticSource,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Simulated duration in seconds.
    #[arg(long, default_value_t = 60.0)]
    seconds: f64,
    /// Simulated frames per second.
    #[arg(long, default_value_t = 30)]
    fps: u32,
    /// Frame width.
    #[arg(long, default_value_t = 128)]
    width: u32,
    /// Frame height.
    #[arg(long, default_value_t = 128)]
    height: u32,
    /// Motion threshold.
    #[arg(long, default_value_t = 1.0)]
    threshold: f32,
    /// ROI as x,y,w,h fractions of the frame.
    #[arg(long, value_parser = parse_roi)]
    roi: Option<RoiRect>,
    /// Seconds between rate computations.
    #[arg(long, default_value_t = 10.0)]
    rate_interval: f64,
    /// Seed for the synthetic stream.
    #[arg(long, default_value_t = 7)]
    seed: u64,
    /// Also write the rates to this CSV file.
    #[arg(long)]
    rate_log: Option<PathBuf>,
    /// Save the last frame with the ROI outline drawn on it (needs ingest-image).
    #[arg(long)]
    snapshot: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = Args::parse();
    if args.fps == 0 {
        return Err(anyhow!("fps must be >= 1"));
    }
    if !(args.rate_interval > 0.0) {
        return Err(anyhow!("rate interval must be > 0"));
    }
    if args.snapshot.is_some() && !cfg!(feature = "ingest-image") {
        return Err(anyhow!("--snapshot requires the ingest-image feature"));
    }

    let clock = Arc::new(ManualClock::new(0.0));
    let mut session = CounterSession::new(clock.clone());
    let memory_log = InMemoryRateLog::new();
    session = match &args.rate_log {
        Some(path) => session.with_rate_sink(Box::new(CsvRateLog::open(path)?)),
        None => session.with_rate_sink(Box::new(memory_log.clone())),
    };

    let mut source = SyntheticSource::new(SourceConfig {
        url: "stub://demo".to_string(),
        width: args.width,
        height: args.height,
        target_fps: args.fps,
        seed: Some(args.seed),
        ..SourceConfig::default()
    })?;
    source.connect()?;

    let controls = Arc::new(Controls::new(args.threshold, args.roi.unwrap_or_default())?);
    let mut processor = FrameProcessor::new(session.detector(), controls.clone());

    let total_frames = (args.seconds * args.fps as f64).round() as u64;
    let frame_dt = 1.0 / args.fps as f64;
    let mut next_rate = args.rate_interval;
    let mut rates = Vec::new();
    let mut peak_motion = 0.0f32;
    let mut frames = 0u64;
    let mut last_frame = None;

    for _ in 0..total_frames {
        clock.advance(frame_dt);
        let Some(frame) = source.next_frame()? else {
            break;
        };
        let sample = processor.process(&frame)?;
        peak_motion = peak_motion.max(sample.motion_amount);
        frames += 1;
        last_frame = Some(frame);

        let now = clock.now();
        if now >= next_rate {
            rates.push((now, session.compute_rate_at(now)?));
            next_rate += args.rate_interval;
        }
    }

    println!("frames processed : {}", frames);
    println!("cells passed     : {}", source.cells_completed());
    println!("cells detected   : {}", session.total_count()?);
    println!("peak motion      : {:.3}", peak_motion);
    for (t, rate) in &rates {
        println!("rate @ {:>7.2}s  : {:.4} cells/s", t, rate);
    }
    if let Some(path) = &args.rate_log {
        println!("rate log         : {}", path.display());
    } else {
        println!("rate points kept : {}", memory_log.points().len());
    }

    if let (Some(path), Some(frame)) = (&args.snapshot, &last_frame) {
        let bounds = controls.roi()?.bounds(frame.width, frame.height);
        save_snapshot(&frame.with_roi_overlay(bounds, u8::MAX), path)?;
        println!("snapshot         : {}", path.display());
    }
    Ok(())
}

#[cfg(feature = "ingest-image")]
fn save_snapshot(frame: &Frame, path: &Path) -> Result<()> {
    frame.save(path)
}

#[cfg(not(feature = "ingest-image"))]
fn save_snapshot(_frame: &Frame, _path: &Path) -> Result<()> {
    Err(anyhow!("--snapshot requires the ingest-image feature"))
}

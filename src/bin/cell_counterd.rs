//! cell_counterd - motion-based cell counter daemon
//!
//! This daemon:
//! 1. Pulls frames from the configured source on a dedicated processing thread
//! 2. Detects cells from the motion inside the ROI
//! 3. Logs FPS and the running count on the display tick
//! 4. Computes the detection rate every rate interval (optionally into a CSV log)
//! 5. Accepts operator commands on stdin (reset, threshold, roi, status, quit)

use anyhow::Result;
use clap::Parser;
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;

use cell_counter::config::parse_roi;
use cell_counter::storage::default_log_path;
use cell_counter::{
    open_source, ControlCommand, Controls, CounterConfig, CounterSession, CsvRateLog,
    FpsMeter, FrameProcessor, MonotonicClock, Pipeline, PipelineHandle, PipelineOptions, RoiRect,
};

const STATUS_PERIOD_SECS: f64 = 1.0;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Config file (JSON, or TOML by extension). Takes precedence over CELL_COUNTER_CONFIG.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Frame source: stub://<name> or a directory of images.
    #[arg(long)]
    source: Option<String>,
    /// Motion threshold (mean absolute pixel difference).
    #[arg(long)]
    threshold: Option<f32>,
    /// ROI as x,y,w,h fractions of the frame.
    #[arg(long, value_parser = parse_roi)]
    roi: Option<RoiRect>,
    /// Seconds between rate computations.
    #[arg(long)]
    rate_interval: Option<f64>,
    /// Append computed rates to this CSV file.
    #[arg(long)]
    rate_log: Option<PathBuf>,
    /// Append computed rates to a timestamped CSV file in this directory.
    #[arg(long, conflicts_with = "rate_log")]
    rate_log_dir: Option<PathBuf>,
    /// Stop after this many seconds.
    #[arg(long)]
    duration: Option<f64>,
    /// Do not read operator commands from stdin.
    #[arg(long)]
    no_stdin: bool,
}

struct Runtime {
    session: CounterSession,
    controls: Arc<Controls>,
    pipeline: PipelineHandle,
    fps: FpsMeter,
    last_fps: f64,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut cfg = match &args.config {
        Some(path) => CounterConfig::load_from(Some(path))?,
        None => CounterConfig::load()?,
    };
    apply_args(&mut cfg, &args)?;
    cfg.validate()?;

    let mut session = CounterSession::new(Arc::new(MonotonicClock::new()));
    let rate_log_path = match &args.rate_log_dir {
        Some(dir) => Some(default_log_path(dir)?),
        None => cfg.rate.log_path.clone(),
    };
    if let Some(path) = &rate_log_path {
        let rate_log = CsvRateLog::open(path)?;
        log::info!("rate log: {}", rate_log.path().display());
        session = session.with_rate_sink(Box::new(rate_log));
    }

    let controls = Arc::new(Controls::new(cfg.threshold, cfg.roi)?);
    let source = open_source(&cfg.source)?;
    let processor = FrameProcessor::new(session.detector(), controls.clone());
    let pipeline = Pipeline::spawn(
        source,
        processor,
        PipelineOptions {
            target_fps: cfg.source.target_fps,
            max_consecutive_failures: cfg.source.max_consecutive_failures,
            ..PipelineOptions::default()
        },
    )?;

    log::info!("cell_counterd running. source={}", cfg.source.url);
    log::info!(
        "threshold={:.3} roi=({:.2}, {:.2}, {:.2}, {:.2}) rate_interval={:.1}s",
        cfg.threshold,
        cfg.roi.x,
        cfg.roi.y,
        cfg.roi.w,
        cfg.roi.h,
        cfg.rate.interval.as_secs_f64()
    );

    let (tx, rx) = mpsc::channel();
    let ctrlc_tx = tx.clone();
    ctrlc::set_handler(move || {
        let _ = ctrlc_tx.send(ControlCommand::Quit);
    })
    .expect("error setting Ctrl-C handler");
    if !args.no_stdin {
        spawn_stdin_reader(tx);
    }

    let started = session.now();
    let mut rt = Runtime {
        fps: FpsMeter::new(started, 0),
        last_fps: 0.0,
        session,
        controls,
        pipeline,
    };
    let rate_interval = cfg.rate.interval.as_secs_f64();
    let mut next_rate = started + rate_interval;
    let mut last_status = started;

    loop {
        match rx.recv_timeout(cfg.display.refresh) {
            Ok(ControlCommand::Quit) => {
                log::info!("shutdown requested");
                break;
            }
            Ok(command) => handle_command(&mut rt, command)?,
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => std::thread::sleep(cfg.display.refresh),
        }

        let now = rt.session.now();
        for sample in rt.pipeline.drain_samples() {
            if sample.event_detected {
                log::debug!(
                    "detection at {:.3}s (motion {:.3})",
                    sample.timestamp,
                    sample.motion_amount
                );
            }
        }

        if !rt.pipeline.is_running() {
            log::info!("processing loop finished");
            break;
        }

        if now - last_status >= STATUS_PERIOD_SECS {
            rt.last_fps = rt.fps.tick(now, rt.pipeline.frames_processed());
            log::debug!(
                "fps={:.1} detected={}",
                rt.last_fps,
                rt.session.total_count()?
            );
            last_status = now;
        }

        if now >= next_rate {
            let rate = rt.session.compute_rate_at(now)?;
            log::info!(
                "rate={:.4} cells/s total={} fps={:.1}",
                rate,
                rt.session.total_count()?,
                rt.last_fps
            );
            next_rate = now + rate_interval;
        }

        if args.duration.is_some_and(|limit| now - started >= limit) {
            log::info!("run duration reached");
            break;
        }
    }

    let Runtime {
        mut session,
        pipeline,
        ..
    } = rt;
    let frames = pipeline.frames_processed();
    pipeline.stop()?;

    let now = session.now();
    if now > session.last_rate_timestamp() {
        let rate = session.compute_rate_at(now)?;
        log::info!("final rate={:.4} cells/s", rate);
    }
    log::info!(
        "stopped after {:.1}s: {} frames, {} cells detected",
        now - started,
        frames,
        session.total_count()?
    );
    Ok(())
}

fn apply_args(cfg: &mut CounterConfig, args: &Args) -> Result<()> {
    if let Some(source) = &args.source {
        cfg.source.url = source.clone();
    }
    if let Some(threshold) = args.threshold {
        cfg.threshold = threshold;
    }
    if let Some(roi) = args.roi {
        cfg.roi = roi;
    }
    if let Some(secs) = args.rate_interval {
        cfg.rate.interval = std::time::Duration::try_from_secs_f64(secs)
            .map_err(|_| anyhow::anyhow!("--rate-interval must be a positive number of seconds"))?;
    }
    if let Some(path) = &args.rate_log {
        cfg.rate.log_path = Some(path.clone());
    }
    Ok(())
}

fn handle_command(rt: &mut Runtime, command: ControlCommand) -> Result<()> {
    match command {
        ControlCommand::Reset => rt.session.reset()?,
        ControlCommand::Threshold(value) => {
            rt.controls.set_threshold(value)?;
            log::info!("threshold set to {:.3}", value);
        }
        ControlCommand::Roi(roi) => {
            rt.controls.set_roi(roi)?;
            let roi = rt.controls.roi()?;
            log::info!(
                "roi set to ({:.2}, {:.2}, {:.2}, {:.2})",
                roi.x,
                roi.y,
                roi.w,
                roi.h
            );
        }
        ControlCommand::Status => {
            let roi = rt.controls.roi()?;
            let last_detection = match rt.session.ledger().latest()? {
                Some(event) => format!("{:.3}s", event.timestamp),
                None => "none".to_string(),
            };
            log::info!(
                "status: fps={:.1} detected={} last={} threshold={:.3} roi=({:.2}, {:.2}, {:.2}, {:.2})",
                rt.last_fps,
                rt.session.total_count()?,
                last_detection,
                rt.controls.threshold(),
                roi.x,
                roi.y,
                roi.w,
                roi.h
            );
        }
        ControlCommand::Quit => {}
    }
    Ok(())
}

fn spawn_stdin_reader(tx: mpsc::Sender<ControlCommand>) {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else {
                break;
            };
            if line.trim().is_empty() {
                continue;
            }
            match ControlCommand::parse(&line) {
                Ok(command) => {
                    if tx.send(command).is_err() {
                        break;
                    }
                }
                Err(err) => log::warn!("ignoring command: {}", err),
            }
        }
    });
}

//! Acquisition and processing loop.
//!
//! One dedicated thread pulls frames from the source, extracts the ROI, runs
//! the detector and publishes each `MotionSample` on a bounded display channel.
//! The loop checks its running flag once per frame and never stops in the
//! middle of a detection step.
//!
//! The ROI and threshold live in `Controls` and can be changed from any thread;
//! the loop reads them at the start of every frame.

use anyhow::{anyhow, Context, Result};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::{Arc, RwLock};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::detect::{CellDetector, MotionSample};
use crate::frame::{extract_region, Frame, RoiRect};
use crate::ingest::FrameSource;

const DEFAULT_DISPLAY_CAPACITY: usize = 1024;

// ----------------------------------------------------------------------------
// Live controls
// ----------------------------------------------------------------------------

/// Operator-adjustable settings read by the processing loop every frame.
#[derive(Debug)]
pub struct Controls {
    threshold_bits: AtomicU32,
    roi: RwLock<RoiRect>,
}

impl Controls {
    /// Fails for a negative or non-finite threshold. The ROI is clamped.
    pub fn new(threshold: f32, roi: RoiRect) -> Result<Self> {
        check_threshold(threshold)?;
        Ok(Self {
            threshold_bits: AtomicU32::new(threshold.to_bits()),
            roi: RwLock::new(roi.clamped()),
        })
    }

    pub fn threshold(&self) -> f32 {
        f32::from_bits(self.threshold_bits.load(Ordering::Relaxed))
    }

    pub fn set_threshold(&self, threshold: f32) -> Result<()> {
        check_threshold(threshold)?;
        self.threshold_bits
            .store(threshold.to_bits(), Ordering::Relaxed);
        Ok(())
    }

    pub fn roi(&self) -> Result<RoiRect> {
        self.roi
            .read()
            .map(|roi| *roi)
            .map_err(|_| anyhow!("roi lock poisoned"))
    }

    /// Replace the ROI. Components are clamped into `[0, 1]`.
    pub fn set_roi(&self, roi: RoiRect) -> Result<()> {
        let mut guard = self
            .roi
            .write()
            .map_err(|_| anyhow!("roi lock poisoned"))?;
        *guard = roi.clamped();
        Ok(())
    }
}

fn check_threshold(threshold: f32) -> Result<()> {
    if !threshold.is_finite() || threshold < 0.0 {
        return Err(anyhow!("threshold must be a finite value >= 0 (got {})", threshold));
    }
    Ok(())
}

// ----------------------------------------------------------------------------
// Frame processor
// ----------------------------------------------------------------------------

/// Extract → difference → detect for one frame at a time.
pub struct FrameProcessor {
    detector: CellDetector,
    controls: Arc<Controls>,
}

impl FrameProcessor {
    pub fn new(detector: CellDetector, controls: Arc<Controls>) -> Self {
        Self { detector, controls }
    }

    pub fn process(&mut self, frame: &Frame) -> Result<MotionSample> {
        let roi = self.controls.roi()?;
        let threshold = self.controls.threshold();
        let region = extract_region(frame, &roi);
        self.detector.process_region(region, threshold)
    }
}

// ----------------------------------------------------------------------------
// Threaded loop
// ----------------------------------------------------------------------------

#[derive(Clone, Debug)]
pub struct PipelineOptions {
    /// Pace the loop to this rate. 0 runs as fast as the source delivers.
    pub target_fps: u32,
    /// Consecutive source failures tolerated before the loop stops.
    pub max_consecutive_failures: u32,
    /// Display samples buffered before new ones are dropped.
    pub display_capacity: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            target_fps: 0,
            max_consecutive_failures: 5,
            display_capacity: DEFAULT_DISPLAY_CAPACITY,
        }
    }
}

pub struct Pipeline;

impl Pipeline {
    /// Connect `source` and start the processing thread.
    pub fn spawn(
        mut source: Box<dyn FrameSource>,
        processor: FrameProcessor,
        options: PipelineOptions,
    ) -> Result<PipelineHandle> {
        source.connect().context("frame source failed to connect")?;

        let running = Arc::new(AtomicBool::new(true));
        let frames = Arc::new(AtomicU64::new(0));
        let (tx, rx) = mpsc::sync_channel(options.display_capacity.max(1));

        let running_thread = running.clone();
        let frames_thread = frames.clone();
        let join = std::thread::Builder::new()
            .name("cell-counter-processing".to_string())
            .spawn(move || {
                let result = run_loop(
                    source,
                    processor,
                    &options,
                    &running_thread,
                    &frames_thread,
                    tx,
                );
                running_thread.store(false, Ordering::SeqCst);
                if let Err(err) = &result {
                    log::error!("processing loop stopped: {:#}", err);
                }
                result
            })?;

        Ok(PipelineHandle {
            running,
            frames,
            samples: rx,
            join: Some(join),
        })
    }
}

fn run_loop(
    mut source: Box<dyn FrameSource>,
    mut processor: FrameProcessor,
    options: &PipelineOptions,
    running: &AtomicBool,
    frames: &AtomicU64,
    samples: SyncSender<MotionSample>,
) -> Result<()> {
    let frame_period =
        (options.target_fps > 0).then(|| Duration::from_secs_f64(1.0 / options.target_fps as f64));
    let mut failures = 0u32;
    let mut dropped = 0u64;

    while running.load(Ordering::SeqCst) {
        let started = Instant::now();

        let frame = match source.next_frame() {
            Ok(Some(frame)) => {
                failures = 0;
                frame
            }
            Ok(None) => {
                log::info!(
                    "frame source exhausted after {} frames",
                    source.stats().frames_captured
                );
                break;
            }
            Err(err) => {
                failures += 1;
                if failures >= options.max_consecutive_failures.max(1) {
                    return Err(err.context(format!(
                        "frame source failed {} times in a row",
                        failures
                    )));
                }
                log::warn!("frame grab failed ({} in a row): {:#}", failures, err);
                continue;
            }
        };

        let sample = processor.process(&frame)?;
        frames.fetch_add(1, Ordering::Relaxed);

        match samples.try_send(sample) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                dropped += 1;
                if dropped.is_power_of_two() {
                    log::debug!("display channel full, {} samples dropped", dropped);
                }
            }
            // Nobody is watching; keep counting.
            Err(TrySendError::Disconnected(_)) => {}
        }

        if let Some(period) = frame_period {
            if let Some(rest) = period.checked_sub(started.elapsed()) {
                std::thread::sleep(rest);
            }
        }
    }
    Ok(())
}

/// Handle to the running processing thread.
pub struct PipelineHandle {
    running: Arc<AtomicBool>,
    frames: Arc<AtomicU64>,
    samples: Receiver<MotionSample>,
    join: Option<JoinHandle<Result<()>>>,
}

impl PipelineHandle {
    /// False once the loop has exited (stopped, exhausted or failed).
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    /// Every sample published since the last call.
    pub fn drain_samples(&self) -> Vec<MotionSample> {
        self.samples.try_iter().collect()
    }

    /// Signal the loop to stop after the current frame and wait for it.
    pub fn stop(mut self) -> Result<()> {
        self.running.store(false, Ordering::SeqCst);
        self.join_thread()
    }

    fn join_thread(&mut self) -> Result<()> {
        match self.join.take() {
            Some(join) => join
                .join()
                .map_err(|_| anyhow!("processing thread panicked"))?,
            None => Ok(()),
        }
    }
}

impl Drop for PipelineHandle {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Err(err) = self.join_thread() {
            log::warn!("processing thread ended with error: {:#}", err);
        }
    }
}

// ----------------------------------------------------------------------------
// FPS
// ----------------------------------------------------------------------------

/// Frames per second between successive ticks.
#[derive(Clone, Debug)]
pub struct FpsMeter {
    last_time: f64,
    last_frames: u64,
}

impl FpsMeter {
    pub fn new(now: f64, frames: u64) -> Self {
        Self {
            last_time: now,
            last_frames: frames,
        }
    }

    /// FPS since the previous tick. Returns 0 if no time has passed.
    pub fn tick(&mut self, now: f64, frames: u64) -> f64 {
        let dt = now - self.last_time;
        let df = frames.saturating_sub(self.last_frames);
        self.last_time = now;
        self.last_frames = frames;
        if dt > 0.0 {
            df as f64 / dt
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::ingest::SourceStats;
    use crate::ledger::EventLedger;

    struct ScriptedSource {
        frames: Vec<Result<Frame>>,
        served: u64,
    }

    impl FrameSource for ScriptedSource {
        fn next_frame(&mut self) -> Result<Option<Frame>> {
            if self.frames.is_empty() {
                return Ok(None);
            }
            self.served += 1;
            self.frames.remove(0).map(Some)
        }

        fn stats(&self) -> SourceStats {
            SourceStats {
                frames_captured: self.served,
                url: "script://".to_string(),
            }
        }
    }

    fn flat(value: u8) -> Result<Frame> {
        Frame::new(vec![value; 16], 4, 4)
    }

    fn processor(ledger: &Arc<EventLedger>, threshold: f32) -> FrameProcessor {
        let clock = Arc::new(ManualClock::new(1.0));
        let detector = CellDetector::new(ledger.clone(), clock);
        FrameProcessor::new(detector, Arc::new(Controls::new(threshold, RoiRect::FULL).unwrap()))
    }

    fn wait_until_stopped(handle: &PipelineHandle) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while handle.is_running() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn controls_validate_and_clamp() {
        let controls = Controls::new(2.0, RoiRect::FULL).unwrap();
        assert!(controls.set_threshold(-1.0).is_err());
        assert!(controls.set_threshold(f32::NAN).is_err());
        assert_eq!(controls.threshold(), 2.0);
        controls.set_threshold(7.5).unwrap();
        assert_eq!(controls.threshold(), 7.5);

        controls.set_roi(RoiRect::new(0.5, 2.0, -1.0, 0.25)).unwrap();
        assert_eq!(controls.roi().unwrap(), RoiRect::new(0.5, 1.0, 0.0, 0.25));
    }

    #[test]
    fn controls_reject_invalid_initial_threshold() {
        assert!(Controls::new(-0.5, RoiRect::FULL).is_err());
        assert!(Controls::new(f32::NAN, RoiRect::FULL).is_err());
        assert!(Controls::new(f32::INFINITY, RoiRect::FULL).is_err());
        let controls = Controls::new(0.0, RoiRect::new(-1.0, 0.0, 2.0, 1.0)).unwrap();
        assert_eq!(controls.threshold(), 0.0);
        assert_eq!(controls.roi().unwrap(), RoiRect::FULL);
    }

    #[test]
    fn loop_runs_until_source_is_exhausted() {
        let ledger = Arc::new(EventLedger::new());
        let source = ScriptedSource {
            frames: vec![flat(0), flat(50), flat(50), flat(0), flat(0)],
            served: 0,
        };
        let handle = Pipeline::spawn(
            Box::new(source),
            processor(&ledger, 10.0),
            PipelineOptions::default(),
        )
        .unwrap();
        wait_until_stopped(&handle);

        assert_eq!(handle.frames_processed(), 5);
        let samples = handle.drain_samples();
        assert_eq!(samples.len(), 5);
        assert!(samples[0].warm_up);
        // 0 -> 50 active, 50 -> 50 fires, 50 -> 0 active, 0 -> 0 fires.
        assert_eq!(samples.iter().filter(|s| s.event_detected).count(), 2);
        assert_eq!(ledger.total_count().unwrap(), 2);
        handle.stop().unwrap();
    }

    #[test]
    fn transient_failures_are_retried() {
        let ledger = Arc::new(EventLedger::new());
        let source = ScriptedSource {
            frames: vec![flat(0), Err(anyhow!("timeout")), flat(0), Err(anyhow!("timeout")), flat(0)],
            served: 0,
        };
        let handle = Pipeline::spawn(
            Box::new(source),
            processor(&ledger, 10.0),
            PipelineOptions::default(),
        )
        .unwrap();
        wait_until_stopped(&handle);
        assert_eq!(handle.frames_processed(), 3);
        handle.stop().unwrap();
    }

    #[test]
    fn persistent_failures_stop_the_loop_with_error() {
        let ledger = Arc::new(EventLedger::new());
        let source = ScriptedSource {
            frames: (0..10).map(|_| Err(anyhow!("timeout"))).collect(),
            served: 0,
        };
        let options = PipelineOptions {
            max_consecutive_failures: 3,
            ..PipelineOptions::default()
        };
        let handle = Pipeline::spawn(Box::new(source), processor(&ledger, 10.0), options).unwrap();
        wait_until_stopped(&handle);
        assert!(!handle.is_running());
        assert!(handle.stop().is_err());
    }

    #[test]
    fn fps_meter_counts_frames_per_interval() {
        let mut meter = FpsMeter::new(0.0, 0);
        assert_eq!(meter.tick(2.0, 60), 30.0);
        assert_eq!(meter.tick(2.0, 90), 0.0);
        assert_eq!(meter.tick(3.0, 100), 10.0);
    }
}

use anyhow::Result;
use std::sync::Arc;

use super::diff::{mean_intensity, FrameDiffer};
use super::motion::{MotionDetector, MotionState};
use super::result::MotionSample;
use crate::clock::Clock;
use crate::frame::ExtractedRegion;
use crate::ledger::EventLedger;

/// Per-frame cell detector.
///
/// Owns the per-frame state (previous region, motion state) and appends every
/// detection to the shared ledger. Runs on the processing thread only.
pub struct CellDetector {
    differ: FrameDiffer,
    motion: MotionDetector,
    ledger: Arc<EventLedger>,
    clock: Arc<dyn Clock>,
}

impl CellDetector {
    pub fn new(ledger: Arc<EventLedger>, clock: Arc<dyn Clock>) -> Self {
        Self {
            differ: FrameDiffer::new(),
            motion: MotionDetector::new(),
            ledger,
            clock,
        }
    }

    /// Process one region against `threshold`.
    ///
    /// The region is consumed and becomes the baseline for the next call. A
    /// detection is stamped by the ledger under its lock, and that stamp is the
    /// sample's timestamp.
    pub fn process_region(&mut self, region: ExtractedRegion, threshold: f32) -> Result<MotionSample> {
        let Some(diff) = self.differ.push(region.into_pixels()) else {
            return Ok(MotionSample::warm_up(self.clock.now()));
        };

        let motion_amount = mean_intensity(diff);
        if !self.motion.observe(motion_amount, threshold) {
            return Ok(MotionSample {
                motion_amount,
                timestamp: self.clock.now(),
                event_detected: false,
                warm_up: false,
            });
        }

        let event = self.ledger.append_stamped(self.clock.as_ref())?;
        log::debug!(
            "cell detected at {:.3}s (motion={:.3}, threshold={:.3})",
            event.timestamp,
            motion_amount,
            threshold
        );
        Ok(MotionSample {
            motion_amount,
            timestamp: event.timestamp,
            event_detected: true,
            warm_up: false,
        })
    }

    pub fn state(&self) -> MotionState {
        self.motion.state()
    }

}

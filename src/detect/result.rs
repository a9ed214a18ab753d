use serde::{Deserialize, Serialize};

/// Per-frame output of the detector, consumed by display sinks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MotionSample {
    /// Mean absolute pixel difference inside the ROI.
    pub motion_amount: f32,
    /// Seconds since the clock origin.
    pub timestamp: f64,
    /// True when this frame closed a motion episode.
    pub event_detected: bool,
    /// True when no previous region of the same size existed (baseline frame).
    pub warm_up: bool,
}

impl MotionSample {
    pub(crate) fn warm_up(timestamp: f64) -> Self {
        Self {
            motion_amount: 0.0,
            timestamp,
            event_detected: false,
            warm_up: true,
        }
    }
}

/// One counted cell: the instant its motion episode ended.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectionEvent {
    pub timestamp: f64,
}

impl DetectionEvent {
    pub fn new(timestamp: f64) -> Self {
        Self { timestamp }
    }
}

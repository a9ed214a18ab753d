//! Motion-based cell detection.
//!
//! - `diff`: frame-to-frame absolute differencing with warm-up on size changes
//! - `motion`: hysteresis state machine that turns motion amounts into events
//! - `cell`: `CellDetector`, which wires both to the event ledger

mod cell;
mod diff;
mod motion;
mod result;

pub use cell::CellDetector;
pub use diff::{absolute_difference, mean_intensity, FrameDiffer};
pub use motion::{MotionDetector, MotionState};
pub use result::{DetectionEvent, MotionSample};

use std::fmt;

/// Whether a motion episode is currently open.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MotionState {
    #[default]
    Quiescent,
    Active,
}

impl fmt::Display for MotionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MotionState::Quiescent => f.write_str("quiescent"),
            MotionState::Active => f.write_str("active"),
        }
    }
}

/// Falling-edge threshold detector.
///
/// An event fires when the motion amount drops strictly below the threshold
/// while the detector is `Active`. The next state is `Active` only when the
/// amount is strictly above the threshold, so a reading exactly at the
/// threshold neither fires nor keeps the episode open.
///
/// The threshold is passed per observation; only the state is retained.
#[derive(Clone, Debug, Default)]
pub struct MotionDetector {
    state: MotionState,
}

impl MotionDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MotionState {
        self.state
    }

    /// Feed one motion amount. Returns true when a detection event fires.
    pub fn observe(&mut self, motion_amount: f32, threshold: f32) -> bool {
        let fired = motion_amount < threshold && self.state == MotionState::Active;
        let next = if motion_amount > threshold {
            MotionState::Active
        } else {
            MotionState::Quiescent
        };
        if next != self.state {
            log::trace!(
                "motion {} -> {} (amount={:.3}, threshold={:.3})",
                self.state,
                next,
                motion_amount,
                threshold
            );
        }
        self.state = next;
        fired
    }
}

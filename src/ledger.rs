//! Event ledger.
//!
//! Append-only, timestamp-ordered record of detection events shared between the
//! processing thread (appends) and the periodic contexts (queries, reset).
//! A single mutex guards the whole sequence, so every query sees some prefix of
//! the appends and never a partial one.

use anyhow::{anyhow, Result};
use std::sync::{Mutex, MutexGuard};

use crate::clock::Clock;
use crate::detect::DetectionEvent;

#[derive(Debug, Default)]
pub struct EventLedger {
    events: Mutex<Vec<DetectionEvent>>,
}

impl EventLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Vec<DetectionEvent>>> {
        self.events
            .lock()
            .map_err(|_| anyhow!("event ledger lock poisoned"))
    }

    /// Append an event. Rejects events older than the newest stored one.
    pub fn append(&self, event: DetectionEvent) -> Result<()> {
        let mut events = self.lock()?;
        push_ordered(&mut events, event)
    }

    /// Append an event stamped with `clock.now()`, read while the ledger is
    /// locked.
    ///
    /// A rate window or reset that reads the clock before this call can never
    /// see a timestamp from its own past appear after it has run.
    pub fn append_stamped(&self, clock: &dyn Clock) -> Result<DetectionEvent> {
        let mut events = self.lock()?;
        let event = DetectionEvent::new(clock.now());
        push_ordered(&mut events, event)?;
        Ok(event)
    }

    /// Number of events with `start <= timestamp <= end`.
    pub fn count_in_range(&self, start: f64, end: f64) -> Result<usize> {
        if start > end {
            return Ok(0);
        }
        let events = self.lock()?;
        // Events are sorted, so both ends are binary searches.
        let lo = events.partition_point(|e| e.timestamp < start);
        let hi = events.partition_point(|e| e.timestamp <= end);
        Ok(hi.saturating_sub(lo))
    }

    pub fn total_count(&self) -> Result<usize> {
        Ok(self.lock()?.len())
    }

    /// Drop every event.
    pub fn reset(&self) -> Result<()> {
        let mut events = self.lock()?;
        let dropped = events.len();
        events.clear();
        log::debug!("event ledger reset ({} events dropped)", dropped);
        Ok(())
    }

    /// Copy of the events in `[start, end]`, for display.
    pub fn events_in_range(&self, start: f64, end: f64) -> Result<Vec<DetectionEvent>> {
        if start > end {
            return Ok(Vec::new());
        }
        let events = self.lock()?;
        let lo = events.partition_point(|e| e.timestamp < start);
        let hi = events.partition_point(|e| e.timestamp <= end);
        Ok(events[lo..hi].to_vec())
    }

    pub fn latest(&self) -> Result<Option<DetectionEvent>> {
        Ok(self.lock()?.last().copied())
    }
}

fn push_ordered(events: &mut Vec<DetectionEvent>, event: DetectionEvent) -> Result<()> {
    if !event.timestamp.is_finite() {
        return Err(anyhow!("event timestamp must be finite"));
    }
    if let Some(last) = events.last() {
        if event.timestamp < last.timestamp {
            return Err(anyhow!(
                "event at {:.6}s is older than ledger head {:.6}s",
                event.timestamp,
                last.timestamp
            ));
        }
    }
    events.push(event);
    Ok(())
}

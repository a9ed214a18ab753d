//! Counting session: the orchestrating owner of the ledger and rate cursor.
//!
//! Restarting a trace resets both, but they stay two separate operations on
//! two separate components; the session is the only place that couples them.

use anyhow::Result;
use std::sync::Arc;

use crate::clock::Clock;
use crate::detect::CellDetector;
use crate::ledger::EventLedger;
use crate::rate::RateAggregator;
use crate::storage::RateSink;

pub struct CounterSession {
    clock: Arc<dyn Clock>,
    ledger: Arc<EventLedger>,
    aggregator: RateAggregator,
}

impl CounterSession {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let ledger = Arc::new(EventLedger::new());
        let aggregator = RateAggregator::new(ledger.clone(), clock.now());
        Self {
            clock,
            ledger,
            aggregator,
        }
    }

    /// Persist every computed rate to `sink`.
    pub fn with_rate_sink(mut self, sink: Box<dyn RateSink>) -> Self {
        self.aggregator = self.aggregator.with_sink(sink);
        self
    }

    /// A detector that appends into this session's ledger.
    pub fn detector(&self) -> CellDetector {
        CellDetector::new(self.ledger.clone(), self.clock.clone())
    }

    pub fn ledger(&self) -> &Arc<EventLedger> {
        &self.ledger
    }

    pub fn now(&self) -> f64 {
        self.clock.now()
    }

    pub fn total_count(&self) -> Result<usize> {
        self.ledger.total_count()
    }

    pub fn compute_rate(&mut self) -> Result<f64> {
        let now = self.clock.now();
        self.compute_rate_at(now)
    }

    pub fn compute_rate_at(&mut self, now: f64) -> Result<f64> {
        self.aggregator.compute_rate(now)
    }

    pub fn last_rate_timestamp(&self) -> f64 {
        self.aggregator.last_rate_timestamp()
    }

    /// Restart tracing now.
    pub fn reset(&mut self) -> Result<()> {
        let now = self.clock.now();
        self.reset_at(now)
    }

    /// Clear the ledger and start a new rate window at `now`.
    pub fn reset_at(&mut self, now: f64) -> Result<()> {
        self.ledger.reset()?;
        self.aggregator.reset(now);
        log::info!("tracing restarted at {:.3}s", now);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::detect::DetectionEvent;

    #[test]
    fn reset_empties_ledger_and_restarts_window() {
        let clock = Arc::new(ManualClock::new(0.0));
        let mut session = CounterSession::new(clock.clone());
        for t in [1.0, 2.0, 3.0] {
            session.ledger().append(DetectionEvent::new(t)).unwrap();
        }
        assert_eq!(session.total_count().unwrap(), 3);

        session.reset_at(4.0).unwrap();
        assert_eq!(session.total_count().unwrap(), 0);
        assert_eq!(session.last_rate_timestamp(), 4.0);
        assert_eq!(session.compute_rate_at(4.001).unwrap(), 0.0);
    }

    #[test]
    fn rate_uses_injected_clock() {
        let clock = Arc::new(ManualClock::new(10.0));
        let mut session = CounterSession::new(clock.clone());
        session.ledger().append(DetectionEvent::new(11.0)).unwrap();
        session.ledger().append(DetectionEvent::new(12.0)).unwrap();
        clock.set(14.0);
        assert_eq!(session.compute_rate().unwrap(), 0.5);
        assert_eq!(session.last_rate_timestamp(), 14.0);
    }
}

//! Windowed detection rate.
//!
//! `RateAggregator` turns the ledger's events into cells per second over the
//! window since its previous computation. The window cursor is owned here and
//! touched only by the rate context.

use anyhow::Result;
use std::sync::Arc;

use crate::ledger::EventLedger;
use crate::storage::RateSink;

pub struct RateAggregator {
    ledger: Arc<EventLedger>,
    last_rate_timestamp: f64,
    sink: Option<Box<dyn RateSink>>,
}

impl RateAggregator {
    /// Start the first window at `now`.
    pub fn new(ledger: Arc<EventLedger>, now: f64) -> Self {
        Self {
            ledger,
            last_rate_timestamp: now,
            sink: None,
        }
    }

    /// Forward every computed rate to `sink`.
    pub fn with_sink(mut self, sink: Box<dyn RateSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn last_rate_timestamp(&self) -> f64 {
        self.last_rate_timestamp
    }

    /// Events per second in `[last_rate_timestamp, now]`, then advance the cursor.
    ///
    /// `now` must be strictly after the cursor. Otherwise nothing is counted,
    /// the cursor stays put, nothing is logged to the sink, and 0 is returned.
    pub fn compute_rate(&mut self, now: f64) -> Result<f64> {
        let start = self.last_rate_timestamp;
        if now.is_nan() || now <= start {
            log::warn!(
                "rate requested at {:.6}s but window starts at {:.6}s; returning 0",
                now,
                start
            );
            return Ok(0.0);
        }

        let n = self.ledger.count_in_range(start, now)?;
        let rate = n as f64 / (now - start);
        self.last_rate_timestamp = now;

        log::debug!(
            "rate window [{:.3}, {:.3}]: {} events, {:.4} /s",
            start,
            now,
            n,
            rate
        );
        if let Some(sink) = self.sink.as_mut() {
            sink.record(now, rate)?;
        }
        Ok(rate)
    }

    /// Start a new window at `now`. The ledger is left alone.
    ///
    /// The cursor never moves backwards; an earlier `now` is ignored.
    pub fn reset(&mut self, now: f64) {
        if now < self.last_rate_timestamp {
            log::warn!(
                "rate reset to {:.6}s ignored; cursor already at {:.6}s",
                now,
                self.last_rate_timestamp
            );
            return;
        }
        self.last_rate_timestamp = now;
    }
}

//! Cell Counter
//!
//! Counts cells passing through a region of interest of a grayscale sensor by
//! watching the frame-to-frame motion inside that region.
//!
//! # Architecture
//!
//! Frame Source → ROI extraction → frame differencing → motion state machine →
//! event ledger ← rate aggregator → sinks.
//!
//! - One processing thread runs extraction, differencing and detection per frame.
//! - Periodic contexts (display refresh, rate timer) only touch the ledger and
//!   the rate cursor.
//! - Time comes from an explicit `Clock` handle, never from a global.
//!
//! # Module Structure
//!
//! - `frame`: frames, ROI rectangles, region extraction
//! - `detect`: differencing, motion state machine, `CellDetector`
//! - `ledger`: thread-safe event ledger
//! - `rate`: windowed detection rate
//! - `storage`: rate time-series sinks (CSV, in-memory)
//! - `session`: ledger + rate cursor ownership and the restart-tracing reset
//! - `pipeline`: processing thread, live controls, FPS
//! - `ingest`: frame sources (synthetic, image directories)
//! - `config`, `control`: daemon configuration and operator commands

pub mod clock;
pub mod config;
pub mod control;
pub mod detect;
pub mod frame;
pub mod ingest;
pub mod ledger;
pub mod pipeline;
pub mod rate;
pub mod session;
pub mod storage;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::CounterConfig;
pub use control::ControlCommand;
pub use detect::{CellDetector, DetectionEvent, FrameDiffer, MotionDetector, MotionSample, MotionState};
pub use frame::{extract_region, ExtractedRegion, Frame, RoiBounds, RoiRect};
pub use ingest::{open_source, FrameSource, SourceConfig, SourceStats, SyntheticSource};
pub use ledger::EventLedger;
pub use pipeline::{Controls, FpsMeter, FrameProcessor, Pipeline, PipelineHandle, PipelineOptions};
pub use rate::RateAggregator;
pub use session::CounterSession;
pub use storage::{CsvRateLog, InMemoryRateLog, RateSink};

//! Rate time-series sinks.
//!
//! Every rate computation can be forwarded to a `RateSink`. `CsvRateLog` is the
//! durable, append-only text log; `InMemoryRateLog` keeps points for display
//! and tests.

use anyhow::{Context, Result};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

pub const CSV_HEADER: &str = "Time (sec), Cells Detected";

pub trait RateSink: Send {
    fn record(&mut self, time_s: f64, rate: f64) -> Result<()>;
}

// ----------------------------------------------------------------------------
// CSV log
// ----------------------------------------------------------------------------

/// Append-only `<time_seconds>, <rate>` log.
///
/// The file is opened on construction and flushed after every line. Dropping
/// the log flushes and closes it.
pub struct CsvRateLog {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl CsvRateLog {
    /// Open (or create) `path` for appending. The header is written only when
    /// the file is empty.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("failed to open rate log {}", path.display()))?;
        let is_empty = file
            .metadata()
            .with_context(|| format!("failed to stat rate log {}", path.display()))?
            .len()
            == 0;
        let mut writer = BufWriter::new(file);
        if is_empty {
            writeln!(writer, "{}", CSV_HEADER)?;
            writer.flush()?;
        }
        log::info!("rate log opened at {}", path.display());
        Ok(Self { path, writer })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RateSink for CsvRateLog {
    fn record(&mut self, time_s: f64, rate: f64) -> Result<()> {
        writeln!(self.writer, "{}, {}", time_s, rate)
            .and_then(|_| self.writer.flush())
            .with_context(|| format!("failed to write rate log {}", self.path.display()))
    }
}

impl Drop for CsvRateLog {
    fn drop(&mut self) {
        if let Err(err) = self.writer.flush() {
            log::warn!("failed to flush rate log {}: {}", self.path.display(), err);
        }
    }
}

/// `cell_detections_<unix seconds>.csv` inside `dir`.
pub fn default_log_path(dir: impl AsRef<Path>) -> Result<PathBuf> {
    let stamp = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();
    Ok(dir
        .as_ref()
        .join(format!("cell_detections_{}.csv", stamp)))
}

// ----------------------------------------------------------------------------
// In-memory log
// ----------------------------------------------------------------------------

/// Cloneable in-memory series. Clones share the same points.
#[derive(Clone, Debug, Default)]
pub struct InMemoryRateLog {
    points: Arc<Mutex<Vec<(f64, f64)>>>,
}

impl InMemoryRateLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn points(&self) -> Vec<(f64, f64)> {
        match self.points.lock() {
            Ok(points) => points.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl RateSink for InMemoryRateLog {
    fn record(&mut self, time_s: f64, rate: f64) -> Result<()> {
        self.points
            .lock()
            .map_err(|_| anyhow::anyhow!("rate log lock poisoned"))?
            .push((time_s, rate));
        Ok(())
    }
}

use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::frame::RoiRect;
use crate::ingest::SourceConfig;

const DEFAULT_THRESHOLD: f32 = 1.0;
const DEFAULT_RATE_INTERVAL_SECS: f64 = 10.0;
const DEFAULT_REFRESH_MS: u64 = 50;

#[derive(Debug, Deserialize, Default)]
struct CounterConfigFile {
    source: Option<SourceConfigFile>,
    roi: Option<RoiConfigFile>,
    detector: Option<DetectorConfigFile>,
    rate: Option<RateConfigFile>,
    display: Option<DisplayConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct SourceConfigFile {
    url: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    target_fps: Option<u32>,
    max_consecutive_failures: Option<u32>,
    seed: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct RoiConfigFile {
    x: Option<f32>,
    y: Option<f32>,
    w: Option<f32>,
    h: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    threshold: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct RateConfigFile {
    interval_secs: Option<f64>,
    log_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct DisplayConfigFile {
    refresh_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct CounterConfig {
    pub source: SourceConfig,
    pub roi: RoiRect,
    pub threshold: f32,
    pub rate: RateSettings,
    pub display: DisplaySettings,
}

#[derive(Debug, Clone)]
pub struct RateSettings {
    pub interval: Duration,
    /// CSV rate log. `None` disables persistence.
    pub log_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct DisplaySettings {
    pub refresh: Duration,
}

impl Default for CounterConfig {
    fn default() -> Self {
        Self {
            source: SourceConfig::default(),
            roi: RoiRect::FULL,
            threshold: DEFAULT_THRESHOLD,
            rate: RateSettings {
                interval: Duration::from_secs_f64(DEFAULT_RATE_INTERVAL_SECS),
                log_path: None,
            },
            display: DisplaySettings {
                refresh: Duration::from_millis(DEFAULT_REFRESH_MS),
            },
        }
    }
}

impl CounterConfig {
    /// Load from `CELL_COUNTER_CONFIG` (if set), then apply env overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("CELL_COUNTER_CONFIG").ok();
        Self::load_from(config_path.as_deref().map(Path::new))
    }

    /// Load from an explicit file (or defaults), then apply env overrides.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => read_config_file(path)?,
            None => CounterConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg)?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: CounterConfigFile) -> Result<Self> {
        let defaults = SourceConfig::default();
        let source_file = file.source.unwrap_or_default();
        let source = SourceConfig {
            url: source_file.url.unwrap_or(defaults.url),
            width: source_file.width.unwrap_or(defaults.width),
            height: source_file.height.unwrap_or(defaults.height),
            target_fps: source_file.target_fps.unwrap_or(defaults.target_fps),
            max_consecutive_failures: source_file
                .max_consecutive_failures
                .unwrap_or(defaults.max_consecutive_failures),
            seed: source_file.seed.or(defaults.seed),
        };

        let roi_file = file.roi.unwrap_or_default();
        let roi = RoiRect {
            x: roi_file.x.unwrap_or(RoiRect::FULL.x),
            y: roi_file.y.unwrap_or(RoiRect::FULL.y),
            w: roi_file.w.unwrap_or(RoiRect::FULL.w),
            h: roi_file.h.unwrap_or(RoiRect::FULL.h),
        };

        let threshold = file
            .detector
            .and_then(|detector| detector.threshold)
            .unwrap_or(DEFAULT_THRESHOLD);

        let rate_file = file.rate.unwrap_or_default();
        let interval_secs = rate_file
            .interval_secs
            .unwrap_or(DEFAULT_RATE_INTERVAL_SECS);
        let rate = RateSettings {
            interval: duration_from_secs(interval_secs)?,
            log_path: rate_file.log_path,
        };

        let display = DisplaySettings {
            refresh: Duration::from_millis(
                file.display
                    .and_then(|display| display.refresh_ms)
                    .unwrap_or(DEFAULT_REFRESH_MS),
            ),
        };

        Ok(Self {
            source,
            roi,
            threshold,
            rate,
            display,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("CELL_COUNTER_SOURCE_URL") {
            if !url.trim().is_empty() {
                self.source.url = url;
            }
        }
        if let Ok(roi) = std::env::var("CELL_COUNTER_ROI") {
            self.roi = parse_roi(&roi)
                .map_err(|e| anyhow!("CELL_COUNTER_ROI must be x,y,w,h: {}", e))?;
        }
        if let Ok(threshold) = std::env::var("CELL_COUNTER_THRESHOLD") {
            self.threshold = threshold
                .trim()
                .parse()
                .map_err(|_| anyhow!("CELL_COUNTER_THRESHOLD must be a number"))?;
        }
        if let Ok(interval) = std::env::var("CELL_COUNTER_RATE_INTERVAL_SECS") {
            let secs: f64 = interval.trim().parse().map_err(|_| {
                anyhow!("CELL_COUNTER_RATE_INTERVAL_SECS must be a number of seconds")
            })?;
            self.rate.interval = duration_from_secs(secs)?;
        }
        if let Ok(path) = std::env::var("CELL_COUNTER_RATE_LOG") {
            if !path.trim().is_empty() {
                self.rate.log_path = Some(PathBuf::from(path));
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("roi.x", self.roi.x),
            ("roi.y", self.roi.y),
            ("roi.w", self.roi.w),
            ("roi.h", self.roi.h),
        ] {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(anyhow!("{} must be within [0, 1] (got {})", name, value));
            }
        }
        if !self.threshold.is_finite() || self.threshold < 0.0 {
            return Err(anyhow!("threshold must be a finite value >= 0"));
        }
        if self.rate.interval.is_zero() {
            return Err(anyhow!("rate interval must be greater than zero"));
        }
        if self.source.width == 0 || self.source.height == 0 {
            return Err(anyhow!("source width and height must be greater than zero"));
        }
        if self.source.target_fps == 0 {
            return Err(anyhow!("source target_fps must be greater than zero"));
        }
        if self.display.refresh.is_zero() {
            return Err(anyhow!("display refresh must be greater than zero"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<CounterConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn duration_from_secs(secs: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(secs)
        .map_err(|_| anyhow!("invalid duration of {} seconds", secs))
}

/// Parse `x,y,w,h` into a ROI.
pub fn parse_roi(value: &str) -> Result<RoiRect> {
    let parts = split_csv(value);
    let [x, y, w, h] = parts.as_slice() else {
        return Err(anyhow!("expected 4 comma-separated values, got {}", parts.len()));
    };
    let parse = |v: &String| -> Result<f32> {
        v.parse()
            .map_err(|_| anyhow!("'{}' is not a number", v))
    };
    Ok(RoiRect::new(parse(x)?, parse(y)?, parse(w)?, parse(h)?))
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = CounterConfig::default();
        assert_eq!(cfg.source.url, "stub://cells");
        assert_eq!(cfg.roi, RoiRect::FULL);
        assert_eq!(cfg.threshold, DEFAULT_THRESHOLD);
        assert_eq!(cfg.rate.interval, Duration::from_secs(10));
        assert!(cfg.rate.log_path.is_none());
        cfg.validate().unwrap();
    }

    #[test]
    fn parse_roi_accepts_four_values() {
        assert_eq!(
            parse_roi(" 0.1, 0.2 ,0.3,0.4").unwrap(),
            RoiRect::new(0.1, 0.2, 0.3, 0.4)
        );
        assert!(parse_roi("0.1,0.2,0.3").is_err());
        assert!(parse_roi("a,b,c,d").is_err());
    }

    #[test]
    fn validate_rejects_out_of_range_values() {
        let mut cfg = CounterConfig::default();
        cfg.roi.w = 1.5;
        assert!(cfg.validate().is_err());

        let mut cfg = CounterConfig::default();
        cfg.threshold = -0.1;
        assert!(cfg.validate().is_err());

        let mut cfg = CounterConfig::default();
        cfg.rate.interval = Duration::ZERO;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn negative_interval_is_rejected() {
        assert!(duration_from_secs(-1.0).is_err());
        assert!(duration_from_secs(f64::NAN).is_err());
    }
}

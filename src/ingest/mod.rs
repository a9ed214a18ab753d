//! Frame sources.
//!
//! This module provides the sources the processing loop pulls frames from:
//! - Synthetic cell stream (`stub://...`) for tests and demos
//! - Directory of image files (feature: ingest-image)
//!
//! Sources hand over owned, validated `Frame`s. A source may fail transiently
//! (timeouts); retrying is the caller's decision. `Ok(None)` means the stream
//! has ended.

#[cfg(feature = "ingest-image")]
pub mod image_dir;
pub mod synthetic;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::frame::Frame;

#[cfg(feature = "ingest-image")]
pub use image_dir::ImageDirSource;
pub use synthetic::SyntheticSource;

pub const DEFAULT_SOURCE_URL: &str = "stub://cells";

/// Configuration for a frame source.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// `stub://<name>` for the synthetic stream, otherwise an image directory.
    pub url: String,
    /// Frame width (synthetic frames).
    pub width: u32,
    /// Frame height (synthetic frames).
    pub height: u32,
    /// Pacing for the processing loop. 0 runs unpaced.
    pub target_fps: u32,
    /// Consecutive `next_frame` failures tolerated before the loop gives up.
    pub max_consecutive_failures: u32,
    /// Seed for the synthetic stream. `None` draws one from the OS.
    pub seed: Option<u64>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_SOURCE_URL.to_string(),
            width: 128,
            height: 128,
            target_fps: 30,
            max_consecutive_failures: 5,
            seed: None,
        }
    }
}

/// Statistics for a frame source.
#[derive(Clone, Debug, Default)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub url: String,
}

pub trait FrameSource: Send {
    /// Prepare the source. Called once before the first frame.
    fn connect(&mut self) -> Result<()> {
        Ok(())
    }

    /// Next frame, or `None` once the stream is exhausted.
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    fn stats(&self) -> SourceStats;
}

/// Open the source named by `config.url`.
pub fn open_source(config: &SourceConfig) -> Result<Box<dyn FrameSource>> {
    if config.url.starts_with("stub://") {
        return Ok(Box::new(SyntheticSource::new(config.clone())?));
    }
    if config.url.contains("://") && !config.url.starts_with("file://") {
        return Err(anyhow!(
            "unsupported frame source '{}' (expected stub:// or a local path)",
            config.url
        ));
    }
    #[cfg(feature = "ingest-image")]
    {
        let path = config.url.trim_start_matches("file://");
        Ok(Box::new(ImageDirSource::new(path)?))
    }
    #[cfg(not(feature = "ingest-image"))]
    {
        Err(anyhow!(
            "image directory sources require the ingest-image feature"
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_url_opens_synthetic_source() {
        let config = SourceConfig {
            seed: Some(1),
            ..SourceConfig::default()
        };
        let mut source = open_source(&config).unwrap();
        source.connect().unwrap();
        let frame = source.next_frame().unwrap().unwrap();
        assert_eq!((frame.width, frame.height), (128, 128));
        assert_eq!(source.stats().frames_captured, 1);
    }

    #[test]
    fn remote_urls_are_rejected() {
        let config = SourceConfig {
            url: "rtsp://camera/stream".to_string(),
            ..SourceConfig::default()
        };
        assert!(open_source(&config).is_err());
    }
}

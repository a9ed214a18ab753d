//! Image directory frame source.
//!
//! Replays a recorded sequence: every PNG/JPEG file in a directory, in file name
//! order, converted to 8-bit grayscale. Frames may differ in size; the detector
//! treats a size change as a new baseline.

use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};

use super::{FrameSource, SourceStats};
use crate::frame::Frame;

const EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

pub struct ImageDirSource {
    dir: PathBuf,
    files: Vec<PathBuf>,
    cursor: usize,
}

impl ImageDirSource {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        if !dir.is_dir() {
            return Err(anyhow!("image source {} is not a directory", dir.display()));
        }
        Ok(Self {
            dir,
            files: Vec::new(),
            cursor: 0,
        })
    }

    fn scan(&mut self) -> Result<()> {
        let mut files = Vec::new();
        for entry in std::fs::read_dir(&self.dir)
            .with_context(|| format!("failed to list {}", self.dir.display()))?
        {
            let path = entry?.path();
            let is_image = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                .unwrap_or(false);
            if is_image && path.is_file() {
                files.push(path);
            }
        }
        files.sort();
        self.files = files;
        self.cursor = 0;
        Ok(())
    }
}

impl FrameSource for ImageDirSource {
    fn connect(&mut self) -> Result<()> {
        self.scan()?;
        if self.files.is_empty() {
            return Err(anyhow!("no image files found in {}", self.dir.display()));
        }
        log::info!(
            "ImageDirSource: {} frames in {}",
            self.files.len(),
            self.dir.display()
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let Some(path) = self.files.get(self.cursor) else {
            return Ok(None);
        };
        self.cursor += 1;
        let img = image::open(path)
            .with_context(|| format!("failed to decode {}", path.display()))?
            .into_luma8();
        let (width, height) = img.dimensions();
        Frame::new(img.into_raw(), width, height).map(Some)
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.cursor as u64,
            url: self.dir.display().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    #[test]
    fn replays_images_in_name_order_then_ends() {
        let dir = tempfile::tempdir().unwrap();
        for (name, value) in [("b.png", 20u8), ("a.png", 10), ("c.png", 30)] {
            let img = GrayImage::from_pixel(4, 3, Luma([value]));
            img.save(dir.path().join(name)).unwrap();
        }
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let mut source = ImageDirSource::new(dir.path()).unwrap();
        source.connect().unwrap();
        let values: Vec<u8> = std::iter::from_fn(|| source.next_frame().unwrap())
            .map(|frame| frame.pixels()[0])
            .collect();
        assert_eq!(values, vec![10, 20, 30]);
        assert_eq!(source.stats().frames_captured, 3);
    }

    #[test]
    fn empty_directory_fails_to_connect() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = ImageDirSource::new(dir.path()).unwrap();
        assert!(source.connect().is_err());
    }
}

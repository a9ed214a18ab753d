//! Frames and region-of-interest extraction.
//!
//! - `Frame`: immutable 8-bit grayscale snapshot handed over by a frame source.
//! - `RoiRect`: normalized rectangle (fractions of the frame) chosen by the operator.
//! - `ExtractedRegion`: owned copy of the pixels inside the ROI plus the absolute
//!   pixel bounds used for overlays.
//!
//! Extraction always copies. The region handed to the detector never aliases the
//! source's frame buffer, so the source is free to reuse or drop the frame.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

// ----------------------------------------------------------------------------
// Frame
// ----------------------------------------------------------------------------

/// Immutable grayscale frame. One byte per pixel, row-major.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl Frame {
    /// Wrap a pixel buffer. Fails on zero dimensions or a buffer of the wrong size.
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(anyhow!(
                "frame dimensions must be non-zero (got {}x{})",
                width,
                height
            ));
        }
        let expected = width as usize * height as usize;
        if data.len() != expected {
            return Err(anyhow!(
                "frame buffer length {} does not match {}x{} ({} bytes)",
                data.len(),
                width,
                height,
                expected
            ));
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<u8> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.data
            .get(y as usize * self.width as usize + x as usize)
            .copied()
    }

    /// Returns a copy of this frame with a one-pixel rectangle outline drawn on `bounds`.
    ///
    /// `self` is left untouched.
    pub fn with_roi_overlay(&self, bounds: RoiBounds, value: u8) -> Frame {
        let mut data = self.data.clone();
        let w = self.width as usize;
        let x2 = bounds.x2.min(self.width - 1) as usize;
        let y2 = bounds.y2.min(self.height - 1) as usize;
        let x1 = (bounds.x1 as usize).min(x2);
        let y1 = (bounds.y1 as usize).min(y2);

        for x in x1..=x2 {
            data[y1 * w + x] = value;
            data[y2 * w + x] = value;
        }
        for y in y1..=y2 {
            data[y * w + x1] = value;
            data[y * w + x2] = value;
        }

        Frame {
            data,
            width: self.width,
            height: self.height,
        }
    }

    /// Write the frame as a grayscale image. The format follows the extension.
    #[cfg(feature = "ingest-image")]
    pub fn save(&self, path: impl AsRef<std::path::Path>) -> Result<()> {
        let path = path.as_ref();
        let img = image::GrayImage::from_raw(self.width, self.height, self.data.clone())
            .ok_or_else(|| anyhow!("frame buffer does not fit {}x{}", self.width, self.height))?;
        img.save(path)
            .map_err(|e| anyhow!("failed to write {}: {}", path.display(), e))
    }
}

// ----------------------------------------------------------------------------
// ROI
// ----------------------------------------------------------------------------

/// Normalized region of interest. All components are fractions in `[0, 1]`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoiRect {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl RoiRect {
    pub const FULL: RoiRect = RoiRect {
        x: 0.0,
        y: 0.0,
        w: 1.0,
        h: 1.0,
    };

    pub fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self { x, y, w, h }
    }

    /// Clamp every component into `[0, 1]`. Non-finite values become 0.
    pub fn clamped(self) -> Self {
        fn unit(v: f32) -> f32 {
            if v.is_finite() {
                v.clamp(0.0, 1.0)
            } else {
                0.0
            }
        }
        Self {
            x: unit(self.x),
            y: unit(self.y),
            w: unit(self.w),
            h: unit(self.h),
        }
    }

    /// Absolute, inclusive pixel bounds of this ROI inside a `width`x`height` frame.
    pub fn bounds(&self, width: u32, height: u32) -> RoiBounds {
        let roi = self.clamped();
        let max_x = width.saturating_sub(1);
        let max_y = height.saturating_sub(1);

        // Truncating casts are floors here since every operand is non-negative.
        let x1 = ((max_x as f32 * roi.x) as u32).min(max_x);
        let y1 = ((max_y as f32 * roi.y) as u32).min(max_y);
        let w = (width as f32 * roi.w) as u32;
        let h = (height as f32 * roi.h) as u32;

        RoiBounds {
            x1,
            y1,
            x2: max_x.min(x1.saturating_add(w)),
            y2: max_y.min(y1.saturating_add(h)),
        }
    }
}

impl Default for RoiRect {
    fn default() -> Self {
        Self::FULL
    }
}

/// Inclusive pixel rectangle `(x1, y1)..=(x2, y2)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoiBounds {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

impl RoiBounds {
    pub fn width(&self) -> u32 {
        self.x2 - self.x1 + 1
    }

    pub fn height(&self) -> u32 {
        self.y2 - self.y1 + 1
    }
}

// ----------------------------------------------------------------------------
// Extracted region
// ----------------------------------------------------------------------------

/// Owned pixels of the ROI for one frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtractedRegion {
    pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub bounds: RoiBounds,
}

impl ExtractedRegion {
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn into_pixels(self) -> Vec<u8> {
        self.pixels
    }

    pub fn len(&self) -> usize {
        self.pixels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    /// Build a region directly from pixels, bypassing a source frame.
    ///
    /// Like `extract_region`, the result is at least 1x1 and its bounds cover
    /// exactly `width` x `height` pixels.
    pub fn from_pixels(pixels: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(anyhow!(
                "region dimensions must be non-zero (got {}x{})",
                width,
                height
            ));
        }
        if pixels.len() != width as usize * height as usize {
            return Err(anyhow!(
                "region buffer length {} does not match {}x{}",
                pixels.len(),
                width,
                height
            ));
        }
        let bounds = RoiBounds {
            x1: 0,
            y1: 0,
            x2: width - 1,
            y2: height - 1,
        };
        Ok(Self {
            pixels,
            width,
            height,
            bounds,
        })
    }
}

/// Copy the pixels covered by `roi` out of `frame`.
///
/// Never fails: the ROI is clamped to the frame and the result is at least 1x1.
pub fn extract_region(frame: &Frame, roi: &RoiRect) -> ExtractedRegion {
    let bounds = roi.bounds(frame.width, frame.height);
    let region_w = bounds.width() as usize;
    let region_h = bounds.height() as usize;
    let frame_w = frame.width as usize;
    let x1 = bounds.x1 as usize;

    let mut pixels = Vec::with_capacity(region_w * region_h);
    for y in bounds.y1 as usize..=bounds.y2 as usize {
        let row = y * frame_w;
        pixels.extend_from_slice(&frame.data[row + x1..row + x1 + region_w]);
    }

    ExtractedRegion {
        pixels,
        width: region_w as u32,
        height: region_h as u32,
        bounds,
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp_frame(width: u32, height: u32) -> Frame {
        let data = (0..width * height).map(|i| (i % 251) as u8).collect();
        Frame::new(data, width, height).unwrap()
    }

    #[test]
    fn frame_rejects_bad_dimensions() {
        assert!(Frame::new(vec![], 0, 4).is_err());
        assert!(Frame::new(vec![0; 10], 4, 4).is_err());
        assert!(Frame::new(vec![0; 16], 4, 4).is_ok());
    }

    #[test]
    fn full_roi_returns_unmodified_frame() {
        for (w, h) in [(1, 1), (7, 3), (64, 48), (128, 128)] {
            let frame = ramp_frame(w, h);
            let region = extract_region(&frame, &RoiRect::FULL);
            assert_eq!(region.width, w);
            assert_eq!(region.height, h);
            assert_eq!(region.pixels(), frame.pixels());
        }
    }

    #[test]
    fn bounds_follow_floor_and_clip_arithmetic() {
        // x1 = floor(99 * 0.25) = 24, w = floor(100 * 0.5) = 50, x2 = 74
        // y1 = floor(49 * 0.5) = 24, h = floor(50 * 0.8) = 40, y2 = min(49, 64) = 49
        let bounds = RoiRect::new(0.25, 0.5, 0.5, 0.8).bounds(100, 50);
        assert_eq!(
            bounds,
            RoiBounds {
                x1: 24,
                y1: 24,
                x2: 74,
                y2: 49
            }
        );
        assert_eq!(bounds.width(), 51);
        assert_eq!(bounds.height(), 26);
    }

    #[test]
    fn extracted_pixels_match_source_window() {
        let frame = ramp_frame(10, 8);
        let region = extract_region(&frame, &RoiRect::new(0.3, 0.2, 0.2, 0.25));
        let b = region.bounds;
        for ry in 0..region.height {
            for rx in 0..region.width {
                let expected = frame.pixel(rx + b.x1, ry + b.y1).unwrap();
                let got = region.pixels()[(ry * region.width + rx) as usize];
                assert_eq!(got, expected);
            }
        }
    }

    #[test]
    fn region_is_never_empty_and_never_larger_than_frame() {
        let fractions = [0.0f32, 0.01, 0.33, 0.5, 0.99, 1.0];
        for &(w, h) in &[(1u32, 1u32), (5, 9), (128, 128)] {
            let frame = ramp_frame(w, h);
            for &x in &fractions {
                for &fw in &fractions[1..] {
                    let region = extract_region(&frame, &RoiRect::new(x, 1.0 - x, fw, fw));
                    assert!(region.width >= 1 && region.width <= w);
                    assert!(region.height >= 1 && region.height <= h);
                    assert_eq!(region.len(), (region.width * region.height) as usize);
                }
            }
        }
    }

    #[test]
    fn out_of_range_roi_is_clamped() {
        let frame = ramp_frame(20, 20);
        let region = extract_region(&frame, &RoiRect::new(-3.0, f32::NAN, 7.0, -1.0));
        assert_eq!(region.bounds.x1, 0);
        assert_eq!(region.bounds.y1, 0);
        assert_eq!(region.width, 20);
        assert_eq!(region.height, 1);
    }

    #[test]
    fn overlay_draws_outline_on_copy() {
        let frame = Frame::new(vec![0; 25], 5, 5).unwrap();
        let bounds = RoiBounds {
            x1: 1,
            y1: 1,
            x2: 3,
            y2: 3,
        };
        let overlaid = frame.with_roi_overlay(bounds, 0xFF);

        assert!(frame.pixels().iter().all(|&p| p == 0));
        assert_eq!(overlaid.pixel(1, 1), Some(0xFF));
        assert_eq!(overlaid.pixel(3, 2), Some(0xFF));
        assert_eq!(overlaid.pixel(2, 2), Some(0));
        assert_eq!(overlaid.pixel(0, 0), Some(0));
        assert_eq!(overlaid.pixels().iter().filter(|&&p| p == 0xFF).count(), 8);
    }

    #[test]
    fn region_from_pixels_has_consistent_bounds() {
        assert!(ExtractedRegion::from_pixels(vec![], 0, 0).is_err());
        assert!(ExtractedRegion::from_pixels(vec![], 3, 0).is_err());
        assert!(ExtractedRegion::from_pixels(vec![0; 5], 2, 2).is_err());

        let region = ExtractedRegion::from_pixels(vec![7; 6], 3, 2).unwrap();
        assert_eq!(region.bounds.width(), region.width);
        assert_eq!(region.bounds.height(), region.height);
        assert_eq!(region.len(), 6);
        assert!(!region.is_empty());
    }

    #[cfg(feature = "ingest-image")]
    #[test]
    fn overlay_snapshot_is_written_as_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.png");
        let frame = ramp_frame(16, 8);
        let bounds = RoiRect::new(0.25, 0.25, 0.5, 0.5).bounds(16, 8);
        frame.with_roi_overlay(bounds, 0xFF).save(&path).unwrap();

        let img = image::open(&path).unwrap().into_luma8();
        assert_eq!(img.dimensions(), (16, 8));
        assert_eq!(img.get_pixel(bounds.x1, bounds.y1).0[0], 0xFF);
        assert_eq!(img.get_pixel(0, 0).0[0], frame.pixel(0, 0).unwrap());
    }
}

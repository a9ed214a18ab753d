//! Synthetic cell stream.
//!
//! Renders a static textured channel with one bright disc at a time drifting
//! left to right, like a cell carried through a microfluidic channel. The disc
//! moves a whole number of pixels per frame so its raster never changes shape;
//! the frame-to-frame motion inside a full-frame ROI therefore ramps up while a
//! cell enters, stays flat, and ramps down as it leaves.

use anyhow::{anyhow, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{FrameSource, SourceConfig, SourceStats};
use crate::frame::Frame;

const BACKGROUND_BASE: u8 = 40;
const BACKGROUND_SPREAD: u8 = 8;
const CELL_VALUE: u8 = 220;

#[derive(Clone, Copy, Debug)]
struct Cell {
    x: i64,
    y: i64,
}

pub struct SyntheticSource {
    config: SourceConfig,
    rng: StdRng,
    background: Vec<u8>,
    radius: i64,
    speed: i64,
    cell: Option<Cell>,
    next_spawn: u64,
    frame_count: u64,
    cells_spawned: u64,
    cells_completed: u64,
}

impl SyntheticSource {
    pub fn new(config: SourceConfig) -> Result<Self> {
        if config.width == 0 || config.height == 0 {
            return Err(anyhow!("synthetic source needs non-zero dimensions"));
        }
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let pixel_count = config.width as usize * config.height as usize;
        let background = (0..pixel_count)
            .map(|_| BACKGROUND_BASE + rng.gen_range(0..BACKGROUND_SPREAD))
            .collect();
        let radius = (config.width.min(config.height) as i64 / 16).max(2);
        let speed = (radius / 2).max(1);

        Ok(Self {
            config,
            rng,
            background,
            radius,
            speed,
            cell: None,
            next_spawn: 1,
            frame_count: 0,
            cells_spawned: 0,
            cells_completed: 0,
        })
    }

    /// Cells that have entered the channel so far.
    pub fn cells_spawned(&self) -> u64 {
        self.cells_spawned
    }

    /// Cells that have fully left the frame.
    pub fn cells_completed(&self) -> u64 {
        self.cells_completed
    }

    fn spawn_if_due(&mut self) {
        if self.cell.is_some() || self.frame_count < self.next_spawn {
            return;
        }
        let height = self.config.height as i64;
        let y = if height > 2 * self.radius {
            self.rng.gen_range(self.radius..height - self.radius)
        } else {
            height / 2
        };
        self.cell = Some(Cell {
            x: -self.radius,
            y,
        });
        self.cells_spawned += 1;
    }

    fn render(&self) -> Vec<u8> {
        let mut pixels = self.background.clone();
        let Some(cell) = self.cell else {
            return pixels;
        };
        let width = self.config.width as i64;
        let height = self.config.height as i64;
        let r = self.radius;
        for y in (cell.y - r).max(0)..=(cell.y + r).min(height - 1) {
            for x in (cell.x - r).max(0)..=(cell.x + r).min(width - 1) {
                let (dx, dy) = (x - cell.x, y - cell.y);
                if dx * dx + dy * dy <= r * r {
                    pixels[(y * width + x) as usize] = CELL_VALUE;
                }
            }
        }
        pixels
    }

    fn advance(&mut self) {
        let Some(cell) = self.cell.as_mut() else {
            return;
        };
        cell.x += self.speed;
        if cell.x - self.radius >= self.config.width as i64 {
            self.cell = None;
            self.cells_completed += 1;
            let traversal = (self.config.width as i64 + 2 * self.radius) / self.speed;
            let gap = self.rng.gen_range(2..=traversal.max(2) as u64);
            self.next_spawn = self.frame_count + gap;
        }
    }
}

impl FrameSource for SyntheticSource {
    fn connect(&mut self) -> Result<()> {
        log::info!(
            "SyntheticSource: connected to {} ({}x{}, cell radius {} px)",
            self.config.url,
            self.config.width,
            self.config.height,
            self.radius
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        self.frame_count += 1;
        self.spawn_if_due();
        let pixels = self.render();
        self.advance();
        Frame::new(pixels, self.config.width, self.config.height).map(Some)
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            url: self.config.url.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{absolute_difference, mean_intensity};

    fn source(width: u32, height: u32, seed: u64) -> SyntheticSource {
        SyntheticSource::new(SourceConfig {
            width,
            height,
            seed: Some(seed),
            ..SourceConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn same_seed_gives_same_stream() {
        let mut a = source(64, 32, 7);
        let mut b = source(64, 32, 7);
        for _ in 0..100 {
            assert_eq!(a.next_frame().unwrap(), b.next_frame().unwrap());
        }
    }

    #[test]
    fn cells_pass_one_at_a_time() {
        let mut src = source(64, 64, 3);
        for _ in 0..2000 {
            src.next_frame().unwrap();
            assert!(src.cells_spawned() - src.cells_completed() <= 1);
        }
        assert!(src.cells_completed() > 5);
    }

    #[test]
    fn motion_ramps_up_while_cell_enters() {
        let mut src = source(96, 96, 11);
        let mut prev = src.next_frame().unwrap().unwrap();
        let mut amounts = Vec::new();
        while src.cells_completed() == 0 {
            let frame = src.next_frame().unwrap().unwrap();
            amounts.push(mean_intensity(&absolute_difference(frame.pixels(), prev.pixels())));
            prev = frame;
        }
        let peak = amounts.iter().cloned().fold(0.0f32, f32::max);
        assert!(peak > 1.0, "peak motion {} too low", peak);

        // Entry: non-decreasing until the disc is nearly fully inside.
        // The textured background makes the plateau wobble slightly, so the
        // ramp ends at the first reading close to the peak.
        let ramp_end = amounts.iter().position(|&a| a >= 0.95 * peak).unwrap();
        assert!(ramp_end >= 2, "entry ramp too short: {:?}", &amounts[..=ramp_end]);
        assert!(
            amounts[..=ramp_end].windows(2).all(|w| w[0] <= w[1]),
            "entry ramp dips: {:?}",
            &amounts[..=ramp_end]
        );

        // Plateau: while fully inside, the reading stays near the peak and
        // well above the level where the cell first appeared.
        let plateau: Vec<f32> = amounts[ramp_end..]
            .iter()
            .copied()
            .take_while(|&a| a >= 0.9 * peak)
            .collect();
        assert!(plateau.len() > 5);
        assert!(plateau.iter().all(|&a| a > amounts[0]));
    }
}

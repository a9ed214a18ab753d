/// Elementwise `|a[i] - b[i]|`. Both slices must have the same length.
pub fn absolute_difference(a: &[u8], b: &[u8]) -> Vec<u8> {
    debug_assert_eq!(a.len(), b.len());
    a.iter().zip(b).map(|(x, y)| x.abs_diff(*y)).collect()
}

/// Arithmetic mean of a byte buffer; 0 for an empty buffer.
pub fn mean_intensity(buf: &[u8]) -> f32 {
    if buf.is_empty() {
        return 0.0;
    }
    let sum: u64 = buf.iter().map(|&v| v as u64).sum();
    (sum as f64 / buf.len() as f64) as f32
}

/// Keeps the previous ROI buffer and differences each new one against it.
///
/// The differ takes ownership of every region it is given. When the new region
/// has a different length than the stored one (first frame, ROI resize) it only
/// replaces the baseline and reports no difference.
#[derive(Debug, Default)]
pub struct FrameDiffer {
    last: Option<Vec<u8>>,
    scratch: Vec<u8>,
}

impl FrameDiffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `current` as the new baseline and return its difference against
    /// the previous one, or `None` on a warm-up frame.
    pub fn push(&mut self, current: Vec<u8>) -> Option<&[u8]> {
        match self.last.take() {
            Some(prev) if prev.len() == current.len() => {
                self.scratch.clear();
                self.scratch
                    .extend(current.iter().zip(&prev).map(|(a, b)| a.abs_diff(*b)));
                self.last = Some(current);
                Some(self.scratch.as_slice())
            }
            Some(prev) => {
                log::debug!(
                    "region size changed ({} -> {} px), resetting baseline",
                    prev.len(),
                    current.len()
                );
                self.last = Some(current);
                None
            }
            None => {
                self.last = Some(current);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_difference_is_zero() {
        let a: Vec<u8> = (0..=255).collect();
        assert!(absolute_difference(&a, &a).iter().all(|&d| d == 0));
    }

    #[test]
    fn difference_is_absolute() {
        assert_eq!(
            absolute_difference(&[0, 255, 10, 200], &[255, 0, 30, 190]),
            vec![255, 255, 20, 10]
        );
    }

    #[test]
    fn mean_of_empty_buffer_is_zero() {
        assert_eq!(mean_intensity(&[]), 0.0);
        assert_eq!(mean_intensity(&[1, 2, 3, 6]), 3.0);
    }

    #[test]
    fn first_frame_and_resize_are_warm_up() {
        let mut differ = FrameDiffer::new();
        assert!(differ.push(vec![1, 2, 3, 4]).is_none());
        assert_eq!(differ.push(vec![2, 2, 1, 8]), Some(&[1u8, 0, 2, 4][..]));

        // Size change only swaps the baseline.
        assert!(differ.push(vec![9, 9]).is_none());
        assert_eq!(differ.push(vec![9, 7]), Some(&[0u8, 2][..]));
    }
}

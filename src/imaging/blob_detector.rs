use super::TargetDetector;
use crate::tracking::Detection;
use image::{Rgb, RgbImage};

/// Colour-threshold detector for a single saturated red target.
///
/// Reports the centroid of all matching pixels and the width of their
/// bounding box as the size metric.
#[derive(Debug, Clone, Copy)]
pub struct BlobDetector {
    min_pixels: u32,
}

impl BlobDetector {
    /// Fewer matching pixels than this count as noise.
    pub const DEFAULT_MIN_PIXELS: u32 = 12;

    pub fn new(min_pixels: u32) -> Self { Self { min_pixels } }

    fn is_target(Rgb([r, g, b]): Rgb<u8>) -> bool { r > 150 && g < 100 && b < 100 }
}

impl Default for BlobDetector {
    fn default() -> Self { Self::new(Self::DEFAULT_MIN_PIXELS) }
}

impl TargetDetector for BlobDetector {
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    fn detect(&mut self, frame: &RgbImage) -> Option<Detection> {
        let mut count = 0u64;
        let (mut sum_x, mut sum_y) = (0u64, 0u64);
        let (mut min_x, mut max_x) = (u32::MAX, 0u32);
        for (x, y, pixel) in frame.enumerate_pixels() {
            if Self::is_target(*pixel) {
                count += 1;
                sum_x += u64::from(x);
                sum_y += u64::from(y);
                min_x = min_x.min(x);
                max_x = max_x.max(x);
            }
        }
        if count < u64::from(self.min_pixels) {
            return None;
        }
        let cx = (sum_x / count) as i32;
        let cy = (sum_y / count) as i32;
        Some(Detection::new(cx, cy, (max_x - min_x + 1) as i32))
    }

    fn name(&self) -> &'static str { "blob" }
}

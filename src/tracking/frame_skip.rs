/// Decides which frames run the (expensive) detector.
///
/// With `every = n`, detection runs on frames `1, 1+n, 1+2n, ...` and the
/// remaining frames replay the last cached detection.
#[derive(Debug, Clone, Copy)]
pub struct FrameSkip {
    every: u32,
    frame_count: u64,
}

impl FrameSkip {
    pub fn new(every: u32) -> Self { Self { every: every.max(1), frame_count: 0 } }

    /// Advances to the next frame and returns whether it must be detected.
    pub fn next_frame(&mut self) -> bool {
        self.frame_count += 1;
        (self.frame_count - 1) % u64::from(self.every) == 0
    }

    pub fn frame_count(&self) -> u64 { self.frame_count }

    pub fn reset(&mut self) { self.frame_count = 0; }
}

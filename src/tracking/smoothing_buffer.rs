use itertools::Itertools;
use std::collections::VecDeque;

/// One observation of the target in frame pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub x: f32,
    pub y: f32,
    pub size: f32,
}

impl Sample {
    pub fn new(x: f32, y: f32, size: f32) -> Self { Self { x, y, size } }
}

/// Fixed capacity history of recent target samples.
///
/// The oldest sample is evicted once [`SmoothingBuffer::CAPACITY`] is
/// exceeded, so the buffer never grows past five entries.
#[derive(Debug, Clone, Default)]
pub struct SmoothingBuffer {
    samples: VecDeque<Sample>,
}

impl SmoothingBuffer {
    pub const CAPACITY: usize = 5;
    /// Weights for the three most recent samples, oldest first.
    pub const WEIGHTS: [f32; 3] = [0.2, 0.3, 0.5];

    pub fn new() -> Self { Self { samples: VecDeque::with_capacity(Self::CAPACITY) } }

    pub fn push(&mut self, sample: Sample) {
        if self.samples.len() == Self::CAPACITY {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn len(&self) -> usize { self.samples.len() }

    pub fn is_empty(&self) -> bool { self.samples.is_empty() }

    pub fn clear(&mut self) { self.samples.clear() }

    /// Returns the weighted average over the last three samples.
    ///
    /// With fewer than three samples the newest sample is passed through
    /// unchanged, `None` if the buffer is empty.
    pub fn smoothed(&self) -> Option<Sample> {
        let n = Self::WEIGHTS.len();
        if self.samples.len() < n {
            return self.samples.back().copied();
        }
        let recent = self.samples.iter().skip(self.samples.len() - n);
        let avg = recent.zip_eq(Self::WEIGHTS).fold(Sample::new(0.0, 0.0, 0.0), |acc, (s, w)| {
            Sample::new(acc.x + s.x * w, acc.y + s.y * w, acc.size + s.size * w)
        });
        Some(avg)
    }
}

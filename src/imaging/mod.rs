//! Camera frame handling between the vehicle video feed and the tracking law.

mod blob_detector;
mod frame_buffer;


pub use blob_detector::BlobDetector;
pub use frame_buffer::FrameBuffer;

use crate::tracking::Detection;
use image::RgbImage;

/// Vision front-end locating the followed person in a square frame.
///
/// Implementations may be expensive, which is why the detection loop only
/// calls them on every n-th frame.
pub trait TargetDetector: Send {
    /// Returns the target centre and apparent size in frame pixels.
    fn detect(&mut self, frame: &RgbImage) -> Option<Detection>;

    fn name(&self) -> &'static str;
}

/// Centre-crops a frame to a square of side `min(width, height)`.
pub fn square_crop(frame: &RgbImage) -> RgbImage {
    let (w, h) = frame.dimensions();
    let side = w.min(h);
    if w == h {
        return frame.clone();
    }
    image::imageops::crop_imm(frame, (w - side) / 2, (h - side) / 2, side, side).to_image()
}

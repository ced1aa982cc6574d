//! Perception-to-command mapping: smoothing, directional intent, depth
//! thresholds and velocity smoothing.

mod direction;
mod frame_skip;
mod smoothing_buffer;
mod thresholds;
mod tracking_cell;
mod tracking_law;


pub use direction::{Depth, DirectionFlags, DirectionIntent, Horizontal, Lateral, Vertical};
pub use frame_skip::FrameSkip;
pub use smoothing_buffer::{Sample, SmoothingBuffer};
pub use thresholds::{ThresholdError, ThresholdPair};
pub use tracking_cell::TrackingCell;
pub use tracking_law::{
    AxisVelocity, Detection, FrameGeometry, TrackSnapshot, TrackState, TrackingLaw, VelocityCommand, smooth,
    to_command,
};

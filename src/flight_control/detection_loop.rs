use super::actuator::VehicleActuator;
use crate::imaging::{FrameBuffer, TargetDetector, square_crop};
use crate::tracking::{FrameGeometry, FrameSkip, TrackSnapshot, TrackingCell};
use crate::{info, log};
use image::RgbImage;
use std::{sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;

/// Frame-producing side of the controller.
///
/// Pulls frames from the vehicle, crops them square, publishes them for
/// streaming and feeds the tracking law. The detector only runs on every
/// n-th frame, the others replay the cached detection.
pub struct DetectionLoop {
    actuator: Arc<VehicleActuator>,
    tracking: Arc<TrackingCell>,
    frames: Arc<FrameBuffer>,
    detector: Box<dyn TargetDetector>,
    skip: FrameSkip,
    frame_interval: Duration,
}

impl DetectionLoop {
    /// Back-off while the vehicle has no frame to offer.
    const NO_FRAME_POLL: Duration = Duration::from_millis(100);
    const LOG_EVERY_FRAMES: u64 = 100;

    pub fn new(
        actuator: Arc<VehicleActuator>,
        tracking: Arc<TrackingCell>,
        frames: Arc<FrameBuffer>,
        detector: Box<dyn TargetDetector>,
        frame_skip: u32,
        frame_interval: Duration,
    ) -> Self {
        Self { actuator, tracking, frames, detector, skip: FrameSkip::new(frame_skip), frame_interval }
    }

    /// Runs until `c_tok` is cancelled. The token is checked once per frame.
    pub async fn run(mut self, c_tok: CancellationToken) {
        info!("Detection loop started using {}.", self.detector.name());
        while !c_tok.is_cancelled() {
            let pause = match self.actuator.get_frame() {
                Some(frame) => {
                    let snap = self.process(frame);
                    if snap.frames_processed % Self::LOG_EVERY_FRAMES == 0 {
                        log!(
                            "Frame {}: target {} velocity {:?}",
                            snap.frames_processed,
                            if snap.target_detected { "seen" } else { "lost" },
                            snap.velocity
                        );
                    }
                    self.frame_interval
                }
                None => Self::NO_FRAME_POLL,
            };
            tokio::select! {
                biased;
                () = c_tok.cancelled() => break,
                () = tokio::time::sleep(pause) => {}
            }
        }
        info!("Detection loop stopped after {} frames.", self.skip.frame_count());
    }

    /// Handles a single camera frame.
    pub fn process(&mut self, frame: RgbImage) -> TrackSnapshot {
        let square = square_crop(&frame);
        let geometry = FrameGeometry::square(square.width());
        let snapshot = if self.skip.next_frame() {
            let detection = self.detector.detect(&square);
            self.tracking.observe(detection, geometry)
        } else {
            self.tracking.replay_cached()
        };
        self.frames.publish(Arc::new(square));
        snapshot
    }
}

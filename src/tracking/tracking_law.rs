use super::{
    direction::{Depth, DirectionFlags, DirectionIntent, Horizontal, Vertical},
    smoothing_buffer::{Sample, SmoothingBuffer},
    thresholds::{ThresholdError, ThresholdPair},
};
use crate::config::TrackingConfig;
use crate::{event, track};
use serde::Serialize;

/// Raw detector output in pixels of the square-cropped frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Detection {
    pub x: i32,
    pub y: i32,
    /// Apparent target width, e.g. twice the inter-eye distance.
    pub size: i32,
}

impl Detection {
    pub fn new(x: i32, y: i32, size: i32) -> Self { Self { x, y, size } }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameGeometry {
    pub width: u32,
    pub height: u32,
}

impl FrameGeometry {
    pub fn square(side: u32) -> Self { Self { width: side, height: side } }
}

/// Integer velocity command, each axis in `[-100, 100]`.
///
/// Positive yaw turns right, positive `up_down` climbs, positive
/// `forward_back` closes in on the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct VelocityCommand {
    pub yaw: i32,
    pub up_down: i32,
    pub forward_back: i32,
}

impl VelocityCommand {
    pub fn is_zero(&self) -> bool { *self == Self::default() }
}

/// Continuous per-axis velocity, used both for targets and the filter state.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AxisVelocity {
    pub yaw: f32,
    pub up_down: f32,
    pub forward_back: f32,
}

/// Result of the most recently processed frame.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TrackState {
    /// Smoothed target sample, `None` while no target is seen.
    pub target: Option<Sample>,
    pub intent: Option<DirectionIntent>,
    /// Unsmoothed velocity the control law aims for.
    pub target_velocity: AxisVelocity,
    /// Commanded velocity after exponential smoothing and dead-band.
    pub velocity: VelocityCommand,
    pub frames_processed: u64,
}

impl TrackState {
    pub fn target_detected(&self) -> bool { self.target.is_some() }
}

/// Point-in-time copy handed to status readers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrackSnapshot {
    pub flags: DirectionFlags,
    pub target_detected: bool,
    pub velocity: VelocityCommand,
    pub thresholds: ThresholdPair,
    pub frames_processed: u64,
}

/// Maps per-frame target observations to a smoothed velocity command.
#[derive(Debug, Clone)]
pub struct TrackingLaw {
    config: TrackingConfig,
    thresholds: ThresholdPair,
    default_thresholds: ThresholdPair,
    buffer: SmoothingBuffer,
    /// Smoothed sample and geometry of the last real detection.
    cached: Option<(Sample, FrameGeometry)>,
    filter: AxisVelocity,
    state: TrackState,
}

impl TrackingLaw {
    /// Base forward/backward speed once outside the comfortable size band.
    const DEPTH_BASE_SPEED: f32 = 5.0;
    /// Additional depth speed reached at full size deviation.
    const DEPTH_SPEED_RANGE: f32 = 15.0;
    /// Distance/radius ratio at which lateral speed saturates.
    const LATERAL_RATIO_CAP: f32 = 1.5;

    /// Creates a law with the configured thresholds as restorable defaults.
    ///
    /// # Errors
    /// Fails if the configured threshold pair is invalid.
    pub fn new(config: TrackingConfig) -> Result<Self, ThresholdError> {
        let thresholds = ThresholdPair::new(config.forward_threshold, config.backward_threshold)?;
        Ok(Self {
            config,
            thresholds,
            default_thresholds: thresholds,
            buffer: SmoothingBuffer::new(),
            cached: None,
            filter: AxisVelocity::default(),
            state: TrackState::default(),
        })
    }

    pub fn config(&self) -> &TrackingConfig { &self.config }
    pub fn state(&self) -> &TrackState { &self.state }
    pub fn thresholds(&self) -> ThresholdPair { self.thresholds }
    pub fn default_thresholds(&self) -> ThresholdPair { self.default_thresholds }
    pub fn has_cached_detection(&self) -> bool { self.cached.is_some() }

    pub fn snapshot(&self) -> TrackSnapshot {
        TrackSnapshot {
            flags: DirectionFlags::from(self.state.intent),
            target_detected: self.state.target_detected(),
            velocity: self.state.velocity,
            thresholds: self.thresholds,
            frames_processed: self.state.frames_processed,
        }
    }

    /// Processes the output of a full detection run.
    ///
    /// `None` means the detector found no target: all velocities drop to
    /// zero immediately and the smoothing history is discarded.
    #[allow(clippy::cast_precision_loss)]
    pub fn observe(&mut self, detection: Option<Detection>, geometry: FrameGeometry) -> TrackSnapshot {
        self.state.frames_processed += 1;
        let Some(det) = detection else {
            self.lose_target();
            return self.snapshot();
        };
        self.buffer.push(Sample::new(det.x as f32, det.y as f32, det.size as f32));
        match self.buffer.smoothed() {
            Some(sample) => {
                self.cached = Some((sample, geometry));
                self.apply_control(sample, geometry);
            }
            None => self.lose_target(),
        }
        self.snapshot()
    }

    /// Runs the control law on the cached detection of a skipped frame.
    ///
    /// Without any cached detection the frame counts as "no target".
    pub fn replay_cached(&mut self) -> TrackSnapshot {
        self.state.frames_processed += 1;
        match self.cached {
            Some((sample, geometry)) => self.apply_control(sample, geometry),
            None => self.lose_target(),
        }
        self.snapshot()
    }

    /// Forgets everything learned about the target, thresholds are kept.
    pub fn reset_track(&mut self) {
        self.buffer.clear();
        self.cached = None;
        self.filter = AxisVelocity::default();
        self.state = TrackState::default();
    }

    fn lose_target(&mut self) {
        if self.state.target_detected() {
            track!("Target lost, zeroing all velocity axes.");
        }
        self.buffer.clear();
        self.cached = None;
        self.filter = AxisVelocity::default();
        self.state.target = None;
        self.state.intent = None;
        self.state.target_velocity = AxisVelocity::default();
        self.state.velocity = VelocityCommand::default();
    }

    #[allow(clippy::cast_precision_loss)]
    fn apply_control(&mut self, sample: Sample, geometry: FrameGeometry) {
        let center_x = geometry.width as f32 / 2.0;
        let center_y = geometry.height as f32 / 2.0;
        let dx = sample.x - center_x;
        let dy = sample.y - center_y;
        let distance = dx.hypot(dy);
        let radius = self.deadzone_radius(geometry);

        let (depth, forward_back) = self.depth_intent(sample.size);
        let (intent, yaw, up_down) = if distance < radius {
            (DirectionIntent::centered(depth), 0.0, 0.0)
        } else {
            let thr = self.config.axis_threshold_px;
            let horizontal = if dx < -thr {
                Some(Horizontal::Left)
            } else if dx > thr {
                Some(Horizontal::Right)
            } else {
                None
            };
            let vertical = if dy < -thr {
                Some(Vertical::Up)
            } else if dy > thr {
                Some(Vertical::Down)
            } else {
                None
            };
            let ratio = (distance / radius).min(Self::LATERAL_RATIO_CAP);
            let magnitude = self.config.lateral_speed_cap * ratio / Self::LATERAL_RATIO_CAP;
            let yaw = match horizontal {
                Some(Horizontal::Left) => -magnitude,
                Some(Horizontal::Right) => magnitude,
                None => 0.0,
            };
            let up_down = match vertical {
                Some(Vertical::Up) => magnitude,
                Some(Vertical::Down) => -magnitude,
                None => 0.0,
            };
            (DirectionIntent::offset(horizontal, vertical, depth), yaw, up_down)
        };

        let target = AxisVelocity { yaw, up_down, forward_back };
        let alpha = self.config.velocity_alpha;
        self.filter = AxisVelocity {
            yaw: smooth(self.filter.yaw, target.yaw, alpha),
            up_down: smooth(self.filter.up_down, target.up_down, alpha),
            forward_back: smooth(self.filter.forward_back, target.forward_back, alpha),
        };
        let band = self.config.velocity_deadband;
        let velocity = VelocityCommand {
            yaw: to_command(self.filter.yaw, band),
            up_down: to_command(self.filter.up_down, band),
            forward_back: to_command(self.filter.forward_back, band),
        };

        if self.state.intent != Some(intent) {
            event!("Direction changed to {intent} (size {:.0}px).", sample.size);
        }
        self.state.target = Some(sample);
        self.state.intent = Some(intent);
        self.state.target_velocity = target;
        self.state.velocity = velocity;
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn deadzone_radius(&self, geometry: FrameGeometry) -> f32 {
        geometry.width as f32 / self.config.deadzone_divisor.max(1) as f32
    }

    #[allow(clippy::cast_precision_loss)]
    fn depth_intent(&self, size: f32) -> (Option<Depth>, f32) {
        let fwd = self.thresholds.forward_px() as f32;
        let bwd = self.thresholds.backward_px() as f32;
        if size < fwd {
            let dev = ((fwd - size) / fwd).min(1.0);
            (Some(Depth::Forward), Self::DEPTH_BASE_SPEED + Self::DEPTH_SPEED_RANGE * dev)
        } else if size > bwd {
            let dev = ((size - bwd) / bwd).min(1.0);
            (Some(Depth::Backward), -(Self::DEPTH_BASE_SPEED + Self::DEPTH_SPEED_RANGE * dev))
        } else {
            (None, 0.0)
        }
    }

    /// Applies an absolute threshold pair requested by the tuner.
    ///
    /// # Errors
    /// Rejects invalid pairs, leaving the current thresholds unchanged.
    pub fn set_thresholds(&mut self, forward: i32, backward: i32) -> Result<ThresholdPair, ThresholdError> {
        self.commit(ThresholdPair::new(forward, backward))
    }

    pub fn adjust_thresholds(&mut self, delta: i32) -> Result<ThresholdPair, ThresholdError> {
        self.commit(self.thresholds.shifted(delta))
    }

    pub fn move_closer(&mut self) -> Result<ThresholdPair, ThresholdError> {
        self.commit(self.thresholds.closer())
    }

    pub fn move_farther(&mut self) -> Result<ThresholdPair, ThresholdError> {
        self.commit(self.thresholds.farther())
    }

    /// Restores the thresholds the law was constructed with.
    pub fn reset_thresholds(&mut self) -> ThresholdPair {
        self.thresholds = self.default_thresholds;
        track!("Thresholds reset to defaults: {}", self.thresholds);
        self.thresholds
    }

    fn commit(
        &mut self,
        candidate: Result<ThresholdPair, ThresholdError>,
    ) -> Result<ThresholdPair, ThresholdError> {
        match candidate {
            Ok(pair) => {
                self.thresholds = pair;
                track!("Thresholds updated: {pair}");
                Ok(pair)
            }
            Err(e) => {
                track!("Rejected threshold update: {e}. Keeping {}", self.thresholds);
                Err(e)
            }
        }
    }
}

/// One exponential smoothing step towards `target`.
pub fn smooth(previous: f32, target: f32, alpha: f32) -> f32 {
    alpha * target + (1.0 - alpha) * previous
}

/// Truncates a smoothed velocity to an integer command.
///
/// Magnitudes below `deadband` become zero to avoid motor buzz.
#[allow(clippy::cast_possible_truncation)]
pub fn to_command(velocity: f32, deadband: i32) -> i32 {
    let v = (velocity.trunc() as i32).clamp(-100, 100);
    if v.abs() < deadband { 0 } else { v }
}

use crate::config::FollowConfig;
use crate::flight_control::{FlightController, VehicleActuator, VehicleTransport};
use crate::imaging::FrameBuffer;
use crate::tracking::{ThresholdError, TrackingCell, TrackingLaw};
use std::sync::Arc;

/// Struct holding the key components of the application, built once at
/// startup and handed to every consumer by reference.
#[derive(Clone)]
pub struct Keychain {
    /// The shared tracking law, written by detection and read by status and tuner.
    tracking: Arc<TrackingCell>,
    /// The latest square-cropped camera frame for streaming.
    frames: Arc<FrameBuffer>,
    /// The safety-gated vehicle facade.
    actuator: Arc<VehicleActuator>,
    /// The flight controller sequencing takeoff, tracking and landing.
    f_cont: Arc<FlightController>,
}

impl Keychain {
    /// Creates a new instance of `Keychain`.
    ///
    /// # Arguments
    /// - `transport`: The link to the vehicle.
    /// - `config`: The process wide configuration.
    ///
    /// # Errors
    /// Fails if the configured distance thresholds are invalid.
    pub fn new(transport: Arc<dyn VehicleTransport>, config: FollowConfig) -> Result<Self, ThresholdError> {
        let tracking = Arc::new(TrackingCell::new(TrackingLaw::new(config.tracking)?));
        let frames = Arc::new(FrameBuffer::new());
        let actuator = Arc::new(VehicleActuator::new(transport, &config));
        let f_cont = Arc::new(FlightController::new(
            Arc::clone(&actuator),
            Arc::clone(&tracking),
            Arc::clone(&frames),
            config,
        ));
        Ok(Self { tracking, frames, actuator, f_cont })
    }

    /// Provides a cloned reference to the tracking law.
    pub fn tracking(&self) -> Arc<TrackingCell> { Arc::clone(&self.tracking) }

    /// Provides a cloned reference to the frame buffer.
    pub fn frames(&self) -> Arc<FrameBuffer> { Arc::clone(&self.frames) }

    /// Provides a cloned reference to the vehicle actuator.
    pub fn actuator(&self) -> Arc<VehicleActuator> { Arc::clone(&self.actuator) }

    /// Provides a cloned reference to the flight controller.
    pub fn f_cont(&self) -> Arc<FlightController> { Arc::clone(&self.f_cont) }
}

use super::{
    actuator::{ActuatorError, VehicleActuator, VehicleStatus},
    control_loop::ControlLoop,
    detection_loop::DetectionLoop,
    flight_phase::FlightPhase,
    safety_monitor::SafetyViolation,
};
use crate::config::FollowConfig;
use crate::imaging::{FrameBuffer, TargetDetector};
use crate::tracking::{TrackSnapshot, TrackingCell};
use crate::{error, info, warn};
use serde::Serialize;
use std::sync::{
    Arc, Mutex, MutexGuard,
    atomic::{AtomicBool, Ordering},
};
use strum_macros::Display;
use tokio::{sync::watch, task::JoinHandle};
use tokio_util::sync::CancellationToken;

/// Why a flight-level request did not complete.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum SequenceError {
    /// Takeoff requested while airborne or while another takeoff runs.
    AlreadyFlying,
    /// Landing or tracking requested while on the ground.
    NotFlying,
    ConnectFailed(ActuatorError),
    StreamFailed(ActuatorError),
    /// No frame arrived within the stream timeout.
    StreamTimeout,
    TakeoffFailed(ActuatorError),
    LandFailed(ActuatorError),
    TargetNotFound,
    Safety(SafetyViolation),
    InvalidTransition { from: FlightPhase, to: FlightPhase },
}

impl std::error::Error for SequenceError {}

/// Moves the shared phase to `to` if the transition is allowed.
///
/// # Errors
/// Returns [`SequenceError::InvalidTransition`], leaving the phase unchanged.
pub fn transition(phase: &watch::Sender<FlightPhase>, to: FlightPhase) -> Result<(), SequenceError> {
    let mut result = Ok(());
    phase.send_if_modified(|current| {
        if *current == to {
            return false;
        }
        if current.can_transition_to(to) {
            info!("Flight phase {current} -> {to}");
            *current = to;
            true
        } else {
            result = Err(SequenceError::InvalidTransition { from: *current, to });
            false
        }
    });
    result
}

/// Non-blocking status snapshot for external readers.
#[derive(Debug, Clone, Serialize)]
pub struct ControllerStatus {
    pub phase: FlightPhase,
    pub tracking_active: bool,
    pub tracking: TrackSnapshot,
    pub vehicle: VehicleStatus,
}

struct TrackingSession {
    c_tok: CancellationToken,
    detection: JoinHandle<()>,
    supervisor: JoinHandle<()>,
}

impl TrackingSession {
    fn is_finished(&self) -> bool { self.supervisor.is_finished() && self.detection.is_finished() }
}

/// Sequences a follow flight: takeoff, optional search, tracking and landing.
///
/// Owns the vehicle actuator and the tracking law for the lifetime of the
/// process. All public entry points are safe to call concurrently and
/// report failures as [`SequenceError`] instead of panicking.
pub struct FlightController {
    actuator: Arc<VehicleActuator>,
    tracking: Arc<TrackingCell>,
    frames: Arc<FrameBuffer>,
    config: FollowConfig,
    phase: Arc<watch::Sender<FlightPhase>>,
    /// Set while a takeoff sequence is in progress.
    sequence_active: AtomicBool,
    session: Mutex<Option<TrackingSession>>,
}

impl FlightController {
    pub fn new(
        actuator: Arc<VehicleActuator>,
        tracking: Arc<TrackingCell>,
        frames: Arc<FrameBuffer>,
        config: FollowConfig,
    ) -> Self {
        let (phase, _) = watch::channel(FlightPhase::Idle);
        Self {
            actuator,
            tracking,
            frames,
            config,
            phase: Arc::new(phase),
            sequence_active: AtomicBool::new(false),
            session: Mutex::new(None),
        }
    }

    pub fn actuator(&self) -> Arc<VehicleActuator> { Arc::clone(&self.actuator) }
    pub fn tracking(&self) -> Arc<TrackingCell> { Arc::clone(&self.tracking) }
    pub fn frames(&self) -> Arc<FrameBuffer> { Arc::clone(&self.frames) }
    pub fn phase(&self) -> FlightPhase { *self.phase.borrow() }
    pub fn watch_phase(&self) -> watch::Receiver<FlightPhase> { self.phase.subscribe() }

    fn lock_session(&self) -> MutexGuard<'_, Option<TrackingSession>> {
        self.session.lock().expect("[FATAL] Mutex poisoned: Failed to acquire tracking session")
    }

    pub fn is_tracking(&self) -> bool { self.lock_session().as_ref().is_some_and(|s| !s.is_finished()) }

    /// Connects, starts the video stream, waits for a first frame and takes off.
    ///
    /// A failure after the vehicle left the ground triggers an emergency
    /// landing before the error is returned.
    pub async fn takeoff(&self) -> Result<(), SequenceError> {
        if self.actuator.is_flying() {
            warn!("Takeoff requested while already flying, ignoring.");
            return Err(SequenceError::AlreadyFlying);
        }
        if self.sequence_active.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_err() {
            warn!("Takeoff already in progress, ignoring.");
            return Err(SequenceError::AlreadyFlying);
        }
        let result = self.takeoff_sequence().await;
        if let Err(e) = &result {
            error!("Flight sequence failed: {e}");
            self.recover().await;
        }
        self.sequence_active.store(false, Ordering::Release);
        result
    }

    async fn takeoff_sequence(&self) -> Result<(), SequenceError> {
        let flight = self.config.flight;
        transition(&self.phase, FlightPhase::Takeoff)?;
        info!("Connecting to vehicle...");
        self.actuator.connect().await.map_err(SequenceError::ConnectFailed)?;
        info!("Starting video stream...");
        self.actuator.stream_on().await.map_err(SequenceError::StreamFailed)?;
        tokio::time::sleep(flight.stream_warmup).await;
        if !self.actuator.wait_for_stream(flight.stream_timeout).await {
            return Err(SequenceError::StreamTimeout);
        }
        info!("Taking off...");
        self.actuator.takeoff().await.map_err(SequenceError::TakeoffFailed)?;
        info!("Takeoff successful.");
        Ok(())
    }

    /// Grounds the vehicle after a failed sequence and returns to idle.
    async fn recover(&self) {
        if self.actuator.is_flying() {
            // Escalation is always permitted.
            let _ = transition(&self.phase, FlightPhase::Emergency);
            if let Err(e) = self.actuator.emergency_land().await {
                error!("Emergency landing failed: {e}");
            }
        }
        if let Err(e) = transition(&self.phase, FlightPhase::Idle) {
            warn!("Could not return to idle: {e}");
        }
    }

    /// Starts detection and the control loop.
    ///
    /// # Returns
    /// `Ok(false)` without side effects if tracking already runs.
    pub fn start_tracking(&self, detector: Box<dyn TargetDetector>) -> Result<bool, SequenceError> {
        if !self.actuator.is_flying() {
            return Err(SequenceError::NotFlying);
        }
        let mut session = self.lock_session();
        if session.as_ref().is_some_and(|s| !s.is_finished()) {
            info!("Tracking already running.");
            return Ok(false);
        }
        // No velocity from a previous session may reach the first control tick.
        self.tracking.reset_track();
        let c_tok = CancellationToken::new();
        let detection = DetectionLoop::new(
            Arc::clone(&self.actuator),
            Arc::clone(&self.tracking),
            Arc::clone(&self.frames),
            detector,
            self.config.tracking.frame_skip,
            self.config.tracking.frame_interval,
        );
        let control = ControlLoop::new(
            Arc::clone(&self.actuator),
            Arc::clone(&self.tracking),
            Arc::clone(&self.phase),
            self.config.flight,
        );
        let detection = tokio::spawn(detection.run(c_tok.clone()));
        let supervisor = tokio::spawn(Self::supervise(
            control,
            Arc::clone(&self.actuator),
            Arc::clone(&self.tracking),
            Arc::clone(&self.phase),
            c_tok.clone(),
        ));
        *session = Some(TrackingSession { c_tok, detection, supervisor });
        info!("Tracking started.");
        Ok(true)
    }

    /// Runs the control loop and escalates to an emergency landing if it
    /// fails or panics.
    async fn supervise(
        control: ControlLoop,
        actuator: Arc<VehicleActuator>,
        tracking: Arc<TrackingCell>,
        phase: Arc<watch::Sender<FlightPhase>>,
        c_tok: CancellationToken,
    ) {
        let outcome = tokio::spawn(control.run(c_tok.clone())).await;
        let failure = match outcome {
            Ok(Ok(())) => return,
            Ok(Err(e)) => e.to_string(),
            Err(join_err) => format!("control loop aborted: {join_err}"),
        };
        error!("Tracking sequence failed: {failure}");
        c_tok.cancel();
        let _ = transition(&phase, FlightPhase::Emergency);
        if actuator.is_flying() {
            if let Err(e) = actuator.emergency_land().await {
                error!("Emergency landing failed: {e}");
            }
        }
        tracking.reset_track();
        if !actuator.is_flying() {
            let _ = transition(&phase, FlightPhase::Idle);
        }
    }

    /// Stops the tracking loops, if any, without touching the vehicle.
    async fn halt_session(&self) -> bool {
        let Some(session) = self.lock_session().take() else { return false };
        session.c_tok.cancel();
        tokio::time::sleep(self.config.flight.stop_grace).await;
        if let Err(e) = session.detection.await {
            error!("Detection loop ended abnormally: {e}");
        }
        if let Err(e) = session.supervisor.await {
            error!("Control supervisor ended abnormally: {e}");
        }
        self.tracking.reset_track();
        true
    }

    /// Stops tracking and lands.
    ///
    /// # Returns
    /// `Ok(false)` without side effects if tracking was not running.
    pub async fn stop_tracking(&self) -> Result<bool, SequenceError> {
        if !self.halt_session().await {
            info!("Tracking was not running.");
            return Ok(false);
        }
        info!("Tracking stopped.");
        if self.actuator.is_flying() {
            self.land().await?;
        }
        Ok(true)
    }

    /// Lands the vehicle, stopping any tracking first.
    ///
    /// Falls back to an emergency landing if the normal landing fails.
    pub async fn land(&self) -> Result<(), SequenceError> {
        self.halt_session().await;
        if !self.actuator.is_flying() {
            if self.phase() == FlightPhase::Emergency {
                let _ = transition(&self.phase, FlightPhase::Idle);
            }
            return Err(SequenceError::NotFlying);
        }
        transition(&self.phase, FlightPhase::Landing)?;
        info!("Landing...");
        match self.actuator.land().await {
            Ok(()) => transition(&self.phase, FlightPhase::Idle),
            Err(e) => {
                error!("Landing failed: {e}");
                self.recover().await;
                Err(SequenceError::LandFailed(e))
            }
        }
    }

    /// Full flight: takeoff followed by tracking with `detector`.
    pub async fn run_flight_sequence(&self, detector: Box<dyn TargetDetector>) -> Result<(), SequenceError> {
        self.takeoff().await?;
        self.start_tracking(detector).map(|_| ())
    }

    pub fn status(&self) -> ControllerStatus {
        ControllerStatus {
            phase: self.phase(),
            tracking_active: self.is_tracking(),
            tracking: self.tracking.snapshot(),
            vehicle: self.actuator.status(),
        }
    }

    /// Last resort: cuts the motors, stops all loops and returns to idle.
    pub async fn emergency_stop(&self) {
        if let Some(session) = self.lock_session().take() {
            session.c_tok.cancel();
        }
        self.tracking.reset_track();
        let _ = transition(&self.phase, FlightPhase::Emergency);
        self.actuator.emergency_stop().await;
        if !self.actuator.is_flying() {
            let _ = transition(&self.phase, FlightPhase::Idle);
        }
    }
}

use super::{
    actuator::{ActuatorError, VehicleActuator},
    flight_controller::{SequenceError, transition},
    flight_phase::FlightPhase,
    safety_monitor::SafetyViolation,
    transport::{RcCommand, Rotation},
};
use crate::config::FlightConfig;
use crate::tracking::TrackingCell;
use crate::{error, event, info, safety, warn};
use std::sync::Arc;
use tokio::{
    sync::watch,
    time::{Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

enum SearchOutcome {
    Found,
    Exhausted,
    Cancelled,
}

/// Fixed-period control side of a tracking session.
///
/// Every tick reads the latest velocity from the tracking law and issues
/// exactly one RC command, independent of the camera frame rate. A tick
/// whose command is still queued when the next one fires is superseded.
pub struct ControlLoop {
    actuator: Arc<VehicleActuator>,
    tracking: Arc<TrackingCell>,
    phase: Arc<watch::Sender<FlightPhase>>,
    config: FlightConfig,
}

impl ControlLoop {
    const FULL_TURN_DEG: u16 = 360;

    pub fn new(
        actuator: Arc<VehicleActuator>,
        tracking: Arc<TrackingCell>,
        phase: Arc<watch::Sender<FlightPhase>>,
        config: FlightConfig,
    ) -> Self {
        Self { actuator, tracking, phase, config }
    }

    /// Searches for the target if enabled, then tracks until cancelled.
    ///
    /// # Errors
    /// - [`SequenceError::TargetNotFound`] if the search turned full circle or timed out.
    /// - [`SequenceError::Safety`] if a safety violation grounded the vehicle.
    pub async fn run(self, c_tok: CancellationToken) -> Result<(), SequenceError> {
        if self.config.search_enabled {
            transition(&self.phase, FlightPhase::Searching)?;
            match self.search(&c_tok).await {
                SearchOutcome::Found => info!("Target found!"),
                SearchOutcome::Cancelled => return Ok(()),
                SearchOutcome::Exhausted => {
                    error!("Failed to find target within search limits.");
                    return Err(SequenceError::TargetNotFound);
                }
            }
        }
        transition(&self.phase, FlightPhase::Tracking)?;
        self.track(&c_tok).await
    }

    async fn search(&self, c_tok: &CancellationToken) -> SearchOutcome {
        info!("Searching for target...");
        let start = Instant::now();
        let step = self.config.search_step_deg.max(1);
        let mut total_rotation = 0;
        while start.elapsed() < self.config.search_timeout && total_rotation < Self::FULL_TURN_DEG {
            if c_tok.is_cancelled() {
                return SearchOutcome::Cancelled;
            }
            if self.tracking.snapshot().target_detected {
                return SearchOutcome::Found;
            }
            info!("No target detected, rotating {step}°...");
            if let Err(e) = self.actuator.rotate(Rotation::Clockwise, step).await {
                warn!("Search rotation failed: {e}");
            }
            total_rotation += step;
            tokio::select! {
                biased;
                () = c_tok.cancelled() => return SearchOutcome::Cancelled,
                () = tokio::time::sleep(self.config.search_settle) => {}
            }
        }
        if self.tracking.snapshot().target_detected {
            SearchOutcome::Found
        } else {
            SearchOutcome::Exhausted
        }
    }

    async fn track(&self, c_tok: &CancellationToken) -> Result<(), SequenceError> {
        info!("Tracking target...");
        let mut ticker = tokio::time::interval(self.config.control_period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut sent = 0usize;
        let mut superseded = 0usize;
        loop {
            tokio::select! {
                biased;
                () = c_tok.cancelled() => break,
                _ = ticker.tick() => {}
            }
            let (detected, velocity) = self.tracking.velocity();
            let rc = if detected {
                RcCommand::clamped(0, velocity.forward_back, velocity.up_down, velocity.yaw)
            } else {
                RcCommand::HOVER
            };
            match self.actuator.send_latest_rc(rc).await {
                Ok(replaced) => {
                    sent += 1;
                    superseded += usize::from(replaced);
                }
                Err(ActuatorError::Safety(SafetyViolation::HeightExceeded(h))) => {
                    safety!("RC command at {h}cm refused, holding.");
                }
                Err(ActuatorError::Safety(v)) => {
                    safety!("Tracking aborted: {v}");
                    return Err(SequenceError::Safety(v));
                }
                Err(ActuatorError::NotFlying) => {
                    warn!("Vehicle no longer flying, leaving tracking loop.");
                    return Err(SequenceError::NotFlying);
                }
                Err(e) => event!("RC command failed: {e}"),
            }
        }
        info!("Control loop stopped: {sent} RC commands sent, {superseded} superseded while queued.");
        Ok(())
    }
}

use super::{
    thresholds::{ThresholdError, ThresholdPair},
    tracking_law::{Detection, FrameGeometry, TrackSnapshot, TrackingLaw, VelocityCommand},
};
use std::sync::{Mutex, MutexGuard};

/// A thread-safe home for the [`TrackingLaw`].
///
/// Track state and thresholds form one logical group behind a single mutex.
/// The detection loop writes, the control tick, the tuner and status
/// readers take short copies and release the lock immediately.
#[derive(Debug)]
pub struct TrackingCell {
    law: Mutex<TrackingLaw>,
}

impl TrackingCell {
    pub fn new(law: TrackingLaw) -> Self { Self { law: Mutex::new(law) } }

    /// Acquires the lock on the tracking law.
    ///
    /// # Panics
    /// - If the Mutex is poisoned.
    pub fn lock_law(&self) -> MutexGuard<'_, TrackingLaw> {
        self.law.lock().expect("[FATAL] Mutex poisoned: Failed to acquire tracking lock")
    }

    pub fn observe(&self, detection: Option<Detection>, geometry: FrameGeometry) -> TrackSnapshot {
        self.lock_law().observe(detection, geometry)
    }

    pub fn replay_cached(&self) -> TrackSnapshot { self.lock_law().replay_cached() }

    /// Clears the track state between tracking sessions.
    pub fn reset_track(&self) { self.lock_law().reset_track(); }

    /// Consistent copy of direction flags, detection state and velocity.
    pub fn snapshot(&self) -> TrackSnapshot { self.lock_law().snapshot() }

    /// Velocity the control tick should send, zero while no target is seen.
    pub fn velocity(&self) -> (bool, VelocityCommand) {
        let law = self.lock_law();
        (law.state().target_detected(), law.state().velocity)
    }

    pub fn thresholds(&self) -> ThresholdPair { self.lock_law().thresholds() }

    pub fn set_thresholds(&self, forward: i32, backward: i32) -> Result<ThresholdPair, ThresholdError> {
        self.lock_law().set_thresholds(forward, backward)
    }

    pub fn adjust_thresholds(&self, delta: i32) -> Result<ThresholdPair, ThresholdError> {
        self.lock_law().adjust_thresholds(delta)
    }

    pub fn move_closer(&self) -> Result<ThresholdPair, ThresholdError> { self.lock_law().move_closer() }

    pub fn move_farther(&self) -> Result<ThresholdPair, ThresholdError> { self.lock_law().move_farther() }

    pub fn reset_thresholds(&self) -> ThresholdPair { self.lock_law().reset_thresholds() }
}

use super::{pid::PidAxis, transport::MoveDirection};
use std::time::Duration;
use tokio::time::Instant;

/// Discrete-move target tracking in normalised frame coordinates.
///
/// Each accepted call turns the PID outputs of the x, y and depth axes into
/// at most three relative moves. Calls inside the cooldown are ignored.
#[derive(Debug, Clone)]
pub struct PidTracker {
    pid_x: PidAxis,
    pid_y: PidAxis,
    pid_z: PidAxis,
    last_track: Option<Instant>,
}

impl PidTracker {
    const COOLDOWN: Duration = Duration::from_millis(500);
    /// Normalised offset from the frame centre that is ignored.
    const DEAD_ZONE: f32 = 0.1;
    /// Preferred target size as a fraction of the frame.
    const DEPTH_SETPOINT: f32 = 0.3;
    const DEPTH_TOLERANCE: f32 = 0.1;
    const LATERAL_SCALE: f32 = 100.0;
    const DEPTH_SCALE: f32 = 80.0;
    const MOVE_RANGE_CM: (f32, f32) = (20.0, 50.0);
    pub const FRAME_CENTER: f32 = 0.5;

    pub fn new() -> Self {
        Self {
            pid_x: PidAxis::lateral(),
            pid_y: PidAxis::lateral(),
            pid_z: PidAxis::depth(),
            last_track: None,
        }
    }

    /// Plans the moves needed to re-centre the target.
    ///
    /// # Arguments
    /// * `target_x`, `target_y` – Target position in `[0, 1]`.
    /// * `target_z` – Optional target size in `[0, 1]` for depth control.
    ///
    /// # Returns
    /// `None` while cooling down or when the target is within the dead zone,
    /// otherwise the list of moves to issue in order.
    pub fn plan(
        &mut self,
        target_x: f32,
        target_y: f32,
        target_z: Option<f32>,
        now: Instant,
    ) -> Option<Vec<(MoveDirection, u16)>> {
        if self.last_track.is_some_and(|t| now.duration_since(t) < Self::COOLDOWN) {
            return None;
        }
        self.last_track = Some(now);

        let error_x = target_x - Self::FRAME_CENTER;
        // Image y grows downwards, vehicle up is positive.
        let error_y = Self::FRAME_CENTER - target_y;
        let control_x = self.pid_x.calculate(error_x, PidAxis::DEFAULT_DT);
        let control_y = self.pid_y.calculate(error_y, PidAxis::DEFAULT_DT);

        if error_x.abs() < Self::DEAD_ZONE && error_y.abs() < Self::DEAD_ZONE {
            return None;
        }

        let mut moves = Vec::with_capacity(3);
        if error_x.abs() > Self::DEAD_ZONE {
            let dir = if control_x > 0.0 { MoveDirection::Right } else { MoveDirection::Left };
            moves.push((dir, Self::to_cm(control_x, Self::LATERAL_SCALE)));
        }
        if error_y.abs() > Self::DEAD_ZONE {
            let dir = if control_y > 0.0 { MoveDirection::Up } else { MoveDirection::Down };
            moves.push((dir, Self::to_cm(control_y, Self::LATERAL_SCALE)));
        }
        if let Some(z) = target_z {
            let error_z = z - Self::DEPTH_SETPOINT;
            if error_z.abs() > Self::DEPTH_TOLERANCE {
                let control_z = self.pid_z.calculate(error_z, PidAxis::DEFAULT_DT);
                let dir = if control_z < 0.0 { MoveDirection::Forward } else { MoveDirection::Back };
                moves.push((dir, Self::to_cm(control_z, Self::DEPTH_SCALE)));
            }
        }
        Some(moves)
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn to_cm(control: f32, scale: f32) -> u16 {
        let (lo, hi) = Self::MOVE_RANGE_CM;
        (control.abs() * scale).clamp(lo, hi) as u16
    }

    pub fn reset(&mut self) {
        self.pid_x.reset();
        self.pid_y.reset();
        self.pid_z.reset();
        self.last_track = None;
    }
}

impl Default for PidTracker {
    fn default() -> Self { Self::new() }
}

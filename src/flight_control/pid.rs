/// Single-axis PID accumulator.
///
/// The output is not clamped; callers scale and clip it to actuator limits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PidAxis {
    kp: f32,
    ki: f32,
    kd: f32,
    integral: f32,
    previous_error: f32,
    /// Symmetric bound for the integral term, unbounded if `None`.
    integral_limit: Option<f32>,
}

impl PidAxis {
    /// Default control step in seconds.
    pub const DEFAULT_DT: f32 = 0.1;

    pub fn new(kp: f32, ki: f32, kd: f32) -> Self {
        Self { kp, ki, kd, integral: 0.0, previous_error: 0.0, integral_limit: None }
    }

    /// Clamps the integral accumulator to `[-limit, limit]` (anti-windup).
    pub fn with_integral_limit(mut self, limit: f32) -> Self {
        self.integral_limit = Some(limit.abs());
        self
    }

    /// Lateral (x) and vertical (y) tracking gains.
    pub fn lateral() -> Self { Self::new(0.4, 0.0, 0.2) }

    /// Depth (z) tracking gains.
    pub fn depth() -> Self { Self::new(0.3, 0.0, 0.15) }

    pub fn calculate(&mut self, error: f32, dt: f32) -> f32 {
        self.integral += error * dt;
        if let Some(limit) = self.integral_limit {
            self.integral = self.integral.clamp(-limit, limit);
        }
        let derivative = if dt > 0.0 { (error - self.previous_error) / dt } else { 0.0 };
        self.previous_error = error;
        self.kp * error + self.ki * self.integral + self.kd * derivative
    }

    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.previous_error = 0.0;
    }

    pub fn integral(&self) -> f32 { self.integral }
    pub fn previous_error(&self) -> f32 { self.previous_error }
}

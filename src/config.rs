use crate::flight_control::SafetyLimits;
use crate::warn;
use std::{str::FromStr, time::Duration};

/// Parameters of the per-frame tracking law.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackingConfig {
    /// Deadzone radius is `frame_width / deadzone_divisor`.
    pub deadzone_divisor: u32,
    /// Per-axis pixel offset below which no left/right/up/down flag is raised.
    pub axis_threshold_px: f32,
    /// Largest yaw / up-down target command.
    pub lateral_speed_cap: f32,
    /// Exponential smoothing factor applied to commanded velocities.
    pub velocity_alpha: f32,
    /// Commands with a smaller magnitude are snapped to zero.
    pub velocity_deadband: i32,
    /// Full detection runs on every n-th frame.
    pub frame_skip: u32,
    /// Pause of the detection loop between two frames.
    pub frame_interval: Duration,
    pub forward_threshold: i32,
    pub backward_threshold: i32,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            deadzone_divisor: 8,
            axis_threshold_px: 20.0,
            lateral_speed_cap: 20.0,
            velocity_alpha: 0.3,
            velocity_deadband: 3,
            frame_skip: 2,
            frame_interval: Duration::from_millis(33),
            forward_threshold: 100,
            backward_threshold: 125,
        }
    }
}

/// Timing and behaviour of the flight sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlightConfig {
    pub control_period: Duration,
    pub stream_timeout: Duration,
    pub stream_warmup: Duration,
    pub takeoff_hop_cm: u16,
    pub takeoff_settle: Duration,
    pub search_enabled: bool,
    pub search_step_deg: u16,
    pub search_timeout: Duration,
    pub search_settle: Duration,
    pub stop_grace: Duration,
}

impl Default for FlightConfig {
    fn default() -> Self {
        Self {
            control_period: Duration::from_millis(100),
            stream_timeout: Duration::from_secs(10),
            stream_warmup: Duration::from_secs(1),
            takeoff_hop_cm: 80,
            takeoff_settle: Duration::from_secs(2),
            search_enabled: false,
            search_step_deg: 30,
            search_timeout: Duration::from_secs(60),
            search_settle: Duration::from_secs(1),
            stop_grace: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Pause between two executed commands.
    pub command_gap: Duration,
    /// Upper bound for a caller waiting on a queued command.
    pub reply_timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            command_gap: Duration::from_millis(100),
            reply_timeout: Duration::from_secs(15),
        }
    }
}

/// Process wide configuration, built once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FollowConfig {
    pub safety: SafetyLimits,
    pub tracking: TrackingConfig,
    pub flight: FlightConfig,
    pub dispatcher: DispatcherConfig,
    /// How long the demo flight keeps tracking before landing.
    pub flight_secs: u64,
}

impl FollowConfig {
    const DEFAULT_FLIGHT_SECS: u64 = 30;

    /// Reads overrides from the process environment.
    pub fn from_env() -> Self { Self::from_lookup(|key| std::env::var(key).ok()) }

    /// Builds the configuration from an arbitrary key lookup.
    ///
    /// Unparsable values are reported and replaced by their default.
    pub fn from_lookup<F>(lookup: F) -> Self
    where F: Fn(&str) -> Option<String> {
        let mut conf = Self { flight_secs: Self::DEFAULT_FLIGHT_SECS, ..Self::default() };
        let defaults = conf.safety;
        conf.safety = SafetyLimits::new(
            parse_or(&lookup, "FOLLOW_MIN_BATTERY", defaults.min_battery()),
            parse_or(&lookup, "FOLLOW_EMERGENCY_BATTERY", defaults.emergency_battery()),
            parse_or(&lookup, "FOLLOW_MAX_HEIGHT", defaults.max_height()),
        );
        conf.tracking.forward_threshold =
            parse_or(&lookup, "FOLLOW_FORWARD_THRESHOLD", conf.tracking.forward_threshold);
        conf.tracking.backward_threshold =
            parse_or(&lookup, "FOLLOW_BACKWARD_THRESHOLD", conf.tracking.backward_threshold);
        conf.tracking.frame_skip =
            parse_or(&lookup, "FOLLOW_FRAME_SKIP", conf.tracking.frame_skip).max(1);
        conf.flight.search_enabled =
            parse_or(&lookup, "FOLLOW_SEARCH", u8::from(conf.flight.search_enabled)) != 0;
        conf.flight_secs = parse_or(&lookup, "FOLLOW_FLIGHT_SECS", conf.flight_secs);
        conf
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + Copy,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("Ignoring unparsable value {raw:?} for {key}.");
            default
        }),
        None => default,
    }
}

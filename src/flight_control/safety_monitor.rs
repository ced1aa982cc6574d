use crate::safety;
use strum_macros::Display;

/// Battery and height limits, fixed for the lifetime of a flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SafetyLimits {
    min_battery: u8,
    emergency_battery: u8,
    max_height: u16,
}

impl Default for SafetyLimits {
    fn default() -> Self { Self { min_battery: 20, emergency_battery: 10, max_height: 300 } }
}

impl SafetyLimits {
    pub fn new(min_battery: u8, emergency_battery: u8, max_height: u16) -> Self {
        Self { min_battery, emergency_battery, max_height }
    }

    pub fn min_battery(&self) -> u8 { self.min_battery }
    pub fn emergency_battery(&self) -> u8 { self.emergency_battery }
    pub fn max_height(&self) -> u16 { self.max_height }
}

/// Why a command was not allowed to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum SafetyViolation {
    NotConnected,
    /// Battery below the emergency threshold, a forced landing was issued.
    CriticalBattery(u8),
    /// Above the allowed ceiling. The command is refused, nothing else happens.
    HeightExceeded(u16),
}

/// Outcome of a pre-command safety check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum SafetyVerdict {
    Allow,
    /// Battery is low. The command still runs.
    Warn(u8),
    /// Battery is critical. The caller must land before anything else.
    EmergencyLand(u8),
    Refused(SafetyViolation),
}

impl SafetyVerdict {
    pub fn permits_command(&self) -> bool { matches!(self, SafetyVerdict::Allow | SafetyVerdict::Warn(_)) }

    /// Converts the verdict into the violation that blocks the command, if any.
    pub fn violation(&self) -> Option<SafetyViolation> {
        match self {
            SafetyVerdict::Allow | SafetyVerdict::Warn(_) => None,
            SafetyVerdict::EmergencyLand(b) => Some(SafetyViolation::CriticalBattery(*b)),
            SafetyVerdict::Refused(v) => Some(*v),
        }
    }
}

/// Gates vehicle commands on connection, battery and height.
///
/// Unreadable telemetry (`None`) does not block a command.
#[derive(Debug, Clone, Copy, Default)]
pub struct SafetyMonitor {
    limits: SafetyLimits,
}

impl SafetyMonitor {
    pub fn new(limits: SafetyLimits) -> Self { Self { limits } }

    pub fn limits(&self) -> &SafetyLimits { &self.limits }

    pub fn check(&self, connected: bool, battery: Option<u8>, height: Option<u16>) -> SafetyVerdict {
        if !connected {
            safety!("Vehicle not connected, refusing command.");
            return SafetyVerdict::Refused(SafetyViolation::NotConnected);
        }
        if let Some(b) = battery {
            if b < self.limits.emergency_battery {
                safety!("CRITICAL BATTERY: {b}% - landing immediately!");
                return SafetyVerdict::EmergencyLand(b);
            }
        }
        if let Some(h) = height {
            if h > self.limits.max_height {
                safety!("Height {h}cm exceeds max {}cm, refusing command.", self.limits.max_height);
                return SafetyVerdict::Refused(SafetyViolation::HeightExceeded(h));
            }
        }
        match battery {
            Some(b) if b < self.limits.min_battery => {
                safety!("Low battery: {b}%");
                SafetyVerdict::Warn(b)
            }
            _ => SafetyVerdict::Allow,
        }
    }
}

use serde::Serialize;
use std::collections::HashSet;
use std::sync::LazyLock;
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter};

/// Phase of the follow flight as seen by the controller.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, Display, EnumIter, Serialize)]
pub enum FlightPhase {
    Idle,
    Takeoff,
    Searching,
    Tracking,
    Landing,
    Emergency,
}

impl FlightPhase {
    /// Whether the controller may move from `self` to `to`.
    pub fn can_transition_to(self, to: FlightPhase) -> bool {
        self == to || ALLOWED_TRANSITIONS.contains(&(self, to))
    }

    /// Whether the vehicle is expected to be airborne in this phase.
    pub fn is_airborne(self) -> bool {
        matches!(self, FlightPhase::Takeoff | FlightPhase::Searching | FlightPhase::Tracking)
    }
}

impl TryFrom<&str> for FlightPhase {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.to_lowercase().as_str() {
            "idle" => Ok(FlightPhase::Idle),
            "takeoff" => Ok(FlightPhase::Takeoff),
            "searching" => Ok(FlightPhase::Searching),
            "tracking" => Ok(FlightPhase::Tracking),
            "landing" => Ok(FlightPhase::Landing),
            "emergency" => Ok(FlightPhase::Emergency),
            other => Err(format!("unknown flight phase '{other}'")),
        }
    }
}

impl From<FlightPhase> for &'static str {
    fn from(value: FlightPhase) -> Self {
        match value {
            FlightPhase::Idle => "idle",
            FlightPhase::Takeoff => "takeoff",
            FlightPhase::Searching => "searching",
            FlightPhase::Tracking => "tracking",
            FlightPhase::Landing => "landing",
            FlightPhase::Emergency => "emergency",
        }
    }
}

pub static ALLOWED_TRANSITIONS: LazyLock<HashSet<(FlightPhase, FlightPhase)>> = LazyLock::new(|| {
    let transitions = [
        // Idle transitions
        (FlightPhase::Idle, FlightPhase::Takeoff),
        // Takeoff transitions
        (FlightPhase::Takeoff, FlightPhase::Searching),
        (FlightPhase::Takeoff, FlightPhase::Tracking),
        (FlightPhase::Takeoff, FlightPhase::Landing),
        (FlightPhase::Takeoff, FlightPhase::Idle),
        // Searching transitions
        (FlightPhase::Searching, FlightPhase::Tracking),
        (FlightPhase::Searching, FlightPhase::Landing),
        // Tracking transitions
        (FlightPhase::Tracking, FlightPhase::Landing),
        (FlightPhase::Tracking, FlightPhase::Idle),
        // Landing transitions
        (FlightPhase::Landing, FlightPhase::Idle),
        // Emergency transitions
        (FlightPhase::Emergency, FlightPhase::Landing),
        (FlightPhase::Emergency, FlightPhase::Idle),
    ];
    let mut lookup: HashSet<_> = transitions.into_iter().collect();
    // Any phase may escalate to an emergency.
    for phase in FlightPhase::iter().filter(|p| *p != FlightPhase::Emergency) {
        lookup.insert((phase, FlightPhase::Emergency));
    }
    lookup
});

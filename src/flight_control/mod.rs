mod actuator;
mod command_dispatcher;
mod control_loop;
mod detection_loop;
mod flight_controller;
mod flight_phase;
mod pid;
mod pid_tracker;
mod safety_monitor;
mod transport;
mod vehicle_command;

#[cfg(test)]
mod tests;

pub use actuator::{ActuatorError, FlightStats, VehicleActuator, VehicleStatus};
pub use command_dispatcher::{CommandDispatcher, DispatchError};
pub use detection_loop::DetectionLoop;
pub use flight_controller::{ControllerStatus, FlightController, SequenceError};
pub use flight_phase::FlightPhase;
pub use pid::PidAxis;
pub use pid_tracker::PidTracker;
pub use safety_monitor::{SafetyLimits, SafetyMonitor, SafetyVerdict, SafetyViolation};
pub use transport::{FlipDirection, MoveDirection, RcCommand, Rotation, TransportError, VehicleTransport};
pub use vehicle_command::{CommandKind, VehicleCommand};

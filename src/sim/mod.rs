//! In-process stand-in for the vehicle link, used by the demo flight and tests.

mod simulated_vehicle;


pub use simulated_vehicle::{SimFault, SimSettings, SimulatedVehicle};

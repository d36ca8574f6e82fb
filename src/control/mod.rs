//! Hysteresis control of the skid actuators.

pub mod actuator;
pub mod controller;
pub mod rules;

pub use actuator::{Actuator, ActuatorState, Command};
pub use controller::{ControlLoop, Evaluation};
pub use rules::FeedBand;

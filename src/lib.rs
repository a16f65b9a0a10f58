// Closed-loop motion control runtime for a two-wheel Maqueen-style chassis:
// pulse encoders for feedback, a gripper servo, and a two-sensor infrared
// line detector, all behind a small synchronous command API driven by a
// 50 Hz control loop.

pub mod board;
pub mod chassis;
pub mod config;
pub mod runtime;
pub mod status;

pub use board::{BoardError, BoardLink, ChassisBus};
pub use chassis::{Chassis, ChassisError, MotorState, Wheel};
pub use status::ChassisStatus;

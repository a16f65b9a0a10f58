// Chassis motion control
//
// Provides:
// - Atomic encoder tick counters fed by the board's pulse stream
// - The movement state machine and per-tick control policies
// - The public motion command API

mod controller;
mod encoder;
pub mod state;

pub use controller::{Chassis, ChassisError};
pub use encoder::EncoderCounters;
pub use state::{Direction, FollowDir, LineReading, MotorState, Servo, Wheel};

// Chassis board interface
//
// Provides:
// - The `ChassisBus` seam the control loop drives (motors, servo, line
//   sensors, encoder pulse source)
// - The UART bridge implementation speaking the framed board protocol

mod link;

pub use link::{BoardError, BoardLink, Opcode, DEFAULT_BAUDRATE, DEFAULT_TIMEOUT_MS};

use crate::chassis::state::{Direction, LineReading, Servo, Wheel};

/// Everything the control loop needs from the chassis hardware.
///
/// The real implementation is [`BoardLink`]; tests substitute a scripted
/// mock. Encoder pulses are delivered as a single-consumer queue drained once
/// per control-loop tick.
pub trait ChassisBus: Send {
    /// Drive one wheel at the given power (0-255) in the given direction.
    fn set_motor(&mut self, wheel: Wheel, dir: Direction, power: u8) -> Result<(), BoardError>;

    /// Cut power to one wheel.
    fn stop_motor(&mut self, wheel: Wheel) -> Result<(), BoardError>;

    /// Cut power to both wheels.
    fn stop_all(&mut self) -> Result<(), BoardError>;

    /// Move a servo to an absolute angle in degrees.
    fn set_servo_angle(&mut self, servo: Servo, angle: u8) -> Result<(), BoardError>;

    /// Read one infrared patrol sensor.
    fn read_line_sensor(&mut self, side: Wheel) -> Result<LineReading, BoardError>;

    /// Drain encoder pulse events received since the last call, tagged by
    /// wheel, oldest first.
    fn drain_pulses(&mut self) -> Result<Vec<Wheel>, BoardError>;
}

// Loop cadence, encoder geometry, tunable defaults
use std::time::Duration;

// Control loop frequency
pub const LOOP_HZ: u64 = 50;

// Encoder disc geometry: pulses per full wheel rotation
pub const TICKS_PER_ROTATION: u32 = 24;

// Tick-matching correction (forward/backward): correction only kicks in once
// the counters diverge by more than the dead band; corrected speeds never
// drift further than SPEED_TRIM from the commanded base speed.
pub const COUNT_DEADBAND: u32 = 10;
pub const SPEED_TRIM: i32 = 20;

// Defaults for the three runtime-settable control constants
pub const DEFAULT_FOLLOW_CTRL: i32 = 50;
pub const DEFAULT_MOTOR_CTRL: i32 = 20;
pub const DEFAULT_MOTOR_CALIB: i32 = 10;

// Gripper servo angles
pub const CLAW_OPEN_ANGLE: u8 = 60;
pub const CLAW_CLOSED_ANGLE: u8 = 10;

// Polling interval for wait_movement_done
pub const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(100);

// Default serial port for the chassis board UART bridge
pub const BOARD_PORT: &str = "/dev/ttyACM0";

// How often the runtime loop emits a telemetry snapshot, in ticks
pub const TELEMETRY_EVERY_TICKS: u64 = 50;

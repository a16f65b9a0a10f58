// Telemetry snapshot published by the runtime loop, plus the one-character
// glyph for the cosmetic display surface.

use serde::{Deserialize, Serialize};

use crate::chassis::MotorState;

/// Point-in-time view of the control state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ChassisStatus {
    pub state: MotorState,
    pub l_count: u32,
    pub r_count: u32,
    pub motor_speed: i32,
    pub l_speed: i32,
    pub r_speed: i32,
}

impl ChassisStatus {
    /// Status glyph rendered on the robot's display.
    pub fn glyph(&self) -> char {
        match self.state {
            MotorState::Stop => '-',
            MotorState::Forward => '^',
            MotorState::Backward => 'v',
            MotorState::Left => '<',
            MotorState::Right => '>',
            MotorState::Follow => '~',
        }
    }
}

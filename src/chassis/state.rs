// Shared control state for the chassis state machine.
//
// The movement mode is stored as a u8 behind an atomic (see controller.rs) so
// the encoder pulse path and cooperative waiters can read it without taking
// the control lock.

use serde::{Deserialize, Serialize};

use crate::config::{DEFAULT_FOLLOW_CTRL, DEFAULT_MOTOR_CALIB, DEFAULT_MOTOR_CTRL};

/// Movement mode of the chassis. `Stop` is the only state in which the motors
/// are guaranteed idle.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MotorState {
    Stop = 0,
    Forward = 1,
    Backward = 2,
    Left = 3,
    Right = 4,
    Follow = 5,
}

impl MotorState {
    pub(crate) fn from_u8(raw: u8) -> Self {
        match raw {
            1 => MotorState::Forward,
            2 => MotorState::Backward,
            3 => MotorState::Left,
            4 => MotorState::Right,
            5 => MotorState::Follow,
            _ => MotorState::Stop,
        }
    }
}

/// Last known steering correction during line-following, used as the
/// dead-reckoning fallback when both sensors go off-line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FollowDir {
    #[default]
    Straight,
    Left,
    Right,
}

/// Identifies a wheel; doubles as the encoder channel and line-sensor side on
/// the same half of the chassis.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wheel {
    Left = 0,
    Right = 1,
}

impl Wheel {
    /// Map a raw motor identifier to a wheel. Unknown ids yield `None`; the
    /// accessors built on top degrade to 0 rather than failing.
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            0 => Some(Wheel::Left),
            1 => Some(Wheel::Right),
            _ => None,
        }
    }
}

/// Spin direction of a wheel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

/// Reading from one infrared patrol sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineReading {
    OnLine,
    OffLine,
}

/// Gripper servo ports on the chassis board.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Servo {
    S1 = 1,
    S2 = 2,
}

/// Command-scoped control fields. Written as a unit when a command is issued,
/// read and rewritten once per control-loop tick.
#[derive(Debug)]
pub struct ControlState {
    /// Target tick count at which motion halts (rotations x 24).
    pub stop_count: u32,
    /// Commanded base speed magnitude; zeroed on stop.
    pub motor_speed: i32,
    /// Static right-wheel offset compensating mechanical bias.
    pub motor_calib: i32,
    /// Corrective delta used to recover the line when both sensors drop out.
    pub motor_ctrl: i32,
    /// Corrective delta subtracted from one wheel during on-line steering.
    pub follow_ctrl: i32,
    /// Instantaneous per-wheel output speeds.
    pub l_speed: i32,
    pub r_speed: i32,
    pub last_follow_dir: FollowDir,
}

impl Default for ControlState {
    fn default() -> Self {
        Self {
            stop_count: 0,
            motor_speed: 0,
            motor_calib: DEFAULT_MOTOR_CALIB,
            motor_ctrl: DEFAULT_MOTOR_CTRL,
            follow_ctrl: DEFAULT_FOLLOW_CTRL,
            l_speed: 0,
            r_speed: 0,
            last_follow_dir: FollowDir::Straight,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn motor_state_round_trips_through_u8() {
        for state in [
            MotorState::Stop,
            MotorState::Forward,
            MotorState::Backward,
            MotorState::Left,
            MotorState::Right,
            MotorState::Follow,
        ] {
            assert_eq!(MotorState::from_u8(state as u8), state);
        }
    }

    #[test]
    fn unknown_raw_state_degrades_to_stop() {
        assert_eq!(MotorState::from_u8(42), MotorState::Stop);
    }

    #[test]
    fn wheel_id_mapping_is_lenient() {
        assert_eq!(Wheel::from_id(0), Some(Wheel::Left));
        assert_eq!(Wheel::from_id(1), Some(Wheel::Right));
        assert_eq!(Wheel::from_id(7), None);
    }

    #[test]
    fn control_state_defaults_match_documented_values() {
        let ctl = ControlState::default();
        assert_eq!(ctl.follow_ctrl, 50);
        assert_eq!(ctl.motor_ctrl, 20);
        assert_eq!(ctl.motor_calib, 10);
        assert_eq!(ctl.last_follow_dir, FollowDir::Straight);
    }
}

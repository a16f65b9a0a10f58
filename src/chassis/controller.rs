// Chassis motion controller
//
// Owns the movement state machine and the per-tick control policies: encoder
// tick-matching for straight moves, independent per-wheel stops for in-place
// turns, and reactive steering for line-following.
//
// Lock discipline: the bus lock is always taken before the control lock.
// Commands write their fields as a unit; the loop reads and rewrites them
// once per tick; the pulse path touches only atomics.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tracing::info;

use crate::board::{BoardError, ChassisBus};
use crate::config::{
    CLAW_CLOSED_ANGLE, CLAW_OPEN_ANGLE, COUNT_DEADBAND, SPEED_TRIM, TICKS_PER_ROTATION,
    WAIT_POLL_INTERVAL,
};
use crate::status::ChassisStatus;

use super::encoder::EncoderCounters;
use super::state::{ControlState, Direction, FollowDir, LineReading, MotorState, Servo, Wheel};

/// Error types for the motion command API
#[derive(Debug, thiserror::Error)]
pub enum ChassisError {
    #[error("Invalid command argument: {reason}")]
    InvalidArgument { reason: String },

    #[error("Board error: {0}")]
    Board(#[from] BoardError),

    #[error("Timed out waiting for movement to finish")]
    WaitTimeout,
}

pub type Result<T> = std::result::Result<T, ChassisError>;

struct Inner<B> {
    bus: Mutex<B>,
    control: Mutex<ControlState>,
    encoders: EncoderCounters,
    motor_state: AtomicU8,
}

/// Handle to the chassis controller. Cloneable; all clones share the same
/// state machine and board connection.
pub struct Chassis<B: ChassisBus> {
    inner: Arc<Inner<B>>,
}

impl<B: ChassisBus> Clone for Chassis<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Clamp a corrected speed into the power range the board accepts.
fn power(speed: i32) -> u8 {
    speed.clamp(0, u8::MAX as i32) as u8
}

impl<B: ChassisBus> Chassis<B> {
    pub fn new(bus: B) -> Self {
        Self {
            inner: Arc::new(Inner {
                bus: Mutex::new(bus),
                control: Mutex::new(ControlState::default()),
                encoders: EncoderCounters::new(),
                motor_state: AtomicU8::new(MotorState::Stop as u8),
            }),
        }
    }

    fn lock_bus(&self) -> MutexGuard<'_, B> {
        self.inner.bus.lock().expect("bus lock poisoned")
    }

    fn lock_control(&self) -> MutexGuard<'_, ControlState> {
        self.inner.control.lock().expect("control lock poisoned")
    }

    fn set_state(&self, state: MotorState) {
        self.inner.motor_state.store(state as u8, Ordering::Release);
    }

    /// Current movement mode.
    pub fn motor_state(&self) -> MotorState {
        MotorState::from_u8(self.inner.motor_state.load(Ordering::Acquire))
    }

    /// Accumulated encoder ticks for a raw motor identifier (0 = left,
    /// 1 = right). Unknown identifiers degrade to 0 rather than failing.
    pub fn motor_count(&self, motor: u8) -> u32 {
        match Wheel::from_id(motor) {
            Some(wheel) => self.inner.encoders.count(wheel),
            None => 0,
        }
    }

    /// Snapshot of the control state for telemetry and display.
    pub fn status(&self) -> ChassisStatus {
        let (l_count, r_count) = self.inner.encoders.snapshot();
        let ctl = self.lock_control();
        ChassisStatus {
            state: self.motor_state(),
            l_count,
            r_count,
            motor_speed: ctl.motor_speed,
            l_speed: ctl.l_speed,
            r_speed: ctl.r_speed,
        }
    }

    // === Tunable control constants (take effect on the next tick) ===

    pub fn set_follow_control(&self, value: i32) {
        self.lock_control().follow_ctrl = value;
    }

    pub fn set_motor_control(&self, value: i32) {
        self.lock_control().motor_ctrl = value;
    }

    pub fn set_motor_calibration(&self, value: i32) {
        self.lock_control().motor_calib = value;
    }

    // === Encoder pulse delivery ===

    /// Record one encoder pulse edge. Pulses arriving while the chassis is
    /// idle are dropped so stray edges cannot corrupt the next move's budget.
    pub fn on_encoder_pulse(&self, wheel: Wheel) {
        if self.motor_state() != MotorState::Stop {
            self.inner.encoders.increment(wheel);
        }
    }

    // === Motion commands ===

    /// Drive straight forward for `rotations` wheel rotations.
    pub fn forward(&self, speed: i32, rotations: i32) -> Result<()> {
        self.begin_move(
            MotorState::Forward,
            speed,
            rotations,
            Direction::Forward,
            Direction::Forward,
        )
    }

    /// Drive straight backward for `rotations` wheel rotations.
    pub fn backward(&self, speed: i32, rotations: i32) -> Result<()> {
        self.begin_move(
            MotorState::Backward,
            speed,
            rotations,
            Direction::Backward,
            Direction::Backward,
        )
    }

    /// Rotate in place to the left (left wheel backward, right forward).
    pub fn turn_left(&self, speed: i32, rotations: i32) -> Result<()> {
        self.begin_move(
            MotorState::Left,
            speed,
            rotations,
            Direction::Backward,
            Direction::Forward,
        )
    }

    /// Rotate in place to the right (left wheel forward, right backward).
    pub fn turn_right(&self, speed: i32, rotations: i32) -> Result<()> {
        self.begin_move(
            MotorState::Right,
            speed,
            rotations,
            Direction::Forward,
            Direction::Backward,
        )
    }

    /// Track the line for at most `rotations` wheel rotations of travel.
    pub fn follow_line(&self, speed: i32, rotations: i32) -> Result<()> {
        self.begin_move(
            MotorState::Follow,
            speed,
            rotations,
            Direction::Forward,
            Direction::Forward,
        )
    }

    pub fn open_claw(&self) -> Result<()> {
        info!("Opening claw");
        self.lock_bus().set_servo_angle(Servo::S1, CLAW_OPEN_ANGLE)?;
        Ok(())
    }

    pub fn close_claw(&self) -> Result<()> {
        info!("Closing claw");
        self.lock_bus().set_servo_angle(Servo::S1, CLAW_CLOSED_ANGLE)?;
        Ok(())
    }

    /// Suspend cooperatively until the current move completes. Matches the
    /// original firmware: no timeout, so a stalled wheel waits forever.
    pub async fn wait_movement_done(&self) {
        while self.motor_state() != MotorState::Stop {
            tokio::time::sleep(WAIT_POLL_INTERVAL).await;
        }
    }

    /// Like [`wait_movement_done`](Self::wait_movement_done), but gives up
    /// after `timeout` if the tick target is never reached.
    pub async fn wait_movement_done_timeout(&self, timeout: Duration) -> Result<()> {
        tokio::time::timeout(timeout, self.wait_movement_done())
            .await
            .map_err(|_| ChassisError::WaitTimeout)
    }

    fn validate(speed: i32, rotations: i32) -> Result<()> {
        if speed < 0 {
            return Err(ChassisError::InvalidArgument {
                reason: format!("negative speed {}", speed),
            });
        }
        if rotations < 0 {
            return Err(ChassisError::InvalidArgument {
                reason: format!("negative rotations {}", rotations),
            });
        }
        Ok(())
    }

    /// Common command path: arm the state machine and issue the initial motor
    /// commands. The control loop owns all correction from here on.
    fn begin_move(
        &self,
        state: MotorState,
        speed: i32,
        rotations: i32,
        l_dir: Direction,
        r_dir: Direction,
    ) -> Result<()> {
        Self::validate(speed, rotations)?;

        let mut bus = self.lock_bus();
        // Pulses the board streamed while stopped (coast-down after the
        // previous move) are still queued on the bus; discard them so they
        // cannot leak into this move's budget.
        bus.drain_pulses()?;
        let calib = {
            let mut ctl = self.lock_control();
            ctl.stop_count = rotations as u32 * TICKS_PER_ROTATION;
            ctl.motor_speed = speed;
            ctl.l_speed = speed;
            ctl.r_speed = speed;
            ctl.last_follow_dir = FollowDir::Straight;
            ctl.motor_calib
        };
        self.inner.encoders.reset();
        self.set_state(state);

        bus.set_motor(Wheel::Left, l_dir, power(speed))?;
        bus.set_motor(Wheel::Right, r_dir, power(speed + calib))?;

        info!(
            "{:?}: speed {} for {} rotations ({} ticks)",
            state,
            speed,
            rotations,
            rotations as u32 * TICKS_PER_ROTATION
        );
        Ok(())
    }

    // === Control loop ===

    /// One control-loop iteration: drain the board's pulse queue, then apply
    /// the policy for the current movement mode.
    pub fn tick(&self) -> Result<()> {
        let mut bus = self.lock_bus();
        for wheel in bus.drain_pulses()? {
            self.on_encoder_pulse(wheel);
        }

        match self.motor_state() {
            MotorState::Stop => Ok(()),
            state @ (MotorState::Forward | MotorState::Backward) => {
                self.tick_drive(&mut *bus, state)
            }
            MotorState::Left | MotorState::Right => self.tick_turn(&mut *bus),
            MotorState::Follow => self.tick_follow(&mut *bus),
        }
    }

    /// Symmetric tick-matching correction: nudge both speeds 1 unit per tick
    /// toward balance once the counters diverge past the dead band, clamped
    /// to `motor_speed ± SPEED_TRIM`.
    fn tick_drive(&self, bus: &mut B, state: MotorState) -> Result<()> {
        let (l_count, r_count) = self.inner.encoders.snapshot();

        let (l_speed, r_speed, stop_count, calib) = {
            let mut ctl = self.lock_control();
            let floor = ctl.motor_speed - SPEED_TRIM;
            let ceil = ctl.motor_speed + SPEED_TRIM;

            if l_count > r_count + COUNT_DEADBAND {
                ctl.l_speed -= 1;
                ctl.r_speed += 1;
                if ctl.l_speed < floor {
                    ctl.l_speed = floor;
                }
                if ctl.r_speed > ceil {
                    ctl.r_speed = ceil;
                }
            } else if r_count > l_count + COUNT_DEADBAND {
                ctl.l_speed += 1;
                ctl.r_speed -= 1;
                if ctl.l_speed > ceil {
                    ctl.l_speed = ceil;
                }
                if ctl.r_speed < floor {
                    ctl.r_speed = floor;
                }
            }

            (ctl.l_speed, ctl.r_speed, ctl.stop_count, ctl.motor_calib)
        };

        if l_count >= stop_count || r_count >= stop_count {
            return self.finish_move(bus, l_count, r_count);
        }

        let dir = match state {
            MotorState::Backward => Direction::Backward,
            _ => Direction::Forward,
        };
        bus.set_motor(Wheel::Left, dir, power(l_speed))?;
        bus.set_motor(Wheel::Right, dir, power(r_speed + calib))?;
        Ok(())
    }

    /// In-place turn: each wheel halts on its own schedule the tick its
    /// counter reaches the target; the move ends once both have.
    fn tick_turn(&self, bus: &mut B) -> Result<()> {
        let (l_count, r_count) = self.inner.encoders.snapshot();
        let stop_count = self.lock_control().stop_count;

        if l_count >= stop_count {
            bus.stop_motor(Wheel::Left)?;
        }
        if r_count >= stop_count {
            bus.stop_motor(Wheel::Right)?;
        }
        if l_count >= stop_count && r_count >= stop_count {
            self.lock_control().motor_speed = 0;
            self.set_state(MotorState::Stop);
            info!("Turn complete: left {} / right {} ticks", l_count, r_count);
        }
        Ok(())
    }

    /// Reactive line-following: steer toward whichever sensor still sees the
    /// line; on full dropout, lean back against the last known correction.
    fn tick_follow(&self, bus: &mut B) -> Result<()> {
        let left_on = bus.read_line_sensor(Wheel::Left)? == LineReading::OnLine;
        let right_on = bus.read_line_sensor(Wheel::Right)? == LineReading::OnLine;
        let (l_count, r_count) = self.inner.encoders.snapshot();

        let (l_speed, r_speed, stop_count, calib) = {
            let mut ctl = self.lock_control();
            let base = ctl.motor_speed;
            match (left_on, right_on) {
                (true, true) => {
                    ctl.l_speed = base;
                    ctl.r_speed = base;
                    ctl.last_follow_dir = FollowDir::Straight;
                }
                (true, false) => {
                    // Chassis drifted right of the line: slow the left wheel.
                    ctl.l_speed = base - ctl.follow_ctrl;
                    ctl.r_speed = base;
                    ctl.last_follow_dir = FollowDir::Left;
                }
                (false, true) => {
                    ctl.l_speed = base;
                    ctl.r_speed = base - ctl.follow_ctrl;
                    ctl.last_follow_dir = FollowDir::Right;
                }
                (false, false) => match ctl.last_follow_dir {
                    // Line lost entirely: lean back the opposite way to
                    // reacquire it.
                    FollowDir::Left => {
                        ctl.l_speed = base;
                        ctl.r_speed = base - ctl.motor_ctrl;
                    }
                    FollowDir::Right => {
                        ctl.l_speed = base - ctl.motor_ctrl;
                        ctl.r_speed = base;
                    }
                    // Dropout while tracking straight holds the previous
                    // speeds unchanged. Quirk kept from the shipped
                    // firmware; see DESIGN.md.
                    FollowDir::Straight => {}
                },
            }
            (ctl.l_speed, ctl.r_speed, ctl.stop_count, ctl.motor_calib)
        };

        if l_count >= stop_count || r_count >= stop_count {
            return self.finish_move(bus, l_count, r_count);
        }

        bus.set_motor(Wheel::Left, Direction::Forward, power(l_speed))?;
        bus.set_motor(Wheel::Right, Direction::Forward, power(r_speed + calib))?;
        Ok(())
    }

    fn finish_move(&self, bus: &mut B, l_count: u32, r_count: u32) -> Result<()> {
        self.lock_control().motor_speed = 0;
        self.set_state(MotorState::Stop);
        bus.stop_all()?;
        info!(
            "Movement complete: left {} / right {} ticks",
            l_count, r_count
        );
        Ok(())
    }
}

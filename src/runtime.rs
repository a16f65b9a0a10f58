// 50 Hz control-loop task plus the one-shot command runner behind the binary.

use std::error::Error;
use std::time::Duration;

use clap::ValueEnum;
use tokio::time::interval;
use tracing::{info, warn};

use crate::board::{BoardLink, ChassisBus};
use crate::chassis::Chassis;
use crate::config::{LOOP_HZ, TELEMETRY_EVERY_TICKS};

/// One-shot commands the binary can execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Command {
    Forward,
    Backward,
    TurnLeft,
    TurnRight,
    FollowLine,
    OpenClaw,
    CloseClaw,
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub port: String,
    pub command: Command,
    pub speed: i32,
    pub rotations: i32,
}

/// Spawn the background control loop for `chassis`: each tick drains the
/// board's encoder pulses and applies the movement policy; a telemetry
/// snapshot is emitted once per second of loop time.
pub fn spawn_control_loop<B: ChassisBus + 'static>(
    chassis: Chassis<B>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = interval(Duration::from_millis(1000 / LOOP_HZ));
        let mut ticks: u64 = 0;
        loop {
            tick.tick().await;

            if let Err(e) = chassis.tick() {
                warn!("Control tick failed: {}", e);
            }

            ticks += 1;
            if ticks % TELEMETRY_EVERY_TICKS == 0 {
                match serde_json::to_string(&chassis.status()) {
                    Ok(json) => info!("status {}", json),
                    Err(e) => warn!("Failed to serialize status: {}", e),
                }
            }
        }
    })
}

pub async fn run(opts: RunOptions) -> Result<(), Box<dyn Error + Send + Sync>> {
    info!("Opening chassis board on {}...", opts.port);
    let mut board = BoardLink::open(&opts.port)?;
    if !board.ping()? {
        return Err("chassis board not responding to ping".into());
    }

    let chassis = Chassis::new(board);
    let loop_task = spawn_control_loop(chassis.clone());
    info!("Runtime started: {}Hz control loop", LOOP_HZ);

    match opts.command {
        Command::Forward => chassis.forward(opts.speed, opts.rotations)?,
        Command::Backward => chassis.backward(opts.speed, opts.rotations)?,
        Command::TurnLeft => chassis.turn_left(opts.speed, opts.rotations)?,
        Command::TurnRight => chassis.turn_right(opts.speed, opts.rotations)?,
        Command::FollowLine => chassis.follow_line(opts.speed, opts.rotations)?,
        Command::OpenClaw => chassis.open_claw()?,
        Command::CloseClaw => chassis.close_claw()?,
    }

    // Claw commands are fire-and-forget; everything else runs until the
    // control loop reaches its tick target.
    if !matches!(opts.command, Command::OpenClaw | Command::CloseClaw) {
        chassis.wait_movement_done().await;
    }

    info!("Done: {:?}", chassis.status());
    loop_task.abort();
    Ok(())
}

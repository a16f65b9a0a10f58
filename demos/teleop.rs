// Keyboard teleop: W/S drive, A/D turn, F follow line, O/C claw, 1-3 speed,
// Q quit
//
// Usage: cargo run --example teleop -- [port]

use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use std::time::Duration;
use tracing::info;

use maqueen_runtime::board::BoardLink;
use maqueen_runtime::chassis::Chassis;
use maqueen_runtime::config::BOARD_PORT;
use maqueen_runtime::runtime::spawn_control_loop;

const SPEEDS: [i32; 3] = [60, 120, 200];
const TURN_SPEEDS: [i32; 3] = [40, 60, 90];
const FOLLOW_ROTATIONS: i32 = 5;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let port = std::env::args()
        .nth(1)
        .unwrap_or_else(|| BOARD_PORT.to_string());

    info!("Opening chassis board on {}...", port);
    let board = BoardLink::open(&port)?;
    let chassis = Chassis::new(board);
    let loop_task = spawn_control_loop(chassis.clone());

    info!("Controls: W/S=drive, A/D=turn, F=follow line, O/C=claw, 1-3=speed, Q=quit");

    enable_raw_mode()?;
    let result = run_teleop(&chassis).await;
    disable_raw_mode()?;
    loop_task.abort();

    result
}

async fn run_teleop(
    chassis: &Chassis<BoardLink>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut speed_idx: usize = 1;

    loop {
        // Poll for key with 20ms timeout (50Hz effective rate)
        if !event::poll(Duration::from_millis(20))? {
            continue;
        }
        let Event::Key(KeyEvent { code, kind, .. }) = event::read()? else {
            continue;
        };
        if kind != KeyEventKind::Press && kind != KeyEventKind::Repeat {
            continue;
        }

        match code {
            KeyCode::Char('w') => chassis.forward(SPEEDS[speed_idx], 1)?,
            KeyCode::Char('s') => chassis.backward(SPEEDS[speed_idx], 1)?,
            KeyCode::Char('a') => chassis.turn_left(TURN_SPEEDS[speed_idx], 1)?,
            KeyCode::Char('d') => chassis.turn_right(TURN_SPEEDS[speed_idx], 1)?,
            KeyCode::Char('f') => chassis.follow_line(SPEEDS[speed_idx], FOLLOW_ROTATIONS)?,
            KeyCode::Char('o') => chassis.open_claw()?,
            KeyCode::Char('c') => chassis.close_claw()?,
            KeyCode::Char(c @ '1'..='3') => {
                speed_idx = (c as usize) - ('1' as usize);
                info!("Speed level {}: {}", c, SPEEDS[speed_idx]);
            }
            KeyCode::Char('q') | KeyCode::Esc => break,
            _ => continue,
        }

        let status = chassis.status();
        info!(
            "[{}] L {} / R {} ticks",
            status.glyph(),
            status.l_count,
            status.r_count
        );
    }

    Ok(())
}

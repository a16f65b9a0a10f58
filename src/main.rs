use clap::Parser;
use tracing_subscriber::EnvFilter;

use maqueen_runtime::config;
use maqueen_runtime::runtime::{Command, RunOptions};

/// Drive the Maqueen chassis: issue one motion command and run the control
/// loop until it completes.
#[derive(Parser)]
#[command(name = "maqueen-runtime")]
struct Args {
    /// Motion command to execute
    #[arg(value_enum)]
    command: Command,

    /// Serial port of the chassis board bridge
    #[arg(long, default_value = config::BOARD_PORT)]
    port: String,

    /// Base motor speed (0-255)
    #[arg(long, default_value_t = 150)]
    speed: i32,

    /// Move length in wheel rotations
    #[arg(long, default_value_t = 1)]
    rotations: i32,
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init();

    let args = Args::parse();
    let opts = RunOptions {
        port: args.port,
        command: args.command,
        speed: args.speed,
        rotations: args.rotations,
    };

    if let Err(e) = maqueen_runtime::runtime::run(opts).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}

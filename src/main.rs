use std::path::PathBuf;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use mecanum_zenoh_runtime::config::{LOOP_HZ, RobotConfig, loop_period};

/// Velocity control runtime for the mecanum base
#[derive(Parser, Debug)]
#[command(name = "mecanum-zenoh-runtime")]
#[command(version)]
#[command(about = "Body velocity commands in, wheel control + odometry out")]
struct Args {
    /// Robot description (JSON); built-in defaults when omitted
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Control loop frequency in Hz (1 to 1000)
    #[arg(long, default_value_t = LOOP_HZ)]
    loop_hz: u64,

    /// Drive wheels open-loop (effort = target / max speed) instead of PID
    #[arg(long)]
    open_loop: bool,

    /// Enable verbose logging (DEBUG level)
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Setup logging (RUST_LOG overrides, e.g. RUST_LOG=mecanum_zenoh_runtime=debug)
    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init(); // installs the subscriber globally

    let config = match &args.config {
        Some(path) => RobotConfig::load(path),
        None => {
            let config = RobotConfig::default();
            config.validate().map(|()| config)
        }
    };
    let config = match loop_period(args.loop_hz).and(config) {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };
    info!("Drive: {:?}", config.drive);

    if let Err(e) = mecanum_zenoh_runtime::runtime::run(config, args.open_loop, args.loop_hz).await {
        error!("Runtime error: {}", e);
        std::process::exit(1);
    }
}

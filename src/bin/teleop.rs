// Keyboard teleop: WASD move, Z/X rotate, R/F speed, Q quit
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use std::time::{Duration, Instant};
use tracing::info;

use mecanum_zenoh_runtime::config::TOPIC_CMD_BASE;
use mecanum_zenoh_runtime::messages::BaseCommand;

const SPEEDS: [f64; 3] = [0.1, 0.3, 0.6]; // m/s
const THETA_SPEEDS: [f64; 3] = [0.3, 0.8, 1.5]; // rad/s
const INPUT_TIMEOUT: Duration = Duration::from_millis(100); // Zero the command after this long with no input

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;
    let publisher = session.declare_publisher(TOPIC_CMD_BASE).await?;

    info!("Publishing to: {}", TOPIC_CMD_BASE);
    info!("Controls: WASD=move, Z/X=rotate, R/F=speed, Q=quit");
    print_speed(0);

    enable_raw_mode()?;
    let result = run_teleop(&publisher).await;
    disable_raw_mode()?;

    result
}

async fn run_teleop(
    publisher: &zenoh::pubsub::Publisher<'_>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut speed_idx: usize = 0;
    let mut cmd = BaseCommand {
        x_vel: 0.0,
        y_vel: 0.0,
        theta_vel: 0.0,
    };
    let mut last_input = Instant::now();

    loop {
        // 20ms poll keeps the publish rate near the runtime's loop rate
        if event::poll(Duration::from_millis(20))? {
            if let Event::Key(KeyEvent { code, kind, .. }) = event::read()? {
                let pressed = kind == KeyEventKind::Press || kind == KeyEventKind::Repeat;
                let speed = SPEEDS[speed_idx];
                let turn = THETA_SPEEDS[speed_idx];

                match code {
                    KeyCode::Char('w') if pressed => cmd.x_vel = speed,
                    KeyCode::Char('s') if pressed => cmd.x_vel = -speed,
                    KeyCode::Char('a') if pressed => cmd.y_vel = speed,
                    KeyCode::Char('d') if pressed => cmd.y_vel = -speed,
                    KeyCode::Char('z') if pressed => cmd.theta_vel = turn,
                    KeyCode::Char('x') if pressed => cmd.theta_vel = -turn,

                    KeyCode::Char('r') if pressed => {
                        speed_idx = (speed_idx + 1).min(SPEEDS.len() - 1);
                        print_speed(speed_idx);
                    }
                    KeyCode::Char('f') if pressed => {
                        speed_idx = speed_idx.saturating_sub(1);
                        print_speed(speed_idx);
                    }

                    KeyCode::Char('q') | KeyCode::Esc if pressed => break,
                    _ => {}
                }

                if pressed && matches!(code, KeyCode::Char('w' | 's' | 'a' | 'd' | 'z' | 'x')) {
                    last_input = Instant::now();
                }
            }
        }

        // Keys released: stop moving
        if last_input.elapsed() > INPUT_TIMEOUT {
            cmd.x_vel = 0.0;
            cmd.y_vel = 0.0;
            cmd.theta_vel = 0.0;
        }

        publisher.put(serde_json::to_string(&cmd)?).await?;
    }

    // Leave the base stopped rather than waiting on the watchdog
    publisher
        .put(serde_json::to_string(&BaseCommand {
            x_vel: 0.0,
            y_vel: 0.0,
            theta_vel: 0.0,
        })?)
        .await?;

    Ok(())
}

fn print_speed(idx: usize) {
    let label = ["LOW", "MED", "HIGH"][idx];
    info!(
        "Speed: {} ({} m/s, {} rad/s)",
        label, SPEEDS[idx], THETA_SPEEDS[idx]
    );
}

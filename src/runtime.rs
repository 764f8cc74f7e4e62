// Fixed-rate control loop with watchdog
// Note: a watchdog is a safety mechanism that triggers a safe action if something goes wrong
// Eg. without it if teleop crashes and stops sending commands, the base would keep driving on the last command

use std::time::{Duration, Instant};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

// local imports
use crate::config::{
    CMD_TIMEOUT, RobotConfig, TOPIC_CMD_BASE, TOPIC_HEALTH, TOPIC_JOINT_STATES, TOPIC_ODOM,
    loop_period,
};
use crate::control::velocity::{CommandHandle, VelocityController};
use crate::messages::{BaseCommand, JointState, Odometry, RuntimeHealth, Stamp};
use crate::motor::kinematics::BodyVelocity;
use crate::odometry::Pose2D;
use crate::sim::SimulatedBase;

/// Everything the loop publishes after one cycle
#[derive(Debug, Clone)]
pub struct CycleOutput {
    pub odometry: Odometry,
    pub joint_state: JointState,
    pub health: RuntimeHealth,
}

pub struct Runtime {
    controller: VelocityController,
    commands: CommandHandle,
    cmd_timeout: Duration,
    pose: Pose2D,
    last_tick: Option<Instant>,
    health: RuntimeHealth,
}

impl Runtime {
    pub fn new(controller: VelocityController, cmd_timeout: Duration) -> Self {
        Self {
            commands: controller.command_handle(),
            controller,
            cmd_timeout,
            pose: Pose2D::default(),
            last_tick: None,
            health: RuntimeHealth::CmdStale, // Start stale until first cmd
        }
    }

    /// Handle the command subscriber writes into
    pub fn command_handle(&self) -> CommandHandle {
        self.commands.clone()
    }

    /// Zero the command if it went stale, and track health transitions
    fn check_watchdog(&mut self, now: Instant) {
        if self.commands.expire_if_stale(now, self.cmd_timeout) {
            // Watchdog triggered - stop the robot
            if self.health != RuntimeHealth::CmdStale {
                warn!(
                    "Command stale (older than {:?}), stopping robot",
                    self.cmd_timeout
                );
            }
            self.health = RuntimeHealth::CmdStale;
        } else {
            if self.health != RuntimeHealth::Ok {
                info!("Receiving commands");
            }
            self.health = RuntimeHealth::Ok;
        }
    }

    /// One control cycle: watchdog, wheel loops, odometry
    pub fn tick(&mut self, now: Instant, stamp: Stamp) -> CycleOutput {
        self.check_watchdog(now);
        self.controller.update_at(now);

        let velocity = self.controller.robot_velocity();
        if let Some(last) = self.last_tick {
            self.pose
                .integrate(velocity, now.saturating_duration_since(last).as_secs_f64());
        }
        self.last_tick = Some(now);

        let joint_state = JointState {
            stamp,
            frame_id: "base_link".to_string(),
            name: self
                .controller
                .wheel_names()
                .iter()
                .map(|n| n.to_string())
                .collect(),
            position: self.controller.wheel_angles(),
            velocity: self.controller.wheel_velocities(),
        };

        CycleOutput {
            odometry: Odometry::new(stamp, self.pose, velocity),
            joint_state,
            health: self.health,
        }
    }

    pub fn health(&self) -> RuntimeHealth {
        self.health
    }

    pub fn pose(&self) -> Pose2D {
        self.pose
    }

    pub fn controller(&self) -> &VelocityController {
        &self.controller
    }

    /// Stop all wheels
    pub fn stop(&mut self) {
        info!("Stopping all wheels");
        self.controller.stop();
    }
}

/// Decode a JSON `BaseCommand` payload into the command slot.
/// Returns false (and keeps the previous command) if the payload does not parse.
pub fn handle_command_payload(commands: &CommandHandle, payload: &[u8]) -> bool {
    match serde_json::from_slice::<BaseCommand>(payload) {
        Ok(cmd) => {
            debug!("Received command: {:?}", cmd);
            commands.set(BodyVelocity::from(&cmd));
            true
        }
        Err(e) => {
            warn!("Failed to parse command: {}", e);
            false
        }
    }
}

pub async fn run(
    config: RobotConfig,
    open_loop: bool,
    loop_hz: u64,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let period = loop_period(loop_hz)?;

    let mut plant = SimulatedBase::new(
        config.drive.wheel_count(),
        &config.sim,
        config.encoder.edges_per_revolution,
    );
    let controller = plant.build_controller(&config, open_loop)?;
    let mut runtime = Runtime::new(controller, CMD_TIMEOUT);

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    info!("Setting up publishers and subscribers...");
    let subscriber = session.declare_subscriber(TOPIC_CMD_BASE).await?;
    let pub_odom = session.declare_publisher(TOPIC_ODOM).await?;
    let pub_joints = session.declare_publisher(TOPIC_JOINT_STATES).await?;
    let pub_health = session.declare_publisher(TOPIC_HEALTH).await?;

    // Commands land in the single-slot cell from their own task; the loop only reads it
    let commands = runtime.command_handle();
    tokio::spawn(async move {
        while let Ok(sample) = subscriber.recv_async().await {
            handle_command_payload(&commands, &sample.payload().to_bytes());
        }
        warn!("Command subscriber closed");
    });

    let mut tick = interval(period);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(
        "Runtime started: {}Hz loop, {}ms watchdog timeout, {}",
        loop_hz,
        CMD_TIMEOUT.as_millis(),
        if open_loop { "open-loop" } else { "closed-loop" }
    );
    info!("Subscribed to: {}", TOPIC_CMD_BASE);
    info!(
        "Publishing to: {}, {}, {}",
        TOPIC_ODOM, TOPIC_JOINT_STATES, TOPIC_HEALTH
    );

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    let mut last_step = Instant::now();

    loop {
        tokio::select! {
            _ = tick.tick() => {}
            _ = &mut shutdown => {
                info!("Shutdown requested");
                break;
            }
        }

        // 1. Advance the plant to now
        let now = Instant::now();
        plant.step(now.saturating_duration_since(last_step).as_secs_f64());
        last_step = now;

        // 2. Run the control cycle (includes watchdog logic)
        let output = runtime.tick(now, Stamp::now());

        // 3. Publish odometry and joint states
        pub_odom.put(serde_json::to_string(&output.odometry)?).await?;
        pub_joints
            .put(serde_json::to_string(&output.joint_state)?)
            .await?;

        // 4. Publish health
        pub_health.put(serde_json::to_string(&output.health)?).await?;
    }

    runtime.stop();
    Ok(())
}

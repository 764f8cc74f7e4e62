// Define message types for the runtime

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::motor::kinematics::BodyVelocity;
use crate::odometry::Pose2D;

// Command from teleop/planner -> runtime
// x_vel, y_vel in m/s, theta_vel in rad/s, all in the robot frame
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BaseCommand {
    pub x_vel: f64,
    pub y_vel: f64,
    pub theta_vel: f64,
}

impl From<&BaseCommand> for BodyVelocity {
    fn from(cmd: &BaseCommand) -> Self {
        BodyVelocity::new(cmd.x_vel, cmd.y_vel, cmd.theta_vel)
    }
}

/// Wall-clock timestamp attached to published state
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Stamp {
    pub sec: u64,
    pub nanosec: u32,
}

impl Stamp {
    pub fn now() -> Self {
        Self::from(SystemTime::now())
    }
}

impl From<SystemTime> for Stamp {
    fn from(time: SystemTime) -> Self {
        // clocks set before 1970 report zero
        let since_epoch = time.duration_since(UNIX_EPOCH).unwrap_or_default();
        Self {
            sec: since_epoch.as_secs(),
            nanosec: since_epoch.subsec_nanos(),
        }
    }
}

/// Yaw-only orientation quaternion
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Orientation {
    pub z: f64,
    pub w: f64,
}

// Pose and achieved velocity, runtime -> odometry consumers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Odometry {
    pub stamp: Stamp,
    pub frame_id: String,
    pub child_frame_id: String,
    pub pose: Pose2D,
    pub orientation: Orientation,
    pub twist: BodyVelocity,
}

impl Odometry {
    pub fn new(stamp: Stamp, pose: Pose2D, twist: BodyVelocity) -> Self {
        let (z, w) = pose.quaternion_zw();
        Self {
            stamp,
            frame_id: "odom".to_string(),
            child_frame_id: "base_link".to_string(),
            pose,
            orientation: Orientation { z, w },
            twist,
        }
    }
}

// Per-wheel angle (rad) and velocity (rad/s), in wheel-index order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JointState {
    pub stamp: Stamp,
    pub frame_id: String,
    pub name: Vec<String>,
    pub position: Vec<f64>,
    pub velocity: Vec<f64>,
}

/// Health status published by runtime
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeHealth {
    Ok,
    CmdStale,
}

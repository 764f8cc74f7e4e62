// Dead-reckoning pose from the achieved body velocity

use serde::{Deserialize, Serialize};

use crate::motor::kinematics::BodyVelocity;

/// Planar pose in the odom frame (x, y in m, theta in rad, wrapped to (-pi, pi])
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose2D {
    pub x: f64,
    pub y: f64,
    pub theta: f64,
}

impl Pose2D {
    /// Advance the pose by a body-frame velocity held for `dt` seconds
    pub fn integrate(&mut self, velocity: BodyVelocity, dt: f64) {
        if !(dt.is_finite() && dt > 0.0) {
            return;
        }

        let (sin, cos) = self.theta.sin_cos();
        self.x += (velocity.vx * cos - velocity.vy * sin) * dt;
        self.y += (velocity.vx * sin + velocity.vy * cos) * dt;

        let theta = self.theta + velocity.omega * dt;
        self.theta = theta.sin().atan2(theta.cos());
    }

    /// Orientation as a yaw-only quaternion, returned as (z, w)
    pub fn quaternion_zw(&self) -> (f64, f64) {
        let half = self.theta / 2.0;
        (half.sin(), half.cos())
    }
}

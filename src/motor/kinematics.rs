// Body <-> wheel kinematics for the supported drive geometries
//
// `inverse` turns a body-frame velocity (vx, vy, omega) into wheel angular
// velocities, `forward` reconstructs the body velocity from measured wheel
// velocities. Both are pure functions of the immutable geometry.

use nalgebra::{Matrix3, Matrix3x4, Matrix4x3, Vector3, Vector4};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Body-frame velocity: vx forward (m/s), vy left (m/s), omega counter-clockwise (rad/s)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BodyVelocity {
    pub vx: f64,
    pub vy: f64,
    pub omega: f64,
}

impl BodyVelocity {
    pub fn new(vx: f64, vy: f64, omega: f64) -> Self {
        Self { vx, vy, omega }
    }

    pub fn zero() -> Self {
        Self::default()
    }

    pub fn is_finite(&self) -> bool {
        self.vx.is_finite() && self.vy.is_finite() && self.omega.is_finite()
    }

    /// Returns [vx, vy, omega]
    pub fn as_array(&self) -> [f64; 3] {
        [self.vx, self.vy, self.omega]
    }
}

/// Mapping between body velocity and a fixed-order vector of wheel velocities
pub trait Kinematics: Send + Sync {
    fn wheel_count(&self) -> usize;

    /// Joint names in wheel-index order
    fn wheel_names(&self) -> &'static [&'static str];

    /// Body velocity -> wheel angular velocities (rad/s), one per wheel
    fn inverse(&self, body: BodyVelocity) -> Vec<f64>;

    /// Wheel angular velocities (rad/s) -> body velocity
    fn forward(&self, wheels: &[f64]) -> BodyVelocity;
}

/// Wheel order shared by the kinematics, the motor controller manager and
/// the joint state output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WheelIndex {
    FrontLeft = 0,
    FrontRight = 1,
    BackLeft = 2,
    BackRight = 3,
}

impl WheelIndex {
    pub const ALL: [WheelIndex; 4] = [
        WheelIndex::FrontLeft,
        WheelIndex::FrontRight,
        WheelIndex::BackLeft,
        WheelIndex::BackRight,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn joint_name(self) -> &'static str {
        MECANUM_JOINT_NAMES[self.index()]
    }
}

const MECANUM_JOINT_NAMES: [&str; 4] = [
    "wheel_front_left_joint",
    "wheel_front_right_joint",
    "wheel_back_left_joint",
    "wheel_back_right_joint",
];

/// Per-wheel coefficients on (vx, vy, k * omega), rows in `WheelIndex` order.
/// The signs encode each wheel's roller orientation.
const MECANUM_SIGNS: [[f64; 3]; 4] = [
    [1.0, -1.0, -1.0], // front left
    [1.0, 1.0, 1.0],   // front right
    [1.0, 1.0, -1.0],  // back left
    [1.0, -1.0, 1.0],  // back right
];

fn check_length(name: &'static str, value: f64) -> Result<f64, ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(ConfigError::invalid(name, value))
    }
}

/// Four-wheel mecanum drive (45° rollers, X configuration seen from above)
#[derive(Debug, Clone, PartialEq)]
pub struct MecanumKinematics {
    wheel_radius: f64,
    bot_to_wheel: Matrix4x3<f64>,
    /// Least-squares inverse of `bot_to_wheel`, (BᵀB)⁻¹Bᵀ
    wheel_to_bot: Matrix3x4<f64>,
}

impl MecanumKinematics {
    /// # Arguments
    /// * `wheel_radius` - Wheel radius in m
    /// * `wheel_base` - Distance between front and rear wheel contact points in m
    /// * `track_width` - Distance between left and right wheel contact points in m
    pub fn new(wheel_radius: f64, wheel_base: f64, track_width: f64) -> Result<Self, ConfigError> {
        let wheel_radius = check_length("wheel_radius", wheel_radius)?;
        let wheel_base = check_length("wheel_base", wheel_base)?;
        let track_width = check_length("track_width", track_width)?;

        // half wheel base + half track width
        let lever = (wheel_base + track_width) / 2.0;
        let bot_to_wheel = Matrix4x3::from_fn(|row, col| {
            let sign = MECANUM_SIGNS[row][col];
            if col == 2 {
                sign * lever / wheel_radius
            } else {
                sign / wheel_radius
            }
        });

        let wheel_to_bot = (bot_to_wheel.transpose() * bot_to_wheel)
            .try_inverse()
            .map(|m| m * bot_to_wheel.transpose())
            .ok_or_else(|| ConfigError::invalid("mecanum geometry", "singular wheel layout"))?;

        Ok(Self {
            wheel_radius,
            bot_to_wheel,
            wheel_to_bot,
        })
    }

    pub fn wheel_radius(&self) -> f64 {
        self.wheel_radius
    }
}

impl Kinematics for MecanumKinematics {
    fn wheel_count(&self) -> usize {
        4
    }

    fn wheel_names(&self) -> &'static [&'static str] {
        &MECANUM_JOINT_NAMES
    }

    fn inverse(&self, body: BodyVelocity) -> Vec<f64> {
        let wheels = self.bot_to_wheel * Vector3::from(body.as_array());
        wheels.iter().copied().collect()
    }

    fn forward(&self, wheels: &[f64]) -> BodyVelocity {
        debug_assert_eq!(wheels.len(), 4, "mecanum drive has four wheels");

        let wheels = Vector4::from_iterator(wheels.iter().copied().chain(std::iter::repeat(0.0)));
        BodyVelocity::from(self.wheel_to_bot * wheels)
    }
}

impl From<Vector3<f64>> for BodyVelocity {
    fn from(v: Vector3<f64>) -> Self {
        BodyVelocity::new(v[0], v[1], v[2])
    }
}

const OMNI_JOINT_NAMES: [&str; 3] = ["wheel_left_joint", "wheel_back_joint", "wheel_right_joint"];

/// Wheel mounting angles (degrees) with -90° offset
/// Left wheel at 240°, Back wheel at 0°, Right wheel at 120°
const OMNI_WHEEL_ANGLES_DEG: [f64; 3] = [240.0 - 90.0, 0.0 - 90.0, 120.0 - 90.0];

/// Three-wheel omni base, wheel order [left, back, right]
#[derive(Debug, Clone, PartialEq)]
pub struct OmniKinematics {
    /// Rows map (vx, vy, omega) to one wheel's angular velocity
    bot_to_wheel: Matrix3<f64>,
    wheel_to_bot: Matrix3<f64>,
}

impl OmniKinematics {
    /// # Arguments
    /// * `wheel_radius` - Wheel radius in m
    /// * `base_radius` - Distance from the base center to each wheel in m
    pub fn new(wheel_radius: f64, base_radius: f64) -> Result<Self, ConfigError> {
        let wheel_radius = check_length("wheel_radius", wheel_radius)?;
        let base_radius = check_length("base_radius", base_radius)?;

        // Each row: [cos(angle), sin(angle), base_radius] / wheel_radius
        let bot_to_wheel = Matrix3::from_fn(|row, col| {
            let angle = OMNI_WHEEL_ANGLES_DEG[row].to_radians();
            let coefficient = match col {
                0 => angle.cos(),
                1 => angle.sin(),
                _ => base_radius,
            };
            coefficient / wheel_radius
        });

        let wheel_to_bot = bot_to_wheel
            .try_inverse()
            .ok_or_else(|| ConfigError::invalid("omni geometry", "singular wheel layout"))?;

        Ok(Self {
            bot_to_wheel,
            wheel_to_bot,
        })
    }
}

impl Kinematics for OmniKinematics {
    fn wheel_count(&self) -> usize {
        3
    }

    fn wheel_names(&self) -> &'static [&'static str] {
        &OMNI_JOINT_NAMES
    }

    fn inverse(&self, body: BodyVelocity) -> Vec<f64> {
        let wheels = self.bot_to_wheel * Vector3::from(body.as_array());
        wheels.iter().copied().collect()
    }

    fn forward(&self, wheels: &[f64]) -> BodyVelocity {
        debug_assert_eq!(wheels.len(), 3, "omni drive has three wheels");

        let wheels = Vector3::from_iterator(wheels.iter().copied().chain(std::iter::repeat(0.0)));
        BodyVelocity::from(self.wheel_to_bot * wheels)
    }
}

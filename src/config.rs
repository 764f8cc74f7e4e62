// Timeouts, topics and the robot description
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::control::pid::{PidGains, PidLimits};
use crate::error::ConfigError;
use crate::motor::kinematics::{Kinematics, MecanumKinematics, OmniKinematics};

// Control loop frequency
pub const LOOP_HZ: u64 = 50;
pub const MAX_LOOP_HZ: u64 = 1000;

// Command timeout for watchdog
pub const CMD_TIMEOUT: Duration = Duration::from_millis(500);

// Zenoh topics
pub const TOPIC_CMD_BASE: &str = "mecanum/cmd/base"; // body velocity commands
pub const TOPIC_ODOM: &str = "mecanum/state/odom"; // pose + achieved velocity
pub const TOPIC_JOINT_STATES: &str = "mecanum/state/joint_states"; // wheel angles + velocities
pub const TOPIC_HEALTH: &str = "mecanum/state/health"; // health status

/// Tick period for a control loop running at `loop_hz`, which must be in 1..=MAX_LOOP_HZ
pub fn loop_period(loop_hz: u64) -> Result<Duration, ConfigError> {
    if !(1..=MAX_LOOP_HZ).contains(&loop_hz) {
        return Err(ConfigError::invalid("loop_hz", loop_hz));
    }
    Ok(Duration::from_micros(1_000_000 / loop_hz))
}

/// Drive geometry, lengths in meters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DriveGeometry {
    Mecanum {
        wheel_radius: f64,
        wheel_base: f64,
        track_width: f64,
    },
    Omni {
        wheel_radius: f64,
        base_radius: f64,
    },
}

impl Default for DriveGeometry {
    fn default() -> Self {
        DriveGeometry::Mecanum {
            wheel_radius: 0.075,
            wheel_base: 0.38,
            track_width: 0.32,
        }
    }
}

impl DriveGeometry {
    pub fn wheel_count(&self) -> usize {
        match self {
            DriveGeometry::Mecanum { .. } => 4,
            DriveGeometry::Omni { .. } => 3,
        }
    }

    /// Build the kinematics model for this geometry
    pub fn kinematics(&self) -> Result<Box<dyn Kinematics>, ConfigError> {
        Ok(match *self {
            DriveGeometry::Mecanum {
                wheel_radius,
                wheel_base,
                track_width,
            } => Box::new(MecanumKinematics::new(wheel_radius, wheel_base, track_width)?),
            DriveGeometry::Omni {
                wheel_radius,
                base_radius,
            } => Box::new(OmniKinematics::new(wheel_radius, base_radius)?),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PidConfig {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    /// Bound on the accumulated error integral; derived from `output_limit / ki` when absent
    pub integral_limit: Option<f64>,
    pub output_limit: f64,
}

impl Default for PidConfig {
    fn default() -> Self {
        Self {
            kp: 0.05,
            ki: 0.5,
            kd: 0.0,
            integral_limit: None,
            output_limit: 1.0,
        }
    }
}

impl PidConfig {
    pub fn gains(&self) -> PidGains {
        PidGains::new(self.kp, self.ki, self.kd)
    }

    pub fn limits(&self) -> PidLimits {
        let mut limits = PidLimits::for_output(&self.gains(), self.output_limit);
        if self.integral_limit.is_some() {
            limits.integral_limit = self.integral_limit;
        }
        limits
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    /// Edges counted over one wheel revolution
    pub edges_per_revolution: u32,
    /// Per wheel, empty means none reversed
    pub reversed: Vec<bool>,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            edges_per_revolution: 1440,
            reversed: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PwmConfig {
    pub frequency_hz: u32,
    pub resolution_bits: u8,
    /// Per wheel, empty means none reversed
    pub reversed: Vec<bool>,
}

impl Default for PwmConfig {
    fn default() -> Self {
        Self {
            frequency_hz: 1000,
            resolution_bits: 8,
            reversed: Vec::new(),
        }
    }
}

/// Simulated wheel plant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Wheel speed at full effort, rad/s
    pub max_wheel_speed: f64,
    /// First-order time constant of the wheel, s
    pub time_constant: f64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            max_wheel_speed: 20.0,
            time_constant: 0.1,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RobotConfig {
    pub drive: DriveGeometry,
    pub pid: PidConfig,
    pub encoder: EncoderConfig,
    pub pwm: PwmConfig,
    pub sim: SimConfig,
}

impl RobotConfig {
    /// Read a JSON config file; missing fields fall back to defaults
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        info!("Loading robot config from {}", path.display());
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.drive.kinematics()?;
        let wheels = self.drive.wheel_count();

        for (name, gain) in [
            ("pid.kp", self.pid.kp),
            ("pid.ki", self.pid.ki),
            ("pid.kd", self.pid.kd),
        ] {
            if !gain.is_finite() || gain < 0.0 {
                return Err(ConfigError::invalid(name, gain));
            }
        }
        if !(self.pid.output_limit.is_finite() && self.pid.output_limit > 0.0) {
            return Err(ConfigError::invalid("pid.output_limit", self.pid.output_limit));
        }
        if let Some(limit) = self.pid.integral_limit {
            if !(limit.is_finite() && limit > 0.0) {
                return Err(ConfigError::invalid("pid.integral_limit", limit));
            }
        }

        if self.encoder.edges_per_revolution == 0 {
            return Err(ConfigError::invalid("encoder.edges_per_revolution", 0));
        }
        if self.pwm.frequency_hz == 0 {
            return Err(ConfigError::invalid("pwm.frequency_hz", 0));
        }
        if !(1..=16).contains(&self.pwm.resolution_bits) {
            return Err(ConfigError::invalid(
                "pwm.resolution_bits",
                self.pwm.resolution_bits,
            ));
        }

        for (name, flags) in [
            ("encoder.reversed", &self.encoder.reversed),
            ("pwm.reversed", &self.pwm.reversed),
        ] {
            if !flags.is_empty() && flags.len() != wheels {
                return Err(ConfigError::invalid(
                    name,
                    format!("{} entries for {} wheels", flags.len(), wheels),
                ));
            }
        }

        if !(self.sim.max_wheel_speed.is_finite() && self.sim.max_wheel_speed > 0.0) {
            return Err(ConfigError::invalid("sim.max_wheel_speed", self.sim.max_wheel_speed));
        }
        if !(self.sim.time_constant.is_finite() && self.sim.time_constant > 0.0) {
            return Err(ConfigError::invalid("sim.time_constant", self.sim.time_constant));
        }

        Ok(())
    }

    pub fn encoder_reversed(&self, wheel: usize) -> bool {
        self.encoder.reversed.get(wheel).copied().unwrap_or(false)
    }

    pub fn pwm_reversed(&self, wheel: usize) -> bool {
        self.pwm.reversed.get(wheel).copied().unwrap_or(false)
    }
}

// Per-wheel velocity controllers
//
// A motor controller owns one encoder and one actuator and regulates the
// wheel's angular velocity towards its target. It knows nothing about the
// body frame; the manager and the velocity controller take care of that.

use std::time::Instant;

use crate::control::pid::{Pid, PidGains, PidLimits};
use crate::error::ConfigError;

use super::actuator::Actuator;
use super::encoder::Encoder;

/// One wheel's velocity regulator
pub trait MotorController: Send {
    /// Desired wheel angular velocity in rad/s
    fn set_target(&mut self, velocity: f64);

    fn target(&self) -> f64;

    /// Sample the encoder and drive the actuator. `now` is the cycle timestamp.
    fn update(&mut self, now: Instant);

    /// Last measured wheel angular velocity in rad/s
    fn measured_velocity(&self) -> f64;

    /// Accumulated wheel angle in rad
    fn angle(&self) -> f64;

    /// Zero the target, cut the output and drop any controller history
    fn stop(&mut self);
}

/// Closed-loop wheel controller: encoder feedback through a PID law
#[derive(Debug)]
pub struct PidMotorController<A> {
    encoder: Encoder,
    actuator: A,
    pid: Pid,
    target: f64,
    last_update: Option<Instant>,
}

impl<A: Actuator> PidMotorController<A> {
    /// Create a controller whose effort is limited to the actuator range [-1, 1]
    pub fn new(encoder: Encoder, actuator: A, gains: PidGains) -> Self {
        Self::with_limits(encoder, actuator, gains, PidLimits::for_output(&gains, 1.0))
    }

    pub fn with_limits(encoder: Encoder, actuator: A, gains: PidGains, limits: PidLimits) -> Self {
        Self {
            encoder,
            actuator,
            pid: Pid::with_limits(gains, limits),
            target: 0.0,
            last_update: None,
        }
    }

    pub fn encoder(&self) -> &Encoder {
        &self.encoder
    }

    pub fn actuator(&self) -> &A {
        &self.actuator
    }

    pub fn pid(&self) -> &Pid {
        &self.pid
    }
}

impl<A: Actuator> MotorController for PidMotorController<A> {
    fn set_target(&mut self, velocity: f64) {
        self.target = velocity;
    }

    fn target(&self) -> f64 {
        self.target
    }

    fn update(&mut self, now: Instant) {
        self.encoder.sample_at(now);

        // zero on the first cycle, which the PID treats as "hold output"
        let dt = self
            .last_update
            .map(|last| now.saturating_duration_since(last).as_secs_f64())
            .unwrap_or(0.0);
        self.last_update = Some(now);

        let effort = self.pid.update(self.target, self.encoder.velocity(), dt);
        self.actuator.apply(effort);
    }

    fn measured_velocity(&self) -> f64 {
        self.encoder.velocity()
    }

    fn angle(&self) -> f64 {
        self.encoder.angle()
    }

    fn stop(&mut self) {
        self.target = 0.0;
        self.pid.reset();
        self.actuator.apply(0.0);
    }
}

/// Feed-forward only: effort = target / max_velocity. The encoder is still
/// sampled so the wheel shows up in odometry and joint states.
#[derive(Debug)]
pub struct OpenLoopMotorController<A> {
    encoder: Encoder,
    actuator: A,
    /// Wheel velocity reached at full effort, rad/s
    max_velocity: f64,
    target: f64,
}

impl<A: Actuator> OpenLoopMotorController<A> {
    pub fn new(encoder: Encoder, actuator: A, max_velocity: f64) -> Result<Self, ConfigError> {
        if !(max_velocity.is_finite() && max_velocity > 0.0) {
            return Err(ConfigError::invalid("max_wheel_speed", max_velocity));
        }

        Ok(Self {
            encoder,
            actuator,
            max_velocity,
            target: 0.0,
        })
    }

    pub fn actuator(&self) -> &A {
        &self.actuator
    }
}

impl<A: Actuator> MotorController for OpenLoopMotorController<A> {
    fn set_target(&mut self, velocity: f64) {
        self.target = velocity;
    }

    fn target(&self) -> f64 {
        self.target
    }

    fn update(&mut self, now: Instant) {
        self.encoder.sample_at(now);
        self.actuator.apply(self.target / self.max_velocity);
    }

    fn measured_velocity(&self) -> f64 {
        self.encoder.velocity()
    }

    fn angle(&self) -> f64 {
        self.encoder.angle()
    }

    fn stop(&mut self) {
        self.target = 0.0;
        self.actuator.apply(0.0);
    }
}

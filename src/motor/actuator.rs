// Actuator stage: signed control effort -> H-bridge direction + PWM duty
//
// Purely open-loop. The pin-level side (direction GPIOs, PWM channel) sits
// behind `PwmOutput` so the same driver runs against real hardware or the
// simulated plant.

use tracing::debug;

use crate::error::ConfigError;

/// Rotation direction requested from the bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Forward,
    Backward,
}

/// One write to the bridge: direction pins + duty cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PwmCommand {
    pub direction: Direction,
    /// 0..=max_duty, where max_duty = 2^resolution_bits - 1
    pub duty: u32,
}

/// Pin-level output of an H-bridge (e.g. L298N IN1/IN2 + ENA)
pub trait PwmOutput: Send {
    /// Called once when the driver is built
    fn configure(&mut self, _frequency_hz: u32, _resolution_bits: u8) {}

    fn write(&mut self, command: PwmCommand);
}

/// Anything that turns a normalized effort into motor drive
pub trait Actuator: Send {
    /// Apply a signed effort in [-1, 1]. Out-of-range values are clamped.
    fn apply(&mut self, effort: f64);

    /// Last effort applied, after clamping
    fn effort(&self) -> f64;
}

/// Map a signed effort onto direction + duty for a bridge with `max_duty` steps
pub fn effort_to_pwm(effort: f64, max_duty: u32) -> PwmCommand {
    let effort = clamp_effort(effort);
    let direction = if effort < 0.0 {
        Direction::Backward
    } else {
        Direction::Forward
    };
    let duty = (effort.abs() * max_duty as f64).round() as u32;

    PwmCommand {
        direction,
        duty: duty.min(max_duty),
    }
}

fn clamp_effort(effort: f64) -> f64 {
    if effort.is_nan() {
        0.0
    } else {
        effort.clamp(-1.0, 1.0)
    }
}

/// Dual-direction H-bridge motor driver
#[derive(Debug)]
pub struct HBridge<O> {
    output: O,
    max_duty: u32,
    /// -1.0 for motors wired or mounted mirrored
    sign: f64,
    effort: f64,
    command: PwmCommand,
}

impl<O: PwmOutput> HBridge<O> {
    /// Configure the output and leave the motor stopped
    pub fn new(
        mut output: O,
        frequency_hz: u32,
        resolution_bits: u8,
        reversed: bool,
    ) -> Result<Self, ConfigError> {
        if frequency_hz == 0 {
            return Err(ConfigError::invalid("pwm.frequency_hz", frequency_hz));
        }
        if !(1..=16).contains(&resolution_bits) {
            return Err(ConfigError::invalid("pwm.resolution_bits", resolution_bits));
        }

        debug!(
            "Configuring H-bridge: {} Hz, {} bit, reversed={}",
            frequency_hz, resolution_bits, reversed
        );
        output.configure(frequency_hz, resolution_bits);

        let mut bridge = Self {
            output,
            max_duty: (1u32 << resolution_bits) - 1,
            sign: if reversed { -1.0 } else { 1.0 },
            effort: 0.0,
            command: PwmCommand::default(),
        };
        bridge.apply(0.0);
        Ok(bridge)
    }

    /// Last command written to the pins
    pub fn command(&self) -> PwmCommand {
        self.command
    }

    pub fn max_duty(&self) -> u32 {
        self.max_duty
    }

    pub fn output(&self) -> &O {
        &self.output
    }
}

impl<O: PwmOutput> Actuator for HBridge<O> {
    fn apply(&mut self, effort: f64) {
        self.effort = clamp_effort(effort);
        self.command = effort_to_pwm(self.sign * self.effort, self.max_duty);
        self.output.write(self.command);
    }

    fn effort(&self) -> f64 {
        self.effort
    }
}

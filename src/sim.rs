// Simulated wheel plant standing in for the motor hardware
//
// Each wheel is a first-order lag from PWM effort to shaft speed. Shaft
// rotation is turned into encoder edges and pushed into the same
// `EdgeCounter` an interrupt handler would feed, so the whole control stack
// runs unchanged on top of it.

use std::f64::consts::TAU;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::info;

use crate::config::{RobotConfig, SimConfig};
use crate::control::velocity::VelocityController;
use crate::error::ConfigError;
use crate::motor::actuator::{Direction, HBridge, PwmCommand, PwmOutput};
use crate::motor::controller::{MotorController, OpenLoopMotorController, PidMotorController};
use crate::motor::encoder::{EdgeCounter, Encoder};
use crate::motor::manager::MotorControllerManager;

#[derive(Debug, Default)]
struct WheelState {
    /// Effort currently applied by the bridge, [-1, 1]
    effort: f64,
    /// Shaft speed, rad/s
    velocity: f64,
    /// Rotation not yet reported as a whole edge
    edge_fraction: f64,
}

/// Pin-level output of one simulated H-bridge
#[derive(Debug, Clone)]
pub struct SimPwm {
    state: Arc<Mutex<WheelState>>,
    max_duty: u32,
}

impl PwmOutput for SimPwm {
    fn configure(&mut self, _frequency_hz: u32, resolution_bits: u8) {
        self.max_duty = (1u32 << resolution_bits) - 1;
    }

    fn write(&mut self, command: PwmCommand) {
        let magnitude = command.duty as f64 / self.max_duty.max(1) as f64;
        let effort = match command.direction {
            Direction::Forward => magnitude,
            Direction::Backward => -magnitude,
        };
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .effort = effort;
    }
}

#[derive(Debug)]
struct SimulatedWheel {
    state: Arc<Mutex<WheelState>>,
    counter: Arc<EdgeCounter>,
}

/// A set of simulated wheels sharing one plant model
#[derive(Debug)]
pub struct SimulatedBase {
    wheels: Vec<SimulatedWheel>,
    max_wheel_speed: f64,
    time_constant: f64,
    radians_per_edge: f64,
}

impl SimulatedBase {
    pub fn new(wheel_count: usize, sim: &SimConfig, edges_per_revolution: u32) -> Self {
        let wheels = (0..wheel_count)
            .map(|_| SimulatedWheel {
                state: Arc::new(Mutex::new(WheelState::default())),
                counter: Arc::new(EdgeCounter::new()),
            })
            .collect();

        Self {
            wheels,
            max_wheel_speed: sim.max_wheel_speed,
            time_constant: sim.time_constant,
            radians_per_edge: TAU / edges_per_revolution.max(1) as f64,
        }
    }

    pub fn wheel_count(&self) -> usize {
        self.wheels.len()
    }

    /// PWM output for wheel `index`, to be wrapped in an `HBridge`
    pub fn pwm(&self, index: usize) -> SimPwm {
        SimPwm {
            state: Arc::clone(&self.wheels[index].state),
            max_duty: 1,
        }
    }

    /// Edge counter for wheel `index`, to be read by an `Encoder`
    pub fn counter(&self, index: usize) -> Arc<EdgeCounter> {
        Arc::clone(&self.wheels[index].counter)
    }

    /// Advance every wheel by `dt` seconds and emit the resulting edges
    pub fn step(&mut self, dt: f64) {
        if !(dt.is_finite() && dt > 0.0) {
            return;
        }
        let alpha = 1.0 - (-dt / self.time_constant).exp();

        for wheel in &self.wheels {
            let mut state = wheel.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.velocity += (self.max_wheel_speed * state.effort - state.velocity) * alpha;

            state.edge_fraction += state.velocity * dt / self.radians_per_edge;
            let edges = state.edge_fraction.trunc();
            state.edge_fraction -= edges;
            wheel.counter.add(edges as i32);
        }
    }

    /// True shaft speeds, rad/s
    pub fn wheel_velocities(&self) -> Vec<f64> {
        self.wheels
            .iter()
            .map(|w| w.state.lock().unwrap_or_else(PoisonError::into_inner).velocity)
            .collect()
    }

    /// Wire a complete velocity controller onto this plant: one encoder and
    /// one H-bridge per wheel, closed-loop PID or open-loop feed-forward.
    pub fn build_controller(
        &self,
        config: &RobotConfig,
        open_loop: bool,
    ) -> Result<VelocityController, ConfigError> {
        config.validate()?;

        let mut controllers: Vec<Box<dyn MotorController>> = Vec::with_capacity(self.wheels.len());
        for index in 0..self.wheels.len() {
            let encoder = Encoder::new(
                self.counter(index),
                config.encoder.edges_per_revolution,
                config.encoder_reversed(index),
            )?;
            let bridge = HBridge::new(
                self.pwm(index),
                config.pwm.frequency_hz,
                config.pwm.resolution_bits,
                config.pwm_reversed(index),
            )?;

            let controller: Box<dyn MotorController> = if open_loop {
                Box::new(OpenLoopMotorController::new(
                    encoder,
                    bridge,
                    config.sim.max_wheel_speed,
                )?)
            } else {
                Box::new(PidMotorController::with_limits(
                    encoder,
                    bridge,
                    config.pid.gains(),
                    config.pid.limits(),
                ))
            };
            controllers.push(controller);
        }

        info!(
            "Built {} {} wheel controllers on the simulated plant",
            controllers.len(),
            if open_loop { "open-loop" } else { "PID" }
        );

        let manager = MotorControllerManager::new(controllers)?;
        VelocityController::new(manager, config.drive.kinematics()?)
    }
}

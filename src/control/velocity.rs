// Body velocity controller: command -> wheel targets -> wheel loops -> achieved velocity
//
// The command slot is written from the inbound message handler and read once
// per cycle by `update`. Everything else runs on the control loop.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::error::ConfigError;
use crate::motor::kinematics::{BodyVelocity, Kinematics};
use crate::motor::manager::MotorControllerManager;

/// Latest body velocity command and when it arrived
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StampedCommand {
    pub velocity: BodyVelocity,
    /// `None` until the first command arrives
    pub received_at: Option<Instant>,
}

/// Single-slot command cell shared between the command source and the control loop.
///
/// Writers overwrite, the reader takes a copy; there is no queue and no history.
/// The whole vector is replaced under one short lock so the loop never sees a
/// half-written command.
#[derive(Debug, Clone, Default)]
pub struct CommandHandle {
    slot: Arc<Mutex<StampedCommand>>,
}

impl CommandHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, velocity: BodyVelocity) {
        self.set_at(velocity, Instant::now());
    }

    /// Store `velocity` as the latest command. A command with a NaN or
    /// infinite component is dropped and the previous one kept.
    pub fn set_at(&self, velocity: BodyVelocity, now: Instant) {
        if !velocity.is_finite() {
            warn!("Ignoring non-finite command: {:?}", velocity);
            return;
        }
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        *slot = StampedCommand {
            velocity,
            received_at: Some(now),
        };
    }

    pub fn latest(&self) -> StampedCommand {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Zero the commanded velocity but keep the arrival time, so a stale
    /// command stays stale until a fresh one comes in
    pub fn expire(&self) {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        slot.velocity = BodyVelocity::zero();
    }

    /// Zero the command if it is older than `timeout` at `now` (or never arrived).
    /// Checked and cleared under one lock so a command landing in between is kept.
    /// Returns true if the command was stale.
    pub fn expire_if_stale(&self, now: Instant, timeout: Duration) -> bool {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        let stale = match slot.received_at {
            Some(at) => now.saturating_duration_since(at) > timeout,
            None => true,
        };
        if stale {
            slot.velocity = BodyVelocity::zero();
        }
        stale
    }
}

pub struct VelocityController {
    commands: CommandHandle,
    manager: MotorControllerManager,
    kinematics: Box<dyn Kinematics>,
    wheel_targets: Vec<f64>,
    robot_velocity: BodyVelocity,
}

impl VelocityController {
    /// Pair a manager with a kinematics model. Fails if the number of
    /// controllers does not match the drive's wheel count.
    pub fn new(
        manager: MotorControllerManager,
        kinematics: Box<dyn Kinematics>,
    ) -> Result<Self, ConfigError> {
        if manager.len() != kinematics.wheel_count() {
            return Err(ConfigError::WheelCountMismatch {
                controllers: manager.len(),
                wheels: kinematics.wheel_count(),
            });
        }

        info!(
            "Velocity controller ready: {} wheels ({})",
            kinematics.wheel_count(),
            kinematics.wheel_names().join(", ")
        );

        Ok(Self {
            commands: CommandHandle::new(),
            wheel_targets: vec![0.0; manager.len()],
            manager,
            kinematics,
            robot_velocity: BodyVelocity::zero(),
        })
    }

    /// Handle for the command source; may be moved to another task or thread
    pub fn command_handle(&self) -> CommandHandle {
        self.commands.clone()
    }

    pub fn set_command(&self, velocity: BodyVelocity) {
        self.commands.set(velocity);
    }

    pub fn command(&self) -> StampedCommand {
        self.commands.latest()
    }

    pub fn update(&mut self) {
        self.update_at(Instant::now());
    }

    /// Run one control cycle with `now` as the cycle timestamp
    pub fn update_at(&mut self, now: Instant) {
        let command = self.commands.latest().velocity;

        self.wheel_targets = self.kinematics.inverse(command);
        self.manager.set_targets(&self.wheel_targets);
        self.manager.update_at(now);

        let measured = self.manager.measured_velocities();
        self.robot_velocity = self.kinematics.forward(&measured);

        debug!(
            "cmd={:?} targets={:?} measured={:?} achieved={:?}",
            command, self.wheel_targets, measured, self.robot_velocity
        );
    }

    /// Achieved body velocity as of the last update
    pub fn robot_velocity(&self) -> BodyVelocity {
        self.robot_velocity
    }

    /// Wheel targets computed in the last update
    pub fn wheel_targets(&self) -> &[f64] {
        &self.wheel_targets
    }

    pub fn wheel_velocities(&self) -> Vec<f64> {
        self.manager.measured_velocities()
    }

    pub fn wheel_angles(&self) -> Vec<f64> {
        self.manager.angles()
    }

    pub fn wheel_names(&self) -> &'static [&'static str] {
        self.kinematics.wheel_names()
    }

    pub fn manager(&self) -> &MotorControllerManager {
        &self.manager
    }

    /// Zero the command and stop every wheel immediately
    pub fn stop(&mut self) {
        self.commands.expire();
        self.wheel_targets.iter_mut().for_each(|t| *t = 0.0);
        self.manager.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motor::controller::MotorController;
    use crate::motor::kinematics::{MecanumKinematics, OmniKinematics};
    use crate::motor::manager::tests::FakeController;
    use std::thread;

    /// Wheel that reaches its target within one cycle
    #[derive(Default)]
    struct IdealWheel {
        target: f64,
        measured: f64,
        angle: f64,
    }

    impl MotorController for IdealWheel {
        fn set_target(&mut self, velocity: f64) {
            self.target = velocity;
        }

        fn target(&self) -> f64 {
            self.target
        }

        fn update(&mut self, _now: Instant) {
            self.measured = self.target;
            self.angle += self.target * 0.02;
        }

        fn measured_velocity(&self) -> f64 {
            self.measured
        }

        fn angle(&self) -> f64 {
            self.angle
        }

        fn stop(&mut self) {
            self.target = 0.0;
            self.measured = 0.0;
        }
    }

    fn ideal_controller() -> VelocityController {
        let wheels = (0..4)
            .map(|_| Box::new(IdealWheel::default()) as Box<dyn MotorController>)
            .collect();
        let manager = MotorControllerManager::new(wheels).unwrap();
        let kinematics = MecanumKinematics::new(0.075, 0.38, 0.32).unwrap();
        VelocityController::new(manager, Box::new(kinematics)).unwrap()
    }

    #[test]
    fn test_wheel_count_mismatch_is_rejected() {
        let wheels = (0..4)
            .map(|_| Box::new(FakeController::default()) as Box<dyn MotorController>)
            .collect();
        let manager = MotorControllerManager::new(wheels).unwrap();
        let omni = OmniKinematics::new(0.05, 0.125).unwrap();

        let result = VelocityController::new(manager, Box::new(omni));
        assert!(matches!(
            result,
            Err(ConfigError::WheelCountMismatch {
                controllers: 4,
                wheels: 3
            })
        ));
    }

    #[test]
    fn test_no_command_means_zero_targets() {
        let mut vc = ideal_controller();
        assert_eq!(vc.command().received_at, None);
        vc.update();
        assert_eq!(vc.wheel_targets(), &[0.0; 4]);
        assert_eq!(vc.robot_velocity(), BodyVelocity::zero());
    }

    #[test]
    fn test_forward_command_end_to_end() {
        let mut vc = ideal_controller();
        vc.set_command(BodyVelocity::new(1.0, 0.0, 0.0));
        vc.update();

        for &t in vc.wheel_targets() {
            assert!((t - 1.0 / 0.075).abs() < 1e-9);
        }
        assert_eq!(vc.manager().targets(), vc.wheel_targets());

        let v = vc.robot_velocity();
        assert!((v.vx - 1.0).abs() < 1e-9);
        assert!(v.vy.abs() < 1e-9);
        assert!(v.omega.abs() < 1e-9);
    }

    #[test]
    fn test_latest_command_wins() {
        let mut vc = ideal_controller();
        vc.set_command(BodyVelocity::new(1.0, 0.0, 0.0));
        vc.set_command(BodyVelocity::new(0.0, 0.0, 0.5));
        vc.update();

        let v = vc.robot_velocity();
        assert!(v.vx.abs() < 1e-9);
        assert!((v.omega - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_wheel_telemetry_in_joint_order() {
        let mut vc = ideal_controller();
        vc.set_command(BodyVelocity::new(0.0, 0.3, 0.0));
        vc.update();

        assert_eq!(vc.wheel_names().len(), 4);
        assert_eq!(vc.wheel_velocities(), vc.wheel_targets().to_vec());
        let angles = vc.wheel_angles();
        assert!(angles[0] < 0.0 && angles[1] > 0.0);
    }

    #[test]
    fn test_stop_zeroes_command_and_wheels() {
        let mut vc = ideal_controller();
        let handle = vc.command_handle();
        handle.set(BodyVelocity::new(0.5, 0.5, 0.5));
        vc.update();
        let stamp = vc.command().received_at;

        vc.stop();
        assert_eq!(vc.command().velocity, BodyVelocity::zero());
        assert_eq!(vc.command().received_at, stamp);
        assert_eq!(vc.manager().targets(), vec![0.0; 4]);
    }

    #[test]
    fn test_expire_if_stale() {
        let handle = CommandHandle::new();
        let timeout = Duration::from_millis(500);
        let start = Instant::now();

        // never received
        assert!(handle.expire_if_stale(start, timeout));

        handle.set_at(BodyVelocity::new(1.0, 0.0, 0.0), start);
        assert!(!handle.expire_if_stale(start + Duration::from_millis(400), timeout));
        assert_eq!(handle.latest().velocity.vx, 1.0);

        assert!(handle.expire_if_stale(start + Duration::from_millis(600), timeout));
        assert_eq!(handle.latest().velocity, BodyVelocity::zero());
        assert_eq!(handle.latest().received_at, Some(start));
    }

    #[test]
    fn test_non_finite_command_is_dropped() {
        let handle = CommandHandle::new();
        let start = Instant::now();
        handle.set_at(BodyVelocity::new(0.5, 0.0, 0.0), start);

        handle.set_at(BodyVelocity::new(f64::NAN, 0.0, 0.0), start + Duration::from_millis(20));
        handle.set_at(BodyVelocity::new(0.0, f64::INFINITY, 0.0), start + Duration::from_millis(40));

        let latest = handle.latest();
        assert_eq!(latest.velocity, BodyVelocity::new(0.5, 0.0, 0.0));
        assert_eq!(latest.received_at, Some(start));
    }

    #[test]
    fn test_overflowing_command_keeps_efforts_finite() {
        use crate::control::pid::PidGains;
        use crate::motor::actuator::Actuator;
        use crate::motor::controller::PidMotorController;
        use crate::motor::encoder::{EdgeCounter, Encoder};

        /// Records every effort it is asked to apply
        struct EffortLog(Arc<Mutex<Vec<f64>>>);

        impl Actuator for EffortLog {
            fn apply(&mut self, effort: f64) {
                self.0.lock().unwrap().push(effort);
            }

            fn effort(&self) -> f64 {
                self.0.lock().unwrap().last().copied().unwrap_or(0.0)
            }
        }

        let log = Arc::new(Mutex::new(Vec::new()));
        let wheels = (0..4)
            .map(|_| {
                let encoder = Encoder::new(Arc::new(EdgeCounter::new()), 1440, false).unwrap();
                Box::new(PidMotorController::new(
                    encoder,
                    EffortLog(Arc::clone(&log)),
                    PidGains::new(0.05, 0.5, 0.0),
                )) as Box<dyn MotorController>
            })
            .collect();
        let manager = MotorControllerManager::new(wheels).unwrap();
        let kinematics = MecanumKinematics::new(0.075, 0.38, 0.32).unwrap();
        let mut vc = VelocityController::new(manager, Box::new(kinematics)).unwrap();

        // finite on the wire, infinite once divided by the wheel radius
        vc.set_command(BodyVelocity::new(1e308, 0.0, 0.0));
        assert!(vc.kinematics.inverse(vc.command().velocity)[0].is_infinite());

        let start = Instant::now();
        for i in 0..5u32 {
            vc.update_at(start + Duration::from_millis(20) * i);
        }

        let efforts = log.lock().unwrap().clone();
        assert_eq!(efforts.len(), 20);
        assert!(efforts.iter().all(|e| e.is_finite()), "efforts: {:?}", efforts);
        assert!(vc.robot_velocity().is_finite());
    }

    #[test]
    fn test_commands_from_another_thread_are_never_torn() {
        let mut vc = ideal_controller();
        let handle = vc.command_handle();

        let writer = thread::spawn(move || {
            for i in 0..5_000 {
                let k = i as f64 * 1e-3;
                handle.set(BodyVelocity::new(k, k, k));
            }
        });

        while !writer.is_finished() {
            vc.update();
            let v = vc.robot_velocity();
            assert!((v.vx - v.vy).abs() < 1e-9 && (v.vy - v.omega).abs() < 1e-9);
        }
        writer.join().unwrap();

        vc.update();
        let v = vc.robot_velocity();
        assert!((v.vx - 4.999).abs() < 1e-9);
    }
}

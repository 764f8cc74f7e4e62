// Fan-out/fan-in of wheel vectors over a fixed set of motor controllers
//
// Index i of every wheel vector belongs to controller i, in the order the
// controllers were registered. The length is checked once at startup by
// whoever pairs the manager with a kinematics model.

use std::time::Instant;

use tracing::{debug, info};

use crate::error::ConfigError;

use super::controller::MotorController;

pub struct MotorControllerManager {
    controllers: Vec<Box<dyn MotorController>>,
}

impl MotorControllerManager {
    pub fn new(controllers: Vec<Box<dyn MotorController>>) -> Result<Self, ConfigError> {
        if controllers.is_empty() {
            return Err(ConfigError::NoControllers);
        }
        info!("Motor controller manager with {} wheels", controllers.len());
        Ok(Self { controllers })
    }

    /// Number of registered controllers
    pub fn len(&self) -> usize {
        self.controllers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controllers.is_empty()
    }

    /// Hand each wheel its target, by index
    pub fn set_targets(&mut self, targets: &[f64]) {
        debug_assert_eq!(targets.len(), self.controllers.len());
        for (controller, &target) in self.controllers.iter_mut().zip(targets) {
            controller.set_target(target);
        }
    }

    pub fn targets(&self) -> Vec<f64> {
        self.controllers.iter().map(|c| c.target()).collect()
    }

    pub fn update(&mut self) {
        self.update_at(Instant::now());
    }

    /// Update every controller in index order with the same cycle timestamp
    pub fn update_at(&mut self, now: Instant) {
        for controller in &mut self.controllers {
            controller.update(now);
        }
    }

    /// Measured wheel velocities in the same order as the targets
    pub fn measured_velocities(&self) -> Vec<f64> {
        self.controllers
            .iter()
            .map(|c| c.measured_velocity())
            .collect()
    }

    /// Accumulated wheel angles in the same order as the targets
    pub fn angles(&self) -> Vec<f64> {
        self.controllers.iter().map(|c| c.angle()).collect()
    }

    /// Stop every wheel
    pub fn stop(&mut self) {
        debug!("Stopping all {} wheels", self.controllers.len());
        for controller in &mut self.controllers {
            controller.stop();
        }
    }

    pub fn controllers(&self) -> &[Box<dyn MotorController>] {
        &self.controllers
    }
}

impl Drop for MotorControllerManager {
    fn drop(&mut self) {
        // don't leave the motors running on the last command
        self.stop();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Controller that reports whatever velocity it is told to and logs its calls
    #[derive(Default)]
    pub(crate) struct FakeController {
        pub target: f64,
        pub measured: f64,
        pub angle: f64,
        pub stopped: bool,
        pub log: Option<(usize, Arc<Mutex<Vec<usize>>>)>,
    }

    impl MotorController for FakeController {
        fn set_target(&mut self, velocity: f64) {
            self.target = velocity;
        }

        fn target(&self) -> f64 {
            self.target
        }

        fn update(&mut self, _now: Instant) {
            if let Some((id, log)) = &self.log {
                log.lock().unwrap().push(*id);
            }
        }

        fn measured_velocity(&self) -> f64 {
            self.measured
        }

        fn angle(&self) -> f64 {
            self.angle
        }

        fn stop(&mut self) {
            self.target = 0.0;
            self.stopped = true;
        }
    }

    fn manager_with(measured: [f64; 4]) -> MotorControllerManager {
        let controllers = measured
            .iter()
            .enumerate()
            .map(|(i, &m)| {
                Box::new(FakeController {
                    measured: m,
                    angle: i as f64,
                    ..Default::default()
                }) as Box<dyn MotorController>
            })
            .collect();
        MotorControllerManager::new(controllers).unwrap()
    }

    #[test]
    fn test_rejects_empty() {
        assert!(matches!(
            MotorControllerManager::new(Vec::new()),
            Err(ConfigError::NoControllers)
        ));
    }

    #[test]
    fn test_set_targets_keeps_index_order() {
        let mut manager = manager_with([0.0; 4]);
        manager.set_targets(&[1.0, -2.0, 3.5, 4.25]);

        let targets: Vec<f64> = manager.controllers().iter().map(|c| c.target()).collect();
        assert_eq!(targets, vec![1.0, -2.0, 3.5, 4.25]);
        assert_eq!(manager.targets(), targets);
    }

    #[test]
    fn test_measured_velocities_keep_index_order() {
        let manager = manager_with([0.5, -1.5, 2.0, 7.0]);
        assert_eq!(manager.measured_velocities(), vec![0.5, -1.5, 2.0, 7.0]);
        assert_eq!(manager.angles(), vec![0.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_update_visits_controllers_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let controllers = (0..4)
            .map(|i| {
                Box::new(FakeController {
                    log: Some((i, Arc::clone(&log))),
                    ..Default::default()
                }) as Box<dyn MotorController>
            })
            .collect();
        let mut manager = MotorControllerManager::new(controllers).unwrap();

        manager.update();
        manager.update();
        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2, 3, 0, 1, 2, 3]);
    }

    #[test]
    fn test_stop_zeroes_targets() {
        let mut manager = manager_with([0.0; 4]);
        manager.set_targets(&[1.0, 1.0, 1.0, 1.0]);
        manager.stop();
        assert_eq!(manager.targets(), vec![0.0; 4]);
    }
}

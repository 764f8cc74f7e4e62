// Per-wheel motion control for the drive base
//
// Provides:
// - Encoder sampling (interrupt-side edge counter + angle/velocity estimate)
// - Actuator stage (signed effort -> H-bridge direction + PWM duty)
// - Closed-loop wheel controllers and the manager that fans targets out to them
// - Body <-> wheel kinematics for the supported drive geometries

pub mod actuator;
pub mod controller;
pub mod encoder;
pub mod kinematics;
pub mod manager;

pub use actuator::{Actuator, Direction, HBridge, PwmCommand, PwmOutput};
pub use controller::{MotorController, OpenLoopMotorController, PidMotorController};
pub use encoder::{EdgeCounter, Encoder};
pub use kinematics::{BodyVelocity, Kinematics, MecanumKinematics, OmniKinematics, WheelIndex};
pub use manager::MotorControllerManager;

// Velocity control runtime for a four-wheeled mecanum base
//
// Body velocity commands come in over zenoh, get turned into per-wheel targets,
// regulated by one PID loop per wheel, and the achieved body velocity is
// reconstructed from the encoders for odometry.

pub mod config;
pub mod control;
pub mod error;
pub mod messages;
pub mod motor;
pub mod odometry;
pub mod runtime;
pub mod sim;

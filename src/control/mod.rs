// Control laws and the body velocity controller

pub mod pid;
pub mod velocity;

pub use pid::{Pid, PidGains, PidLimits};
pub use velocity::{CommandHandle, StampedCommand, VelocityController};

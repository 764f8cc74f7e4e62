// Startup errors
//
// Everything that can go wrong at runtime is handled by policy (clamp, hold last
// value), so the only errors the core reports are configuration problems found
// while wiring the drive together.

/// Errors raised while building the control stack
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value}")]
    InvalidParameter { name: &'static str, value: String },

    #[error("Drive has {wheels} wheels but {controllers} motor controllers were registered")]
    WheelCountMismatch { controllers: usize, wheels: usize },

    #[error("No motor controllers registered")]
    NoControllers,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

impl ConfigError {
    pub(crate) fn invalid(name: &'static str, value: impl ToString) -> Self {
        Self::InvalidParameter {
            name,
            value: value.to_string(),
        }
    }
}

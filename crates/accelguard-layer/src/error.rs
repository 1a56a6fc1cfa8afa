use accelguard_common::{ConfigError, ValidationError};

use crate::driver::DriverError;

/// Errors returned by layer entry points.
#[derive(Debug, thiserror::Error)]
pub enum LayerError {
    /// The layer refused the call; the driver was not invoked.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The driver itself failed.
    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl LayerError {
    /// The validation error, if the layer produced this failure.
    pub const fn validation(&self) -> Option<&ValidationError> {
        match self {
            Self::Validation(err) => Some(err),
            _ => None,
        }
    }

    pub const fn is_driver_error(&self) -> bool {
        matches!(self, Self::Driver(_))
    }
}

pub type Result<T> = std::result::Result<T, LayerError>;

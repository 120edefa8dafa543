//! Error handling.

use std::error::Error as StdError;

use anyhow::Error as AnyError;
use displaydoc::Display;

use quarry::QuarryError;

pub type ControllerResult<T> = Result<T, ControllerError>;

/// An error.
#[derive(Debug, Display)]
pub enum ControllerError {
    /// Configuration error: {0}
    ConfigError(AnyError),

    /// Error from the common components.
    CoreError(QuarryError),
}

impl ControllerError {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ConfigError(_) => "ConfigError",
            Self::CoreError(_) => "CoreError",
        }
    }

    pub fn config_error(error: impl StdError + Send + Sync + 'static) -> Self {
        Self::ConfigError(AnyError::new(error))
    }
}

impl From<QuarryError> for ControllerError {
    fn from(error: QuarryError) -> Self {
        Self::CoreError(error)
    }
}

impl StdError for ControllerError {}

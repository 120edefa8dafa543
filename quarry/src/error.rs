//! Error handling.

use std::error::Error as StdError;

use anyhow::Error as AnyError;
use displaydoc::Display;

pub type QuarryResult<T> = Result<T, QuarryError>;

/// An error.
#[derive(Debug, Display)]
pub enum QuarryError {
    /// Invalid {kind} name "{name}": {reason}
    InvalidName {
        kind: &'static str,
        name: String,
        reason: &'static str,
    },

    /// {kind} {value} is out of range [{min}, {max}]
    ValueOutOfRange {
        kind: &'static str,
        value: u64,
        min: u64,
        max: u64,
    },

    /// Unknown flag name "{name}"
    UnknownFlag { name: String },

    /// Invalid property key "{key}": {reason}
    InvalidPropKey { key: String, reason: &'static str },

    /// Role "{subject}" has no {requested} access to this object
    AccessDenied {
        subject: String,
        requested: &'static str,
    },

    /// The {kind} already exists
    AlreadyExists { kind: &'static str },

    /// Number pool exhausted
    PoolExhausted,

    /// Number {0} is already in use
    ValueInUse(u32),

    /// Persistence driver error: {0}
    DriverError(AnyError),

    /// Implementation error: {0}
    ImplementationError(String),
}

impl QuarryError {
    pub fn name(&self) -> &'static str {
        match self {
            Self::InvalidName { .. } => "InvalidName",
            Self::ValueOutOfRange { .. } => "ValueOutOfRange",
            Self::UnknownFlag { .. } => "UnknownFlag",
            Self::InvalidPropKey { .. } => "InvalidPropKey",
            Self::AccessDenied { .. } => "AccessDenied",
            Self::AlreadyExists { .. } => "AlreadyExists",
            Self::PoolExhausted => "PoolExhausted",
            Self::ValueInUse(_) => "ValueInUse",
            Self::DriverError(_) => "DriverError",
            Self::ImplementationError(_) => "ImplementationError",
        }
    }

    pub fn driver_error(error: impl StdError + Send + Sync + 'static) -> Self {
        Self::DriverError(AnyError::new(error))
    }

    /// A programming or integration defect. Not a recoverable runtime
    /// condition; callers are expected to abort the operation.
    pub fn implementation_error(message: impl Into<String>) -> Self {
        Self::ImplementationError(message.into())
    }
}

impl StdError for QuarryError {}

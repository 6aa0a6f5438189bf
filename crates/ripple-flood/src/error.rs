//! Flood-specific error types

use thiserror::Error;

/// Errors that can occur in the flood subsystem
#[derive(Debug, Error)]
pub enum FloodError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Timer errors
    #[error("Schedule error: {0}")]
    Schedule(#[from] ScheduleError),

    /// Frame codec errors
    #[error("Frame error: {0}")]
    Frame(#[from] ripple_core::FrameError),

    /// A record for this sequence is already retained
    #[error("Sequence {0} is already registered")]
    DuplicateSequence(u32),

    /// The service task has stopped
    #[error("Flood service is no longer running")]
    ServiceClosed,
}

/// Configuration errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    /// A required option was not supplied
    #[error("Missing required option {0}")]
    MissingField(&'static str),

    /// An option has an unusable value
    #[error("Invalid value for {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field,
            reason: reason.into(),
        }
    }
}

/// Timer arming errors
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleError {
    /// `now + delay` cannot be represented
    #[error("Deadline for sequence {sequence} is out of range")]
    DeadlineOverflow { sequence: u32 },

    /// The broadcast already reached a terminal state
    #[error("Sequence {sequence} has already fired")]
    AlreadyFired { sequence: u32 },
}

/// Result type for flood operations
pub type FloodResult<T> = Result<T, FloodError>;

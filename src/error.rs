//! Errors returned by `ShrinkMap` operations.

use core::fmt;

pub type Result<T, E = ShrinkMapError> = core::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ShrinkMapError {
    #[error("invalid configuration: {field}: {reason}")]
    InvalidConfig { field: &'static str, reason: String },

    #[error("map has been stopped")]
    MapStopped,

    #[error("maximum capacity exceeded (current size: {current}, max size: {max})")]
    CapacityExceeded { current: usize, max: usize },

    #[error("shrink operation failed: {reason}")]
    ShrinkFailed { reason: String },

    #[error("batch operation failed: {reason}")]
    BatchFailed { reason: String },
}

/// Stable, payload-free classification of a [`ShrinkMapError`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum ErrorKind {
    InvalidConfig,
    MapStopped,
    ShrinkFailed,
    BatchFailed,
    CapacityExceeded,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::InvalidConfig => "INVALID_CONFIG",
            ErrorKind::MapStopped => "MAP_STOPPED",
            ErrorKind::ShrinkFailed => "SHRINK_FAILED",
            ErrorKind::BatchFailed => "BATCH_FAILED",
            ErrorKind::CapacityExceeded => "CAPACITY_EXCEEDED",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ShrinkMapError {
    pub(crate) fn invalid_config(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field,
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidConfig { .. } => ErrorKind::InvalidConfig,
            Self::MapStopped => ErrorKind::MapStopped,
            Self::CapacityExceeded { .. } => ErrorKind::CapacityExceeded,
            Self::ShrinkFailed { .. } => ErrorKind::ShrinkFailed,
            Self::BatchFailed { .. } => ErrorKind::BatchFailed,
        }
    }

    pub fn is_map_stopped(&self) -> bool {
        matches!(self, Self::MapStopped)
    }

    pub fn is_capacity_exceeded(&self) -> bool {
        matches!(self, Self::CapacityExceeded { .. })
    }
}

//! Error types for the event scan.

use chrono::{DateTime, Utc};
use ros_common::CommonError;
use thiserror::Error;

/// Errors that abort a scan.
///
/// Truncated freeze windows are not represented here: they travel on the
/// event itself (see [`crate::event::FreezeFraction`]).
#[derive(Error, Debug)]
pub enum ScanError {
    /// An expected hourly slice is not available.
    #[error("input gap: no slice for {time}: {reason}")]
    InputGap { time: DateTime<Utc>, reason: String },

    /// A slice was found but one of its fields is absent or misshapen.
    #[error("input slice for {time} is missing field '{field}': {reason}")]
    MissingField {
        time: DateTime<Utc>,
        field: String,
        reason: String,
    },

    /// Hours were presented out of strict hourly order.
    #[error("out-of-order hour: expected {expected}, got {found}")]
    OutOfOrder {
        expected: DateTime<Utc>,
        found: DateTime<Utc>,
    },

    /// The checkpoint was written by an incompatible engine.
    #[error("checkpoint schema version {found} is not supported (expected {expected})")]
    CheckpointVersion { found: u32, expected: u32 },

    /// The checkpoint decodes but does not belong to this run.
    #[error("checkpoint does not match this run: {0}")]
    CheckpointMismatch(String),

    /// A resume was requested but no checkpoint exists for it.
    #[error("checkpoint not found: {0}")]
    CheckpointMissing(String),

    /// Threshold or range values are out of their valid domain.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Catalog output failed.
    #[error("catalog error: {0}")]
    Catalog(String),

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Checkpoint or catalog (de)serialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl ScanError {
    /// Create a Configuration error.
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create an InputGap error.
    pub fn input_gap(time: DateTime<Utc>, reason: impl Into<String>) -> Self {
        Self::InputGap {
            time,
            reason: reason.into(),
        }
    }

    /// Create a MissingField error.
    pub fn missing_field(
        time: DateTime<Utc>,
        field: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::MissingField {
            time,
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a CheckpointMismatch error.
    pub fn checkpoint_mismatch(msg: impl Into<String>) -> Self {
        Self::CheckpointMismatch(msg.into())
    }

    /// True for errors that mean the input archive itself is incomplete.
    pub fn is_input_failure(&self) -> bool {
        matches!(self, Self::InputGap { .. } | Self::MissingField { .. })
    }
}

impl From<serde_json::Error> for ScanError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for ScanError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Configuration(err.to_string())
    }
}

impl From<CommonError> for ScanError {
    fn from(err: CommonError) -> Self {
        Self::Configuration(err.to_string())
    }
}

/// Result type for scan operations.
pub type Result<T> = std::result::Result<T, ScanError>;

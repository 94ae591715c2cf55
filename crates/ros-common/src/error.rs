//! Error types for shared grid and time handling.

use thiserror::Error;

/// Result type alias using CommonError.
pub type CommonResult<T> = Result<T, CommonError>;

/// Errors raised while building time axes, grids and snapshots.
#[derive(Debug, Error)]
pub enum CommonError {
    #[error("Invalid time format: {0}")]
    InvalidTime(String),

    #[error("Invalid time range {start} .. {end}: {message}")]
    InvalidRange {
        start: String,
        end: String,
        message: String,
    },

    #[error("Field '{field}' has {found} values, grid expects {expected}")]
    ShapeMismatch {
        field: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("Cell ({row}, {col}) is outside a {ny}x{nx} grid")]
    CellOutOfBounds {
        row: usize,
        col: usize,
        ny: usize,
        nx: usize,
    },

    #[error("Region mask selects no grid cells")]
    EmptyRegion,
}

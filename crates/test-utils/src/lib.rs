//! Shared test utilities for the ros-events workspace.
//!
//! This crate provides common testing infrastructure including:
//! - Synthetic hourly series builders
//! - Small fixed grids and timestamps
//! - MERRA-2 style netCDF day files
//!
//! # Usage
//!
//! Add to your crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! test-utils = { path = "../test-utils" }
//! ```
//!
//! Then import in your tests:
//!
//! ```ignore
//! use test_utils::{fixtures, SeriesBuilder};
//! ```

pub mod fixtures;
pub mod generators;
pub mod netcdf_files;

// Re-export commonly used items at the crate root
pub use fixtures::*;
pub use generators::*;

/// Macro for approximate floating-point equality assertions.
///
/// # Usage
///
/// ```ignore
/// use test_utils::assert_approx_eq;
///
/// assert_approx_eq!(1.0001_f64, 1.0_f64, 0.001_f64); // passes
/// assert_approx_eq!(1.1_f32, 1.0_f32, 0.001_f32);    // fails
/// ```
#[macro_export]
macro_rules! assert_approx_eq {
    ($left:expr, $right:expr, $epsilon:expr) => {{
        let left: f64 = $left as f64;
        let right: f64 = $right as f64;
        let epsilon: f64 = $epsilon as f64;
        let diff = (left - right).abs();
        if diff > epsilon {
            panic!(
                concat!(
                    "assertion failed: `(left ≈ right)`\n",
                    "  left: `{:?}`,\n right: `{:?}`,\n",
                    "  diff: `{:?}` > epsilon `{:?}`"
                ),
                left, right, diff, epsilon
            );
        }
    }};
}

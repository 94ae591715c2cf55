//! Common types shared by the rain-on-snow event engine and its services.

pub mod bbox;
pub mod error;
pub mod grid;
pub mod time;

pub use bbox::LatLonBox;
pub use error::{CommonError, CommonResult};
pub use grid::{CellCoord, CellIndex, Field, GridShape, GridSnapshot, LatLonGrid};
pub use time::{hour_index, parse_timestamp, TimeAxis, YearMonth};

//! Common test fixtures for ros-events tests.
//!
//! This module provides pre-defined grids and timestamps that represent
//! common scenarios in the event scan.

use chrono::{DateTime, TimeZone, Utc};
use ros_common::LatLonGrid;

/// Small grids for testing.
pub mod grid {
    use super::LatLonGrid;

    /// One cell near Fairbanks.
    pub fn single_cell() -> LatLonGrid {
        LatLonGrid::new(vec![64.5], vec![-147.5])
    }

    /// 2 x 3 cells on the MERRA-2 0.5° x 0.625° spacing, inside the
    /// interior Alaska box.
    pub fn interior_alaska() -> LatLonGrid {
        LatLonGrid::new(vec![64.0, 64.5], vec![-148.75, -148.125, -147.5])
    }

    /// 2 x 2 cells where the western column falls outside every Alaska box.
    pub fn straddling_alaska() -> LatLonGrid {
        LatLonGrid::new(vec![60.0, 60.5], vec![-200.0, -150.0])
    }
}

/// Reference timestamps.
pub mod time {
    use super::*;

    pub fn ts(year: i32, month: u32, day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(year, month, day, hour, 0, 0)
            .single()
            .unwrap_or_else(|| panic!("invalid fixture time {year}-{month}-{day} {hour}"))
    }

    /// First hour of January 2001.
    pub fn jan_2001() -> DateTime<Utc> {
        ts(2001, 1, 1, 0)
    }
}

/// Threshold values in scan units.
pub mod thresholds {
    /// Hourly rate that qualifies under the default 6.096 mm/day threshold.
    pub const WET_RATE: f32 = 1.0;

    /// Just below the default qualifying rate of 0.254 mm/hr.
    pub const DRIZZLE_RATE: f32 = 0.2;

    /// Snow depth above the default 0.0254 m minimum.
    pub const DEEP_SNOW_M: f32 = 0.5;
}

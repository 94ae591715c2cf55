//! Finalized precipitation events and their annotations.

use chrono::{DateTime, Duration, Utc};
use ros_common::{hour_index, YearMonth};
use serde::{Deserialize, Serialize};

/// Rain-on-snow icing classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IcingCategory {
    NoIce,
    /// Rain melted the snowpack away during the event.
    MeltedSnowpack,
    /// Rain on bare, frozen ground.
    SurfaceFreezeOnBareGround,
    /// Rain into a snowpack that survived the event.
    PersistentSnowpackRefreeze,
}

impl IcingCategory {
    /// Numeric code used in catalog tables (0-3).
    pub fn code(&self) -> u8 {
        match self {
            IcingCategory::NoIce => 0,
            IcingCategory::MeltedSnowpack => 1,
            IcingCategory::SurfaceFreezeOnBareGround => 2,
            IcingCategory::PersistentSnowpackRefreeze => 3,
        }
    }

    pub fn is_icing(&self) -> bool {
        !matches!(self, IcingCategory::NoIce)
    }
}

/// Share of hours at or below 0 °C within one post-event horizon.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FreezeFraction {
    pub horizon_hours: u32,
    /// Hours of the horizon that were actually observed.
    pub observed_hours: u32,
    pub frozen_hours: u32,
    /// `frozen_hours / min(observed_hours, horizon_hours)`; `None` when
    /// nothing was observed.
    pub fraction: Option<f64>,
    /// The series ended before the horizon elapsed; `fraction` is provisional.
    pub truncated: bool,
}

impl FreezeFraction {
    /// A window whose full horizon elapsed.
    pub fn complete(horizon_hours: u32, frozen_hours: u32) -> Self {
        Self {
            horizon_hours,
            observed_hours: horizon_hours,
            frozen_hours,
            fraction: Some(f64::from(frozen_hours) / f64::from(horizon_hours)),
            truncated: false,
        }
    }

    /// A window cut short by the end of the series.
    pub fn truncated(horizon_hours: u32, observed_hours: u32, frozen_hours: u32) -> Self {
        let observed = observed_hours.min(horizon_hours);
        let fraction = (observed > 0).then(|| f64::from(frozen_hours) / f64::from(observed));
        Self {
            horizon_hours,
            observed_hours: observed,
            frozen_hours,
            fraction,
            truncated: observed < horizon_hours,
        }
    }
}

/// One precipitation event at one grid cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrecipEvent {
    /// Dense cell id within the tracked region.
    pub cell_id: usize,
    pub row: usize,
    pub col: usize,

    /// Start of the first qualifying hour (one hour before its slice time).
    pub start: DateTime<Utc>,

    /// Active hours, excluding the trailing gap.
    pub duration_hours: u32,

    /// Slice time of the hour that closed the event.
    pub finalized_at: DateTime<Utc>,

    pub precip_mm: f64,
    pub snowfall_mm: f64,

    pub start_snow_depth_m: f64,
    pub end_snow_depth_m: f64,

    /// Temperature extremes over the qualifying hours; `None` when no
    /// finite sample was seen.
    pub min_surface_temp_c: Option<f64>,
    pub max_surface_temp_c: Option<f64>,
    pub min_air_temp_c: Option<f64>,
    pub max_air_temp_c: Option<f64>,

    /// Assigned by the icing classifier.
    pub icing: Option<IcingCategory>,

    /// One entry per freeze window, assigned when the windows close.
    pub freeze: Vec<FreezeFraction>,
}

impl PrecipEvent {
    /// Liquid share of the event total.
    pub fn rain_mm(&self) -> f64 {
        self.precip_mm - self.snowfall_mm
    }

    /// Start plus active duration; freeze windows are measured from here.
    pub fn end_time(&self) -> DateTime<Utc> {
        self.start + Duration::hours(i64::from(self.duration_hours))
    }

    pub fn end_hour(&self) -> i64 {
        hour_index(self.end_time())
    }

    /// Catalog month: the month of the hour that closed the event.
    pub fn catalog_month(&self) -> YearMonth {
        YearMonth::of(self.finalized_at)
    }

    /// Catalog key.
    pub fn key(&self) -> (usize, usize, DateTime<Utc>) {
        (self.row, self.col, self.start)
    }

    /// Any freeze window closed at series end rather than at its horizon.
    pub fn is_truncated(&self) -> bool {
        self.freeze.iter().any(|f| f.truncated)
    }
}

//! Synthetic hourly series for exercising the event scan.
//!
//! A [`SeriesBuilder`] starts from a calm, above-freezing, snow-free grid and
//! lets a test paint rain, snow depth and temperatures onto chosen cells and
//! hours. Values are already in scan units (mm/hr, m, °C).

use std::ops::Range;

use chrono::{DateTime, Duration, Utc};
use ros_common::{GridShape, GridSnapshot};

/// Every hourly timestamp from `start`, `hours` long.
pub fn hourly(start: DateTime<Utc>, hours: usize) -> Vec<DateTime<Utc>> {
    (0..hours).map(|i| start + Duration::hours(i as i64)).collect()
}

/// A snapshot with every field set to a single value.
pub fn uniform_snapshot(
    valid_time: DateTime<Utc>,
    shape: GridShape,
    precip_rate: f32,
    surface_temp: f32,
) -> GridSnapshot {
    let n = shape.len();
    GridSnapshot {
        valid_time,
        shape,
        precip_rate: vec![precip_rate; n],
        snowfall_rate: vec![0.0; n],
        snow_depth: vec![0.0; n],
        surface_temp: vec![surface_temp; n],
        air_temp: vec![surface_temp; n],
    }
}

/// Builds a contiguous run of hourly snapshots over one grid.
#[derive(Debug, Clone)]
pub struct SeriesBuilder {
    shape: GridShape,
    snapshots: Vec<GridSnapshot>,
}

impl SeriesBuilder {
    /// Dry series at 1 °C with no snow.
    pub fn new(shape: GridShape, start: DateTime<Utc>, hours: usize) -> Self {
        let snapshots = hourly(start, hours)
            .into_iter()
            .map(|t| uniform_snapshot(t, shape, 0.0, 1.0))
            .collect();
        Self { shape, snapshots }
    }

    pub fn shape(&self) -> GridShape {
        self.shape
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    fn paint(
        mut self,
        cell: usize,
        hours: Range<usize>,
        apply: impl Fn(&mut GridSnapshot, usize),
    ) -> Self {
        let end = hours.end.min(self.snapshots.len());
        for snap in &mut self.snapshots[hours.start.min(end)..end] {
            apply(snap, cell);
        }
        self
    }

    /// Precipitation rate on one cell for the given hour offsets.
    pub fn rain(self, cell: usize, hours: Range<usize>, rate: f32) -> Self {
        self.paint(cell, hours, |s, c| s.precip_rate[c] = rate)
    }

    /// Snowfall rate; also adds to the total precipitation rate.
    pub fn snowfall(self, cell: usize, hours: Range<usize>, rate: f32) -> Self {
        self.paint(cell, hours, |s, c| {
            s.snowfall_rate[c] = rate;
            s.precip_rate[c] = s.precip_rate[c].max(rate);
        })
    }

    pub fn snow_depth(self, cell: usize, hours: Range<usize>, depth_m: f32) -> Self {
        self.paint(cell, hours, |s, c| s.snow_depth[c] = depth_m)
    }

    pub fn surface_temp(self, cell: usize, hours: Range<usize>, temp_c: f32) -> Self {
        self.paint(cell, hours, |s, c| s.surface_temp[c] = temp_c)
    }

    pub fn air_temp(self, cell: usize, hours: Range<usize>, temp_c: f32) -> Self {
        self.paint(cell, hours, |s, c| s.air_temp[c] = temp_c)
    }

    /// Same surface temperature on every cell and hour.
    pub fn all_surface_temp(mut self, temp_c: f32) -> Self {
        for snap in &mut self.snapshots {
            snap.surface_temp.iter_mut().for_each(|v| *v = temp_c);
        }
        self
    }

    pub fn build(self) -> Vec<GridSnapshot> {
        self.snapshots
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_hourly_steps() {
        let start = Utc.with_ymd_and_hms(2001, 1, 31, 22, 0, 0).unwrap();
        let hours = hourly(start, 3);
        assert_eq!(hours[2], Utc.with_ymd_and_hms(2001, 2, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_series_builder_paints_cells() {
        let start = Utc.with_ymd_and_hms(2001, 1, 1, 0, 0, 0).unwrap();
        let series = SeriesBuilder::new(GridShape::new(1, 2), start, 5)
            .rain(1, 1..3, 2.0)
            .surface_temp(0, 0..10, -4.0)
            .build();

        assert_eq!(series.len(), 5);
        assert_eq!(series[0].precip_rate, vec![0.0, 0.0]);
        assert_eq!(series[1].precip_rate, vec![0.0, 2.0]);
        assert_eq!(series[3].precip_rate, vec![0.0, 0.0]);
        assert!(series.iter().all(|s| s.surface_temp[0] == -4.0));
        assert!(series.iter().all(|s| s.surface_temp[1] == 1.0));
    }
}

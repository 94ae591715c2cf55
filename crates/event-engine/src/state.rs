//! Per-cell event accumulator.

use chrono::{DateTime, Duration, Utc};
use ros_common::CellCoord;
use serde::{Deserialize, Serialize};

use crate::config::SegmentationThresholds;
use crate::event::PrecipEvent;

/// Running minimum and maximum of a temperature series.
///
/// Only the extremes are needed when an event closes, so samples are folded
/// in as they arrive instead of being retained.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TempRange {
    pub min: f64,
    pub max: f64,
}

impl TempRange {
    fn fold(range: Option<TempRange>, value: f32) -> Option<TempRange> {
        let v = f64::from(value);
        if !v.is_finite() {
            return range;
        }
        Some(match range {
            Some(r) => TempRange {
                min: r.min.min(v),
                max: r.max.max(v),
            },
            None => TempRange { min: v, max: v },
        })
    }
}

/// One cell's inputs for one hour.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellInputs {
    pub precip_rate: f32,
    pub snowfall_rate: f32,
    pub snow_depth: f32,
    pub surface_temp: f32,
    pub air_temp: f32,
}

/// What a cell did during one hour.
#[derive(Debug, Clone, PartialEq)]
pub enum CellStep {
    /// Idle and dry.
    Idle,
    /// Qualifying hour added to an open event.
    Accumulating,
    /// Dry hour inside an open event, gap not yet reached.
    Waiting,
    /// Gap reached and the event met the total threshold.
    Finalized {
        event: PrecipEvent,
        /// Frozen surface hours among the trailing gap hours.
        gap_frozen_hours: u32,
    },
    /// Gap reached but the event fell short of the total threshold.
    Discarded,
}

/// In-progress (or idle) precipitation event for one grid cell.
///
/// A cell is idle exactly when `event_start` is `None`. The temperature
/// ranges stay `None` until a finite sample arrives.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GridCellEventState {
    pub accumulated_precip_mm: f64,
    pub accumulated_snowfall_mm: f64,
    /// Consecutive non-qualifying hours since the last qualifying one.
    pub hours_since_qualifying_precip: u32,
    pub surface_temp: Option<TempRange>,
    pub air_temp: Option<TempRange>,
    pub event_start: Option<DateTime<Utc>>,
    pub start_snow_depth_m: f64,
    /// Frozen surface hours counted while waiting out the gap.
    pub gap_frozen_hours: u32,
}

impl GridCellEventState {
    pub fn is_idle(&self) -> bool {
        self.event_start.is_none()
    }

    /// Advance the cell by one hour whose slice is stamped `valid_time`.
    pub fn step(
        &mut self,
        cell_id: usize,
        coord: CellCoord,
        thresholds: &SegmentationThresholds,
        input: &CellInputs,
        valid_time: DateTime<Utc>,
    ) -> CellStep {
        if f64::from(input.precip_rate) >= thresholds.rate_threshold_mm_hr {
            if self.is_idle() {
                // Rates accumulate over the hour before the slice time.
                self.event_start = Some(valid_time - Duration::hours(1));
                self.start_snow_depth_m = f64::from(input.snow_depth);
            }
            self.hours_since_qualifying_precip = 0;
            self.gap_frozen_hours = 0;
            self.accumulated_precip_mm += f64::from(input.precip_rate);
            self.accumulated_snowfall_mm += f64::from(input.snowfall_rate);
            self.surface_temp = TempRange::fold(self.surface_temp, input.surface_temp);
            self.air_temp = TempRange::fold(self.air_temp, input.air_temp);
            return CellStep::Accumulating;
        }

        let Some(start) = self.event_start else {
            return CellStep::Idle;
        };

        self.hours_since_qualifying_precip += 1;
        if input.surface_temp <= 0.0 {
            self.gap_frozen_hours += 1;
        }

        if self.hours_since_qualifying_precip < thresholds.gap_hours {
            return CellStep::Waiting;
        }

        let outcome = if self.accumulated_precip_mm >= thresholds.total_threshold_mm {
            let elapsed = (valid_time - start).num_hours();
            let duration_hours = (elapsed - i64::from(thresholds.gap_hours)).max(0) as u32;

            CellStep::Finalized {
                event: PrecipEvent {
                    cell_id,
                    row: coord.row,
                    col: coord.col,
                    start,
                    duration_hours,
                    finalized_at: valid_time,
                    precip_mm: self.accumulated_precip_mm,
                    snowfall_mm: self.accumulated_snowfall_mm,
                    start_snow_depth_m: self.start_snow_depth_m,
                    end_snow_depth_m: f64::from(input.snow_depth),
                    min_surface_temp_c: self.surface_temp.map(|r| r.min),
                    max_surface_temp_c: self.surface_temp.map(|r| r.max),
                    min_air_temp_c: self.air_temp.map(|r| r.min),
                    max_air_temp_c: self.air_temp.map(|r| r.max),
                    icing: None,
                    freeze: Vec::new(),
                },
                gap_frozen_hours: self.gap_frozen_hours,
            }
        } else {
            CellStep::Discarded
        };

        self.reset();
        outcome
    }

    /// Return the cell to idle.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn thresholds() -> SegmentationThresholds {
        SegmentationThresholds {
            rate_threshold_mm_hr: 0.254,
            total_threshold_mm: 0.254,
            gap_hours: 2,
        }
    }

    fn input(precip: f32, surface_temp: f32) -> CellInputs {
        CellInputs {
            precip_rate: precip,
            snowfall_rate: 0.0,
            snow_depth: 0.1,
            surface_temp,
            air_temp: 1.0,
        }
    }

    fn t(h: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2001, 1, 1, 0, 0, 0).unwrap() + Duration::hours(h)
    }

    const COORD: CellCoord = CellCoord { row: 3, col: 4 };

    #[test]
    fn test_first_qualifying_hour_backdates_start() {
        let mut state = GridCellEventState::default();
        let step = state.step(0, COORD, &thresholds(), &input(1.0, -2.0), t(5));
        assert_eq!(step, CellStep::Accumulating);
        assert_eq!(state.event_start, Some(t(4)));
        assert_eq!(state.start_snow_depth_m, f64::from(0.1f32));
        assert_eq!(state.surface_temp, Some(TempRange { min: -2.0, max: -2.0 }));
    }

    #[test]
    fn test_idle_dry_hour_is_untouched() {
        let mut state = GridCellEventState::default();
        let step = state.step(0, COORD, &thresholds(), &input(0.1, 5.0), t(0));
        assert_eq!(step, CellStep::Idle);
        assert_eq!(state, GridCellEventState::default());
    }

    #[test]
    fn test_counter_resets_on_qualifying_hour() {
        let mut state = GridCellEventState::default();
        let th = thresholds();
        state.step(0, COORD, &th, &input(1.0, 1.0), t(1));
        assert_eq!(state.step(0, COORD, &th, &input(0.0, 1.0), t(2)), CellStep::Waiting);
        assert_eq!(state.hours_since_qualifying_precip, 1);
        state.step(0, COORD, &th, &input(1.0, 1.0), t(3));
        assert_eq!(state.hours_since_qualifying_precip, 0);
        assert_eq!(state.step(0, COORD, &th, &input(0.0, 1.0), t(4)), CellStep::Waiting);
    }

    #[test]
    fn test_finalize_after_gap() {
        let mut state = GridCellEventState::default();
        let th = thresholds();
        state.step(0, COORD, &th, &input(1.0, 2.0), t(1));
        state.step(0, COORD, &th, &input(0.5, -1.0), t(2));
        state.step(0, COORD, &th, &input(0.0, -3.0), t(3));
        let step = state.step(0, COORD, &th, &input(0.0, 4.0), t(4));

        match step {
            CellStep::Finalized {
                event,
                gap_frozen_hours,
            } => {
                assert_eq!(event.start, t(0));
                assert_eq!(event.duration_hours, 2);
                assert_eq!(event.end_time(), t(2));
                assert_eq!(event.finalized_at, t(4));
                assert_eq!(event.precip_mm, 1.5);
                assert_eq!(event.min_surface_temp_c, Some(-1.0));
                assert_eq!(event.max_surface_temp_c, Some(2.0));
                assert_eq!((event.row, event.col), (3, 4));
                assert_eq!(gap_frozen_hours, 1);
            }
            other => panic!("expected finalized event, got {:?}", other),
        }
        assert!(state.is_idle());
        assert_eq!(state, GridCellEventState::default());
    }

    #[test]
    fn test_sub_threshold_event_is_discarded() {
        let th = SegmentationThresholds {
            rate_threshold_mm_hr: 0.05,
            ..thresholds()
        };
        let mut state = GridCellEventState::default();
        for h in 1..=3 {
            state.step(0, COORD, &th, &input(0.2 / 3.0, 1.0), t(h));
        }
        state.step(0, COORD, &th, &input(0.0, 1.0), t(4));
        assert_eq!(state.step(0, COORD, &th, &input(0.0, 1.0), t(5)), CellStep::Discarded);
        assert!(state.is_idle());
    }

    #[test]
    fn test_non_finite_temperature_is_ignored() {
        let mut state = GridCellEventState::default();
        let th = thresholds();
        state.step(0, COORD, &th, &input(1.0, f32::NAN), t(1));
        assert_eq!(state.surface_temp, None);
        state.step(0, COORD, &th, &input(1.0, -4.0), t(2));
        assert_eq!(state.surface_temp, Some(TempRange { min: -4.0, max: -4.0 }));
    }

    #[test]
    fn test_event_without_temperature_samples_has_no_extremes() {
        let mut state = GridCellEventState::default();
        let th = thresholds();
        let wet = CellInputs {
            air_temp: f32::NAN,
            ..input(1.0, f32::NAN)
        };
        state.step(0, COORD, &th, &wet, t(1));
        state.step(0, COORD, &th, &input(0.0, -1.0), t(2));

        match state.step(0, COORD, &th, &input(0.0, -1.0), t(3)) {
            CellStep::Finalized { event, .. } => {
                assert_eq!(event.min_surface_temp_c, None);
                assert_eq!(event.max_surface_temp_c, None);
                assert_eq!(event.max_air_temp_c, None);
            }
            other => panic!("expected finalized event, got {:?}", other),
        }
    }
}

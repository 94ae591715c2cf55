//! Post-event freeze-window accumulation.
//!
//! Each cell keeps a running count of frozen surface hours since the scan
//! began. An open event remembers that count at its end time, so a window's
//! tally is simply the difference between the cell's count when the window
//! closes and the remembered baseline. Window closures sit in a min-heap
//! keyed by due hour; an hour only touches the events whose next window
//! closes in that hour.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap};

use chrono::{DateTime, Duration, Utc};
use rayon::prelude::*;
use ros_common::{hour_index, CellIndex, GridSnapshot};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Result, ScanError};
use crate::event::{FreezeFraction, PrecipEvent};

/// An event waiting for its freeze windows to close.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FreezeWindowEntry {
    pub id: u64,
    pub event: PrecipEvent,
    /// Hour index of the event's end time.
    pub end_hour: i64,
    /// The cell's cumulative frozen-hour count at `end_hour`.
    pub baseline: u64,
    /// Windows closed so far, in horizon order.
    pub closed: Vec<FreezeFraction>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Closure {
    due_hour: i64,
    entry_id: u64,
    window: usize,
}

/// Serializable aggregator state for checkpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FreezeState {
    pub windows_hours: Vec<u32>,
    pub frozen_totals: Vec<u64>,
    pub entries: Vec<FreezeWindowEntry>,
    pub next_id: u64,
    pub last_hour: Option<DateTime<Utc>>,
}

/// Surface-frozen flag per tracked cell for one hour.
pub fn frozen_mask(snapshot: &GridSnapshot, cells: &CellIndex) -> Vec<bool> {
    (0..cells.len())
        .into_par_iter()
        .map(|id| snapshot.surface_temp[cells.flat(id)] <= 0.0)
        .collect()
}

/// Tracks open events until their largest freeze window closes.
pub struct FreezeWindowAggregator {
    windows_hours: Vec<u32>,
    frozen_totals: Vec<u64>,
    entries: BTreeMap<u64, FreezeWindowEntry>,
    closures: BinaryHeap<Reverse<Closure>>,
    next_id: u64,
    last_hour: Option<DateTime<Utc>>,
}

impl FreezeWindowAggregator {
    /// `windows_hours` must be non-empty and strictly increasing.
    pub fn new(windows_hours: Vec<u32>, n_cells: usize) -> Self {
        Self {
            windows_hours,
            frozen_totals: vec![0; n_cells],
            entries: BTreeMap::new(),
            closures: BinaryHeap::new(),
            next_id: 0,
            last_hour: None,
        }
    }

    pub fn windows_hours(&self) -> &[u32] {
        &self.windows_hours
    }

    /// Number of events still waiting on a window.
    pub fn open_len(&self) -> usize {
        self.entries.len()
    }

    pub fn last_hour(&self) -> Option<DateTime<Utc>> {
        self.last_hour
    }

    /// Account for one hour of surface temperatures and return the events
    /// whose largest window closed at this hour.
    pub fn observe_hour(
        &mut self,
        frozen: &[bool],
        hour: DateTime<Utc>,
    ) -> Result<Vec<PrecipEvent>> {
        if let Some(last) = self.last_hour {
            let expected = last + Duration::hours(1);
            if hour != expected {
                return Err(ScanError::OutOfOrder {
                    expected,
                    found: hour,
                });
            }
        }
        if frozen.len() != self.frozen_totals.len() {
            return Err(ScanError::missing_field(
                hour,
                "surface_temp",
                format!(
                    "frozen mask has {} cells, aggregator tracks {}",
                    frozen.len(),
                    self.frozen_totals.len()
                ),
            ));
        }

        self.frozen_totals
            .par_iter_mut()
            .zip(frozen.par_iter())
            .for_each(|(total, &is_frozen)| {
                if is_frozen {
                    *total += 1;
                }
            });
        self.last_hour = Some(hour);

        Ok(self.close_due(hour_index(hour)))
    }

    /// Open an event finalized at the most recently observed hour.
    ///
    /// `gap_frozen_hours` counts the frozen hours between the event's end
    /// time and its finalization, which are already part of every window.
    pub fn admit(&mut self, event: PrecipEvent, gap_frozen_hours: u32) -> Result<()> {
        if self.last_hour != Some(event.finalized_at) {
            return Err(ScanError::OutOfOrder {
                expected: self.last_hour.unwrap_or(event.finalized_at),
                found: event.finalized_at,
            });
        }
        let cell_total = self.frozen_totals.get(event.cell_id).copied().ok_or_else(|| {
            ScanError::checkpoint_mismatch(format!(
                "event cell {} is outside the region",
                event.cell_id
            ))
        })?;

        let end_hour = event.end_hour();
        let elapsed = hour_index(event.finalized_at) - end_hour;
        if elapsed >= i64::from(self.windows_hours[0]) {
            return Err(ScanError::configuration(format!(
                "event closed {} hours after its end, beyond the first freeze window",
                elapsed
            )));
        }

        let id = self.next_id;
        self.next_id += 1;

        self.closures.push(Reverse(Closure {
            due_hour: end_hour + i64::from(self.windows_hours[0]),
            entry_id: id,
            window: 0,
        }));
        self.entries.insert(
            id,
            FreezeWindowEntry {
                id,
                event,
                end_hour,
                baseline: cell_total.saturating_sub(u64::from(gap_frozen_hours)),
                closed: Vec::with_capacity(self.windows_hours.len()),
            },
        );
        Ok(())
    }

    fn close_due(&mut self, now: i64) -> Vec<PrecipEvent> {
        let mut completed = Vec::new();

        while let Some(Reverse(next)) = self.closures.peek().copied() {
            if next.due_hour > now {
                break;
            }
            self.closures.pop();

            let Some(entry) = self.entries.get_mut(&next.entry_id) else {
                continue;
            };
            let horizon = self.windows_hours[next.window];
            let frozen = self.frozen_totals[entry.event.cell_id].saturating_sub(entry.baseline);
            entry.closed.push(FreezeFraction::complete(horizon, frozen as u32));

            if let Some(&following) = self.windows_hours.get(next.window + 1) {
                self.closures.push(Reverse(Closure {
                    due_hour: entry.end_hour + i64::from(following),
                    entry_id: next.entry_id,
                    window: next.window + 1,
                }));
            } else if let Some(mut done) = self.entries.remove(&next.entry_id) {
                done.event.freeze = std::mem::take(&mut done.closed);
                completed.push(done.event);
            }
        }

        if !completed.is_empty() {
            debug!(
                completed = completed.len(),
                open = self.entries.len(),
                "Closed freeze windows"
            );
        }
        completed
    }

    /// Close every remaining window at series end.
    ///
    /// Windows whose horizon has not elapsed are computed over the hours
    /// actually observed and flagged truncated.
    pub fn finish(&mut self) -> Vec<PrecipEvent> {
        let now = self.last_hour.map(hour_index);
        self.closures.clear();

        let entries = std::mem::take(&mut self.entries);
        let mut truncated = 0usize;
        let mut events = Vec::with_capacity(entries.len());

        for (_, mut entry) in entries {
            let observed = now.map(|h| (h - entry.end_hour).max(0)).unwrap_or(0);
            let frozen = self.frozen_totals[entry.event.cell_id].saturating_sub(entry.baseline);

            for &horizon in &self.windows_hours[entry.closed.len()..] {
                let observed_hours = observed.min(i64::from(horizon)) as u32;
                entry
                    .closed
                    .push(FreezeFraction::truncated(horizon, observed_hours, frozen as u32));
            }

            entry.event.freeze = entry.closed;
            if entry.event.is_truncated() {
                truncated += 1;
            }
            events.push(entry.event);
        }

        if truncated > 0 {
            warn!(
                truncated,
                "Series ended before freeze windows closed; fractions are provisional"
            );
        }
        events
    }

    /// Snapshot for a checkpoint.
    pub fn to_state(&self) -> FreezeState {
        FreezeState {
            windows_hours: self.windows_hours.clone(),
            frozen_totals: self.frozen_totals.clone(),
            entries: self.entries.values().cloned().collect(),
            next_id: self.next_id,
            last_hour: self.last_hour,
        }
    }

    /// Rebuild from a checkpoint, re-deriving the closure queue.
    pub fn from_state(state: FreezeState) -> Result<Self> {
        let mut closures = BinaryHeap::with_capacity(state.entries.len());
        let mut entries = BTreeMap::new();

        for entry in state.entries {
            let window = entry.closed.len();
            let horizon = state.windows_hours.get(window).copied().ok_or_else(|| {
                ScanError::checkpoint_mismatch(format!(
                    "open entry {} has no window left to close",
                    entry.id
                ))
            })?;
            if entry.event.cell_id >= state.frozen_totals.len() {
                return Err(ScanError::checkpoint_mismatch(format!(
                    "open entry {} references cell {} outside the region",
                    entry.id, entry.event.cell_id
                )));
            }
            closures.push(Reverse(Closure {
                due_hour: entry.end_hour + i64::from(horizon),
                entry_id: entry.id,
                window,
            }));
            entries.insert(entry.id, entry);
        }

        Ok(Self {
            windows_hours: state.windows_hours,
            frozen_totals: state.frozen_totals,
            entries,
            closures,
            next_id: state.next_id,
            last_hour: state.last_hour,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(h: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2005, 1, 1, 0, 0, 0).unwrap() + Duration::hours(h)
    }

    /// Event ending at `end` and finalized two hours later.
    fn event_ending_at(end: i64) -> PrecipEvent {
        PrecipEvent {
            cell_id: 0,
            row: 0,
            col: 0,
            start: t(end - 3),
            duration_hours: 3,
            finalized_at: t(end + 2),
            precip_mm: 2.0,
            snowfall_mm: 0.0,
            start_snow_depth_m: 0.1,
            end_snow_depth_m: 0.1,
            min_surface_temp_c: Some(-1.0),
            max_surface_temp_c: Some(1.0),
            min_air_temp_c: Some(0.0),
            max_air_temp_c: Some(2.0),
            icing: None,
            freeze: Vec::new(),
        }
    }

    /// Feed hours `from..=to`, frozen when `is_frozen(h)`, collecting output.
    fn feed(
        agg: &mut FreezeWindowAggregator,
        from: i64,
        to: i64,
        is_frozen: impl Fn(i64) -> bool,
    ) -> Vec<PrecipEvent> {
        let mut out = Vec::new();
        for h in from..=to {
            out.extend(agg.observe_hour(&[is_frozen(h)], t(h)).unwrap());
        }
        out
    }

    #[test]
    fn test_complete_window_fraction() {
        // End at hour 10; 18 of hours 11..=34 are frozen.
        let mut agg = FreezeWindowAggregator::new(vec![24, 48], 1);
        let frozen = |h: i64| (11..=28).contains(&h);

        feed(&mut agg, 0, 12, frozen);
        agg.admit(event_ending_at(10), 2).unwrap();

        let out = feed(&mut agg, 13, 57, frozen);
        assert!(out.is_empty());
        let out = feed(&mut agg, 58, 58, frozen);
        assert_eq!(out.len(), 1);

        let f = &out[0].freeze;
        assert_eq!(f[0], FreezeFraction::complete(24, 18));
        assert_eq!(f[0].fraction, Some(0.75));
        assert_eq!(f[1].fraction, Some(18.0 / 48.0));
        assert_eq!(agg.open_len(), 0);
    }

    #[test]
    fn test_truncated_window_at_series_end() {
        let mut agg = FreezeWindowAggregator::new(vec![24, 240], 1);
        // Hours 11..=20 observed, 4 of them frozen.
        let frozen = |h: i64| (11..=14).contains(&h);
        feed(&mut agg, 0, 12, frozen);
        agg.admit(event_ending_at(10), 2).unwrap();
        feed(&mut agg, 13, 20, frozen);

        let out = agg.finish();
        assert_eq!(out.len(), 1);
        let f = &out[0].freeze;
        assert_eq!(f.len(), 2);
        assert!(f[0].truncated);
        assert_eq!(f[0].observed_hours, 10);
        assert_eq!(f[0].fraction, Some(0.4));
        assert_eq!(f[1].observed_hours, 10);
        assert!(out[0].is_truncated());
    }

    #[test]
    fn test_partially_closed_event_keeps_complete_windows() {
        let mut agg = FreezeWindowAggregator::new(vec![24, 240], 1);
        feed(&mut agg, 0, 12, |_| true);
        agg.admit(event_ending_at(10), 2).unwrap();
        feed(&mut agg, 13, 100, |_| true);

        let out = agg.finish();
        let f = &out[0].freeze;
        assert!(!f[0].truncated);
        assert_eq!(f[0].fraction, Some(1.0));
        assert!(f[1].truncated);
        assert_eq!(f[1].observed_hours, 90);
    }

    #[test]
    fn test_gap_hours_seed_the_tally() {
        // Only the two gap hours are frozen.
        let mut agg = FreezeWindowAggregator::new(vec![24], 1);
        let frozen = |h: i64| h == 11 || h == 12;
        feed(&mut agg, 0, 12, frozen);
        agg.admit(event_ending_at(10), 2).unwrap();
        let out = feed(&mut agg, 13, 34, frozen);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].freeze[0].frozen_hours, 2);
    }

    #[test]
    fn test_out_of_order_hour_is_rejected() {
        let mut agg = FreezeWindowAggregator::new(vec![24], 1);
        agg.observe_hour(&[false], t(0)).unwrap();
        let err = agg.observe_hour(&[false], t(2)).unwrap_err();
        assert!(matches!(err, ScanError::OutOfOrder { .. }));
    }

    #[test]
    fn test_admit_requires_current_hour() {
        let mut agg = FreezeWindowAggregator::new(vec![24], 1);
        feed(&mut agg, 0, 5, |_| false);
        assert!(agg.admit(event_ending_at(10), 2).is_err());
    }

    #[test]
    fn test_state_roundtrip_preserves_pending_closures() {
        let mut agg = FreezeWindowAggregator::new(vec![24, 48], 1);
        feed(&mut agg, 0, 12, |h| h % 2 == 0);
        agg.admit(event_ending_at(10), 1).unwrap();
        feed(&mut agg, 13, 40, |h| h % 2 == 0);

        let mut restored = FreezeWindowAggregator::from_state(agg.to_state()).unwrap();
        let a = feed(&mut agg, 41, 60, |h| h % 2 == 0);
        let b = feed(&mut restored, 41, 60, |h| h % 2 == 0);
        assert_eq!(a, b);
        assert_eq!(a.len(), 1);
    }
}

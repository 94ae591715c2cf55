//! Hour-by-hour event segmentation over every tracked cell.

use rayon::prelude::*;
use ros_common::{CellIndex, GridSnapshot};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::config::SegmentationThresholds;
use crate::error::{Result, ScanError};
use crate::event::PrecipEvent;
use crate::state::{CellInputs, CellStep, GridCellEventState};

/// An event closed this hour, with the frozen-hour tally of its trailing gap.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalizedEvent {
    pub event: PrecipEvent,
    pub gap_frozen_hours: u32,
}

/// Running counts kept across the whole scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmenterStats {
    pub hours: u64,
    pub finalized: u64,
    /// Events that reached the gap below the total threshold.
    pub discarded: u64,
}

/// Drives every cell's [`GridCellEventState`] one hour at a time.
pub struct EventSegmenter {
    thresholds: SegmentationThresholds,
    cells: CellIndex,
    states: Vec<GridCellEventState>,
    stats: SegmenterStats,
}

impl EventSegmenter {
    /// All cells start idle.
    pub fn new(thresholds: SegmentationThresholds, cells: CellIndex) -> Self {
        let states = vec![GridCellEventState::default(); cells.len()];
        Self {
            thresholds,
            cells,
            states,
            stats: SegmenterStats::default(),
        }
    }

    /// Replace every cell's state, e.g. from a checkpoint.
    pub fn restore(
        &mut self,
        states: Vec<GridCellEventState>,
        stats: SegmenterStats,
    ) -> Result<()> {
        if states.len() != self.cells.len() {
            return Err(ScanError::checkpoint_mismatch(format!(
                "checkpoint holds {} cell states, region has {} cells",
                states.len(),
                self.cells.len()
            )));
        }
        self.states = states;
        self.stats = stats;
        Ok(())
    }

    pub fn states(&self) -> &[GridCellEventState] {
        &self.states
    }

    pub fn stats(&self) -> SegmenterStats {
        self.stats
    }

    pub fn cells(&self) -> &CellIndex {
        &self.cells
    }

    /// Number of cells with an event in progress.
    pub fn active_cells(&self) -> usize {
        self.states.iter().filter(|s| !s.is_idle()).count()
    }

    /// Consume one hourly snapshot and return the events it closed.
    ///
    /// Cells are independent within an hour, so they are updated in parallel;
    /// the returned events are ordered by cell id.
    pub fn advance(&mut self, snapshot: &GridSnapshot) -> Result<Vec<FinalizedEvent>> {
        snapshot
            .validate(&self.cells.shape())
            .map_err(|e| ScanError::missing_field(snapshot.valid_time, "grid", e.to_string()))?;

        let thresholds = self.thresholds;
        let cells = &self.cells;
        let valid_time = snapshot.valid_time;

        let outcomes: Vec<CellStep> = self
            .states
            .par_iter_mut()
            .enumerate()
            .filter_map(|(id, state)| {
                let flat = cells.flat(id);
                let input = CellInputs {
                    precip_rate: snapshot.precip_rate[flat],
                    snowfall_rate: snapshot.snowfall_rate[flat],
                    snow_depth: snapshot.snow_depth[flat],
                    surface_temp: snapshot.surface_temp[flat],
                    air_temp: snapshot.air_temp[flat],
                };
                match state.step(id, cells.coord(id), &thresholds, &input, valid_time) {
                    step @ (CellStep::Finalized { .. } | CellStep::Discarded) => Some(step),
                    _ => None,
                }
            })
            .collect();

        let mut finalized = Vec::new();
        for outcome in outcomes {
            match outcome {
                CellStep::Finalized {
                    event,
                    gap_frozen_hours,
                } => finalized.push(FinalizedEvent {
                    event,
                    gap_frozen_hours,
                }),
                CellStep::Discarded => self.stats.discarded += 1,
                _ => {}
            }
        }

        self.stats.hours += 1;
        self.stats.finalized += finalized.len() as u64;

        trace!(
            time = %valid_time,
            finalized = finalized.len(),
            "Segmented hour"
        );

        Ok(finalized)
    }
}

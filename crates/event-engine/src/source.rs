//! Upstream gridded data sources.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use ros_common::{GridSnapshot, LatLonGrid};

use crate::error::{Result, ScanError};

/// Supplies exactly one snapshot per hour of the series.
pub trait HourlySource {
    /// Geometry shared by every snapshot.
    fn grid(&self) -> &LatLonGrid;

    /// Load the slice stamped `valid_time`, or fail with an input error.
    fn load(&mut self, valid_time: DateTime<Utc>) -> Result<GridSnapshot>;
}

/// Snapshots held in memory, keyed by valid time.
#[derive(Debug, Clone)]
pub struct MemorySource {
    grid: LatLonGrid,
    snapshots: BTreeMap<DateTime<Utc>, GridSnapshot>,
}

impl MemorySource {
    pub fn new(grid: LatLonGrid) -> Self {
        Self {
            grid,
            snapshots: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, snapshot: GridSnapshot) {
        self.snapshots.insert(snapshot.valid_time, snapshot);
    }
}

impl Extend<GridSnapshot> for MemorySource {
    fn extend<I: IntoIterator<Item = GridSnapshot>>(&mut self, iter: I) {
        for snapshot in iter {
            self.insert(snapshot);
        }
    }
}

impl HourlySource for MemorySource {
    fn grid(&self) -> &LatLonGrid {
        &self.grid
    }

    fn load(&mut self, valid_time: DateTime<Utc>) -> Result<GridSnapshot> {
        self.snapshots
            .get(&valid_time)
            .cloned()
            .ok_or_else(|| ScanError::input_gap(valid_time, "no snapshot in memory source"))
    }
}

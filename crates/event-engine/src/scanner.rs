//! Single-pass scan over the hourly series.
//!
//! Each hour runs segmentation, freeze accounting and catalog bookkeeping in
//! that order. Month boundaries release finished catalog months and, when a
//! [`Checkpointer`] is supplied, persist the full scan state.

use chrono::{DateTime, Duration, Utc};
use metrics::{counter, gauge};
use ros_common::{CellIndex, GridSnapshot, TimeAxis, YearMonth};
use tracing::{debug, info};

use crate::catalog::{CatalogWriter, MonthlyCatalog, ReleasedMonth};
use crate::checkpoint::{Checkpointer, ScanCheckpoint, CHECKPOINT_SCHEMA_VERSION};
use crate::config::ScanConfig;
use crate::error::{Result, ScanError};
use crate::freeze::{frozen_mask, FreezeWindowAggregator};
use crate::icing::IcingClassifier;
use crate::segmenter::{EventSegmenter, FinalizedEvent};
use crate::source::HourlySource;

/// Totals for one call to [`EventScanner::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub hours_scanned: u64,
    pub events_finalized: u64,
    pub events_discarded: u64,
    pub months_written: usize,
    pub provisional_months: usize,
    pub truncated_events: usize,
    pub checkpoints_written: usize,
}

/// Owns all scan state for one region and threshold set.
pub struct EventScanner {
    config: ScanConfig,
    axis: TimeAxis,
    segmenter: EventSegmenter,
    classifier: IcingClassifier,
    freeze: FreezeWindowAggregator,
    catalog: MonthlyCatalog,
    next_hour: DateTime<Utc>,
}

impl EventScanner {
    /// Start a fresh scan at the configured start hour.
    pub fn new(config: ScanConfig, cells: CellIndex) -> Result<Self> {
        config.validate()?;
        if cells.is_empty() {
            return Err(ScanError::configuration("region contains no cells"));
        }

        let axis = config.time_axis()?;
        let freeze = FreezeWindowAggregator::new(config.freeze_windows_hours.clone(), cells.len());

        Ok(Self {
            segmenter: EventSegmenter::new(config.segmentation, cells),
            classifier: IcingClassifier::new(config.icing),
            freeze,
            catalog: MonthlyCatalog::new(),
            next_hour: axis.start(),
            axis,
            config,
        })
    }

    /// Continue a scan from a month-boundary checkpoint.
    ///
    /// The checkpoint must have been produced with the same region, grid,
    /// thresholds and freeze windows, and its resume hour must lie on this
    /// configuration's axis.
    pub fn resume(
        config: ScanConfig,
        cells: CellIndex,
        checkpoint: ScanCheckpoint,
    ) -> Result<Self> {
        let mut scanner = Self::new(config, cells)?;

        if checkpoint.schema_version != CHECKPOINT_SCHEMA_VERSION {
            return Err(ScanError::CheckpointVersion {
                found: checkpoint.schema_version,
                expected: CHECKPOINT_SCHEMA_VERSION,
            });
        }
        if !scanner.axis.contains(checkpoint.resume_at) {
            return Err(ScanError::checkpoint_mismatch(format!(
                "resume hour {} is outside the configured series {} .. {}",
                checkpoint.resume_at,
                scanner.axis.start(),
                scanner.axis.end()
            )));
        }
        let cells = scanner.segmenter.cells();
        if checkpoint.shape != cells.shape() || checkpoint.cells.as_slice() != cells.coords() {
            return Err(ScanError::checkpoint_mismatch(
                "grid or region cells differ from the checkpoint",
            ));
        }
        if checkpoint.segmentation != scanner.config.segmentation {
            return Err(ScanError::checkpoint_mismatch(
                "segmentation thresholds differ from the checkpoint",
            ));
        }
        if checkpoint.icing != scanner.config.icing {
            return Err(ScanError::checkpoint_mismatch(
                "icing thresholds differ from the checkpoint",
            ));
        }
        if checkpoint.freeze.windows_hours != scanner.config.freeze_windows_hours {
            return Err(ScanError::checkpoint_mismatch(
                "freeze windows differ from the checkpoint",
            ));
        }
        let expected_last = checkpoint.resume_at - Duration::hours(1);
        if checkpoint.freeze.last_hour.is_some_and(|h| h != expected_last) {
            return Err(ScanError::checkpoint_mismatch(format!(
                "freeze state ends at {:?}, expected {}",
                checkpoint.freeze.last_hour, expected_last
            )));
        }

        scanner
            .segmenter
            .restore(checkpoint.cell_states, checkpoint.segmenter_stats)?;
        scanner.freeze = FreezeWindowAggregator::from_state(checkpoint.freeze)?;
        scanner.catalog = checkpoint.catalog;
        scanner.next_hour = checkpoint.resume_at;

        info!(
            resume_at = %scanner.next_hour,
            active_cells = scanner.segmenter.active_cells(),
            open_events = scanner.freeze.open_len(),
            pending_months = scanner.catalog.pending_months(),
            "Resumed scan from checkpoint"
        );
        Ok(scanner)
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    pub fn axis(&self) -> TimeAxis {
        self.axis
    }

    /// The next hour [`step_hour`](Self::step_hour) expects.
    pub fn next_hour(&self) -> DateTime<Utc> {
        self.next_hour
    }

    pub fn is_complete(&self) -> bool {
        self.next_hour >= self.axis.end()
    }

    /// Events waiting for freeze windows.
    pub fn open_events(&self) -> usize {
        self.freeze.open_len()
    }

    pub fn catalog(&self) -> &MonthlyCatalog {
        &self.catalog
    }

    /// Capture the state needed to continue at [`next_hour`](Self::next_hour).
    pub fn checkpoint(&self) -> ScanCheckpoint {
        let cells = self.segmenter.cells();
        ScanCheckpoint {
            schema_version: CHECKPOINT_SCHEMA_VERSION,
            resume_at: self.next_hour,
            shape: cells.shape(),
            cells: cells.coords().to_vec(),
            segmentation: self.config.segmentation,
            icing: self.config.icing,
            cell_states: self.segmenter.states().to_vec(),
            segmenter_stats: self.segmenter.stats(),
            freeze: self.freeze.to_state(),
            catalog: self.catalog.clone(),
        }
    }

    /// Process one hourly snapshot.
    ///
    /// Returns the catalog months released by this hour, which is only ever
    /// non-empty on the last hour of a month.
    pub fn step_hour(&mut self, snapshot: &GridSnapshot) -> Result<Vec<ReleasedMonth>> {
        let t = snapshot.valid_time;
        if t != self.next_hour {
            return Err(ScanError::OutOfOrder {
                expected: self.next_hour,
                found: t,
            });
        }
        if !self.axis.contains(t) {
            return Err(ScanError::configuration(format!(
                "hour {} is past the end of the series ({})",
                t,
                self.axis.end()
            )));
        }
        snapshot
            .validate(&self.segmenter.cells().shape())
            .map_err(|e| ScanError::missing_field(t, "grid", e.to_string()))?;

        let month = YearMonth::of(t);
        self.catalog.open_month(month);

        let finalized = self.segmenter.advance(snapshot)?;

        let mask = frozen_mask(snapshot, self.segmenter.cells());
        for event in self.freeze.observe_hour(&mask, t)? {
            self.catalog.complete(event);
        }

        let (mut events, gap_frozen): (Vec<_>, Vec<_>) = finalized
            .into_iter()
            .map(|f: FinalizedEvent| (f.event, f.gap_frozen_hours))
            .unzip();
        self.classifier.classify_all(&mut events);
        let icing_events = events
            .iter()
            .filter(|e| e.icing.is_some_and(|c| c.is_icing()))
            .count();

        let new_events = events.len();
        for (event, gap_frozen_hours) in events.into_iter().zip(gap_frozen) {
            self.catalog.expect(&event);
            self.freeze.admit(event, gap_frozen_hours)?;
        }

        counter!("ros_hours_scanned_total").increment(1);
        counter!("ros_events_finalized_total").increment(new_events as u64);
        counter!("ros_icing_events_total").increment(icing_events as u64);
        gauge!("ros_open_freeze_windows").set(self.freeze.open_len() as f64);

        self.next_hour = t + Duration::hours(1);

        if !TimeAxis::is_last_hour_of_month(t) {
            return Ok(Vec::new());
        }

        self.catalog.close_months_before(month.next());
        let released = self.catalog.drain_ready();
        info!(
            month = %month,
            active_cells = self.segmenter.active_cells(),
            open_events = self.freeze.open_len(),
            pending_events = self.catalog.pending_events(),
            released = released.len(),
            "Completed month"
        );
        Ok(released)
    }

    /// Close every open freeze window and release all pending months.
    ///
    /// Only valid once the series is complete.
    pub fn finish(&mut self) -> Result<Vec<ReleasedMonth>> {
        if !self.is_complete() {
            return Err(ScanError::configuration(format!(
                "cannot finalize at {}: series runs to {}",
                self.next_hour,
                self.axis.end()
            )));
        }
        for event in self.freeze.finish() {
            self.catalog.complete(event);
        }
        Ok(self.catalog.drain_all())
    }

    /// Scan the remaining hours from `source`, writing released months to
    /// `writer` and saving a checkpoint at each month boundary.
    pub fn run<S, W>(
        &mut self,
        source: &mut S,
        writer: &mut W,
        checkpointer: Option<&Checkpointer>,
    ) -> Result<ScanSummary>
    where
        S: HourlySource,
        W: CatalogWriter,
    {
        let mut summary = ScanSummary::default();
        let stats_before = self.segmenter.stats();
        let remaining = self.axis.resume_from(self.next_hour).ok();

        info!(
            start = %self.next_hour,
            end = %self.axis.end(),
            cells = self.segmenter.cells().len(),
            tag = %self.config.catalog_tag(),
            "Starting scan"
        );

        for t in remaining.iter().flat_map(|axis| axis.iter()) {
            let snapshot = source.load(t)?;
            let released = self.step_hour(&snapshot)?;
            summary.hours_scanned += 1;
            write_released(writer, released, &mut summary)?;

            if !TimeAxis::is_last_hour_of_month(t) {
                continue;
            }
            let final_hour = t == self.axis.last();
            if let Some(checkpointer) = checkpointer {
                if !(final_hour && self.config.finalize_at_end) {
                    checkpointer.save(&self.checkpoint())?;
                    summary.checkpoints_written += 1;
                }
            }
        }

        if self.config.finalize_at_end {
            let released = self.finish()?;
            write_released(writer, released, &mut summary)?;
        } else {
            debug!(
                pending_months = self.catalog.pending_months(),
                open_events = self.freeze.open_len(),
                "Leaving pending months for a later run"
            );
        }

        let stats = self.segmenter.stats();
        summary.events_finalized = stats.finalized - stats_before.finalized;
        summary.events_discarded = stats.discarded - stats_before.discarded;
        counter!("ros_events_discarded_total").increment(summary.events_discarded);

        info!(
            hours = summary.hours_scanned,
            finalized = summary.events_finalized,
            discarded = summary.events_discarded,
            months = summary.months_written,
            provisional = summary.provisional_months,
            truncated = summary.truncated_events,
            "Scan complete"
        );
        Ok(summary)
    }
}

fn write_released<W: CatalogWriter>(
    writer: &mut W,
    released: Vec<ReleasedMonth>,
    summary: &mut ScanSummary,
) -> Result<()> {
    for month in released {
        writer.write_month(month.month, &month.events, month.provisional)?;
        let truncated = month.events.iter().filter(|e| e.is_truncated()).count();
        counter!("ros_catalog_months_written_total").increment(1);
        counter!("ros_events_emitted_total").increment(month.events.len() as u64);
        counter!("ros_truncated_events_total").increment(truncated as u64);
        summary.months_written += 1;
        summary.truncated_events += truncated;
        if month.provisional {
            summary.provisional_months += 1;
        }
    }
    Ok(())
}

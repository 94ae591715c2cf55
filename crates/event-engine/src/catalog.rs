//! Monthly event catalog assembly and output.
//!
//! Events are grouped by the month in which they were finalized. A month is
//! released once the scan has moved past it and every one of its events has
//! closed its freeze windows, so each released month is final.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use ros_common::YearMonth;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, ScanError};
use crate::event::{IcingCategory, PrecipEvent};

/// Downstream store for finalized monthly catalogs.
pub trait CatalogWriter {
    /// Persist one month. Called at most once per month, in calendar order.
    fn write_month(
        &mut self,
        month: YearMonth,
        events: &[PrecipEvent],
        provisional: bool,
    ) -> Result<()>;
}

/// A month handed to the writer.
#[derive(Debug, Clone, PartialEq)]
pub struct ReleasedMonth {
    pub month: YearMonth,
    pub events: Vec<PrecipEvent>,
    /// At least one event carries a truncated freeze window.
    pub provisional: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct PendingMonth {
    month: YearMonth,
    /// Events of this month still inside the freeze aggregator.
    outstanding: u32,
    /// The scan has moved past this month.
    closed: bool,
    events: Vec<PrecipEvent>,
}

impl PendingMonth {
    fn new(month: YearMonth) -> Self {
        Self {
            month,
            outstanding: 0,
            closed: false,
            events: Vec::new(),
        }
    }

    fn into_released(mut self) -> ReleasedMonth {
        self.events.sort_by_key(|e| e.key());
        let provisional = self.outstanding > 0 || self.events.iter().any(|e| e.is_truncated());
        ReleasedMonth {
            month: self.month,
            events: self.events,
            provisional,
        }
    }
}

/// Months awaiting release, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonthlyCatalog {
    months: Vec<PendingMonth>,
}

impl MonthlyCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    fn month_mut(&mut self, month: YearMonth) -> &mut PendingMonth {
        let pos = match self.months.binary_search_by_key(&month, |m| m.month) {
            Ok(pos) => pos,
            Err(pos) => {
                self.months.insert(pos, PendingMonth::new(month));
                pos
            }
        };
        &mut self.months[pos]
    }

    /// Register a month so it is written even if it has no events.
    pub fn open_month(&mut self, month: YearMonth) {
        self.month_mut(month);
    }

    /// An event entered the freeze aggregator.
    pub fn expect(&mut self, event: &PrecipEvent) {
        self.month_mut(event.catalog_month()).outstanding += 1;
    }

    /// An event left the freeze aggregator with all windows assigned.
    pub fn complete(&mut self, event: PrecipEvent) {
        let pending = self.month_mut(event.catalog_month());
        pending.outstanding = pending.outstanding.saturating_sub(1);
        pending.events.push(event);
    }

    /// Mark every month before `month` as finished by the scan.
    pub fn close_months_before(&mut self, month: YearMonth) {
        for pending in self.months.iter_mut().filter(|m| m.month < month) {
            pending.closed = true;
        }
    }

    /// Release leading months that are closed and fully resolved.
    pub fn drain_ready(&mut self) -> Vec<ReleasedMonth> {
        let ready = self
            .months
            .iter()
            .take_while(|m| m.closed && m.outstanding == 0)
            .count();
        self.months.drain(..ready).map(PendingMonth::into_released).collect()
    }

    /// Release everything, e.g. at series end.
    pub fn drain_all(&mut self) -> Vec<ReleasedMonth> {
        self.months.drain(..).map(PendingMonth::into_released).collect()
    }

    pub fn pending_months(&self) -> usize {
        self.months.len()
    }

    /// Events finalized but not yet released.
    pub fn pending_events(&self) -> usize {
        self.months
            .iter()
            .map(|m| m.events.len() + m.outstanding as usize)
            .sum()
    }
}

/// One catalog line: the event plus derived columns.
#[derive(Debug, Serialize)]
struct CatalogRecord<'a> {
    #[serde(flatten)]
    event: &'a PrecipEvent,
    rain_mm: f64,
    end_time: DateTime<Utc>,
    icing_code: Option<u8>,
    truncated: bool,
}

impl<'a> CatalogRecord<'a> {
    fn new(event: &'a PrecipEvent) -> Self {
        Self {
            event,
            rain_mm: event.rain_mm(),
            end_time: event.end_time(),
            icing_code: event.icing.as_ref().map(IcingCategory::code),
            truncated: event.is_truncated(),
        }
    }
}

/// Writes one JSON Lines file per month.
pub struct JsonLinesCatalogWriter {
    dir: PathBuf,
    tag: String,
}

impl JsonLinesCatalogWriter {
    /// `tag` identifies the threshold set in file names.
    pub fn new(dir: impl Into<PathBuf>, tag: impl Into<String>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir, tag: tag.into() })
    }

    /// File path for a month's catalog.
    pub fn path_for(&self, month: YearMonth, provisional: bool) -> PathBuf {
        let suffix = if provisional { "_provisional" } else { "" };
        self.dir
            .join(format!("PrecipEvents_{}_{}{}.jsonl", self.tag, month, suffix))
    }

    fn write_file(path: &Path, events: &[PrecipEvent]) -> Result<()> {
        let tmp = path.with_extension("jsonl.tmp");
        {
            let mut out = BufWriter::new(fs::File::create(&tmp)?);
            for event in events {
                serde_json::to_writer(&mut out, &CatalogRecord::new(event))?;
                out.write_all(b"\n")?;
            }
            out.flush()?;
        }
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

impl CatalogWriter for JsonLinesCatalogWriter {
    fn write_month(
        &mut self,
        month: YearMonth,
        events: &[PrecipEvent],
        provisional: bool,
    ) -> Result<()> {
        let path = self.path_for(month, provisional);
        Self::write_file(&path, events)
            .map_err(|e| ScanError::Catalog(format!("{}: {}", path.display(), e)))?;

        info!(
            month = %month,
            events = events.len(),
            provisional,
            path = %path.display(),
            "Wrote monthly catalog"
        );
        Ok(())
    }
}

/// Keeps released months in memory.
#[derive(Debug, Default)]
pub struct MemoryCatalogWriter {
    pub months: Vec<ReleasedMonth>,
}

impl MemoryCatalogWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every written event, in release order.
    pub fn events(&self) -> impl Iterator<Item = &PrecipEvent> {
        self.months.iter().flat_map(|m| m.events.iter())
    }
}

impl CatalogWriter for MemoryCatalogWriter {
    fn write_month(
        &mut self,
        month: YearMonth,
        events: &[PrecipEvent],
        provisional: bool,
    ) -> Result<()> {
        self.months.push(ReleasedMonth {
            month,
            events: events.to_vec(),
            provisional,
        });
        Ok(())
    }
}

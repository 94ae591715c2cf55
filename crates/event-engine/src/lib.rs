//! Rain-on-snow event engine
//!
//! This crate scans an hourly gridded reanalysis series in a single pass and
//! produces a monthly catalog of precipitation events per grid cell. It:
//!
//! - **Segments events**: per-cell state machines split precipitation into
//!   discrete events separated by a dry gap
//! - **Classifies icing**: each event gets a rain-on-snow icing category
//! - **Tracks refreeze**: the fraction of frozen surface hours in fixed
//!   windows after each event, accumulated causally
//! - **Checkpoints**: the whole scan state is saved at every month boundary
//!
//! # Architecture
//!
//! ```text
//! HourlySource::load(t)
//!      │
//!      ▼
//! EventScanner::step_hour
//!      │
//!      ├─► EventSegmenter::advance        (parallel over cells)
//!      │         │
//!      │         └─► finalized events ─► IcingClassifier::classify_all
//!      │                                        │
//!      │                                        └─► FreezeWindowAggregator::admit
//!      │
//!      ├─► FreezeWindowAggregator::observe_hour
//!      │         │
//!      │         └─► completed events ─► MonthlyCatalog
//!      │
//!      └─► month end: release months ─► CatalogWriter, save ScanCheckpoint
//! ```
//!
//! # Example
//!
//! ```ignore
//! use event_engine::{EventScanner, JsonLinesCatalogWriter, Merra2Archive, ScanConfig};
//!
//! let config = ScanConfig::from_yaml("config/scan.yaml")?.with_env_overrides()?;
//! let mut source = Merra2Archive::open(
//!     "/data/merra2",
//!     Default::default(),
//!     Default::default(),
//!     Default::default(),
//! )?;
//! let cells = CellIndex::all(source.grid().shape());
//! let mut writer = JsonLinesCatalogWriter::new("out", config.catalog_tag())?;
//!
//! let mut scanner = EventScanner::new(config, cells)?;
//! let summary = scanner.run(&mut source, &mut writer, None)?;
//! ```

pub mod archive;
pub mod catalog;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod event;
pub mod freeze;
pub mod icing;
pub mod scanner;
pub mod segmenter;
pub mod source;
pub mod state;

// Re-export commonly used types at crate root
pub use archive::{ArchiveLayout, Collection, FieldNames, Merra2Archive, UnitConversion};
pub use catalog::{
    CatalogWriter, JsonLinesCatalogWriter, MemoryCatalogWriter, MonthlyCatalog, ReleasedMonth,
};
pub use checkpoint::{Checkpointer, ScanCheckpoint, CHECKPOINT_SCHEMA_VERSION};
pub use config::{IcingThresholds, RegionPreset, ScanConfig, SegmentationThresholds};
pub use error::{Result, ScanError};
pub use event::{FreezeFraction, IcingCategory, PrecipEvent};
pub use freeze::FreezeWindowAggregator;
pub use icing::IcingClassifier;
pub use scanner::{EventScanner, ScanSummary};
pub use segmenter::{EventSegmenter, SegmenterStats};
pub use source::{HourlySource, MemorySource};
pub use state::GridCellEventState;

//! Month-boundary checkpoints.
//!
//! A checkpoint is gzip-compressed JSON holding everything the scan needs to
//! continue from the first hour of the next month: every cell's event state,
//! the freeze aggregator and the catalog months not yet released.

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use ros_common::{CellCoord, GridShape, YearMonth};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::catalog::MonthlyCatalog;
use crate::config::{IcingThresholds, SegmentationThresholds};
use crate::error::{Result, ScanError};
use crate::freeze::FreezeState;
use crate::segmenter::SegmenterStats;
use crate::state::GridCellEventState;

/// Bumped whenever the serialized layout changes.
pub const CHECKPOINT_SCHEMA_VERSION: u32 = 1;

/// Complete resumable scan state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanCheckpoint {
    pub schema_version: u32,
    /// First hour the resumed scan will process.
    pub resume_at: DateTime<Utc>,
    pub shape: GridShape,
    pub cells: Vec<CellCoord>,
    pub segmentation: SegmentationThresholds,
    /// Rules applied to events still pending in `catalog`.
    pub icing: IcingThresholds,
    pub cell_states: Vec<GridCellEventState>,
    pub segmenter_stats: SegmenterStats,
    pub freeze: FreezeState,
    pub catalog: MonthlyCatalog,
}

#[derive(Deserialize)]
struct Header {
    schema_version: u32,
}

/// Serialize a checkpoint to an opaque blob.
pub fn encode(checkpoint: &ScanCheckpoint) -> Result<Vec<u8>> {
    let json = serde_json::to_vec(checkpoint)?;
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&json)?;
    Ok(encoder.finish()?)
}

/// Decode a blob, rejecting any schema version other than the current one.
pub fn decode(blob: &[u8]) -> Result<ScanCheckpoint> {
    let mut json = Vec::new();
    GzDecoder::new(blob)
        .read_to_end(&mut json)
        .map_err(|e| ScanError::Serialization(format!("checkpoint is not valid gzip: {}", e)))?;

    let header: Header = serde_json::from_slice(&json)?;
    if header.schema_version != CHECKPOINT_SCHEMA_VERSION {
        return Err(ScanError::CheckpointVersion {
            found: header.schema_version,
            expected: CHECKPOINT_SCHEMA_VERSION,
        });
    }

    Ok(serde_json::from_slice(&json)?)
}

/// Saves and loads checkpoints in a directory, one file per resume month.
#[derive(Debug, Clone)]
pub struct Checkpointer {
    dir: PathBuf,
}

impl Checkpointer {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `active_YYYYMM.json.gz`, named by the month the scan resumes in.
    pub fn path_for(&self, month: YearMonth) -> PathBuf {
        self.dir.join(format!("active_{}.json.gz", month))
    }

    /// Write atomically: a temp file is renamed over the final path.
    pub fn save(&self, checkpoint: &ScanCheckpoint) -> Result<PathBuf> {
        let blob = encode(checkpoint)?;
        let path = self.path_for(YearMonth::of(checkpoint.resume_at));
        let tmp = path.with_extension("gz.tmp");

        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&blob)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)?;

        info!(
            path = %path.display(),
            resume_at = %checkpoint.resume_at,
            bytes = blob.len(),
            "Saved checkpoint"
        );
        Ok(path)
    }

    /// Load the checkpoint for `month`; a missing file is fatal.
    pub fn load(&self, month: YearMonth) -> Result<ScanCheckpoint> {
        let path = self.path_for(month);
        let blob = match fs::read(&path) {
            Ok(blob) => blob,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ScanError::CheckpointMissing(path.display().to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        let checkpoint = decode(&blob)?;

        info!(
            path = %path.display(),
            resume_at = %checkpoint.resume_at,
            cells = checkpoint.cells.len(),
            open_events = checkpoint.freeze.entries.len(),
            "Loaded checkpoint"
        );
        Ok(checkpoint)
    }
}

//! Resuming a scan from checkpoints must reproduce an uninterrupted scan.

use chrono::Duration;
use event_engine::checkpoint::{decode, encode};
use event_engine::{
    Checkpointer, EventScanner, MemoryCatalogWriter, MemorySource, ScanConfig, ScanError,
    SegmentationThresholds,
};
use ros_common::{CellIndex, GridSnapshot, LatLonGrid, YearMonth};
use test_utils::fixtures::{grid, thresholds, time};
use test_utils::SeriesBuilder;

const JAN: usize = 31 * 24;
const JAN_FEB: usize = 59 * 24;

fn config(hours: usize, finalize_at_end: bool) -> ScanConfig {
    let start = time::jan_2001();
    ScanConfig {
        start,
        end: start + Duration::hours(hours as i64),
        freeze_windows_hours: vec![24, 240],
        finalize_at_end,
        ..ScanConfig::default()
    }
}

/// Events open across the January boundary in every stage of their life.
fn series(g: &LatLonGrid) -> Vec<GridSnapshot> {
    SeriesBuilder::new(g.shape(), time::jan_2001(), JAN_FEB)
        .rain(0, 100..110, thresholds::WET_RATE)
        .rain(1, 650..655, thresholds::WET_RATE)
        .rain(2, 742..744, thresholds::WET_RATE)
        .rain(3, 740..760, thresholds::WET_RATE)
        .snow_depth(1, 0..JAN_FEB, thresholds::DEEP_SNOW_M)
        .surface_temp(1, 600..1000, -5.0)
        .surface_temp(3, 0..JAN_FEB, -1.0)
        .build()
}

fn source(g: &LatLonGrid) -> MemorySource {
    let mut source = MemorySource::new(g.clone());
    source.extend(series(g));
    source
}

// ============================================================================
// Split runs
// ============================================================================

#[test]
fn test_split_run_matches_single_run() {
    let g = grid::interior_alaska();
    let cells = CellIndex::all(g.shape());

    let mut single = MemoryCatalogWriter::new();
    EventScanner::new(config(JAN_FEB, true), cells.clone())
        .unwrap()
        .run(&mut source(&g), &mut single, None)
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let checkpointer = Checkpointer::new(dir.path()).unwrap();
    let mut split = MemoryCatalogWriter::new();

    let first = EventScanner::new(config(JAN, false), cells.clone())
        .unwrap()
        .run(&mut source(&g), &mut split, Some(&checkpointer))
        .unwrap();
    assert_eq!(first.checkpoints_written, 1);
    assert!(checkpointer.path_for(YearMonth::new(2001, 2)).exists());

    let checkpoint = checkpointer.load(YearMonth::new(2001, 2)).unwrap();
    let mut resumed = EventScanner::resume(config(JAN_FEB, true), cells, checkpoint).unwrap();
    assert_eq!(resumed.next_hour(), time::ts(2001, 2, 1, 0));
    resumed.run(&mut source(&g), &mut split, Some(&checkpointer)).unwrap();

    assert!(!single.months.is_empty());
    assert_eq!(split.months, single.months);
}

#[test]
fn test_checkpoint_written_at_each_month_boundary() {
    let g = grid::interior_alaska();
    let dir = tempfile::tempdir().unwrap();
    let checkpointer = Checkpointer::new(dir.path()).unwrap();
    let mut writer = MemoryCatalogWriter::new();

    let summary = EventScanner::new(config(JAN_FEB, true), CellIndex::all(g.shape()))
        .unwrap()
        .run(&mut source(&g), &mut writer, Some(&checkpointer))
        .unwrap();

    // The final boundary is not checkpointed when the run finalizes.
    assert_eq!(summary.checkpoints_written, 1);
    assert!(checkpointer.path_for(YearMonth::new(2001, 2)).exists());
    assert!(!checkpointer.path_for(YearMonth::new(2001, 3)).exists());
}

#[test]
fn test_mid_month_blob_resume_is_exact() {
    let g = grid::interior_alaska();
    let cells = CellIndex::all(g.shape());
    let snapshots = series(&g);

    let mut straight = EventScanner::new(config(JAN_FEB, true), cells.clone()).unwrap();
    for snap in &snapshots[..745] {
        straight.step_hour(snap).unwrap();
    }

    let blob = encode(&straight.checkpoint()).unwrap();
    let mut resumed =
        EventScanner::resume(config(JAN_FEB, true), cells, decode(&blob).unwrap()).unwrap();
    assert!(resumed.open_events() > 0);

    for snap in &snapshots[745..793] {
        straight.step_hour(snap).unwrap();
        resumed.step_hour(snap).unwrap();
    }
    assert_eq!(resumed.checkpoint(), straight.checkpoint());
}

// ============================================================================
// Rejections
// ============================================================================

#[test]
fn test_resume_with_changed_thresholds_is_rejected() {
    let g = grid::interior_alaska();
    let cells = CellIndex::all(g.shape());
    let mut scanner = EventScanner::new(config(JAN_FEB, true), cells.clone()).unwrap();
    for snap in &series(&g)[..24] {
        scanner.step_hour(snap).unwrap();
    }
    let checkpoint = scanner.checkpoint();

    let mut changed = config(JAN_FEB, true);
    changed.segmentation = SegmentationThresholds {
        gap_hours: 3,
        ..SegmentationThresholds::default()
    };
    assert!(matches!(
        EventScanner::resume(changed, cells.clone(), checkpoint.clone()),
        Err(ScanError::CheckpointMismatch(_))
    ));

    let mut icing = config(JAN_FEB, true);
    icing.icing.min_snow_depth_m = 0.1;
    assert!(matches!(
        EventScanner::resume(icing, cells.clone(), checkpoint.clone()),
        Err(ScanError::CheckpointMismatch(_))
    ));

    let mut windows = config(JAN_FEB, true);
    windows.freeze_windows_hours = vec![24, 720];
    assert!(matches!(
        EventScanner::resume(windows, cells.clone(), checkpoint.clone()),
        Err(ScanError::CheckpointMismatch(_))
    ));

    assert!(EventScanner::resume(config(JAN_FEB, true), cells, checkpoint).is_ok());
}

#[test]
fn test_resume_with_other_region_is_rejected() {
    let g = grid::interior_alaska();
    let scanner = EventScanner::new(config(JAN_FEB, true), CellIndex::all(g.shape())).unwrap();
    let checkpoint = scanner.checkpoint();

    let coords = CellIndex::all(g.shape()).coords()[..3].to_vec();
    let fewer = CellIndex::from_coords(g.shape(), coords).unwrap();
    assert!(matches!(
        EventScanner::resume(config(JAN_FEB, true), fewer, checkpoint),
        Err(ScanError::CheckpointMismatch(_))
    ));
}

#[test]
fn test_resume_outside_series_is_rejected() {
    let g = grid::single_cell();
    let cells = CellIndex::all(g.shape());
    let mut checkpoint = EventScanner::new(config(JAN_FEB, true), cells.clone())
        .unwrap()
        .checkpoint();
    checkpoint.resume_at = time::ts(2001, 3, 1, 0);
    checkpoint.freeze.last_hour = Some(time::ts(2001, 2, 28, 23));

    assert!(matches!(
        EventScanner::resume(config(JAN_FEB, true), cells, checkpoint),
        Err(ScanError::CheckpointMismatch(_))
    ));
}

#[test]
fn test_missing_checkpoint_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let checkpointer = Checkpointer::new(dir.path()).unwrap();
    assert!(matches!(
        checkpointer.load(YearMonth::new(2001, 2)),
        Err(ScanError::CheckpointMissing(_))
    ));
}

//! Rain-on-snow event scanner.
//!
//! Scans an hourly reanalysis archive once, writing:
//! - Monthly precipitation event catalogs (JSON Lines)
//! - Month-boundary checkpoints for resuming interrupted or partial runs
//! - Optional Prometheus text dump of the scan counters

mod config;

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use event_engine::{
    Checkpointer, EventScanner, HourlySource, JsonLinesCatalogWriter, Merra2Archive,
};
use ros_common::{parse_timestamp, CellIndex, YearMonth};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use config::ScannerConfig;

#[derive(Parser, Debug)]
#[command(name = "event-scanner")]
#[command(about = "Single-pass rain-on-snow event scan over hourly reanalysis grids")]
struct Args {
    /// Configuration file path
    #[arg(short, long, env = "ROS_CONFIG")]
    config: Option<PathBuf>,

    /// MERRA-2 archive root (overrides archive.root)
    #[arg(long, env = "ROS_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Catalog output directory (overrides output.catalog_dir)
    #[arg(long, env = "ROS_CATALOG_DIR")]
    output_dir: Option<PathBuf>,

    /// Checkpoint directory (overrides output.checkpoint_dir)
    #[arg(long, env = "ROS_CHECKPOINT_DIR")]
    checkpoint_dir: Option<PathBuf>,

    /// Resume from the checkpoint for this month (e.g. 2001-02 or 2001-02-01)
    #[arg(long)]
    resume_from: Option<String>,

    /// Leave freeze windows open at the end for a later run to extend
    #[arg(long)]
    no_finalize: bool,

    /// Do not write month-boundary checkpoints
    #[arg(long)]
    no_checkpoints: bool,

    /// Write Prometheus-format counters here when the scan ends
    #[arg(long)]
    metrics_file: Option<PathBuf>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    // Load environment from .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Initialize tracing
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(true)
        .json()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let prometheus = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install Prometheus recorder")?;

    info!("Starting rain-on-snow event scanner");

    // Load configuration
    let mut config = ScannerConfig::load(args.config.as_deref())?;
    if let Some(dir) = args.data_dir {
        config.archive.root = dir;
    }
    if let Some(dir) = args.output_dir {
        config.output.catalog_dir = dir;
    }
    if let Some(dir) = args.checkpoint_dir {
        config.output.checkpoint_dir = dir;
    }
    if args.no_finalize {
        config.scan.finalize_at_end = false;
    }
    config.scan.validate().context("Invalid scan configuration")?;

    info!(
        start = %config.scan.start,
        end = %config.scan.end,
        tag = %config.scan.catalog_tag(),
        windows = ?config.scan.freeze_windows_hours,
        archive = %config.archive.root.display(),
        "Loaded configuration"
    );

    let mut source = Merra2Archive::open(
        &config.archive.root,
        config.archive.layout.clone(),
        config.archive.fields.clone(),
        config.archive.units,
    )
    .with_context(|| format!("Failed to open archive {}", config.archive.root.display()))?;

    // The region sample always comes from the configured start hour, so a
    // resumed run rebuilds the same cell set as the run that checkpointed.
    let sample = source
        .load(config.scan.start)
        .with_context(|| format!("Failed to read region sample at {}", config.scan.start))?;
    let cells =
        CellIndex::from_region(source.grid(), &config.scan.region_boxes(), &sample.precip_rate)
            .context("Failed to build region mask")?;
    info!(cells = cells.len(), grid = ?cells.shape(), "Built region mask");

    let checkpoint_dir = &config.output.checkpoint_dir;
    let checkpointer = Checkpointer::new(checkpoint_dir)
        .with_context(|| format!("Failed to open checkpoint dir {}", checkpoint_dir.display()))?;

    let mut scanner = match &args.resume_from {
        Some(month) => {
            let month = parse_resume_month(month)?;
            let checkpoint = checkpointer
                .load(month)
                .with_context(|| format!("Failed to load checkpoint for {}", month))?;
            EventScanner::resume(config.scan.clone(), cells, checkpoint)
                .context("Failed to resume scan")?
        }
        None => EventScanner::new(config.scan.clone(), cells).context("Failed to start scan")?,
    };

    let catalog_dir = &config.output.catalog_dir;
    let mut writer = JsonLinesCatalogWriter::new(catalog_dir, config.scan.catalog_tag())
        .with_context(|| format!("Failed to open catalog dir {}", catalog_dir.display()))?;

    let checkpoints = (!args.no_checkpoints).then_some(&checkpointer);
    let result = scanner.run(&mut source, &mut writer, checkpoints);

    if let Some(path) = &args.metrics_file {
        if let Err(e) = fs::write(path, prometheus.render()) {
            warn!(path = %path.display(), error = %e, "Failed to write metrics file");
        }
    }

    let summary = result.with_context(|| format!("Scan stopped at {}", scanner.next_hour()))?;
    info!(
        hours = summary.hours_scanned,
        finalized = summary.events_finalized,
        discarded = summary.events_discarded,
        months = summary.months_written,
        provisional_months = summary.provisional_months,
        truncated = summary.truncated_events,
        checkpoints = summary.checkpoints_written,
        "Event scanner finished"
    );

    Ok(())
}

/// Accept `YYYY-MM`, `YYYYMM` or any timestamp inside the month.
fn parse_resume_month(s: &str) -> Result<YearMonth> {
    let trimmed = s.trim();
    let digits: String = trimmed.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() == 6 && trimmed.len() <= 7 {
        let year = digits[..4].parse().context("Invalid resume year")?;
        let month: u32 = digits[4..].parse().context("Invalid resume month")?;
        anyhow::ensure!((1..=12).contains(&month), "Invalid resume month {}", s);
        return Ok(YearMonth::new(year, month));
    }
    let t = parse_timestamp(trimmed).with_context(|| format!("Invalid resume month {}", s))?;
    Ok(YearMonth::of(t))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_resume_month() {
        assert_eq!(parse_resume_month("2001-02").unwrap(), YearMonth::new(2001, 2));
        assert_eq!(parse_resume_month("200102").unwrap(), YearMonth::new(2001, 2));
        assert_eq!(parse_resume_month("2001-02-01").unwrap(), YearMonth::new(2001, 2));
        assert!(parse_resume_month("2001-13").is_err());
        assert!(parse_resume_month("February").is_err());
    }

    #[test]
    fn test_args_parse() {
        let args = Args::parse_from([
            "event-scanner",
            "--config",
            "scan.yaml",
            "--resume-from",
            "2001-02",
            "--no-finalize",
        ]);
        assert_eq!(args.config, Some(PathBuf::from("scan.yaml")));
        assert_eq!(args.resume_from.as_deref(), Some("2001-02"));
        assert!(args.no_finalize);
        assert_eq!(args.log_level, "info");
    }
}

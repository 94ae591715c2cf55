//! Event scanner configuration.
//!
//! A single YAML file with three sections:
//!
//! ```yaml
//! scan:
//!   start: 1980-05-01T00:00:00Z
//!   end: 2019-01-01T00:00:00Z
//!   region_preset: alaska
//! archive:
//!   root: ${MERRA2_ROOT:-/data/merra2}
//! output:
//!   catalog_dir: /data/catalog
//!   checkpoint_dir: /data/checkpoints
//! ```
//!
//! `${VAR}` and `${VAR:-default}` are substituted before parsing; the `ROS_*`
//! scan overrides are applied after.

use anyhow::{Context, Result};
use event_engine::{ArchiveLayout, FieldNames, ScanConfig, UnitConversion};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Top-level scanner configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    pub scan: ScanConfig,
    pub archive: ArchiveConfig,
    pub output: OutputConfig,
}

/// Where the hourly input lives and how to read it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    pub root: PathBuf,
    pub layout: ArchiveLayout,
    pub fields: FieldNames,
    pub units: UnitConversion,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("/data/merra2"),
            layout: ArchiveLayout::default(),
            fields: FieldNames::default(),
            units: UnitConversion::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub catalog_dir: PathBuf,
    pub checkpoint_dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            catalog_dir: PathBuf::from("/data/catalog"),
            checkpoint_dir: PathBuf::from("/data/checkpoints"),
        }
    }
}

impl ScannerConfig {
    /// Load from YAML, or start from defaults when no file is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                let content = fs::read_to_string(path)
                    .with_context(|| format!("Failed to read scanner config from {:?}", path))?;
                Self::from_yaml_str(&content)?
            }
            None => Self::default(),
        };

        Ok(Self {
            scan: config
                .scan
                .with_env_overrides()
                .context("Invalid ROS_* environment override")?,
            ..config
        })
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let expanded = expand_env_vars(content)?;
        serde_yaml::from_str(&expanded).with_context(|| "Failed to parse scanner config YAML")
    }
}

// ============================================================================
// Environment Variable Expansion
// ============================================================================

/// Expand `${VAR}` and `${VAR:-default}` in YAML content.
fn expand_env_vars(content: &str) -> Result<String> {
    let mut result = String::with_capacity(content.len());
    let mut rest = content;

    while let Some(open) = rest.find("${") {
        result.push_str(&rest[..open]);
        let after = &rest[open + 2..];
        let close = after
            .find('}')
            .with_context(|| format!("Unclosed variable substitution: ${{{}", after))?;
        result.push_str(&resolve_var_expr(&after[..close])?);
        rest = &after[close + 1..];
    }
    result.push_str(rest);

    Ok(result)
}

/// Resolve `VAR` or `VAR:-default`.
fn resolve_var_expr(expr: &str) -> Result<String> {
    if let Some((var_name, default)) = expr.split_once(":-") {
        match std::env::var(var_name.trim()) {
            Ok(val) if !val.is_empty() => Ok(val),
            _ => Ok(default.to_string()),
        }
    } else {
        std::env::var(expr.trim()).with_context(|| format!("Environment variable {} not set", expr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use event_engine::RegionPreset;

    #[test]
    fn test_expand_env_vars_with_default() {
        std::env::remove_var("ROS_TEST_UNSET_ROOT");
        let result = expand_env_vars("root: ${ROS_TEST_UNSET_ROOT:-/tmp/merra}/hourly").unwrap();
        assert_eq!(result, "root: /tmp/merra/hourly");
    }

    #[test]
    fn test_expand_env_vars_simple() {
        std::env::set_var("ROS_TEST_CATALOG", "/srv/catalog");
        let result = expand_env_vars("catalog_dir: ${ROS_TEST_CATALOG}").unwrap();
        assert_eq!(result, "catalog_dir: /srv/catalog");
    }

    #[test]
    fn test_expand_env_vars_missing_required() {
        std::env::remove_var("ROS_TEST_REQUIRED");
        assert!(expand_env_vars("${ROS_TEST_REQUIRED}").is_err());
        assert!(expand_env_vars("${ROS_TEST_REQUIRED").is_err());
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
scan:
  start: 2001-01-01T00:00:00Z
  end: 2001-03-01T00:00:00Z
  region_preset: alaska
  segmentation:
    gap_hours: 3
archive:
  root: /data/merra2
  layout:
    air_dir: Hourly/SLV
  fields:
    surface_temp: TS
  units:
    snow_depth_scale: 0.01
output:
  catalog_dir: /tmp/catalog
"#;
        let config = ScannerConfig::from_yaml_str(yaml).unwrap();

        assert_eq!(config.scan.segmentation.gap_hours, 3);
        assert_eq!(config.scan.region_preset, Some(RegionPreset::Alaska));
        assert_eq!(config.archive.layout.air_dir, PathBuf::from("Hourly/SLV"));
        assert_eq!(config.archive.layout.land_dir, PathBuf::from("Hourly/MERRA-LND"));
        assert_eq!(config.archive.fields.surface_temp, "TS");
        assert_eq!(config.archive.fields.air_temp, "T2M");
        assert_eq!(config.archive.units.snow_depth_scale, 0.01);
        assert_eq!(config.archive.units.rate_scale, 3600.0);
        assert_eq!(config.output.catalog_dir, PathBuf::from("/tmp/catalog"));
        assert_eq!(config.output.checkpoint_dir, PathBuf::from("/data/checkpoints"));
        assert!(config.scan.validate().is_ok());
    }
}

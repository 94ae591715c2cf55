//! Configuration for the event scan.

use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, TimeZone, Utc};
use ros_common::{parse_timestamp, LatLonBox, TimeAxis};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ScanError};

/// Post-event freeze horizons in hours (1, 10, 30 and 90 days).
pub const DEFAULT_FREEZE_WINDOWS_HOURS: [u32; 4] = [24, 240, 720, 2160];

/// Thresholds that split the hourly series into events.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationThresholds {
    /// Minimum hourly precipitation rate for a qualifying hour (mm/hr).
    pub rate_threshold_mm_hr: f64,

    /// Minimum event total for an event to be kept (mm).
    pub total_threshold_mm: f64,

    /// Consecutive non-qualifying hours that end an event.
    pub gap_hours: u32,
}

impl Default for SegmentationThresholds {
    fn default() -> Self {
        Self {
            // 0.01 in/day expressed per hour
            rate_threshold_mm_hr: 6.096 / 24.0,
            // 0.01 in per event
            total_threshold_mm: 0.254,
            gap_hours: 2,
        }
    }
}

/// Thresholds for the rain-on-snow icing rules.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IcingThresholds {
    /// Events whose maximum 2-m temperature never exceeds this cannot be rain (°C).
    pub min_allowed_air_temp_c: f64,

    /// Minimum liquid precipitation for icing (mm).
    pub min_icing_rain_mm: f64,

    /// Snow depth above which the ground counts as snow covered (m).
    pub min_snow_depth_m: f64,
}

impl Default for IcingThresholds {
    fn default() -> Self {
        Self {
            min_allowed_air_temp_c: -10.0,
            min_icing_rain_mm: 0.254,
            min_snow_depth_m: 0.0254,
        }
    }
}

/// Named region masks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionPreset {
    Alaska,
}

impl RegionPreset {
    pub fn boxes(&self) -> Vec<LatLonBox> {
        match self {
            RegionPreset::Alaska => LatLonBox::alaska(),
        }
    }

    /// Name used in catalog file names.
    pub fn label(&self) -> &'static str {
        match self {
            RegionPreset::Alaska => "Alaska",
        }
    }
}

/// Top-level scan configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// First hourly slice of the series (inclusive).
    pub start: DateTime<Utc>,

    /// First timestamp past the series (exclusive).
    pub end: DateTime<Utc>,

    pub segmentation: SegmentationThresholds,

    pub icing: IcingThresholds,

    /// Freeze window horizons in hours, strictly increasing.
    pub freeze_windows_hours: Vec<u32>,

    /// Optional named region; combined with `region`.
    pub region_preset: Option<RegionPreset>,

    /// Extra region boxes. Empty together with no preset means every cell.
    pub region: Vec<LatLonBox>,

    /// Close open freeze windows as truncated when the series ends.
    /// Disable for a partial run that a later run will extend.
    pub finalize_at_end: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            start: Utc.with_ymd_and_hms(1980, 5, 1, 0, 0, 0).single().unwrap_or_default(),
            end: Utc.with_ymd_and_hms(2019, 1, 1, 0, 0, 0).single().unwrap_or_default(),
            segmentation: SegmentationThresholds::default(),
            icing: IcingThresholds::default(),
            freeze_windows_hours: DEFAULT_FREEZE_WINDOWS_HOURS.to_vec(),
            region_preset: None,
            region: Vec::new(),
            finalize_at_end: true,
        }
    }
}

impl ScanConfig {
    /// Load configuration from a YAML file.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&text)
    }

    /// Parse configuration from YAML text.
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Overlay environment variables on top of the current values.
    ///
    /// A variable that is set but does not parse is a configuration error.
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Some(v) = env_parse("ROS_RATE_THRESHOLD_MM_HR")? {
            self.segmentation.rate_threshold_mm_hr = v;
        }
        if let Some(v) = env_parse("ROS_TOTAL_THRESHOLD_MM")? {
            self.segmentation.total_threshold_mm = v;
        }
        if let Some(v) = env_parse("ROS_GAP_HOURS")? {
            self.segmentation.gap_hours = v;
        }
        if let Some(v) = env_parse("ROS_MIN_AIR_TEMP_C")? {
            self.icing.min_allowed_air_temp_c = v;
        }
        if let Some(v) = env_parse("ROS_MIN_ICING_RAIN_MM")? {
            self.icing.min_icing_rain_mm = v;
        }
        if let Some(v) = env_parse("ROS_MIN_SNOW_DEPTH_M")? {
            self.icing.min_snow_depth_m = v;
        }

        if let Ok(val) = std::env::var("ROS_START") {
            self.start = parse_timestamp(&val)
                .map_err(|e| ScanError::configuration(format!("ROS_START: {}", e)))?;
        }
        if let Ok(val) = std::env::var("ROS_END") {
            self.end = parse_timestamp(&val)
                .map_err(|e| ScanError::configuration(format!("ROS_END: {}", e)))?;
        }

        if let Ok(val) = std::env::var("ROS_FREEZE_WINDOWS_HOURS") {
            self.freeze_windows_hours = val
                .split(',')
                .map(|s| parse_value("ROS_FREEZE_WINDOWS_HOURS", s.trim()))
                .collect::<Result<Vec<u32>>>()?;
        }

        if let Ok(val) = std::env::var("ROS_FINALIZE_AT_END") {
            self.finalize_at_end = match val.trim().to_lowercase().as_str() {
                "true" | "1" => true,
                "false" | "0" => false,
                other => {
                    return Err(ScanError::configuration(format!(
                        "ROS_FINALIZE_AT_END: expected true or false, got {:?}",
                        other
                    )))
                }
            };
        }

        Ok(self)
    }

    /// Validate the configuration before any state is created.
    pub fn validate(&self) -> Result<()> {
        let seg = &self.segmentation;
        let icing = &self.icing;

        // A zero rate would make every hour qualify and no event could end.
        if !seg.rate_threshold_mm_hr.is_finite() || seg.rate_threshold_mm_hr <= 0.0 {
            return Err(ScanError::configuration("rate_threshold_mm_hr must be finite and > 0"));
        }
        if !seg.total_threshold_mm.is_finite() || seg.total_threshold_mm < 0.0 {
            return Err(ScanError::configuration("total_threshold_mm must be finite and >= 0"));
        }
        if seg.gap_hours == 0 {
            return Err(ScanError::configuration("gap_hours must be > 0"));
        }

        if !icing.min_allowed_air_temp_c.is_finite() || icing.min_allowed_air_temp_c < -273.15 {
            return Err(ScanError::configuration(
                "min_allowed_air_temp_c must be finite and above absolute zero",
            ));
        }
        if !icing.min_icing_rain_mm.is_finite() || icing.min_icing_rain_mm < 0.0 {
            return Err(ScanError::configuration("min_icing_rain_mm must be finite and >= 0"));
        }
        if !icing.min_snow_depth_m.is_finite() || icing.min_snow_depth_m < 0.0 {
            return Err(ScanError::configuration("min_snow_depth_m must be finite and >= 0"));
        }

        if self.freeze_windows_hours.is_empty() {
            return Err(ScanError::configuration("at least one freeze window is required"));
        }
        if self.freeze_windows_hours.windows(2).any(|w| w[0] >= w[1]) {
            return Err(ScanError::configuration(
                "freeze_windows_hours must be strictly increasing",
            ));
        }
        // The gap hours after an event already belong to every window.
        if self.freeze_windows_hours[0] <= seg.gap_hours {
            return Err(ScanError::configuration(format!(
                "every freeze window must exceed gap_hours ({})",
                seg.gap_hours
            )));
        }

        if let Some(b) = self.region.iter().find(|b| !b.is_valid()) {
            return Err(ScanError::configuration(format!("invalid region box {:?}", b)));
        }

        let axis = self.time_axis()?;
        if !self.finalize_at_end && !TimeAxis::is_last_hour_of_month(axis.last()) {
            return Err(ScanError::configuration(
                "a run with finalize_at_end = false must end on a month boundary",
            ));
        }

        Ok(())
    }

    /// The hourly axis covered by this configuration.
    pub fn time_axis(&self) -> Result<TimeAxis> {
        TimeAxis::new(self.start, self.end).map_err(|e| ScanError::configuration(e.to_string()))
    }

    /// Preset boxes followed by explicit boxes.
    pub fn region_boxes(&self) -> Vec<LatLonBox> {
        let mut boxes = self.region_preset.map(|p| p.boxes()).unwrap_or_default();
        boxes.extend(self.region.iter().copied());
        boxes
    }

    /// Tag used in catalog file names, e.g. `Alaska_Gap2_Rate0.254_Total0.254`.
    /// The region prefix is present only when a preset is set.
    pub fn catalog_tag(&self) -> String {
        let rate = (self.segmentation.rate_threshold_mm_hr * 1e4).round() / 1e4;
        let thresholds = format!(
            "Gap{}_Rate{}_Total{}",
            self.segmentation.gap_hours, rate, self.segmentation.total_threshold_mm
        );
        match self.region_preset {
            Some(preset) => format!("{}_{}", preset.label(), thresholds),
            None => thresholds,
        }
    }
}

fn env_parse<T: FromStr>(name: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(val) => parse_value(name, val.trim()).map(Some),
        Err(_) => Ok(None),
    }
}

fn parse_value<T: FromStr>(name: &str, val: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    val.parse()
        .map_err(|e| ScanError::configuration(format!("{}: invalid value {:?}: {}", name, val, e)))
}

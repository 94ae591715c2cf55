//! MERRA-2 hourly netCDF archive.
//!
//! Two collections of daily files share one latitude/longitude grid and hold
//! 24 hourly grids per variable, dimensioned `(time, lat, lon)`:
//!
//! ```text
//! <root>/Hourly/MERRA-LND/MERRA2_400.tavg1_2d_lnd_Nx.YYYYMMDD.nc4
//!     PRECTOTLAND PRECSNOLAND SNODP TSURF
//! <root>/Hourly/T2M/MERRA2_400.tavg1_2d_slv_Nx.YYYYMMDD.nc4
//!     T2M
//! ```
//!
//! Files are matched on the `YYYYMMDD` in their name. Hour `h` of a day file
//! is the slice stamped `YYYY-MM-DD hh:00 UTC`. Fill values become NaN and
//! unit conversion is applied on load.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Timelike, Utc};
use ros_common::{Field, GridSnapshot, LatLonGrid};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Result, ScanError};
use crate::source::HourlySource;

pub const HOURS_PER_DAY: usize = 24;

/// The two MERRA-2 collections a scan reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    /// Land surface diagnostics (`tavg1_2d_lnd_Nx`).
    Land,
    /// Single-level diagnostics (`tavg1_2d_slv_Nx`).
    Air,
}

impl Collection {
    /// Collection holding `field`.
    pub fn of(field: Field) -> Self {
        match field {
            Field::AirTemp => Collection::Air,
            _ => Collection::Land,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Land => "land",
            Collection::Air => "air",
        }
    }
}

/// Collection directories relative to the archive root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveLayout {
    pub land_dir: PathBuf,
    pub air_dir: PathBuf,
}

impl Default for ArchiveLayout {
    fn default() -> Self {
        Self {
            land_dir: PathBuf::from("Hourly/MERRA-LND"),
            air_dir: PathBuf::from("Hourly/T2M"),
        }
    }
}

impl ArchiveLayout {
    pub fn dir(&self, collection: Collection) -> &Path {
        match collection {
            Collection::Land => &self.land_dir,
            Collection::Air => &self.air_dir,
        }
    }
}

/// netCDF variable name of each field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldNames {
    pub precip_rate: String,
    pub snowfall_rate: String,
    pub snow_depth: String,
    pub surface_temp: String,
    pub air_temp: String,
}

impl Default for FieldNames {
    /// MERRA-2 land and single-level names.
    fn default() -> Self {
        Self {
            precip_rate: "PRECTOTLAND".to_string(),
            snowfall_rate: "PRECSNOLAND".to_string(),
            snow_depth: "SNODP".to_string(),
            surface_temp: "TSURF".to_string(),
            air_temp: "T2M".to_string(),
        }
    }
}

impl FieldNames {
    pub fn name(&self, field: Field) -> &str {
        match field {
            Field::PrecipRate => &self.precip_rate,
            Field::SnowfallRate => &self.snowfall_rate,
            Field::SnowDepth => &self.snow_depth,
            Field::SurfaceTemp => &self.surface_temp,
            Field::AirTemp => &self.air_temp,
        }
    }
}

/// Conversion from stored units to scan units (mm/hr, m, °C).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnitConversion {
    /// Multiplier for precipitation and snowfall rates.
    pub rate_scale: f64,
    pub snow_depth_scale: f64,
    /// Added to both temperatures.
    pub temperature_offset: f64,
}

impl Default for UnitConversion {
    /// kg m^-2 s^-1 to mm/hr, metres unchanged, Kelvin to °C.
    fn default() -> Self {
        Self {
            rate_scale: 3600.0,
            snow_depth_scale: 1.0,
            temperature_offset: -273.15,
        }
    }
}

impl UnitConversion {
    /// Values are stored in scan units already.
    pub fn identity() -> Self {
        Self {
            rate_scale: 1.0,
            snow_depth_scale: 1.0,
            temperature_offset: 0.0,
        }
    }

    fn apply(&self, field: Field, raw: f32) -> f32 {
        let v = f64::from(raw);
        let converted = match field {
            Field::PrecipRate | Field::SnowfallRate => v * self.rate_scale,
            Field::SnowDepth => v * self.snow_depth_scale,
            Field::SurfaceTemp | Field::AirTemp => v + self.temperature_offset,
        };
        converted as f32
    }
}

struct LoadedDay {
    date: NaiveDate,
    /// One buffer per field in `Field::ALL` order, 24 grids each.
    fields: Vec<Vec<f32>>,
}

/// Hourly source backed by MERRA-2 netCDF day files.
pub struct Merra2Archive {
    root: PathBuf,
    layout: ArchiveLayout,
    names: FieldNames,
    conversion: UnitConversion,
    grid: LatLonGrid,
    land_files: BTreeMap<NaiveDate, PathBuf>,
    air_files: BTreeMap<NaiveDate, PathBuf>,
    day: Option<LoadedDay>,
}

impl Merra2Archive {
    /// Index both collections and read the grid from the first land file.
    pub fn open(
        root: impl Into<PathBuf>,
        layout: ArchiveLayout,
        names: FieldNames,
        conversion: UnitConversion,
    ) -> Result<Self> {
        let root = root.into();
        let land_files = index_day_files(&root.join(&layout.land_dir))?;
        let air_files = index_day_files(&root.join(&layout.air_dir))?;

        let Some(sample) = land_files.values().next() else {
            return Err(ScanError::configuration(format!(
                "no netCDF day files under {}",
                root.join(&layout.land_dir).display()
            )));
        };
        let grid = read_grid(sample)?;
        if grid.shape().is_empty() {
            return Err(ScanError::configuration(format!(
                "{} describes an empty grid",
                sample.display()
            )));
        }

        info!(
            root = %root.display(),
            land_days = land_files.len(),
            air_days = air_files.len(),
            first = ?land_files.keys().next(),
            last = ?land_files.keys().next_back(),
            grid = ?grid.shape(),
            "Opened MERRA-2 archive"
        );

        Ok(Self {
            root,
            layout,
            names,
            conversion,
            grid,
            land_files,
            air_files,
            day: None,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn open_day(
        &self,
        collection: Collection,
        date: NaiveDate,
        valid_time: DateTime<Utc>,
    ) -> Result<netcdf::File> {
        let files = match collection {
            Collection::Land => &self.land_files,
            Collection::Air => &self.air_files,
        };
        let Some(path) = files.get(&date) else {
            return Err(ScanError::input_gap(
                valid_time,
                format!(
                    "no {} file for {} under {}",
                    collection.as_str(),
                    date,
                    self.root.join(self.layout.dir(collection)).display()
                ),
            ));
        };
        netcdf::open(path).map_err(|e| {
            ScanError::input_gap(valid_time, format!("cannot open {}: {}", path.display(), e))
        })
    }

    fn load_day(&self, date: NaiveDate, valid_time: DateTime<Utc>) -> Result<LoadedDay> {
        let land = self.open_day(Collection::Land, date, valid_time)?;
        let air = self.open_day(Collection::Air, date, valid_time)?;

        let mut fields = Vec::with_capacity(Field::ALL.len());
        for field in Field::ALL {
            let file = match Collection::of(field) {
                Collection::Land => &land,
                Collection::Air => &air,
            };
            fields.push(self.read_field(file, field, valid_time)?);
        }

        debug!(date = %date, "Loaded day files");
        Ok(LoadedDay { date, fields })
    }

    /// Read all 24 hourly grids of one field, in scan units.
    fn read_field(
        &self,
        file: &netcdf::File,
        field: Field,
        valid_time: DateTime<Utc>,
    ) -> Result<Vec<f32>> {
        let name = self.names.name(field);
        let var = file.variable(name).ok_or_else(|| {
            ScanError::missing_field(valid_time, name, "variable not present in day file")
        })?;

        let shape = self.grid.shape();
        let dims: Vec<usize> = var.dimensions().iter().map(|d| d.len()).collect();
        if dims != [HOURS_PER_DAY, shape.ny, shape.nx] {
            return Err(ScanError::missing_field(
                valid_time,
                name,
                format!(
                    "dimensions {:?}, expected [{}, {}, {}]",
                    dims, HOURS_PER_DAY, shape.ny, shape.nx
                ),
            ));
        }

        let raw: Vec<f32> = var.get_values(..).map_err(|e| {
            ScanError::missing_field(valid_time, name, format!("read failed: {}", e))
        })?;

        let fill = get_f32_attr(&var, "_FillValue").or_else(|| get_f32_attr(&var, "missing_value"));
        let scale = get_f32_attr(&var, "scale_factor").unwrap_or(1.0);
        let offset = get_f32_attr(&var, "add_offset").unwrap_or(0.0);

        Ok(raw
            .into_iter()
            .map(|v| {
                if fill == Some(v) || !v.is_finite() {
                    f32::NAN
                } else {
                    self.conversion.apply(field, v * scale + offset)
                }
            })
            .collect())
    }
}

impl HourlySource for Merra2Archive {
    fn grid(&self) -> &LatLonGrid {
        &self.grid
    }

    fn load(&mut self, valid_time: DateTime<Utc>) -> Result<GridSnapshot> {
        let date = valid_time.date_naive();
        if self.day.as_ref().map(|d| d.date) != Some(date) {
            self.day = Some(self.load_day(date, valid_time)?);
        }
        let Some(day) = self.day.as_ref() else {
            return Err(ScanError::input_gap(valid_time, "day buffer unavailable"));
        };

        let n = self.grid.shape().len();
        let hour = valid_time.hour() as usize;
        let slice = |i: usize| day.fields[i][hour * n..(hour + 1) * n].to_vec();

        Ok(GridSnapshot {
            valid_time,
            shape: self.grid.shape(),
            precip_rate: slice(0),
            snowfall_rate: slice(1),
            snow_depth: slice(2),
            surface_temp: slice(3),
            air_temp: slice(4),
        })
    }
}

// =============================================================================
// Internal helpers
// =============================================================================

/// Map each date found in a file name under `dir` to its file.
///
/// Reprocessed files (e.g. `MERRA2_401`) sort after the originals and win.
fn index_day_files(dir: &Path) -> Result<BTreeMap<NaiveDate, PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|e| {
        ScanError::configuration(format!("cannot list archive dir {}: {}", dir.display(), e))
    })?;

    let mut paths: Vec<PathBuf> = Vec::new();
    for entry in entries {
        let path = entry?.path();
        let is_netcdf = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e == "nc4" || e == "nc");
        if is_netcdf {
            paths.push(path);
        }
    }
    paths.sort();

    let mut files = BTreeMap::new();
    for path in paths {
        let Some(date) = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(date_in_name)
        else {
            continue;
        };
        if let Some(previous) = files.insert(date, path.clone()) {
            warn!(
                date = %date,
                replaced = %previous.display(),
                kept = %path.display(),
                "Duplicate day file"
            );
        }
    }
    Ok(files)
}

/// First run of exactly eight digits that forms a valid date.
fn date_in_name(name: &str) -> Option<NaiveDate> {
    let bytes = name.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if !bytes[i].is_ascii_digit() {
            i += 1;
            continue;
        }
        let start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        if i - start == 8 {
            if let Ok(date) = NaiveDate::parse_from_str(&name[start..i], "%Y%m%d") {
                return Some(date);
            }
        }
    }
    None
}

fn read_grid(path: &Path) -> Result<LatLonGrid> {
    let file = netcdf::open(path).map_err(|e| {
        ScanError::configuration(format!("cannot open {}: {}", path.display(), e))
    })?;
    let lats = read_axis(&file, "lat", path)?;
    let lons = read_axis(&file, "lon", path)?;
    Ok(LatLonGrid::new(lats, lons))
}

fn read_axis(file: &netcdf::File, name: &str, path: &Path) -> Result<Vec<f64>> {
    let var = file.variable(name).ok_or_else(|| {
        ScanError::configuration(format!("{} has no {} variable", path.display(), name))
    })?;
    var.get_values::<f64, _>(..).map_err(|e| {
        ScanError::configuration(format!("cannot read {} from {}: {}", name, path.display(), e))
    })
}

/// Check if a variable has an attribute with the given name.
fn has_attr(var: &netcdf::Variable, name: &str) -> bool {
    var.attributes().any(|attr| attr.name() == name)
}

fn get_f32_attr(var: &netcdf::Variable, name: &str) -> Option<f32> {
    if !has_attr(var, name) {
        return None;
    }
    let attr_value = var.attribute_value(name)?.ok()?;
    f32::try_from(attr_value).ok()
}
